use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter applying `level` to all ci-artifacts crates
pub fn filter_for_level(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    ["ci_artifacts", "ci_artifacts_core", "ci_artifacts_jenkins", "ci_artifacts_api"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// `RUST_LOG` wins over `default_filter`. Logs go to stderr, stdout is
/// reserved for the JSON result.
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_level() {
        let filter = filter_for_level("DEBUG");
        assert!(filter.starts_with("ci_artifacts=debug,"));
        assert!(filter.contains("ci_artifacts_jenkins=debug"));
    }
}
