use std::path::{
    Path,
    PathBuf,
};

use thiserror::Error;

use super::interpolation::{
    interpolate_toml,
    InterpolationError,
};
use super::schema::CiArtifactsConfig;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Environment variable interpolation failed: {0}")]
    InterpolationError(#[from] InterpolationError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ConfigLoadResult<T> = Result<T, ConfigLoadError>;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn discover_config_path() -> PathBuf {
        let path = CiArtifactsConfig::default_config_path();
        tracing::debug!("Using config path: {}", path.display());
        path
    }

    /// Loads the config if there is one, an absent file yields the defaults
    pub fn load_default() -> ConfigLoadResult<CiArtifactsConfig> {
        let path = Self::discover_config_path();
        match Self::load(&path) {
            Err(ConfigLoadError::FileNotFound(_)) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(CiArtifactsConfig::default())
            }
            other => other,
        }
    }

    pub fn load(path: &Path) -> ConfigLoadResult<CiArtifactsConfig> {
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigLoadResult<CiArtifactsConfig> {
        let table: toml::Table = toml::from_str(content)?;
        let mut value = toml::Value::Table(table);
        interpolate_toml(&mut value)?;

        let config: CiArtifactsConfig = value.try_into()?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &CiArtifactsConfig) -> ConfigLoadResult<()> {
        let defaults = &config.defaults;
        if defaults.poll_queue_sleep_secs == 0 || defaults.poll_build_sleep_secs == 0 {
            return Err(ConfigLoadError::InvalidConfig(
                "poll intervals must be at least one second".to_string(),
            ));
        }
        if defaults.retry_attempts == 0 {
            return Err(ConfigLoadError::InvalidConfig(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(url) = config.jenkins.url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigLoadError::InvalidConfig(format!(
                    "jenkins.url '{url}' is not an http(s) URL"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraint::DEFAULT_MAX_BUILDS;

    #[test]
    fn test_parse_full_config() {
        std::env::set_var("CI_ARTIFACTS_LOADER_TOKEN", "s3cr3t");
        let config = ConfigLoader::parse(
            r#"
            [jenkins]
            url = "https://ci.example.com"
            username = "jane"
            password = "${CI_ARTIFACTS_LOADER_TOKEN}"

            [defaults]
            poll_queue_sleep_secs = 10
            ignore_params = ["DISABLE_CACHE", "CIPARAM_CLEANUP"]
            "#,
        )
        .unwrap();
        std::env::remove_var("CI_ARTIFACTS_LOADER_TOKEN");

        assert_eq!(config.jenkins.password.as_deref(), Some("s3cr3t"));
        assert_eq!(config.jenkins.timeout_secs, 120);
        assert_eq!(config.defaults.poll_queue_sleep_secs, 10);
        assert_eq!(config.defaults.poll_build_sleep_secs, 60);
        assert_eq!(config.defaults.ignore_params.len(), 2);
    }

    #[test]
    fn test_parse_request_timeout() {
        let config = ConfigLoader::parse("[jenkins]\ntimeout = 30\n").unwrap();
        assert_eq!(config.jenkins.timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigLoader::parse("").unwrap();
        assert!(config.jenkins.url.is_none());
        assert_eq!(config.defaults.poll_queue_sleep_secs, 30);
        assert_eq!(config.defaults.retry_attempts, 5);
        assert_eq!(config.defaults.max_builds, DEFAULT_MAX_BUILDS);
        assert_eq!(config.defaults.ignore_params, vec!["DISABLE_CACHE".to_string()]);
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let result = ConfigLoader::parse("[defaults]\npoll_build_sleep_secs = 0\n");
        assert!(matches!(result, Err(ConfigLoadError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load(&dir.path().join("config.toml"));
        assert!(matches!(result, Err(ConfigLoadError::FileNotFound(_))));
    }
}
