use std::collections::BTreeMap;
use std::fmt;

use ci_artifacts_api::{
    CiError,
    CiResult,
    JenkinsApi,
    ReservationOutcome,
};

use crate::domain::report::ReservationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationAction {
    Reserve,
    Unreserve,
}

impl fmt::Display for ReservationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserve => write!(f, "reserve"),
            Self::Unreserve => write!(f, "unreserve"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationOptions {
    pub dry_run: bool,
    /// Error out instead of warning when a resource is held by someone else
    pub fail_already_locked: bool,
}

/// Resource names grouped by label
pub async fn list_resources(api: &dyn JenkinsApi) -> CiResult<BTreeMap<String, Vec<String>>> {
    let resources = api.lockable_resources().await?;
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for resource in resources {
        for label in &resource.labels {
            buckets
                .entry(label.clone())
                .or_default()
                .push(resource.name.clone());
        }
    }
    Ok(buckets)
}

pub async fn change_reservations(
    api: &dyn JenkinsApi, action: ReservationAction, names: &[String],
    options: ReservationOptions,
) -> CiResult<ReservationReport> {
    let mut report = ReservationReport {
        action: action.to_string(),
        done: Vec::new(),
        already_locked: Vec::new(),
        dry_run: options.dry_run,
    };

    for name in names {
        if options.dry_run {
            tracing::info!("Would {action} the resource {name}");
            continue;
        }

        let outcome = match action {
            ReservationAction::Reserve => api.reserve_resource(name).await?,
            ReservationAction::Unreserve => api.unreserve_resource(name).await?,
        };
        match outcome {
            ReservationOutcome::Done => {
                tracing::debug!("{name} {action}d successfully");
                report.done.push(name.clone());
            }
            ReservationOutcome::AlreadyLocked => {
                tracing::warn!("Resource {name} already locked");
                if options.fail_already_locked {
                    return Err(CiError::ResourceLocked(name.clone()));
                }
                report.already_locked.push(name.clone());
            }
        }
    }
    Ok(report)
}
