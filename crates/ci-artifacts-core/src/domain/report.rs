//! JSON objects printed on stdout, one per invocation

use std::collections::BTreeMap;

use chrono::{
    DateTime,
    Utc,
};
use ci_artifacts_api::{
    BuildHandle,
    BuildRecord,
    BuildState,
    CiError,
    JobInfo,
    JobPath,
    ParameterSet,
    QueueItem,
};
use serde::Serialize;

pub const EXIT_FAILURE: i32 = 1;

/// Build failed (strict mode) or waiting timed out
pub const EXIT_BUILD_FAILED: i32 = 2;

pub const EXIT_NO_ACTION: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub job: JobPath,
    pub number: u64,
    pub url: String,
    pub result: BuildState,
    pub timestamp: DateTime<Utc>,
    pub parameters: ParameterSet,
}

impl From<&BuildRecord> for BuildSummary {
    fn from(build: &BuildRecord) -> Self {
        Self {
            job: build.job.clone(),
            number: build.number,
            url: build.url.clone(),
            result: build.state,
            timestamp: build.timestamp,
            parameters: build.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSummary {
    pub job: JobPath,
    pub queue_id: u64,
    pub parameters: ParameterSet,
}

impl From<&QueueItem> for QueueSummary {
    fn from(item: &QueueItem) -> Self {
        Self {
            job: item.job.clone(),
            queue_id: item.id,
            parameters: item.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HandleSummary {
    Build(BuildSummary),
    Queued(QueueSummary),
}

impl From<&BuildHandle> for HandleSummary {
    fn from(handle: &BuildHandle) -> Self {
        match handle {
            BuildHandle::Queued(item) => HandleSummary::Queued(item.into()),
            BuildHandle::Started(build) => HandleSummary::Build(build.into()),
        }
    }
}

/// A build request that was not sent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassiveRequest {
    pub job: JobPath,
    pub params: ParameterSet,
}

/// Output of `request`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestReport {
    Existing(HandleSummary),
    TriggeredBuild(QueueSummary),
    Passive(PassiveRequest),
}

/// Output of the waiting commands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultReport {
    pub result: BuildState,
    pub build: u64,
    pub url: String,
    pub artifacts: Vec<String>,
}

impl ResultReport {
    pub fn new(build: &BuildRecord, artifacts: Vec<String>) -> Self {
        Self {
            result: build.state,
            build: build.number,
            url: build.url.clone(),
            artifacts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationReport {
    pub action: String,
    pub done: Vec<String>,
    pub already_locked: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoActionReport {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Request(RequestReport),
    Result(ResultReport),
    Info(Box<JobInfo>),
    Resources(BTreeMap<String, Vec<String>>),
    Reservation(ReservationReport),
    NoAction(NoActionReport),
    Empty(Empty),
}

/// A report together with the process exit code it implies
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub report: Report,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(report: Report) -> Self {
        Self {
            report,
            exit_code: 0,
        }
    }

    pub fn no_action(report: Report) -> Self {
        Self {
            report,
            exit_code: EXIT_NO_ACTION,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.report).unwrap_or_else(|_| "{}".to_string())
    }
}

/// JSON object and exit code for a fatal error
pub fn error_report(err: &CiError) -> (serde_json::Value, i32) {
    match err {
        CiError::BuildFailed { what, state, url } => (
            serde_json::json!({
                "result": state,
                "build": what,
                "url": url,
                "error": err.to_string(),
            }),
            EXIT_BUILD_FAILED,
        ),
        CiError::PollTimeout { .. } => (
            serde_json::json!({ "error": err.to_string() }),
            EXIT_BUILD_FAILED,
        ),
        _ => (
            serde_json::json!({ "error": err.to_string() }),
            EXIT_FAILURE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use ci_artifacts_api::ParamValue;

    use super::*;

    #[test]
    fn test_request_report_shape() {
        let mut params = ParameterSet::new();
        params.insert("EDITION", ParamValue::Text("raw".into()));
        let item = QueueItem {
            job: "checkmk/master/build".parse().unwrap(),
            id: 4711,
            parameters: params,
            executable: None,
            cancelled: false,
            why: None,
        };

        let report = Report::Request(RequestReport::TriggeredBuild((&item).into()));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "triggered_build": {
                    "job": "checkmk/master/build",
                    "queue_id": 4711,
                    "parameters": {"EDITION": "raw"}
                }
            })
        );
    }

    #[test]
    fn test_empty_and_error_reports() {
        let output = CommandOutput::ok(Report::Empty(Empty::default()));
        assert_eq!(output.to_json(), "{}");

        let (json, code) = error_report(&CiError::BuildFailed {
            what: "job#12".into(),
            state: BuildState::Failure,
            url: None,
        });
        assert_eq!(json["result"], "FAILURE");
        assert_eq!(code, EXIT_BUILD_FAILED);

        let (_, code) = error_report(&CiError::ParameterFormat("x".into()));
        assert_eq!(code, EXIT_FAILURE);
    }
}
