use std::collections::{
    BTreeMap,
    BTreeSet,
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::CiError;
use crate::params::ParameterSet;

/// Slash separated job name, e.g. `folder/sub-folder/job`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobPath(String);

impl JobPath {
    pub fn new(path: &str) -> Result<Self, CiError> {
        let trimmed = path.trim_matches(|c: char| c == '/' || c.is_whitespace());
        if trimmed.is_empty() {
            return Err(CiError::ParameterFormat("job path must not be empty".to_string()));
        }
        if trimmed.split('/').any(|segment| segment.trim().is_empty()) {
            return Err(CiError::ParameterFormat(format!(
                "job path '{path}' contains an empty segment"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for JobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobPath {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobPath {
    type Error = CiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<JobPath> for String {
    fn from(path: JobPath) -> Self {
        path.0
    }
}

/// Lifecycle state of a build request or build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    Queued,
    Running,
    Success,
    Unstable,
    Failure,
    Aborted,
    NotBuilt,
    Unknown,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BuildState::Queued | BuildState::Running)
    }

    pub fn is_success(self) -> bool {
        self == BuildState::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildState::Queued => "QUEUED",
            BuildState::Running => "RUNNING",
            BuildState::Success => "SUCCESS",
            BuildState::Unstable => "UNSTABLE",
            BuildState::Failure => "FAILURE",
            BuildState::Aborted => "ABORTED",
            BuildState::NotBuilt => "NOT_BUILT",
            BuildState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build of a job, as reported by Jenkins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub job: JobPath,
    pub number: u64,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub state: BuildState,
    pub parameters: ParameterSet,
    pub artifacts: Vec<String>,
    /// Dependency path fingerprint recorded when the build was triggered
    pub path_hashes: Option<BTreeMap<String, String>>,
}

impl BuildRecord {
    pub fn describe(&self) -> String {
        format!("{}#{}", self.job, self.number)
    }
}

/// A build request waiting in the Jenkins queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub job: JobPath,
    pub id: u64,
    pub parameters: ParameterSet,
    /// Build number, once the scheduler started the build
    pub executable: Option<u64>,
    pub cancelled: bool,
    pub why: Option<String>,
}

impl QueueItem {
    pub fn describe(&self) -> String {
        format!("{} (queue item {})", self.job, self.id)
    }
}

/// Something that can be waited on: a queued request or a started build
#[derive(Debug, Clone, PartialEq)]
pub enum BuildHandle {
    Queued(QueueItem),
    Started(BuildRecord),
}

impl BuildHandle {
    pub fn describe(&self) -> String {
        match self {
            BuildHandle::Queued(item) => item.describe(),
            BuildHandle::Started(build) => build.describe(),
        }
    }
}

/// A build artifact together with the MD5 hash Jenkins fingerprinted for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub md5: Option<String>,
}

/// Kind of node in the job tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Folder,
    Workflow,
    Freestyle,
    MultiBranch,
    Other,
}

/// Summary of a build as listed on its job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: u64,
    pub url: String,
}

/// Job or folder description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub path: JobPath,
    pub name: String,
    pub url: String,
    pub kind: JobKind,
    pub class: String,
    /// Newest first
    pub builds: Vec<BuildRef>,
    pub in_queue: bool,
    pub children: Vec<String>,
    pub last_successful_build: Option<u64>,
    pub last_completed_build: Option<u64>,
    /// Parameters defined as booleans on the job
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub boolean_params: BTreeSet<String>,
}

/// A resource managed by the lockable-resources plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockableResource {
    pub name: String,
    pub labels: Vec<String>,
    pub description: Option<String>,
    pub locked: bool,
    pub reserved: bool,
    pub reserved_by: Option<String>,
}

/// Result of asking Jenkins to reserve or release a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    Done,
    AlreadyLocked,
}
