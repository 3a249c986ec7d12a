//! API response types for Jenkins API
//!
//! Everything the Jenkins side may leave out is optional here; the mapper
//! decides which fields are required.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct WhoAmI {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "_class")]
    #[serde(default)]
    pub _class: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildRef {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Job {
    #[serde(rename = "_class")]
    #[serde(default)]
    pub _class: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "fullName")]
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub builds: Vec<BuildRef>,
    #[serde(rename = "inQueue")]
    #[serde(default)]
    pub in_queue: bool,
    #[serde(default)]
    pub jobs: Vec<JobItem>,
    #[serde(rename = "lastSuccessfulBuild")]
    #[serde(default)]
    pub last_successful_build: Option<BuildRef>,
    #[serde(rename = "lastCompletedBuild")]
    #[serde(default)]
    pub last_completed_build: Option<BuildRef>,
    #[serde(default)]
    pub property: Vec<JobProperty>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobProperty {
    #[serde(rename = "parameterDefinitions")]
    #[serde(default)]
    pub parameter_definitions: Vec<ParameterDefinition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParameterDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Build {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    #[serde(rename = "inProgress")]
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
    #[serde(default)]
    pub actions: Vec<Option<BuildAction>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildArtifact {
    #[serde(rename = "relativePath")]
    #[serde(default)]
    pub relative_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildAction {
    #[serde(rename = "_class")]
    #[serde(default)]
    pub _class: Option<String>,
    #[serde(default)]
    pub parameters: Vec<BuildParameter>,
    /// Free form key/value data set by the pipeline (CustomBuildPropertiesAction)
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildParameter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueTask {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueItem {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub task: Option<QueueTask>,
    #[serde(default)]
    pub actions: Vec<Option<BuildAction>>,
    #[serde(default)]
    pub executable: Option<BuildRef>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub why: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueResponse {
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Fingerprint {
    #[serde(rename = "fileName")]
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FingerprintResponse {
    #[serde(default)]
    pub fingerprint: Vec<Fingerprint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Resource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "labelsAsList")]
    #[serde(default)]
    pub labels_as_list: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub reserved: bool,
    #[serde(rename = "reservedBy")]
    #[serde(default)]
    pub reserved_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourcesResponse {
    #[serde(default)]
    pub resources: Vec<Resource>,
}
