use std::path::Path;

use async_trait::async_trait;

use crate::error::CiResult;
use crate::params::ParameterSet;
use crate::types::*;

/// Operations consumed from the Jenkins REST API
///
/// Implementations map every response into the typed model and report missing
/// required fields as [`crate::CiError::RemoteSchema`]. Retrying is the
/// caller's business, see [`crate::RetryPolicy`].
#[async_trait]
pub trait JenkinsApi: Send + Sync {
    /// Id of the authenticated user, used to check connectivity
    async fn whoami(&self) -> CiResult<String>;

    /// Job or folder details, builds newest first
    async fn job_info(&self, job: &JobPath) -> CiResult<JobInfo>;

    async fn build_info(&self, job: &JobPath, number: u64) -> CiResult<BuildRecord>;

    /// Items in the global build queue that belong to `job`
    async fn queued_items(&self, job: &JobPath) -> CiResult<Vec<QueueItem>>;

    async fn queue_item(&self, job: &JobPath, id: u64) -> CiResult<QueueItem>;

    /// Schedules a build and returns its queue item
    async fn trigger_build(&self, job: &JobPath, params: &ParameterSet) -> CiResult<QueueItem>;

    async fn stop_build(&self, job: &JobPath, number: u64) -> CiResult<()>;

    async fn cancel_queue_item(&self, id: u64) -> CiResult<()>;

    /// Artifacts of a build with their fingerprint hashes
    async fn list_artifacts(&self, build: &BuildRecord) -> CiResult<Vec<Artifact>>;

    /// Streams an artifact into `dest`
    async fn download_artifact(
        &self, build: &BuildRecord, artifact: &str, dest: &Path,
    ) -> CiResult<u64>;

    async fn lockable_resources(&self) -> CiResult<Vec<LockableResource>>;

    async fn reserve_resource(&self, name: &str) -> CiResult<ReservationOutcome>;

    async fn unreserve_resource(&self, name: &str) -> CiResult<ReservationOutcome>;
}
