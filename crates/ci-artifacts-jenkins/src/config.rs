use ci_artifacts_api::{
    CiError,
    CiResult,
    JobPath,
};

/// Parameter carrying the dependency path fingerprint of a triggered build
pub const DEPENDENCY_HASHES_PARAM: &str = "DEPENDENCY_PATH_HASHES";

/// Turns `folder/job` into the URL path `folder/job/job`
pub(crate) fn encode_job_name(job: &JobPath) -> String {
    job.segments()
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/job/")
}

/// URL of a job including the trailing slash, the form Jenkins reports it in
pub(crate) fn job_url(server_url: &str, job: &JobPath) -> String {
    format!("{}/job/{}/", server_url, encode_job_name(job))
}

pub(crate) fn build_url(server_url: &str, job: &JobPath, number: u64) -> String {
    format!("{}{}/", job_url(server_url, job), number)
}

/// Jenkins may know itself under a different root URL than the one we talk
/// to, so queue tasks are matched on the job part of their URL only.
pub(crate) fn task_belongs_to(task_url: &str, job: &JobPath) -> bool {
    let suffix = format!("/job/{}", encode_job_name(job));
    task_url.trim_end_matches('/').ends_with(&suffix)
}

/// Extracts the queue id from the `Location` header of a trigger response,
/// e.g. `https://ci.example.com/queue/item/4711/`
pub(crate) fn parse_queue_location(location: &str) -> CiResult<u64> {
    location
        .trim_end_matches('/')
        .rsplit_once("/queue/item/")
        .and_then(|(_, id)| id.parse().ok())
        .ok_or_else(|| {
            CiError::RemoteSchema(format!(
                "trigger response location '{location}' does not name a queue item"
            ))
        })
}
