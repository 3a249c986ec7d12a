//! In-memory [`JenkinsApi`] for tests

use std::collections::{
    BTreeMap,
    BTreeSet,
    VecDeque,
};
use std::path::Path;
use std::sync::{
    Arc,
    Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use ci_artifacts_api::{
    Artifact,
    BuildRecord,
    BuildRef,
    BuildState,
    CiError,
    CiResult,
    JenkinsApi,
    JobInfo,
    JobKind,
    JobPath,
    LockableResource,
    ParamValue,
    ParameterSet,
    QueueItem,
    ReservationOutcome,
};

pub fn job(path: &str) -> JobPath {
    path.parse().unwrap()
}

pub fn params(entries: &[(&str, &str)]) -> ParameterSet {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), ParamValue::normalize(v, false)))
        .collect()
}

pub fn build(job_path: &str, number: u64, state: BuildState, params: ParameterSet) -> BuildRecord {
    BuildRecord {
        job: job(job_path),
        number,
        url: format!("https://ci.example.com/job/{job_path}/{number}/"),
        timestamp: Utc::now(),
        duration: Duration::ZERO,
        state,
        parameters: params,
        artifacts: Vec::new(),
        path_hashes: None,
    }
}

pub fn started_at(mut record: BuildRecord, timestamp: DateTime<Utc>) -> BuildRecord {
    record.timestamp = timestamp;
    record
}

#[derive(Default)]
struct FakeState {
    builds: BTreeMap<(JobPath, u64), VecDeque<BuildRecord>>,
    queue: BTreeMap<u64, VecDeque<QueueItem>>,
    artifacts: BTreeMap<u64, Vec<(Artifact, Vec<u8>)>>,
    resources: Vec<LockableResource>,
    locked: BTreeSet<String>,
    transient_download_failures: usize,
    download_delay: Option<Duration>,
    build_info_delay: Option<Duration>,
    boolean_params: BTreeSet<String>,
    next_queue_id: u64,
    calls: Vec<String>,
}

/// Jenkins double with scripted build progressions
#[derive(Clone, Default)]
pub struct FakeJenkins {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeJenkins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a build. Each further call for the same number queues another
    /// snapshot returned by successive `build_info` calls.
    pub fn add_build(&self, record: BuildRecord) {
        let mut state = self.inner.lock().unwrap();
        state
            .builds
            .entry((record.job.clone(), record.number))
            .or_default()
            .push_back(record);
    }

    /// Scripts a queue item. Triggered builds get ids from 101 on, scripting
    /// one of those ids makes the triggered build follow the script.
    pub fn add_queue_item(&self, item: QueueItem) {
        let mut state = self.inner.lock().unwrap();
        state.queue.entry(item.id).or_default().push_back(item);
    }

    /// Makes `job_info` report `name` as a boolean job parameter
    pub fn declare_boolean_param(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .boolean_params
            .insert(name.to_string());
    }

    pub fn add_artifact(&self, number: u64, path: &str, content: &[u8], with_hash: bool) {
        let md5 = with_hash.then(|| {
            use md5::Digest;
            hex::encode(md5::Md5::digest(content))
        });
        self.inner
            .lock()
            .unwrap()
            .artifacts
            .entry(number)
            .or_default()
            .push((
                Artifact {
                    path: path.to_string(),
                    md5,
                },
                content.to_vec(),
            ));
    }

    pub fn add_resource(&self, name: &str, labels: &[&str]) {
        self.inner.lock().unwrap().resources.push(LockableResource {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            description: None,
            locked: false,
            reserved: false,
            reserved_by: None,
        });
    }

    pub fn lock_resource(&self, name: &str) {
        self.inner.lock().unwrap().locked.insert(name.to_string());
    }

    pub fn fail_downloads(&self, times: usize) {
        self.inner.lock().unwrap().transient_download_failures = times;
    }

    pub fn delay_downloads(&self, delay: Duration) {
        self.inner.lock().unwrap().download_delay = Some(delay);
    }

    pub fn delay_build_info(&self, delay: Duration) {
        self.inner.lock().unwrap().build_info_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn called(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

fn pop_snapshot<T: Clone>(snapshots: &mut VecDeque<T>) -> Option<T> {
    if snapshots.len() > 1 {
        snapshots.pop_front()
    } else {
        snapshots.front().cloned()
    }
}

#[async_trait]
impl JenkinsApi for FakeJenkins {
    async fn whoami(&self) -> CiResult<String> {
        Ok("jane".to_string())
    }

    async fn job_info(&self, job: &JobPath) -> CiResult<JobInfo> {
        self.record(format!("job_info {job}"));
        let state = self.inner.lock().unwrap();
        let mut builds = state
            .builds
            .iter()
            .filter(|((j, _), _)| j == job)
            .filter_map(|((_, number), snapshots)| {
                snapshots.front().map(|b| BuildRef {
                    number: *number,
                    url: b.url.clone(),
                })
            })
            .collect::<Vec<_>>();
        builds.sort_by(|a, b| b.number.cmp(&a.number));

        Ok(JobInfo {
            path: job.clone(),
            name: job.name().to_string(),
            url: format!("https://ci.example.com/job/{job}/"),
            kind: JobKind::Workflow,
            class: "org.jenkinsci.plugins.workflow.job.WorkflowJob".to_string(),
            builds,
            in_queue: !state.queue.is_empty(),
            children: Vec::new(),
            last_successful_build: None,
            last_completed_build: None,
            boolean_params: state.boolean_params.clone(),
        })
    }

    async fn build_info(&self, job: &JobPath, number: u64) -> CiResult<BuildRecord> {
        self.record(format!("build_info {job}#{number}"));
        let delay = self.inner.lock().unwrap().build_info_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.inner.lock().unwrap();
        state
            .builds
            .get_mut(&(job.clone(), number))
            .and_then(pop_snapshot)
            .ok_or_else(|| CiError::Api(format!("{job}#{number}: HTTP 404 Not Found")))
    }

    async fn queued_items(&self, job: &JobPath) -> CiResult<Vec<QueueItem>> {
        self.record(format!("queued_items {job}"));
        let state = self.inner.lock().unwrap();
        Ok(state
            .queue
            .values()
            .filter_map(|snapshots| snapshots.front())
            .filter(|item| &item.job == job && item.executable.is_none() && !item.cancelled)
            .cloned()
            .collect())
    }

    async fn queue_item(&self, _job: &JobPath, id: u64) -> CiResult<QueueItem> {
        self.record(format!("queue_item {id}"));
        let mut state = self.inner.lock().unwrap();
        state
            .queue
            .get_mut(&id)
            .and_then(pop_snapshot)
            .ok_or_else(|| CiError::Api(format!("queue item {id}: HTTP 404 Not Found")))
    }

    async fn trigger_build(&self, job: &JobPath, params: &ParameterSet) -> CiResult<QueueItem> {
        self.record(format!("trigger {job} {params}"));
        let mut state = self.inner.lock().unwrap();
        state.next_queue_id = state.next_queue_id.max(100) + 1;
        let item = QueueItem {
            job: job.clone(),
            id: state.next_queue_id,
            parameters: params.clone(),
            executable: None,
            cancelled: false,
            why: Some("Waiting for next available executor".to_string()),
        };
        if !state.queue.contains_key(&item.id) {
            state.queue.insert(item.id, VecDeque::from([item.clone()]));
        }
        Ok(item)
    }

    async fn stop_build(&self, job: &JobPath, number: u64) -> CiResult<()> {
        self.record(format!("stop {job}#{number}"));
        Ok(())
    }

    async fn cancel_queue_item(&self, id: u64) -> CiResult<()> {
        self.record(format!("cancel {id}"));
        Ok(())
    }

    async fn list_artifacts(&self, build: &BuildRecord) -> CiResult<Vec<Artifact>> {
        self.record(format!("list_artifacts {}", build.describe()));
        let state = self.inner.lock().unwrap();
        Ok(state
            .artifacts
            .get(&build.number)
            .map(|artifacts| artifacts.iter().map(|(a, _)| a.clone()).collect())
            .unwrap_or_default())
    }

    async fn download_artifact(
        &self, build: &BuildRecord, artifact: &str, dest: &Path,
    ) -> CiResult<u64> {
        self.record(format!("download {artifact}"));
        let (content, delay) = {
            let mut state = self.inner.lock().unwrap();
            if state.transient_download_failures > 0 {
                state.transient_download_failures -= 1;
                return Err(CiError::TransientNetwork(
                    "connection reset by peer".to_string(),
                ));
            }
            let content = state
                .artifacts
                .get(&build.number)
                .and_then(|artifacts| artifacts.iter().find(|(a, _)| a.path == artifact))
                .map(|(_, content)| content.clone())
                .ok_or_else(|| CiError::Api(format!("{artifact}: HTTP 404 Not Found")))?;
            (content, state.download_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        tokio::fs::write(dest, &content).await?;
        Ok(content.len() as u64)
    }

    async fn lockable_resources(&self) -> CiResult<Vec<LockableResource>> {
        Ok(self.inner.lock().unwrap().resources.clone())
    }

    async fn reserve_resource(&self, name: &str) -> CiResult<ReservationOutcome> {
        self.record(format!("reserve {name}"));
        let mut state = self.inner.lock().unwrap();
        if !state.locked.insert(name.to_string()) {
            return Ok(ReservationOutcome::AlreadyLocked);
        }
        Ok(ReservationOutcome::Done)
    }

    async fn unreserve_resource(&self, name: &str) -> CiResult<ReservationOutcome> {
        self.record(format!("unreserve {name}"));
        self.inner.lock().unwrap().locked.remove(name);
        Ok(ReservationOutcome::Done)
    }
}
