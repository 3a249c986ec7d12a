use std::path::PathBuf;
use std::sync::Arc;

use ci_artifacts_api::{
    BuildHandle,
    BuildRecord,
    CiResult,
    JenkinsApi,
    JobPath,
    QueueItem,
};

use super::fetcher::{
    self,
    DownloadOptions,
};
use super::matcher::find_match_in;
use super::poller::{
    self,
    InterruptHandler,
    PollSettings,
};
use crate::domain::constraint::MatchConstraint;
use crate::domain::report::{
    CommandOutput,
    Empty,
    NoActionReport,
    PassiveRequest,
    Report,
    RequestReport,
    ResultReport,
};

/// What to do when no existing build matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMissing {
    #[default]
    Trigger,
    /// Report the request that would have been made
    Passive,
    /// Report that nothing was found
    Omit,
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job: JobPath,
    pub constraint: MatchConstraint,
    pub on_missing: OnMissing,
}

/// Where and how to store artifacts
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub base_dir: PathBuf,
    pub out_dir: PathBuf,
    pub options: DownloadOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Existing(BuildHandle),
    Triggered(QueueItem),
    Passive(PassiveRequest),
    Omitted,
}

const NOTHING_FOUND: &str = "no matching build found, none started";

/// Runs the `request`, `await-result`, `validate`, `download`, `fetch` and
/// `info` commands against one Jenkins
pub struct BuildWorkflow {
    api: Arc<dyn JenkinsApi>,
    interrupt: Arc<dyn InterruptHandler>,
    poll: PollSettings,
}

impl BuildWorkflow {
    pub fn new(
        api: Arc<dyn JenkinsApi>, interrupt: Arc<dyn InterruptHandler>, poll: PollSettings,
    ) -> Self {
        Self {
            api,
            interrupt,
            poll,
        }
    }

    /// Finds a matching build or, depending on `on_missing`, triggers one
    ///
    /// Values of boolean job parameters are normalized before matching, a
    /// triggered build gets them as `true`/`false`.
    pub async fn resolve(&self, request: &JobRequest) -> CiResult<Resolution> {
        let api = self.api.as_ref();
        let info = api.job_info(&request.job).await?;
        let constraint = &request.constraint.with_boolean_params(&info.boolean_params);

        if let Some(handle) = find_match_in(api, &info, constraint).await? {
            return Ok(Resolution::Existing(handle));
        }

        match request.on_missing {
            OnMissing::Omit => {
                tracing::info!("No matching build and --omit-new-build given, nothing to do");
                Ok(Resolution::Omitted)
            }
            OnMissing::Passive => {
                let passive = PassiveRequest {
                    job: request.job.clone(),
                    params: constraint.trigger_params(),
                };
                tracing::info!(
                    "Passive mode, would trigger {} with {}",
                    passive.job,
                    passive.params
                );
                Ok(Resolution::Passive(passive))
            }
            OnMissing::Trigger => {
                let item = poller::trigger(
                    api,
                    &request.job,
                    &constraint.params,
                    &constraint.unchecked_params(),
                )
                .await?;
                Ok(Resolution::Triggered(item))
            }
        }
    }

    pub async fn request(&self, request: &JobRequest) -> CiResult<CommandOutput> {
        let report = match self.resolve(request).await? {
            Resolution::Existing(handle) => RequestReport::Existing((&handle).into()),
            Resolution::Triggered(item) => RequestReport::TriggeredBuild((&item).into()),
            Resolution::Passive(passive) => RequestReport::Passive(passive),
            Resolution::Omitted => return Ok(CommandOutput::ok(Report::Empty(Empty::default()))),
        };
        Ok(CommandOutput::ok(Report::Request(report)))
    }

    pub async fn await_result(&self, request: &JobRequest) -> CiResult<CommandOutput> {
        self.wait_and_report(request, &self.poll, true).await
    }

    /// `await-result` in strict mode, without artifact listing
    pub async fn validate(&self, request: &JobRequest) -> CiResult<CommandOutput> {
        let strict = PollSettings {
            strict: true,
            ..self.poll.clone()
        };
        self.wait_and_report(request, &strict, false).await
    }

    /// Downloads the artifacts of an existing matching build, never triggers
    pub async fn download(
        &self, request: &JobRequest, target: &DownloadTarget,
    ) -> CiResult<CommandOutput> {
        let request = JobRequest {
            on_missing: OnMissing::Omit,
            ..request.clone()
        };
        self.fetch(&request, target).await
    }

    /// Resolves, waits for and downloads a build
    pub async fn fetch(
        &self, request: &JobRequest, target: &DownloadTarget,
    ) -> CiResult<CommandOutput> {
        let build = match self.resolve_and_wait(request, &self.poll).await? {
            Ok(build) => build,
            Err(no_action) => return Ok(no_action),
        };
        let artifacts = fetcher::download(
            self.api.as_ref(),
            &build,
            &target.out_dir,
            &target.base_dir,
            &target.options,
        )
        .await?;
        Ok(CommandOutput::ok(Report::Result(ResultReport::new(&build, artifacts))))
    }

    pub async fn info(&self, job: &JobPath) -> CiResult<CommandOutput> {
        let info = self.api.job_info(job).await?;
        tracing::info!("{job} is a {:?} ({})", info.kind, info.class);
        Ok(CommandOutput::ok(Report::Info(Box::new(info))))
    }

    async fn wait_and_report(
        &self, request: &JobRequest, poll: &PollSettings, list_artifacts: bool,
    ) -> CiResult<CommandOutput> {
        let build = match self.resolve_and_wait(request, poll).await? {
            Ok(build) => build,
            Err(no_action) => return Ok(no_action),
        };
        let artifacts = if list_artifacts {
            build.artifacts.clone()
        } else {
            Vec::new()
        };
        Ok(CommandOutput::ok(Report::Result(ResultReport::new(&build, artifacts))))
    }

    /// The finished build, or the output to print when there is nothing to
    /// wait for
    async fn resolve_and_wait(
        &self, request: &JobRequest, poll: &PollSettings,
    ) -> CiResult<Result<BuildRecord, CommandOutput>> {
        let handle = match self.resolve(request).await? {
            Resolution::Existing(handle) => handle,
            Resolution::Triggered(item) => BuildHandle::Queued(item),
            Resolution::Passive(passive) => {
                return Ok(Err(CommandOutput::no_action(Report::Request(
                    RequestReport::Passive(passive),
                ))));
            }
            Resolution::Omitted => {
                return Ok(Err(CommandOutput::no_action(Report::NoAction(
                    NoActionReport {
                        message: NOTHING_FOUND.to_string(),
                    },
                ))));
            }
        };

        let build =
            poller::await_completion(self.api.as_ref(), handle, poll, self.interrupt.as_ref())
                .await?;
        Ok(Ok(build))
    }
}
