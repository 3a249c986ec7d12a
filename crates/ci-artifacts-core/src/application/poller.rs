use std::time::Duration;

use async_trait::async_trait;
use ci_artifacts_api::{
    BuildHandle,
    BuildRecord,
    BuildState,
    CiError,
    CiResult,
    JenkinsApi,
    JobPath,
    ParameterSet,
    QueueItem,
};
use tokio::io::{
    AsyncBufReadExt,
    AsyncWriteExt,
    BufReader,
};
use tokio::time::Instant;

pub const DEFAULT_POLL_QUEUE_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_POLL_BUILD_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Interval while the request waits in the queue
    pub queue_interval: Duration,
    /// Interval while the build is running
    pub build_interval: Duration,
    /// Overall bound of the wait, the remote build is left alone when it expires
    pub timeout: Option<Duration>,
    /// Treat a non-success result as an error
    pub strict: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            queue_interval: DEFAULT_POLL_QUEUE_INTERVAL,
            build_interval: DEFAULT_POLL_BUILD_INTERVAL,
            timeout: None,
            strict: false,
        }
    }
}

/// Source of user interrupts during a wait
#[async_trait]
pub trait InterruptHandler: Send + Sync {
    /// Resolves once the user asked to stop waiting. Called once per wait,
    /// the listener has to stay registered until the future is dropped.
    async fn interrupted(&self);

    /// Whether the remote build should be cancelled too. Must default to no.
    async fn confirm_cancel(&self, what: &str) -> bool;
}

/// Never interrupts
pub struct NoInterrupt;

#[async_trait]
impl InterruptHandler for NoInterrupt {
    async fn interrupted(&self) {
        std::future::pending::<()>().await
    }

    async fn confirm_cancel(&self, _what: &str) -> bool {
        false
    }
}

/// Ctrl-C followed by a `[y/N]` prompt on the terminal
pub struct CtrlCPrompt;

#[async_trait]
impl InterruptHandler for CtrlCPrompt {
    async fn interrupted(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await
        }
    }

    async fn confirm_cancel(&self, what: &str) -> bool {
        let mut stderr = tokio::io::stderr();
        let prompt = format!("\nCancel {what}? [y/N] ");
        if stderr.write_all(prompt.as_bytes()).await.is_err() {
            return false;
        }
        let _ = stderr.flush().await;

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        let answered = tokio::select! {
            read = stdin.read_line(&mut answer) => read.is_ok(),
            // a second Ctrl-C answers the question with the default
            _ = tokio::signal::ctrl_c() => false,
        };
        answered && matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Submits `params` merged with `params_no_check` as a new build of `job`
pub async fn trigger(
    api: &dyn JenkinsApi, job: &JobPath, params: &ParameterSet, params_no_check: &ParameterSet,
) -> CiResult<QueueItem> {
    let merged = params.merged(params_no_check);
    let item = api.trigger_build(job, &merged).await?;
    tracing::info!("Triggered new build: {}", item.describe());
    Ok(item)
}

/// Polls `handle` until it reached a terminal state
///
/// The queue is polled at `queue_interval`, a running build at
/// `build_interval`. A cancelled queue item fails with
/// [`CiError::BuildFailed`] in state `ABORTED`. An interrupt is honored
/// while sleeping and while a remote call is in flight.
pub async fn await_completion(
    api: &dyn JenkinsApi, handle: BuildHandle, settings: &PollSettings,
    interrupt: &dyn InterruptHandler,
) -> CiResult<BuildRecord> {
    let started = Instant::now();
    let mut handle = handle;
    let interrupted = interrupt.interrupted();
    tokio::pin!(interrupted);

    loop {
        match &handle {
            BuildHandle::Queued(item) if item.cancelled => {
                return Err(CiError::BuildFailed {
                    what: item.describe(),
                    state: BuildState::Aborted,
                    url: None,
                });
            }
            BuildHandle::Queued(item) => {
                if let Some(number) = item.executable {
                    tracing::info!("{} started as build #{number}", item.describe());
                    handle = tokio::select! {
                        biased;
                        _ = &mut interrupted => return abandon(api, &handle, interrupt).await,
                        next = refresh(api, &handle) => next?,
                    };
                    continue;
                }
                tracing::info!(
                    "Waiting for {} to leave the queue ({})",
                    item.describe(),
                    item.why.as_deref().unwrap_or("no reason given")
                );
            }
            BuildHandle::Started(build) if build.state.is_terminal() => {
                return finish(build.clone(), settings.strict);
            }
            BuildHandle::Started(build) => {
                tracing::info!("Waiting for {} to finish..", build.describe());
            }
        }

        let interval = match handle {
            BuildHandle::Queued(_) => settings.queue_interval,
            BuildHandle::Started(_) => settings.build_interval,
        };
        let sleep = match settings.timeout {
            Some(timeout) => {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    tracing::warn!(
                        "Timeout of {timeout:?} exceeded, {} keeps running",
                        handle.describe()
                    );
                    return Err(CiError::PollTimeout {
                        what: handle.describe(),
                        elapsed,
                    });
                }
                interval.min(timeout - elapsed)
            }
            None => interval,
        };

        tokio::select! {
            biased;
            _ = &mut interrupted => return abandon(api, &handle, interrupt).await,
            _ = tokio::time::sleep(sleep) => {}
        }

        handle = tokio::select! {
            biased;
            _ = &mut interrupted => return abandon(api, &handle, interrupt).await,
            next = refresh(api, &handle) => next?,
        };
    }
}

/// Fetches the current state of `handle`, following a queue item into its build
async fn refresh(api: &dyn JenkinsApi, handle: &BuildHandle) -> CiResult<BuildHandle> {
    Ok(match handle {
        BuildHandle::Queued(item) => match item.executable {
            Some(number) => BuildHandle::Started(api.build_info(&item.job, number).await?),
            None => BuildHandle::Queued(api.queue_item(&item.job, item.id).await?),
        },
        BuildHandle::Started(build) => {
            BuildHandle::Started(api.build_info(&build.job, build.number).await?)
        }
    })
}

fn finish(build: BuildRecord, strict: bool) -> CiResult<BuildRecord> {
    if build.state.is_success() {
        tracing::info!("{} finished with result {}", build.describe(), build.state);
        return Ok(build);
    }
    if strict {
        return Err(CiError::BuildFailed {
            what: build.describe(),
            state: build.state,
            url: Some(build.url),
        });
    }
    tracing::warn!("{} finished with result {}", build.describe(), build.state);
    Ok(build)
}

async fn abandon(
    api: &dyn JenkinsApi, handle: &BuildHandle, interrupt: &dyn InterruptHandler,
) -> CiResult<BuildRecord> {
    let what = handle.describe();
    if !interrupt.confirm_cancel(&what).await {
        tracing::warn!("Stopped waiting, {what} keeps running");
        return Err(CiError::Interrupted(format!("{what} (left running)")));
    }

    match handle {
        BuildHandle::Queued(item) => api.cancel_queue_item(item.id).await?,
        BuildHandle::Started(build) => api.stop_build(&build.job, build.number).await?,
    }
    Err(CiError::Interrupted(format!("{what} (cancelled)")))
}
