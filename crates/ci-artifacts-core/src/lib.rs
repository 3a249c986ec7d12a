pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_support;

pub use application::{
    BuildWorkflow,
    CtrlCPrompt,
    DownloadOptions,
    DownloadTarget,
    InterruptHandler,
    JobRequest,
    OnMissing,
    PollSettings,
    ReservationAction,
    ReservationOptions,
};
pub use domain::{
    error_report,
    CommandOutput,
    MatchConstraint,
    Report,
    TimeWindow,
};
pub use infrastructure::{
    resolve_credentials,
    CiArtifactsConfig,
    ConfigLoader,
    Credentials,
};
