//! Typed model of Jenkins jobs, builds and queue items plus the
//! [`JenkinsApi`] trait the rest of ci-artifacts is written against.

pub mod error;
pub mod params;
pub mod service;
pub mod types;
pub mod utils;

pub use error::{
    CiError,
    CiResult,
};
pub use params::{
    normalize,
    parse_params,
    ParamValue,
    ParameterSet,
};
pub use service::JenkinsApi;
pub use types::{
    Artifact,
    BuildHandle,
    BuildRecord,
    BuildRef,
    BuildState,
    JobInfo,
    JobKind,
    JobPath,
    LockableResource,
    QueueItem,
    ReservationOutcome,
};
pub use utils::{
    RetryPolicy,
    DEFAULT_MAX_ATTEMPTS,
};
