use std::time::Duration;

use thiserror::Error;

use crate::types::BuildState;

/// Error taxonomy shared by the client and the build workflow
#[derive(Error, Debug)]
pub enum CiError {
    #[error("Malformed parameter: {0}")]
    ParameterFormat(String),

    #[error("Unexpected response from Jenkins: {0}")]
    RemoteSchema(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Gave up waiting for {what} after {elapsed:?}")]
    PollTimeout { what: String, elapsed: Duration },

    #[error("{what} finished with result {state}")]
    BuildFailed {
        what: String,
        state: BuildState,
        url: Option<String>,
    },

    #[error("Build {0} has no artifacts")]
    NoArtifacts(String),

    #[error("Resource already locked: {0}")]
    ResourceLocked(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Interrupted while waiting for {0}")]
    Interrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CiError {
    /// Only transport level failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, CiError::TransientNetwork(_))
    }
}

pub type CiResult<T> = Result<T, CiError>;

impl From<serde_json::Error> for CiError {
    fn from(err: serde_json::Error) -> Self {
        CiError::Serialization(err.to_string())
    }
}
