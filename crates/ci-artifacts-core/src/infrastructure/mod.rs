pub mod config;

pub use config::{
    resolve_credentials,
    CiArtifactsConfig,
    ConfigLoadError,
    ConfigLoader,
    Credentials,
};
