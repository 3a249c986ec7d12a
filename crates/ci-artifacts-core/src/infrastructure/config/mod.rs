pub mod credentials;
pub mod interpolation;
pub mod loader;
pub mod schema;

pub use credentials::{
    jjb_config_path,
    resolve_credentials,
    CredentialSource,
    Credentials,
};
pub use interpolation::{
    interpolate,
    InterpolationError,
};
pub use loader::{
    ConfigLoadError,
    ConfigLoader,
};
pub use schema::{
    CiArtifactsConfig,
    DefaultsConfig,
    JenkinsConfig,
};
