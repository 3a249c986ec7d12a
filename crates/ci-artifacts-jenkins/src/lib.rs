//! Jenkins REST client for ci-artifacts
//!
//! [`JenkinsClient`] implements [`ci_artifacts_api::JenkinsApi`] on top of
//! reqwest:
//! - job, build and queue lookups mapped into the typed build model
//! - triggering, stopping and cancelling builds
//! - artifact fingerprints and downloads
//! - the lockable-resources plugin endpoints
//!
//! # Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ci_artifacts_api::{JenkinsApi, RetryPolicy};
//! use ci_artifacts_jenkins::{JenkinsClient, JenkinsSettings};
//!
//! # async fn run() -> ci_artifacts_api::CiResult<()> {
//! let client = JenkinsClient::connect(JenkinsSettings {
//!     url: "https://ci.example.com".to_string(),
//!     username: "jane".to_string(),
//!     password: "api-token".to_string().into(),
//!     timeout: Duration::from_secs(120),
//!     retry: RetryPolicy::transient(),
//! })
//! .await?;
//! println!("connected as {}", client.whoami().await?);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod mapper;
mod types;

pub use client::{
    JenkinsClient,
    JenkinsSettings,
};
pub use config::DEPENDENCY_HASHES_PARAM;
