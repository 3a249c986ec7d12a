use std::path::PathBuf;
use std::time::Duration;

use serde::{
    Deserialize,
    Serialize,
};

use crate::domain::constraint::DEFAULT_MAX_BUILDS;

pub(super) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Seconds between queue polls
pub(super) const DEFAULT_POLL_QUEUE_SLEEP_SECS: u64 = 30;

pub(super) const DEFAULT_POLL_BUILD_SLEEP_SECS: u64 = 60;

pub(super) const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

pub(super) const DEFAULT_IGNORE_PARAMS: &[&str] = &["DISABLE_CACHE"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CiArtifactsConfig {
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl CiArtifactsConfig {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CI_ARTIFACTS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .map(|p| p.join("ci-artifacts").join("config.toml"))
                    .unwrap_or_else(|| PathBuf::from(".ci-artifacts.toml"))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JenkinsConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// API token or password
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(rename = "timeout", default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl JenkinsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_poll_queue_sleep")]
    pub poll_queue_sleep_secs: u64,

    #[serde(default = "default_poll_build_sleep")]
    pub poll_build_sleep_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_ignore_params")]
    pub ignore_params: Vec<String>,

    #[serde(default = "default_max_builds")]
    pub max_builds: usize,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            poll_queue_sleep_secs: DEFAULT_POLL_QUEUE_SLEEP_SECS,
            poll_build_sleep_secs: DEFAULT_POLL_BUILD_SLEEP_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            ignore_params: default_ignore_params(),
            max_builds: DEFAULT_MAX_BUILDS,
            retry_attempts: default_retry_attempts(),
        }
    }
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_poll_queue_sleep() -> u64 {
    DEFAULT_POLL_QUEUE_SLEEP_SECS
}

fn default_poll_build_sleep() -> u64 {
    DEFAULT_POLL_BUILD_SLEEP_SECS
}

fn default_download_timeout() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_ignore_params() -> Vec<String> {
    DEFAULT_IGNORE_PARAMS.iter().map(|s| s.to_string()).collect()
}

fn default_max_builds() -> usize {
    DEFAULT_MAX_BUILDS
}

fn default_retry_attempts() -> usize {
    ci_artifacts_api::DEFAULT_MAX_ATTEMPTS
}
