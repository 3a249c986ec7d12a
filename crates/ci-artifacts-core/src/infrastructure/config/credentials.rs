//! Resolution of the Jenkins URL, user and API token
//!
//! Sources are tried in order: the `--credentials` map, the `[jenkins]`
//! section of the TOML config and finally the Jenkins Job Builder ini file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{
    Path,
    PathBuf,
};

use ci_artifacts_api::{
    CiError,
    CiResult,
    RetryPolicy,
};
use ci_artifacts_jenkins::JenkinsSettings;
use secrecy::SecretString;

use super::schema::CiArtifactsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    CommandLine,
    ConfigFile,
    JenkinsJobBuilder,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandLine => write!(f, "--credentials"),
            Self::ConfigFile => write!(f, "config file"),
            Self::JenkinsJobBuilder => write!(f, "JJB config"),
        }
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub url: String,
    pub username: String,
    pub password: SecretString,
    pub source: CredentialSource,
}

impl Credentials {
    pub fn into_settings(self, config: &CiArtifactsConfig) -> JenkinsSettings {
        JenkinsSettings {
            url: self.url,
            username: self.username,
            password: self.password,
            timeout: config.jenkins.timeout(),
            retry: RetryPolicy::new(
                config.defaults.retry_attempts,
                std::time::Duration::ZERO,
                false,
            ),
        }
    }
}

pub fn jjb_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join(".config")
            .join("jenkins_jobs")
            .join("jenkins_jobs.ini")
    })
}

/// Resolves credentials from `cli` (parsed `--credentials`), then `config`,
/// then the JJB ini at `jjb_path`
pub fn resolve_credentials(
    cli: Option<&BTreeMap<String, String>>, config: &CiArtifactsConfig, jjb_path: Option<&Path>,
) -> CiResult<Credentials> {
    if let Some(map) = cli {
        if let Some(creds) = from_cli(map, |name| std::env::var(name).ok())? {
            return Ok(creds);
        }
    }
    tracing::debug!(
        "Credentials haven't been (fully) provided via --credentials, trying config file"
    );

    if let Some(creds) = from_config(config) {
        return Ok(creds);
    }
    tracing::debug!("No complete [jenkins] section in config file, trying JJB config");

    let path = jjb_path.ok_or_else(|| {
        CiError::InvalidConfig("no credentials found and no home directory for JJB config".into())
    })?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        CiError::InvalidConfig(format!(
            "no credentials provided and JJB config {} unreadable: {e}",
            path.display()
        ))
    })?;
    from_jjb_ini(&content)
}

fn from_cli<F>(map: &BTreeMap<String, String>, env: F) -> CiResult<Option<Credentials>>
where
    F: Fn(&str) -> Option<String>,
{
    let complete = ["url", "username", "password"]
        .iter()
        .all(|key| map.contains_key(*key) || map.contains_key(&format!("{key}_env")));
    if !complete {
        return Ok(None);
    }

    let lookup = |key: &str| -> CiResult<String> {
        if let Some(value) = map.get(key) {
            return Ok(value.clone());
        }
        let var = &map[&format!("{key}_env")];
        env(var).ok_or_else(|| {
            CiError::InvalidConfig(format!("environment variable {var} for '{key}' is not set"))
        })
    };

    Ok(Some(Credentials {
        url: lookup("url")?,
        username: lookup("username")?,
        password: SecretString::from(lookup("password")?),
        source: CredentialSource::CommandLine,
    }))
}

fn from_config(config: &CiArtifactsConfig) -> Option<Credentials> {
    let jenkins = &config.jenkins;
    match (&jenkins.url, &jenkins.username, &jenkins.password) {
        (Some(url), Some(username), Some(password)) => Some(Credentials {
            url: url.clone(),
            username: username.clone(),
            password: SecretString::from(password.clone()),
            source: CredentialSource::ConfigFile,
        }),
        _ => None,
    }
}

/// Reads `url`, `user` and `password` from the `[jenkins]` section
pub fn from_jjb_ini(content: &str) -> CiResult<Credentials> {
    let section = ini_section(content, "jenkins");
    let get = |key: &str| {
        section.get(key).cloned().ok_or_else(|| {
            CiError::InvalidConfig(format!("JJB config lacks [jenkins] {key}"))
        })
    };

    Ok(Credentials {
        url: get("url")?,
        username: get("user")?,
        password: SecretString::from(get("password")?),
        source: CredentialSource::JenkinsJobBuilder,
    })
}

fn ini_section(content: &str, wanted: &str) -> BTreeMap<String, String> {
    let mut current = None::<String>;
    let mut values = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(name.trim().to_string());
            continue;
        }
        if current.as_deref() != Some(wanted) {
            continue;
        }
        if let Some((key, value)) = line.split_once(['=', ':']) {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    values
}
