//! Jenkins API client and methods

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ci_artifacts_api::{
    Artifact,
    BuildRecord,
    CiError,
    CiResult,
    JenkinsApi,
    JobInfo,
    JobPath,
    LockableResource,
    ParameterSet,
    QueueItem,
    ReservationOutcome,
    RetryPolicy,
};
use reqwest::header::{
    HeaderMap,
    HeaderValue,
    AUTHORIZATION,
    LOCATION,
};
use reqwest::{
    Client,
    Response,
    StatusCode,
};
use secrecy::{
    ExposeSecret,
    SecretString,
};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::{
    config,
    mapper,
    types,
};

/// Returned by the lockable-resources plugin for resources held by someone else
const RESOURCE_LOCKED_STATUS: u16 = 423;

/// Connection settings for [`JenkinsClient`]
#[derive(Debug)]
pub struct JenkinsSettings {
    pub url: String,
    pub username: String,
    pub password: SecretString,
    /// Timeout for a single API request
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Jenkins API client with retry logic
pub struct JenkinsClient {
    client: Client,
    server_url: String,
    username: String,
    retry: RetryPolicy,
}

fn map_send_error(what: &str, err: reqwest::Error) -> CiError {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        CiError::TransientNetwork(format!("{what}: {err}"))
    } else {
        CiError::Api(format!("{what}: {err}"))
    }
}

async fn check_status(what: &str, response: Response) -> CiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let detail = if error_text.contains("<html") || error_text.contains("<!DOCTYPE html>") {
        String::new()
    } else if error_text.chars().count() > 300 {
        format!(": {}...", error_text.chars().take(300).collect::<String>())
    } else if error_text.is_empty() {
        String::new()
    } else {
        format!(": {error_text}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CiError::InvalidConfig(format!(
            "{what}: Jenkins rejected the credentials (HTTP {status})"
        ))),
        _ => Err(CiError::Api(format!("{what}: HTTP {status}{detail}"))),
    }
}

impl JenkinsClient {
    pub fn new(settings: JenkinsSettings) -> CiResult<Self> {
        let auth_value = format!(
            "{}:{}",
            settings.username,
            settings.password.expose_secret()
        );
        let auth_header = format!(
            "Basic {}",
            base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                auth_value.as_bytes()
            )
        );

        let mut auth = HeaderValue::from_str(&auth_header)
            .map_err(|e| CiError::InvalidConfig(format!("Invalid auth format: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CiError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            server_url: settings.url.trim_end_matches('/').to_string(),
            username: settings.username,
            retry: settings.retry,
        })
    }

    /// Creates the client and checks the connection with a whoami request
    pub async fn connect(settings: JenkinsSettings) -> CiResult<Self> {
        let client = Self::new(settings)?;
        let id = client.whoami().await?;
        if id != client.username {
            tracing::warn!(
                "Jenkins identifies us as '{id}', not as configured user '{}'",
                client.username
            );
        }
        tracing::debug!("Connected to {} as {id}", client.server_url);
        Ok(client)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> CiResult<T> {
        self.retry
            .retry(what, || async {
                tracing::debug!("GET {url}");
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| map_send_error(what, e))?;
                let response = check_status(what, response).await?;
                let response_text = response
                    .text()
                    .await
                    .map_err(|e| map_send_error(what, e))?;
                serde_json::from_str(&response_text)
                    .map_err(|e| CiError::RemoteSchema(format!("{what}: {e}")))
            })
            .await
    }

    async fn post(&self, url: &str, what: &str, form: &[(String, String)]) -> CiResult<Response> {
        self.retry
            .retry(what, || async {
                tracing::debug!("POST {url}");
                self.client
                    .post(url)
                    .form(form)
                    .send()
                    .await
                    .map_err(|e| map_send_error(what, e))
            })
            .await
    }

    async fn change_reservation(&self, action: &str, name: &str) -> CiResult<ReservationOutcome> {
        let url = format!(
            "{}/lockable-resources/{action}?resource={}",
            self.server_url,
            urlencoding::encode(name)
        );
        let what = format!("{action} {name}");
        let response = self.post(&url, &what, &[]).await?;

        if response.status().as_u16() == RESOURCE_LOCKED_STATUS {
            return Ok(ReservationOutcome::AlreadyLocked);
        }
        check_status(&what, response).await?;
        Ok(ReservationOutcome::Done)
    }
}

#[async_trait]
impl JenkinsApi for JenkinsClient {
    async fn whoami(&self) -> CiResult<String> {
        let url = format!("{}/me/api/json", self.server_url);
        let whoami: types::WhoAmI = self.get_json(&url, "whoami").await?;
        whoami
            .id
            .ok_or_else(|| CiError::RemoteSchema("whoami: missing field 'id'".to_string()))
    }

    async fn job_info(&self, job: &JobPath) -> CiResult<JobInfo> {
        let url = format!(
            "{}api/json?tree=_class,name,fullName,url,inQueue,builds[number,url],jobs[name,_class],lastSuccessfulBuild[number,url],lastCompletedBuild[number,url],property[parameterDefinitions[name,type]]",
            config::job_url(&self.server_url, job)
        );
        let raw: types::Job = self.get_json(&url, &format!("job info of {job}")).await?;
        mapper::map_job(job, raw)
    }

    async fn build_info(&self, job: &JobPath, number: u64) -> CiResult<BuildRecord> {
        let url = format!(
            "{}api/json",
            config::build_url(&self.server_url, job, number)
        );
        let raw: types::Build = self
            .get_json(&url, &format!("build info of {job}#{number}"))
            .await?;
        mapper::map_build(job, raw)
    }

    async fn queued_items(&self, job: &JobPath) -> CiResult<Vec<QueueItem>> {
        let url = format!("{}/queue/api/json", self.server_url);
        let response: types::QueueResponse = self.get_json(&url, "queue listing").await?;
        response
            .items
            .into_iter()
            .filter(|item| {
                item.task
                    .as_ref()
                    .and_then(|task| task.url.as_deref())
                    .is_some_and(|task_url| config::task_belongs_to(task_url, job))
            })
            .map(|item| mapper::map_queue_item(job, item))
            .collect()
    }

    async fn queue_item(&self, job: &JobPath, id: u64) -> CiResult<QueueItem> {
        let url = format!("{}/queue/item/{id}/api/json", self.server_url);
        let raw: types::QueueItem = self.get_json(&url, &format!("queue item {id}")).await?;
        if let Some(task) = raw.task.as_ref() {
            tracing::trace!("queue item {id} belongs to {:?}", task.name);
        }
        mapper::map_queue_item(job, raw)
    }

    async fn trigger_build(&self, job: &JobPath, params: &ParameterSet) -> CiResult<QueueItem> {
        let endpoint = if params.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let url = format!("{}{endpoint}", config::job_url(&self.server_url, job));
        let what = format!("trigger {job}");

        tracing::info!("Triggering {job} with {params}");
        let response = self.post(&url, &what, &params.to_form()).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        check_status(&what, response).await?;

        let location = location.ok_or_else(|| {
            CiError::RemoteSchema(format!("{what}: response carries no Location header"))
        })?;
        let id = config::parse_queue_location(&location)?;
        tracing::info!("{job} queued as item {id}");

        Ok(QueueItem {
            job: job.clone(),
            id,
            parameters: params.clone(),
            executable: None,
            cancelled: false,
            why: None,
        })
    }

    async fn stop_build(&self, job: &JobPath, number: u64) -> CiResult<()> {
        let url = format!("{}stop", config::build_url(&self.server_url, job, number));
        let what = format!("stop {job}#{number}");
        tracing::info!("Stopping build {job}#{number}");
        let response = self.post(&url, &what, &[]).await?;
        check_status(&what, response).await?;
        Ok(())
    }

    async fn cancel_queue_item(&self, id: u64) -> CiResult<()> {
        let url = format!("{}/queue/cancelItem?id={id}", self.server_url);
        let what = format!("cancel queue item {id}");
        tracing::info!("Cancelling queue item {id}");
        let response = self.post(&url, &what, &[]).await?;
        check_status(&what, response).await?;
        Ok(())
    }

    async fn list_artifacts(&self, build: &BuildRecord) -> CiResult<Vec<Artifact>> {
        // build.url is what Jenkins reports, which might not be reachable from
        // here, so the URL is derived from our own server URL
        let url = format!(
            "{}api/json?tree=fingerprint[fileName,hash]",
            config::build_url(&self.server_url, &build.job, build.number)
        );
        let response: types::FingerprintResponse = self
            .get_json(&url, &format!("fingerprints of {}", build.describe()))
            .await?;
        mapper::map_artifacts(build, response)
    }

    async fn download_artifact(
        &self, build: &BuildRecord, artifact: &str, dest: &Path,
    ) -> CiResult<u64> {
        let encoded = artifact
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!(
            "{}artifact/{encoded}",
            config::build_url(&self.server_url, &build.job, build.number)
        );
        let what = format!("download {artifact}");

        tracing::debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_send_error(&what, e))?;
        let mut response = check_status(&what, response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_send_error(&what, e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn lockable_resources(&self) -> CiResult<Vec<LockableResource>> {
        let url = format!(
            "{}/lockable-resources/api/json?tree=resources[*]",
            self.server_url
        );
        let response: types::ResourcesResponse =
            self.get_json(&url, "lockable resources").await?;
        tracing::debug!("Found {} lockable resources", response.resources.len());
        response
            .resources
            .into_iter()
            .map(mapper::map_resource)
            .collect()
    }

    async fn reserve_resource(&self, name: &str) -> CiResult<ReservationOutcome> {
        self.change_reservation("reserve", name).await
    }

    async fn unreserve_resource(&self, name: &str) -> CiResult<ReservationOutcome> {
        self.change_reservation("unreserve", name).await
    }
}
