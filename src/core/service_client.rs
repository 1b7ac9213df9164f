// src/core/service_client.rs
//! Typed HTTP client for the job-scraping backend.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::{Origin, Url};

use crate::app_log;
use crate::auth::BackendSync;
use crate::error::ApiError;
use crate::types::response::{ErrorBody, ScrapeRequest};
use crate::types::{
    GeneratedCv, GeneratedStats, HealthStatus, JobDetail, JobList, JobStats, MessageResponse,
    ScrapedJob, SyncResponse,
};
use crate::utils::{content_type_for, validate_cv_file, validate_job_url};

const AUTH_SYNC_ENDPOINT: &str = "/api/auth/sync";
const SCRAPE_ENDPOINT: &str = "/api/scrape";
const JOBS_ENDPOINT: &str = "/api/jobs";
const GENERATE_CV_ENDPOINT: &str = "/api/generate-cv";
const STATS_ENDPOINT: &str = "/api/stats";
const GENERATE_STATS_ENDPOINT: &str = "/api/stats/generate";
const HEALTH_ENDPOINT: &str = "/api/health";

/// Supplies the `Authorization` header for outgoing requests.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Header for a request about to be sent, or `None` to send it unauthenticated.
    async fn authorization(&self) -> Option<HeaderValue>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    origin: Origin,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl ApiClient {
    pub fn new(base_url: &Url, timeout_seconds: u64) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            origin: base_url.origin(),
            credentials: None,
        })
    }

    /// Attach `Authorization` from `credentials` to every request.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Tell the backend a user has signed in. Uses `bearer_token` directly rather
    /// than the credential source.
    pub async fn sync_user(&self, bearer_token: &str) -> Result<SyncResponse, ApiError> {
        let url = self.url(AUTH_SYNC_ENDPOINT);
        app_log!(debug, "Syncing user with backend: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer_token)
            .send()
            .await?;
        read_json(response, "sync", "Failed to sync user").await
    }

    pub async fn scrape_job(&self, job_url: &str) -> Result<ScrapedJob, ApiError> {
        let job_url = validate_job_url(job_url)?;
        app_log!(info, "Scraping job: {}", job_url);

        let response = self
            .request(Method::POST, SCRAPE_ENDPOINT)
            .await
            .json(&ScrapeRequest {
                url: job_url.as_str(),
            })
            .send()
            .await?;
        read_json(response, "scrape", "Failed to scrape job").await
    }

    pub async fn list_jobs(&self, limit: u32, offset: u32) -> Result<JobList, ApiError> {
        let response = self
            .request(Method::GET, JOBS_ENDPOINT)
            .await
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        read_json(response, "jobs", "Failed to fetch jobs").await
    }

    pub async fn get_job(&self, job_id: i64) -> Result<JobDetail, ApiError> {
        let path = format!("{}/{}", JOBS_ENDPOINT, job_id);
        let response = self.request(Method::GET, &path).await.send().await?;
        read_json(response, "job", "Failed to fetch job").await
    }

    pub async fn delete_job(&self, job_id: i64) -> Result<MessageResponse, ApiError> {
        let path = format!("{}/{}", JOBS_ENDPOINT, job_id);
        app_log!(info, "Deleting job {}", job_id);

        let response = self.request(Method::DELETE, &path).await.send().await?;
        read_json(response, "delete job", "Failed to delete job").await
    }

    /// Upload a CV and ask the backend to tailor it to `job_id`.
    pub async fn generate_cv(&self, job_id: i64, cv_file: &Path) -> Result<GeneratedCv, ApiError> {
        validate_cv_file(cv_file).await?;

        let file_name = cv_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("cv.txt")
            .to_string();
        let content = tokio::fs::read(cv_file).await.map_err(|source| ApiError::Io {
            path: cv_file.display().to_string(),
            source,
        })?;

        let form = Form::new().text("job_id", job_id.to_string()).part(
            "cv_file",
            Part::bytes(content)
                .file_name(file_name.clone())
                .mime_str(content_type_for(&file_name))?,
        );

        app_log!(info, "Generating CV for job {} from {}", job_id, file_name);
        let response = self
            .request(Method::POST, GENERATE_CV_ENDPOINT)
            .await
            .multipart(form)
            .send()
            .await?;
        read_json(response, "generate CV", "Failed to generate CV").await
    }

    pub async fn stats(&self) -> Result<JobStats, ApiError> {
        let response = self.request(Method::GET, STATS_ENDPOINT).await.send().await?;
        read_json(response, "stats", "Failed to fetch stats").await
    }

    pub async fn generate_stats(&self) -> Result<GeneratedStats, ApiError> {
        app_log!(info, "Requesting statistics generation");
        let response = self
            .request(Method::POST, GENERATE_STATS_ENDPOINT)
            .await
            .send()
            .await?;
        read_json(response, "generate stats", "Failed to generate stats").await
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let response = self.request(Method::GET, HEALTH_ENDPOINT).await.send().await?;
        read_json(response, "health", "Health check failed").await
    }

    /// Download a generated artifact into `dest_dir`. `location` is either an
    /// absolute URL or a path relative to the backend base URL.
    pub async fn download(&self, location: &str, dest_dir: &Path) -> Result<PathBuf, ApiError> {
        let url = if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else if location.starts_with('/') {
            self.url(location)
        } else {
            format!("{}/{}", self.base_url, location)
        };

        let url = Url::parse(&url)
            .map_err(|_| ApiError::InvalidInput(format!("Invalid download location: {}", location)))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::InvalidInput(format!("Cannot derive a file name from {}", location))
            })?;

        app_log!(info, "Downloading {}", url);
        let mut request = self.client.get(url.clone());
        // Credentials only go to the backend itself.
        if url.origin() == self.origin {
            if let Some(header) = self.authorization().await {
                request = request.header(AUTHORIZATION, header);
            }
        } else {
            app_log!(debug, "Downloading from foreign origin without credentials");
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response, "Failed to download file").await);
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| ApiError::Io {
                path: dest_dir.display().to_string(),
                source,
            })?;
        let dest = dest_dir.join(file_name);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|source| ApiError::Io {
                path: dest.display().to_string(),
                source,
            })?;
        Ok(dest)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorization(&self) -> Option<HeaderValue> {
        match &self.credentials {
            Some(credentials) => credentials.authorization().await,
            None => None,
        }
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        app_log!(trace, "{} {}", method, url);
        let builder = self.client.request(method, &url);
        match self.authorization().await {
            Some(header) => builder.header(AUTHORIZATION, header),
            None => builder,
        }
    }
}

#[async_trait]
impl BackendSync for ApiClient {
    async fn sync(&self, bearer_token: &str) -> Result<(), ApiError> {
        let response = self.sync_user(bearer_token).await?;
        if let Some(message) = response.message {
            app_log!(debug, "Backend sync: {}", message);
        }
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    operation: &'static str,
    fallback: &str,
) -> Result<T, ApiError> {
    let status = response.status();
    app_log!(trace, "Response status for {}: {}", operation, status);

    if !status.is_success() {
        return Err(status_error(response, fallback).await);
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| ApiError::Decode { operation, source })
}

/// Build a `Status` error, preferring the backend's `detail` message.
async fn status_error(response: Response, fallback: &str) -> ApiError {
    let status = response.status().as_u16();
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message())
        .unwrap_or_else(|| fallback.to_string());

    app_log!(error, "Backend returned {}: {}", status, detail);
    ApiError::Status { status, detail }
}
