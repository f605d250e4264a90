//! HTTP transport to the device's upload server
//!
//! Two requests exist: `POST /app-upload` carrying the archive as a streamed
//! body, and `POST /restart` asking the device to restart the application.
//! The [`Transport`] trait is the seam the orchestrator talks to, so tests can
//! substitute an in-memory implementation.

pub mod endpoint;

pub use endpoint::{ConfigError, Endpoint, DEFAULT_PORT, URL_ENV};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use upload_core::ArchiveStream;

/// Path the archive is posted to
pub const UPLOAD_PATH: &str = "/app-upload";

/// Path of the restart request
pub const RESTART_PATH: &str = "/restart";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

impl TransportError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Request side of a sync run
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stream `archive` to the device and return the response status
    ///
    /// Any completed exchange is `Ok`, whatever the status code; judging the
    /// status is left to the caller.
    async fn upload(&self, archive: ArchiveStream) -> Result<u16, TransportError>;

    /// Ask the device to restart the application
    async fn restart(&self) -> Result<(), TransportError>;
}

/// Timeouts for [`UploadClient`]
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Whole-request limit for an upload, body included
    pub upload_timeout: Duration,
    pub restart_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(120),
            restart_timeout: Duration::from_secs(10),
        }
    }
}

/// [`Transport`] over plain HTTP
#[derive(Debug, Clone)]
pub struct UploadClient {
    endpoint: Endpoint,
    http: reqwest::Client,
    options: ClientOptions,
}

impl UploadClient {
    pub fn new(endpoint: Endpoint, options: ClientOptions) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            endpoint,
            http,
            options,
        })
    }
}

#[async_trait]
impl Transport for UploadClient {
    async fn upload(&self, archive: ArchiveStream) -> Result<u16, TransportError> {
        let url = self.endpoint.url(UPLOAD_PATH);
        info!("Uploading to {}", url);

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, archive.content_type())
            .timeout(self.options.upload_timeout)
            .body(reqwest::Body::wrap_stream(archive))
            .send()
            .await
            .map_err(|err| TransportError::from_reqwest(&url, err))?;

        let status = response.status().as_u16();
        // Drain so the connection is released cleanly; the body is informational.
        if let Ok(body) = response.text().await {
            if !body.is_empty() {
                debug!("Upload response: {}", body.trim());
            }
        }

        Ok(status)
    }

    async fn restart(&self) -> Result<(), TransportError> {
        let url = self.endpoint.url(RESTART_PATH);
        debug!("Requesting restart at {}", url);

        let response = self
            .http
            .post(&url)
            .timeout(self.options.restart_timeout)
            .send()
            .await
            .map_err(|err| TransportError::from_reqwest(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
