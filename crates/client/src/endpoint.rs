//! Remote device endpoint resolution
//!
//! The endpoint is resolved once at startup: an explicit URL wins over the
//! `APP_UPLOAD_URL` environment variable, and explicit host/port values
//! override the parts parsed from either. A missing port falls back to
//! [`DEFAULT_PORT`].

use reqwest::Url;
use std::fmt;
use thiserror::Error;

/// Port the device's upload server listens on by default
pub const DEFAULT_PORT: u16 = 5481;

/// Environment variable holding the default endpoint URL
pub const URL_ENV: &str = "APP_UPLOAD_URL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{0}' (only http is supported)")]
    UnsupportedScheme(String),

    #[error("no server host given (use --url, --host or set {URL_ENV})")]
    MissingHost,

    #[error("invalid port 0")]
    InvalidPort,
}

/// Host and port of the device's upload server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let host = host.into();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(Self { host, port })
    }

    /// Resolve the endpoint from flags and environment
    ///
    /// `url` is the explicit `--url` flag, `env_url` the environment value.
    /// Empty strings count as absent.
    pub fn resolve(
        url: Option<&str>,
        env_url: Option<&str>,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let raw = url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| env_url.filter(|u| !u.trim().is_empty()));

        let (parsed_host, parsed_port) = match raw {
            Some(raw) => parse_url(raw.trim())?,
            None => (None, None),
        };

        let host = host
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or(parsed_host)
            .ok_or(ConfigError::MissingHost)?;
        let port = port.or(parsed_port).unwrap_or(DEFAULT_PORT);

        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Full URL for a request path such as `/app-upload`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Split a `host[:port]` or `http://host[:port]` string
fn parse_url(raw: &str) -> Result<(Option<String>, Option<u16>), ConfigError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let url = Url::parse(&with_scheme).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url.host_str().filter(|h| !h.is_empty()).map(str::to_string);
    Ok((host, url.port()))
}
