//! Project tool configuration (`app-upload.toml`)
//!
//! Every key is optional. A missing file is the all-defaults configuration;
//! a present file is validated before use. Command-line flags override the
//! values read here.

use crate::orchestrator::WatermarkPolicy;
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use upload_client::ClientOptions;
use upload_core::{ArchiveOptions, IgnoreConfig, DEFAULT_STATE_FILE};

/// Config file name, looked up in the project root
pub const CONFIG_FILE: &str = "app-upload.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub upload: UploadSection,
    pub incremental: IncrementalSection,
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSection {
    /// Whole-request limit for the upload (1-3600)
    pub timeout_secs: u64,
    /// gzip level (0-9, 0 = plain tar)
    pub compression_level: u32,
    /// Request a restart after a successful upload
    pub restart: bool,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            compression_level: 9,
            restart: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IncrementalSection {
    /// State file path, relative to the project root
    pub state_file: PathBuf,
    /// Move the watermark even when the upload failed
    pub advance_on_failure: bool,
}

impl Default for IncrementalSection {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            advance_on_failure: true,
        }
    }
}

impl ToolConfig {
    /// Load the config from the project root
    ///
    /// Returns the default config if `app-upload.toml` doesn't exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate config text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=3600).contains(&self.upload.timeout_secs),
            "upload.timeout_secs must be between 1 and 3600 (got {})",
            self.upload.timeout_secs
        );
        ensure!(
            self.upload.compression_level <= 9,
            "upload.compression_level must be between 0 and 9 (got {})",
            self.upload.compression_level
        );
        ensure!(
            !self.incremental.state_file.as_os_str().is_empty(),
            "incremental.state_file must not be empty"
        );
        Ok(())
    }

    pub fn watermark_policy(&self) -> WatermarkPolicy {
        if self.incremental.advance_on_failure {
            WatermarkPolicy::Always
        } else {
            WatermarkPolicy::OnSuccess
        }
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            compression_level: self.upload.compression_level,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            upload_timeout: Duration::from_secs(self.upload.timeout_secs),
            ..ClientOptions::default()
        }
    }
}
