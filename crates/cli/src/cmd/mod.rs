//! CLI command implementations

pub mod upload;
pub mod watch;

use crate::util;
use anyhow::{Context, Result};
use cli_lib::{SyncOptions, ToolConfig};
use std::path::PathBuf;
use upload_client::{Endpoint, UploadClient, URL_ENV};

/// Flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub project: Option<PathBuf>,
}

/// Everything a command needs before its first run
pub struct Session {
    pub root: PathBuf,
    pub config: ToolConfig,
    pub endpoint: Endpoint,
    pub client: UploadClient,
}

impl Session {
    /// Resolve root, config and endpoint; any failure here is fatal
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let root = util::project_root(global.project.as_deref())?;
        let config = ToolConfig::load(&root)?;

        let env_url = std::env::var(URL_ENV).ok();
        let endpoint = Endpoint::resolve(
            global.url.as_deref(),
            env_url.as_deref(),
            global.host.as_deref(),
            global.port,
        )
        .context("Failed to resolve the device endpoint")?;

        let client = UploadClient::new(endpoint.clone(), config.client_options())
            .context("Failed to create HTTP client")?;

        tracing::debug!("Project {} -> {}", root.display(), endpoint);
        Ok(Self {
            root,
            config,
            endpoint,
            client,
        })
    }

    /// Orchestrator options from config, with flags applied on top
    pub fn sync_options(
        &self,
        incremental: Option<Option<PathBuf>>,
        dry_run: bool,
        no_restart: bool,
    ) -> Result<SyncOptions> {
        Ok(SyncOptions {
            root: self.root.clone(),
            state_file: self.state_file(incremental)?,
            dry_run,
            no_restart: no_restart || !self.config.upload.restart,
            watermark_policy: self.config.watermark_policy(),
            archive: self.config.archive_options(),
            ignore: self.config.ignore.clone(),
            // Full uploads must not ship the state an incremental run left
            excluded: vec![self.root.join(&self.config.incremental.state_file)],
        })
    }

    /// `--incremental` alone uses the configured state file in the project
    /// root; `--incremental=<file>` is relative to the current directory
    fn state_file(&self, incremental: Option<Option<PathBuf>>) -> Result<Option<PathBuf>> {
        match incremental {
            None => Ok(None),
            Some(None) => Ok(Some(self.root.join(&self.config.incremental.state_file))),
            Some(Some(path)) => Ok(Some(util::absolute(&path)?)),
        }
    }
}
