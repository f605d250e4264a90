//! One synchronization run
//!
//! `run_once` reads the watermark, selects files, streams the archive to the
//! transport, requests a restart and advances the watermark. Runs on one
//! orchestrator are serialized by an internal lock, so the watermark read of
//! a run always happens after the previous run's write.

use std::iter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use upload_client::Transport;
use upload_core::enumerate::{all_files, changed_since};
use upload_core::{
    spawn_archive, ArchiveError, ArchiveOptions, ArchiveSource, CandidateFile, EnumerateError,
    Enumeration, ErrorKind, IgnoreConfig, IgnoreError, IgnoreRules, StateError, StateFile,
    Watermark, DEFAULT_STATE_FILE,
};

/// When the watermark moves after an upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPolicy {
    /// After success, a failed upload, or an archive error
    #[default]
    Always,
    /// Only after the server accepted the upload
    OnSuccess,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Project root
    pub root: PathBuf,
    /// Incremental state file; `None` uploads every file. Relative paths are
    /// resolved against `root`.
    pub state_file: Option<PathBuf>,
    pub dry_run: bool,
    pub no_restart: bool,
    pub watermark_policy: WatermarkPolicy,
    pub archive: ArchiveOptions,
    pub ignore: IgnoreConfig,
    /// Files kept out of archives besides the active state file: the
    /// project's configured state file, the watch-mode trigger file.
    /// Relative paths are resolved against `root`.
    pub excluded: Vec<PathBuf>,
}

impl SyncOptions {
    /// Full upload of `root` with default settings
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state_file: None,
            dry_run: false,
            no_restart: false,
            watermark_policy: WatermarkPolicy::default(),
            archive: ArchiveOptions::default(),
            ignore: IgnoreConfig::default(),
            excluded: vec![PathBuf::from(DEFAULT_STATE_FILE)],
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartStatus {
    /// The upload failed or carried no file
    NotRequested,
    /// Disabled by `--no-restart` or config
    Suppressed,
    Sent,
    /// The request failed; never fails the run
    Failed,
}

/// Result of an upload attempt, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Response status; `None` when no response was received
    pub status: Option<u16>,
    /// Files included in the archive
    pub files: usize,
    pub failure: Option<String>,
    pub restart: RestartStatus,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.status == Some(200) && self.failure.is_none()
    }

    /// Kind of the failure, if the upload failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        (!self.is_success()).then_some(ErrorKind::Transport)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    /// Nothing selected; nothing sent or written
    NoChanges,
    /// Selection that would have been uploaded
    DryRun { files: Vec<PathBuf> },
    Uploaded(UploadOutcome),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to load ignore rules: {0}")]
    Ignore(#[from] IgnoreError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Archive(ArchiveError::Enumerate(_)) => ErrorKind::Enumeration,
            SyncError::Archive(_) => ErrorKind::Archive,
            SyncError::Ignore(IgnoreError::Pattern { .. }) => ErrorKind::Config,
            SyncError::Ignore(_)
            | SyncError::State(_)
            | SyncError::Enumerate(_)
            | SyncError::Join(_) => ErrorKind::Enumeration,
        }
    }
}

pub struct SyncOrchestrator<T> {
    transport: T,
    options: SyncOptions,
    run_lock: Mutex<()>,
}

impl<T: Transport> SyncOrchestrator<T> {
    pub fn new(transport: T, options: SyncOptions) -> Self {
        Self {
            transport,
            options,
            run_lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.run_lock.lock().await;
        let options = &self.options;

        // Captured before enumeration: files touched while the run is in
        // flight stay newer than the next watermark.
        let boundary = Watermark::now();

        let state = options
            .state_file
            .as_deref()
            .map(|path| StateFile::new(options.resolve(path)));
        let watermark = match &state {
            Some(state) if options.dry_run => Some(state.read()?),
            Some(state) => Some(state.read_or_init()?),
            None => None,
        };
        if let (Some(state), Some(watermark)) = (&state, watermark) {
            debug!("Watermark {} from {}", watermark, state.path().display());
        }

        let rules = Arc::new(self.load_rules().await?);

        let (source, selected) = match select(rules, watermark, options.dry_run).await? {
            Selection::Empty => {
                info!("No changes to upload");
                return Ok(SyncReport::NoChanges);
            }
            Selection::Files(files) if options.dry_run => {
                let files = files.into_iter().map(|file| file.path).collect();
                return Ok(SyncReport::DryRun { files });
            }
            Selection::Files(files) => {
                let count = files.len();
                (ArchiveSource::Files(files), count)
            }
            Selection::Walk(first, rest) => {
                let walk = iter::once(Ok(first)).chain(rest);
                (ArchiveSource::Walk(Box::new(walk)), 0)
            }
        };

        let archived = self.upload(source, selected).await;

        let succeeded = matches!(&archived, Ok(outcome) if outcome.is_success());
        if let Some(state) = &state {
            self.advance(state, boundary, succeeded)?;
        }

        let mut outcome = archived?;
        outcome.restart = self.restart(&outcome).await;
        Ok(SyncReport::Uploaded(outcome))
    }

    async fn load_rules(&self) -> Result<IgnoreRules, SyncError> {
        let options = &self.options;
        let root = options.root.clone();
        let config = options.ignore.clone();
        let excluded: Vec<PathBuf> = options
            .state_file
            .iter()
            .chain(options.excluded.iter())
            .map(|path| options.resolve(path))
            .collect();

        let rules =
            tokio::task::spawn_blocking(move || IgnoreRules::load(&root, config, &excluded))
                .await??;
        Ok(rules)
    }

    /// Stream the archive into the transport
    ///
    /// `Err` only for archive failures; transport failures are part of the
    /// outcome.
    async fn upload(
        &self,
        source: ArchiveSource,
        selected: usize,
    ) -> Result<UploadOutcome, SyncError> {
        if selected > 0 {
            info!("Uploading {} files", selected);
        } else {
            info!("Uploading all files");
        }

        let (stream, task) =
            spawn_archive(self.options.root.clone(), source, self.options.archive);
        let response = self.transport.upload(stream).await;
        let archived = task.finish().await;

        let files = match &archived {
            Ok(summary) => summary.files,
            Err(ArchiveError::ConsumerClosed { selected }) => *selected,
            Err(_) => selected,
        };

        match (response, archived) {
            // The server stopped reading; its answer is what counts.
            (response, Err(ArchiveError::ConsumerClosed { .. })) | (response, Ok(_)) => {
                let outcome = match response {
                    Ok(200) => UploadOutcome {
                        status: Some(200),
                        files,
                        failure: None,
                        restart: RestartStatus::NotRequested,
                    },
                    Ok(status) => UploadOutcome {
                        status: Some(status),
                        files,
                        failure: Some(format!("server answered with status {}", status)),
                        restart: RestartStatus::NotRequested,
                    },
                    Err(err) => UploadOutcome {
                        status: None,
                        files,
                        failure: Some(err.to_string()),
                        restart: RestartStatus::NotRequested,
                    },
                };
                if let (Some(kind), Some(failure)) = (outcome.error_kind(), &outcome.failure) {
                    kind.log(failure);
                }
                Ok(outcome)
            }
            (_, Err(err)) => Err(err.into()),
        }
    }

    fn advance(
        &self,
        state: &StateFile,
        boundary: Watermark,
        succeeded: bool,
    ) -> Result<(), SyncError> {
        match self.options.watermark_policy {
            WatermarkPolicy::OnSuccess if !succeeded => {
                debug!("Keeping watermark after failed upload");
                Ok(())
            }
            _ => {
                state.advance(boundary)?;
                Ok(())
            }
        }
    }

    async fn restart(&self, outcome: &UploadOutcome) -> RestartStatus {
        if !outcome.is_success() || outcome.files == 0 {
            return RestartStatus::NotRequested;
        }
        if self.options.no_restart {
            return RestartStatus::Suppressed;
        }

        match self.transport.restart().await {
            Ok(()) => RestartStatus::Sent,
            Err(err) => {
                ErrorKind::Restart.log(&err);
                RestartStatus::Failed
            }
        }
    }
}

enum Selection {
    Empty,
    Files(Vec<CandidateFile>),
    /// Full upload: the first file, then the rest of the same walk
    Walk(CandidateFile, Enumeration),
}

/// Decide what the run uploads
///
/// A full upload pulls only the first file up front, so an empty project is
/// known before anything is sent and the tree is still walked once.
async fn select(
    rules: Arc<IgnoreRules>,
    watermark: Option<Watermark>,
    dry_run: bool,
) -> Result<Selection, SyncError> {
    let selection = tokio::task::spawn_blocking(move || -> Result<Selection, EnumerateError> {
        let enumeration = Enumeration::new(rules);
        let files = match watermark {
            Some(watermark) => changed_since(enumeration, watermark)?,
            None if dry_run => all_files(enumeration)?,
            None => {
                let mut rest = enumeration;
                return match rest.next() {
                    Some(first) => Ok(Selection::Walk(first?, rest)),
                    None => Ok(Selection::Empty),
                };
            }
        };

        if files.is_empty() {
            Ok(Selection::Empty)
        } else {
            Ok(Selection::Files(files))
        }
    })
    .await??;

    Ok(selection)
}
