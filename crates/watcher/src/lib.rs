//! Trigger-file watching for app-upload
//!
//! A watch session observes one trigger file. Every burst of changes to it
//! is one trigger. The file is touched when the session starts so the
//! platform watcher produces an initial event; that first trigger only arms
//! the session and is never reported.

pub mod debounce;

pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};

use filetime::FileTime;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("trigger path {} has no file name", .0.display())]
    InvalidPath(PathBuf),

    #[error("failed to touch trigger file {}: {source}", path.display())]
    Touch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch {}: {source}", path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Session state: the initial synthetic trigger is swallowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    ArmedInitial,
    Active,
}

impl TriggerState {
    /// Record a trigger; returns whether it should run the pipeline
    pub fn on_trigger(&mut self) -> bool {
        match self {
            TriggerState::ArmedInitial => {
                *self = TriggerState::Active;
                false
            }
            TriggerState::Active => true,
        }
    }
}

/// Watches a single trigger file and yields debounced triggers
pub struct TriggerWatcher {
    path: PathBuf,
    state: TriggerState,
    debouncer: Debouncer<()>,
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for TriggerWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerWatcher")
            .field("path", &self.path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TriggerWatcher {
    /// Start watching `path`, creating it if needed
    ///
    /// The parent directory is watched non-recursively, so the trigger file
    /// may be replaced (e.g. by an editor's rename-on-save) without losing
    /// the watch.
    pub fn start(path: impl Into<PathBuf>, window: Duration) -> Result<Self, WatchError> {
        let path = absolute(path.into());
        let file_name = path
            .file_name()
            .ok_or_else(|| WatchError::InvalidPath(path.clone()))?
            .to_os_string();
        let parent = path
            .parent()
            .ok_or_else(|| WatchError::InvalidPath(path.clone()))?
            .to_path_buf();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_change(&event)
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        let _ = tx.send(());
                    }
                }
                Err(err) => warn!("Watch error: {}", err),
            },
            Config::default(),
        )
        .map_err(|source| WatchError::Notify {
            path: parent.clone(),
            source,
        })?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: parent.clone(),
                source,
            })?;

        // After registering, so the touch is observed.
        touch(&path)?;
        debug!("Watching trigger file {}", path.display());

        Ok(Self {
            path,
            state: TriggerState::ArmedInitial,
            debouncer: Debouncer::new(rx, window),
            _watcher: watcher,
        })
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Wait for the next trigger that should run the pipeline
    ///
    /// Returns `None` if the platform watcher shut down.
    pub async fn next(&mut self) -> Option<()> {
        loop {
            let merged = self.debouncer.next_burst().await?;
            if self.state.on_trigger() {
                debug!("Trigger on {} ({} events)", self.path.display(), merged);
                return Some(());
            }
            debug!("Session armed ({} initial events)", merged);
        }
    }
}

/// Reads and opens are not changes
fn is_change(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Create the file if missing and set its mtime to now
fn touch(path: &Path) -> Result<(), WatchError> {
    let wrap = |source: io::Error| WatchError::Touch {
        path: path.to_path_buf(),
        source,
    };

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)?;
    filetime::set_file_mtime(path, FileTime::now()).map_err(wrap)?;
    Ok(())
}
