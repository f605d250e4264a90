//! Incremental upload state
//!
//! The state file carries no content: its own modification time is the
//! watermark of the last synchronization. Writes go through a temporary file
//! in the same directory and a rename, so a crash leaves either the old or the
//! new watermark on disk.

use filetime::FileTime;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// State file used by `--incremental` without a path
pub const DEFAULT_STATE_FILE: &str = ".app-upload-state";

/// Name prefix of the temporary file written before the rename
pub const TEMP_PREFIX: &str = ".app-upload-state.";

/// Name suffix of the temporary file written before the rename
pub const TEMP_SUFFIX: &str = ".tmp";

/// Whether `name` is a state temporary file, possibly left by a crash
pub fn is_temp_file_name(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| {
        name.len() > TEMP_PREFIX.len() + TEMP_SUFFIX.len()
            && name.starts_with(TEMP_PREFIX)
            && name.ends_with(TEMP_SUFFIX)
    })
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write state file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Boundary between files already uploaded and files still pending
///
/// A file is pending when its modification time is strictly greater than
/// the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(FileTime);

impl Watermark {
    /// "No prior sync": every file is newer than this
    pub fn epoch() -> Self {
        Self(FileTime::zero())
    }

    pub fn now() -> Self {
        Self(FileTime::now())
    }

    pub fn from_file_time(time: FileTime) -> Self {
        Self(time)
    }

    pub fn file_time(&self) -> FileTime {
        self.0
    }

    pub fn is_epoch(&self) -> bool {
        self.0 == FileTime::zero()
    }

    /// Whether a file with this mtime belongs in the next incremental upload
    pub fn admits(&self, mtime: FileTime) -> bool {
        mtime > self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0.unix_seconds(), self.0.nanoseconds())
    }
}

/// Incremental state file
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted watermark
    ///
    /// A missing file means no prior sync and reads as [`Watermark::epoch`].
    /// Never creates the file.
    pub fn read(&self) -> Result<Watermark, StateError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => Ok(Watermark(FileTime::from_last_modification_time(&metadata))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Watermark::epoch()),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Read the watermark, creating the file at epoch zero if it is missing
    pub fn read_or_init(&self) -> Result<Watermark, StateError> {
        if !self.path.exists() {
            debug!("Creating state file {}", self.path.display());
            self.write(Watermark::epoch())?;
            return Ok(Watermark::epoch());
        }
        self.read()
    }

    /// Move the watermark forward to `to`
    ///
    /// The watermark never moves backwards; an older value (e.g. after a
    /// clock adjustment) leaves the stored one in place. Returns the
    /// watermark now on disk.
    pub fn advance(&self, to: Watermark) -> Result<Watermark, StateError> {
        let current = self.read()?;
        if to < current {
            warn!(
                "Not moving watermark backwards ({} -> {}) in {}",
                current,
                to,
                self.path.display()
            );
            return Ok(current);
        }

        self.write(to)?;
        debug!("Advanced watermark to {} in {}", to, self.path.display());
        Ok(to)
    }

    /// Atomically replace the state file with one stamped `watermark`
    fn write(&self, watermark: Watermark) -> Result<(), StateError> {
        let wrap = |source: io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(wrap)?;

        let tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(wrap)?;

        let time = watermark.file_time();
        filetime::set_file_times(tmp.path(), time, time).map_err(wrap)?;
        tmp.as_file().sync_all().map_err(wrap)?;
        tmp.persist(&self.path).map_err(|err| wrap(err.error))?;
        Ok(())
    }
}
