//! Project file enumeration
//!
//! Walks the project tree honoring [`IgnoreRules`] and yields every regular
//! file as a [`CandidateFile`]. Traversal is sorted by file name so the
//! sequence is deterministic for a fixed filesystem snapshot.

use crate::ignore::IgnoreRules;
use crate::state::Watermark;
use filetime::FileTime;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("failed to walk project tree: {0}")]
    Walk(#[source] walkdir::Error),

    #[error("failed to read metadata for {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A project file with its observed modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Path relative to the project root
    pub path: PathBuf,
    /// Last modification time at enumeration
    pub mtime: FileTime,
}

/// Lazy walk over the uploadable files of a project
///
/// Non-restartable: once an error is yielded the walk ends, since a partial
/// file list would silently under-upload.
pub struct Enumeration {
    rules: Arc<IgnoreRules>,
    walker: walkdir::IntoIter,
    failed: bool,
}

impl Enumeration {
    /// Start walking the root the rules were loaded for
    pub fn new(rules: Arc<IgnoreRules>) -> Self {
        let walker = WalkDir::new(rules.root())
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        Self {
            rules,
            walker,
            failed: false,
        }
    }

    fn candidate(&self, entry: &walkdir::DirEntry) -> Result<CandidateFile, EnumerateError> {
        let metadata = entry.metadata().map_err(|source| EnumerateError::Metadata {
            path: entry.path().to_path_buf(),
            source,
        })?;

        let path = entry
            .path()
            .strip_prefix(self.rules.root())
            .unwrap_or(entry.path())
            .to_path_buf();

        Ok(CandidateFile {
            path,
            mtime: FileTime::from_last_modification_time(&metadata),
        })
    }
}

impl Iterator for Enumeration {
    type Item = Result<CandidateFile, EnumerateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(EnumerateError::Walk(err)));
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            // With follow_links the file type is the link target's.
            let file_type = entry.file_type();
            if self.rules.is_excluded(entry.path(), file_type.is_dir()) {
                if file_type.is_dir() {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if !file_type.is_file() {
                continue;
            }

            let candidate = self.candidate(&entry);
            if candidate.is_err() {
                self.failed = true;
            }
            return Some(candidate);
        }
    }
}

/// Collect the files modified strictly after `watermark`
pub fn changed_since(
    enumeration: Enumeration,
    watermark: Watermark,
) -> Result<Vec<CandidateFile>, EnumerateError> {
    let mut selected = Vec::new();
    for file in enumeration {
        let file = file?;
        if watermark.admits(file.mtime) {
            selected.push(file);
        }
    }
    Ok(selected)
}

/// Collect every uploadable file
pub fn all_files(enumeration: Enumeration) -> Result<Vec<CandidateFile>, EnumerateError> {
    enumeration.collect()
}
