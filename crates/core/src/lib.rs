//! Change detection and archiving for app-upload
//!
//! This crate provides:
//! - Layered ignore rules (`.gitignore`, `.uploadignore`, built-in exclusions)
//! - Deterministic, ignore-aware project enumeration
//! - The incremental watermark state file
//! - Streaming tar/gzip archives with backpressure
//! - The error kinds shared by the upload pipeline

pub mod archive;
pub mod enumerate;
pub mod error;
pub mod ignore;
pub mod state;

// Re-exports
pub use archive::{
    spawn_archive, ArchiveError, ArchiveOptions, ArchiveSource, ArchiveStream, ArchiveSummary,
    ArchiveTask,
};
pub use enumerate::{CandidateFile, EnumerateError, Enumeration};
pub use error::{ErrorKind, ErrorPolicy};
pub use crate::ignore::{IgnoreConfig, IgnoreError, IgnoreRules};
pub use state::{StateError, StateFile, Watermark, DEFAULT_STATE_FILE};
