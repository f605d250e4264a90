//! app-upload library
//!
//! The parts of the tool the binary drives: one synchronization run, the
//! watch loop around it, and the project tool configuration.

pub mod config;
pub mod orchestrator;
pub mod watch;

// Re-exports
pub use config::{ToolConfig, CONFIG_FILE};
pub use orchestrator::{
    RestartStatus, SyncError, SyncOptions, SyncOrchestrator, SyncReport, UploadOutcome,
    WatermarkPolicy,
};
pub use watch::{watch_loop, Triggers};
