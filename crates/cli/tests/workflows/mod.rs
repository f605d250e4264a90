//! Workflow integration tests
//!
//! End-to-end runs of the `app-upload` binary against an in-process device.

pub mod config_errors;
pub mod incremental;
pub mod upload;
pub mod watch;
