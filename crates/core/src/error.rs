//! Error kinds and the propagation policy attached to each
//!
//! Every failure the upload pipeline can hit falls into one [`ErrorKind`].
//! The kind decides what happens next, through [`ErrorKind::policy`]:
//!
//! | Kind          | Policy              |
//! |---------------|---------------------|
//! | `Config`      | `FatalAtStartup`    |
//! | `Enumeration` | `AbortOperation`    |
//! | `Archive`     | `AbortOperation`    |
//! | `Transport`   | `ReportAndContinue` |
//! | `Restart`     | `Swallow`           |

use std::fmt;
use tracing::{debug, error, warn};

/// Category of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid host/port, unreadable tool config
    Config,
    /// Unreadable file metadata while listing the project
    Enumeration,
    /// Failure while streaming a file into the archive
    Archive,
    /// Connection refused, timeout, non-200 response
    Transport,
    /// The best-effort restart request failed
    Restart,
}

/// What the caller does with an error of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The process never starts an operation
    FatalAtStartup,
    /// The current operation ends, nothing partial is sent
    AbortOperation,
    /// Shown to the operator as a failed upload; the process keeps running
    ReportAndContinue,
    /// Logged at debug level at most
    Swallow,
}

impl ErrorKind {
    pub const fn policy(self) -> ErrorPolicy {
        match self {
            ErrorKind::Config => ErrorPolicy::FatalAtStartup,
            ErrorKind::Enumeration | ErrorKind::Archive => ErrorPolicy::AbortOperation,
            ErrorKind::Transport => ErrorPolicy::ReportAndContinue,
            ErrorKind::Restart => ErrorPolicy::Swallow,
        }
    }

    /// Log `err` at the level its policy calls for
    pub fn log(self, err: &dyn fmt::Display) {
        match self.policy() {
            ErrorPolicy::Swallow => debug!("Ignoring {} error: {}", self, err),
            ErrorPolicy::ReportAndContinue => warn!("{} error: {}", self, err),
            ErrorPolicy::AbortOperation | ErrorPolicy::FatalAtStartup => {
                error!("{} error: {}", self, err)
            }
        }
    }
}

impl ErrorPolicy {
    /// Whether a long-running session keeps going after the error
    pub fn continues_session(self) -> bool {
        !matches!(self, ErrorPolicy::FatalAtStartup)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "configuration",
            ErrorKind::Enumeration => "enumeration",
            ErrorKind::Archive => "archive",
            ErrorKind::Transport => "transport",
            ErrorKind::Restart => "restart",
        };
        f.write_str(name)
    }
}
