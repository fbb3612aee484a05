//! Result and error types for snap-report.
//!
//! Every variant here is absorbed somewhere inside the crate: the listener and
//! the suite manager log these errors and keep going, so reporting trouble never
//! replaces the outcome of the test being reported.

use crate::entry::TestStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for reporting operations
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors that can occur while building a report
#[derive(Debug, Error)]
pub enum ReportError {
    /// Report directory or artifact could not be created
    #[error("Report setup failed for {}: {message}", path.display())]
    Setup {
        /// Directory or file that could not be prepared
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Screenshot could not be taken or saved
    #[error("Screenshot not taken: {message}")]
    Capture {
        /// Error message
        message: String,
    },

    /// A log call arrived on a worker with no bound test entry
    #[error("No test entry bound to worker '{worker}'")]
    UnboundContext {
        /// Worker that made the call
        worker: String,
    },

    /// A terminal status was reported for an entry that already finished
    #[error("Test '{test}' is already {from:?}; ignoring {to:?}")]
    InvalidTransition {
        /// Test name
        test: String,
        /// Status already recorded
        from: TestStatus,
        /// Status that was rejected
        to: TestStatus,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    /// Create a setup error for a path
    #[must_use]
    pub fn setup(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Setup {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a capture error
    #[must_use]
    pub fn capture(message: impl ToString) -> Self {
        Self::Capture {
            message: message.to_string(),
        }
    }
}
