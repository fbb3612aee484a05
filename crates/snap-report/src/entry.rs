//! Report Entry Model
//!
//! A [`TestEntry`] is the per-test section of the execution report: an ordered
//! log of timestamped, leveled records plus a final status.
//!
//! ```text
//!            test-start
//!               │
//!               ▼
//!          ┌─────────┐   success   ┌────────┐
//!          │ Pending │────────────►│ Passed │
//!          └─────────┘             └────────┘
//!            │     │    failure    ┌────────┐
//!            │     └──────────────►│ Failed │
//!            │          skip       └────────┘
//!            │                     ┌─────────┐
//!            └────────────────────►│ Skipped │
//!                                  └─────────┘
//! ```
//!
//! Terminal states never transition again; a second terminal signal is
//! rejected with [`ReportError::InvalidTransition`].

use crate::registry::WorkerId;
use crate::render::escape_html;
use crate::result::{ReportError, ReportResult};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    /// Informational step
    Info,
    /// Passing check or test
    Pass,
    /// Failing check or test
    Fail,
    /// Skipped test
    Skip,
    /// Infrastructure problem that was absorbed (capture failed, etc.)
    Warning,
}

impl LogLevel {
    /// Label shown in the report
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Warning => "WARNING",
        }
    }
}

/// Something embedded alongside a log message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Attachment {
    /// Raster image, embedded inline as base64
    Image {
        /// MIME type (e.g. `image/png`)
        mime_type: String,
        /// Base64-encoded image bytes
        base64: String,
        /// Copy saved on disk, if any
        path: Option<PathBuf>,
    },
    /// Plain text, escaped when rendered
    Text(String),
    /// HTML fragment, rendered as-is
    Html(String),
}

impl Attachment {
    /// Create a PNG attachment from base64 data
    #[must_use]
    pub fn png(base64: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Image {
            mime_type: "image/png".to_string(),
            base64: base64.into(),
            path,
        }
    }

    /// Check if the attachment is an image
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// A single line in a test's log. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    /// When the record was written
    pub timestamp: DateTime<Local>,
    /// Severity
    pub level: LogLevel,
    /// Message markup (already HTML-safe)
    pub message: String,
    /// Optional attachment
    pub attachment: Option<Attachment>,
}

impl LogRecord {
    /// Create a record from plain text, escaping it for the report
    #[must_use]
    pub fn text(level: LogLevel, text: &str) -> Self {
        Self::markup(level, escape_html(text))
    }

    /// Create a record from markup that is already HTML-safe
    #[must_use]
    pub fn markup(level: LogLevel, markup: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: markup.into(),
            attachment: None,
        }
    }

    /// Attach an image, text or HTML fragment
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Test status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    /// Test started, no outcome yet
    Pending,
    /// Test passed
    Passed,
    /// Test failed
    Failed,
    /// Test was skipped
    Skipped,
}

impl TestStatus {
    /// Check if status is terminal
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if status is skipped
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Per-test report record
#[derive(Debug, Clone, Serialize)]
pub struct TestEntry {
    /// Test name, usually `<class>::<method>`
    pub name: String,
    /// Worker that created the entry
    pub worker: WorkerId,
    /// Current status
    pub status: TestStatus,
    /// Ordered log records
    pub records: Vec<LogRecord>,
    /// When the entry was created
    pub started_at: DateTime<Local>,
    /// When a terminal status was recorded
    pub finished_at: Option<DateTime<Local>>,
}

impl TestEntry {
    /// Create a pending entry
    #[must_use]
    pub fn new(name: impl Into<String>, worker: WorkerId) -> Self {
        Self {
            name: name.into(),
            worker,
            status: TestStatus::Pending,
            records: Vec::new(),
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// Composite identity: owning worker plus test name
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.worker, self.name)
    }

    /// Append a record
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    /// Move from `Pending` to a terminal status
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidTransition`] if the entry already finished
    /// or `status` is `Pending`. The recorded status is left untouched.
    pub fn finish(&mut self, status: TestStatus) -> ReportResult<()> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(ReportError::InvalidTransition {
                test: self.name.clone(),
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.finished_at = Some(Local::now());
        Ok(())
    }
}

/// Shared handle to a [`TestEntry`].
///
/// The suite keeps the strong reference; the execution context registry only
/// ever holds a [`WeakTestHandle`].
#[derive(Debug, Clone)]
pub struct TestHandle {
    inner: Arc<Mutex<TestEntry>>,
}

impl TestHandle {
    /// Create a handle that belongs to no suite (console-only reporting)
    #[must_use]
    pub fn detached(name: impl Into<String>, worker: WorkerId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TestEntry::new(name, worker))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TestEntry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Test name
    #[must_use]
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> TestStatus {
        self.lock().status
    }

    /// Copy of the records logged so far
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().records.clone()
    }

    /// Copy of the whole entry
    #[must_use]
    pub fn snapshot(&self) -> TestEntry {
        self.lock().clone()
    }

    /// Log plain text
    pub fn log(&self, level: LogLevel, text: &str) {
        self.record(LogRecord::text(level, text));
    }

    /// Log an already-built record
    pub fn record(&self, record: LogRecord) {
        self.lock().push(record);
    }

    /// Record a terminal status
    ///
    /// # Errors
    ///
    /// See [`TestEntry::finish`].
    pub fn finish(&self, status: TestStatus) -> ReportResult<()> {
        self.lock().finish(status)
    }

    /// Check if two handles point at the same entry
    #[must_use]
    pub fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lookup-only reference that does not keep the entry alive
    #[must_use]
    pub fn downgrade(&self) -> WeakTestHandle {
        WeakTestHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning reference to a [`TestEntry`]
#[derive(Debug, Clone)]
pub struct WeakTestHandle {
    inner: Weak<Mutex<TestEntry>>,
}

impl WeakTestHandle {
    /// Get the entry back if its owner still holds it
    #[must_use]
    pub fn upgrade(&self) -> Option<TestHandle> {
        self.inner.upgrade().map(|inner| TestHandle { inner })
    }
}
