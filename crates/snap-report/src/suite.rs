//! Suite Report Manager
//!
//! Owns the lifetime of the execution report artifact: created at suite start,
//! filled with one [`TestEntry`](crate::entry::TestEntry) per test by any
//! number of workers, and flushed at suite end with the total execution time.
//!
//! # Lifecycle
//!
//! ```text
//! SuiteReportManager::create_suite ──► SuiteReport ──create_test──► TestHandle (×N workers)
//!                                          │
//!                                          └──flush──► ExecutionReport_<ddMMyyyy_HHmmss>.html
//! ```
//!
//! The manager is the process-scoped handle. Callers create it once, pass it
//! by reference, and tear it down explicitly; there is no hidden global.

use crate::capture::FILE_STAMP_FORMAT;
use crate::config::ReportConfig;
use crate::entry::{TestHandle, TestStatus};
use crate::folders;
use crate::registry::WorkerId;
use crate::render::{render_html, render_json, SuiteSnapshot};
use crate::result::{ReportError, ReportResult};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Metadata key holding the suite duration
pub const TOTAL_TIME_KEY: &str = "Total Execution Time";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Format a duration as `HH:MM:SS`, with hours wrapping at 24
#[must_use]
pub fn format_execution_time(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    format!(
        "{:02}:{:02}:{:02}",
        (ms / (1000 * 60 * 60)) % 24,
        (ms / (1000 * 60)) % 60,
        (ms / 1000) % 60
    )
}

/// Write through a temporary file so a reader never sees a half-written report
///
/// Callers serialize on [`SuiteReport`]'s flush lock; the temporary file is
/// removed again if either step fails.
fn write_replacing(path: &Path, contents: &str) -> ReportResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let written = std::fs::write(&tmp, contents).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// The aggregate report for one suite run
#[derive(Debug)]
pub struct SuiteReport {
    path: PathBuf,
    title: String,
    json_summary: bool,
    created_at: DateTime<Local>,
    started_at: DateTime<Local>,
    system_info: Mutex<Vec<(String, String)>>,
    tests: Mutex<Vec<TestHandle>>,
    flushes: AtomicUsize,
    flush_lock: Mutex<()>,
}

impl SuiteReport {
    /// Create a report in `dir`
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Setup`] if the directory or artifact cannot be
    /// created.
    pub fn create(dir: &Path, config: &ReportConfig) -> ReportResult<Self> {
        Self::create_at(dir, config, Local::now())
    }

    /// Create a report with an explicit start time
    ///
    /// A placeholder artifact is written immediately, which both reserves the
    /// file name and proves the directory is writable.
    ///
    /// # Errors
    ///
    /// See [`SuiteReport::create`].
    pub fn create_at(
        dir: &Path,
        config: &ReportConfig,
        now: DateTime<Local>,
    ) -> ReportResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| ReportError::setup(dir, e))?;
        let stamp = now.format(FILE_STAMP_FORMAT).to_string();
        let (path, mut file) = folders::create_unique(dir, "ExecutionReport", &stamp, "html")
            .map_err(|e| ReportError::setup(dir, e))?;

        let report = Self {
            path,
            title: config.report_name.clone(),
            json_summary: config.json_summary,
            created_at: now,
            started_at: now,
            system_info: Mutex::new(config.system_info()),
            tests: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
        };

        file.write_all(render_html(&report.snapshot()).as_bytes())
            .map_err(|e| ReportError::setup(&report.path, e))?;
        tracing::info!("Report File Path: {}", report.path.display());
        Ok(report)
    }

    /// Artifact path; also the suite's identity
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the JSON summary, if enabled
    #[must_use]
    pub fn json_path(&self) -> Option<PathBuf> {
        self.json_summary.then(|| self.path.with_extension("json"))
    }

    /// Report title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// When the suite started
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Append a pending test entry owned by the calling worker
    pub fn create_test(&self, name: impl Into<String>) -> TestHandle {
        let handle = TestHandle::detached(name, WorkerId::current());
        lock(&self.tests).push(handle.clone());
        handle
    }

    /// All test entries in creation order
    #[must_use]
    pub fn tests(&self) -> Vec<TestHandle> {
        lock(&self.tests).clone()
    }

    /// Set a metadata row, replacing an existing row with the same key
    pub fn set_system_info(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        let mut info = lock(&self.system_info);
        match info.iter_mut().find(|(k, _)| *k == key) {
            Some(row) => row.1 = value,
            None => info.push((key, value)),
        }
    }

    /// Look up a metadata row
    #[must_use]
    pub fn system_value(&self, key: &str) -> Option<String> {
        lock(&self.system_info)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Count tests with the given status
    #[must_use]
    pub fn count(&self, status: TestStatus) -> usize {
        lock(&self.tests)
            .iter()
            .filter(|t| t.status() == status)
            .count()
    }

    /// Number of times the report has been flushed
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Copy the current state for rendering
    #[must_use]
    pub fn snapshot(&self) -> SuiteSnapshot {
        SuiteSnapshot {
            title: self.title.clone(),
            path: self.path.clone(),
            created_at: self.created_at,
            system_info: lock(&self.system_info).clone(),
            tests: lock(&self.tests).iter().map(TestHandle::snapshot).collect(),
        }
    }

    /// Record the total execution time and persist the report
    ///
    /// # Errors
    ///
    /// Returns error if writing the artifact fails.
    pub fn flush(&self) -> ReportResult<()> {
        self.flush_at(Local::now())
    }

    /// Flush with an explicit end time
    ///
    /// Safe to call more than once, and from several threads at once:
    /// flushes run one at a time, the total time is overwritten and the
    /// artifact replaced whole.
    ///
    /// # Errors
    ///
    /// See [`SuiteReport::flush`].
    pub fn flush_at(&self, now: DateTime<Local>) -> ReportResult<()> {
        let _flushing = lock(&self.flush_lock);
        let elapsed = (now - self.started_at).to_std().unwrap_or_default();
        let total = format_execution_time(elapsed);
        self.set_system_info(TOTAL_TIME_KEY, total.clone());

        let snapshot = self.snapshot();
        write_replacing(&self.path, &render_html(&snapshot))?;
        if let Some(json_path) = self.json_path() {
            write_replacing(&json_path, &render_json(&snapshot)?)?;
        }

        self.flushes.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "{} (total time {total}) flushed to {}",
            snapshot.summary(),
            self.path.display()
        );
        Ok(())
    }
}

/// Process-scoped owner of the live [`SuiteReport`]
#[derive(Debug)]
pub struct SuiteReportManager {
    config: ReportConfig,
    suite: Mutex<Option<Arc<SuiteReport>>>,
}

impl SuiteReportManager {
    /// Create a manager with no live suite
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            suite: Mutex::new(None),
        }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Create a fresh suite in `dir`, replacing any live one.
    ///
    /// Setup failures are logged and yield `None`; callers then fall back to
    /// console-only reporting.
    pub fn create_suite(&self, dir: &Path) -> Option<Arc<SuiteReport>> {
        tracing::info!("Setting up execution report...");
        match SuiteReport::create(dir, &self.config) {
            Ok(suite) => {
                let suite = Arc::new(suite);
                *lock(&self.suite) = Some(Arc::clone(&suite));
                tracing::info!("Execution report setup completed.");
                Some(suite)
            }
            Err(e) => {
                tracing::error!("Error occurred while setting up execution report: {e}");
                None
            }
        }
    }

    /// Live suite, creating one in the configured report directory if needed
    pub fn get_or_create_suite(&self) -> Option<Arc<SuiteReport>> {
        let mut slot = lock(&self.suite);
        if let Some(suite) = slot.as_ref() {
            return Some(Arc::clone(suite));
        }
        match SuiteReport::create(&self.config.report_dir, &self.config) {
            Ok(suite) => {
                let suite = Arc::new(suite);
                *slot = Some(Arc::clone(&suite));
                Some(suite)
            }
            Err(e) => {
                tracing::error!("Error occurred while setting up execution report: {e}");
                None
            }
        }
    }

    /// Live suite, without creating one
    #[must_use]
    pub fn suite(&self) -> Option<Arc<SuiteReport>> {
        lock(&self.suite).clone()
    }

    /// Flush the live suite, if any. Errors are logged.
    pub fn flush(&self) -> bool {
        let Some(suite) = self.suite() else {
            tracing::warn!("No execution report to flush");
            return false;
        };
        match suite.flush() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to write {}: {e}", suite.path().display());
                false
            }
        }
    }

    /// Drop the live suite
    pub fn teardown(&self) -> Option<Arc<SuiteReport>> {
        lock(&self.suite).take()
    }
}
