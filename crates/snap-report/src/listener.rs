//! Lifecycle listener
//!
//! Maps the test runner's lifecycle signals onto the reporting core, and gives
//! page objects and other glue a way to log against whatever test is running
//! on their worker.
//!
//! ```text
//!  runner signal            listener                          core
//!  ─────────────            ────────                          ────
//!  suite-start      ──►  on_start          ──►  SuiteReportManager::get_or_create_suite
//!  test-start       ──►  on_test_start     ──►  SuiteReport::create_test + ContextRegistry::bind
//!  (glue)           ──►  log_step / observe──►  ContextRegistry::current ─► TestHandle::log
//!  test-failure     ──►  on_test_failure   ──►  FailureDiagnosis + ScreenshotCapture
//!  test-success/skip──►  on_test_*         ──►  TestHandle::finish + ContextRegistry::clear
//!  suite-finish     ──►  on_finish         ──►  SuiteReport::flush
//! ```
//!
//! Nothing here returns a reporting error to the caller. Problems are logged
//! and the test carries on with its own outcome.
//!
//! Without an open report a started test is console-only. The listener keeps
//! such an entry alive itself until its terminal signal, since no suite owns it.

use crate::capture::{BrowserSession, ScreenshotCapture};
use crate::config::ReportConfig;
use crate::diagnostics::{Failure, FailureDiagnosis};
use crate::entry::{Attachment, LogLevel, LogRecord, TestHandle, TestStatus};
use crate::folders;
use crate::registry::{ContextRegistry, WorkerId};
use crate::suite::{SuiteReport, SuiteReportManager};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives lifecycle signals and writes them into the execution report
#[derive(Debug)]
pub struct ReportListener {
    manager: SuiteReportManager,
    registry: ContextRegistry,
    capture: ScreenshotCapture,
    detached: Mutex<Vec<TestHandle>>,
}

impl ReportListener {
    /// Create a listener for a configuration
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        let capture = ScreenshotCapture::new(config.screenshot_dir.clone());
        Self {
            manager: SuiteReportManager::new(config),
            registry: ContextRegistry::new(),
            capture,
            detached: Mutex::new(Vec::new()),
        }
    }

    /// The suite manager
    #[must_use]
    pub const fn manager(&self) -> &SuiteReportManager {
        &self.manager
    }

    /// The execution context registry
    #[must_use]
    pub const fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Suite signals
    // ------------------------------------------------------------------

    /// Suite started: prepare directories and open the report
    pub fn on_start(&self) -> Option<Arc<SuiteReport>> {
        self.prepare_dirs();
        let suite = self.manager.get_or_create_suite();
        if suite.is_some() {
            tracing::info!("Report initialized.");
        } else {
            tracing::warn!("Continuing with console-only reporting");
        }
        suite
    }

    /// Suite started, writing the report into `dir` instead of the configured
    /// directory
    pub fn on_start_in(&self, dir: &Path) -> Option<Arc<SuiteReport>> {
        self.prepare_dirs();
        let suite = self.manager.create_suite(dir);
        if suite.is_some() {
            tracing::info!("Report initialized.");
        }
        suite
    }

    fn prepare_dirs(&self) {
        let config = self.manager.config();
        if !config.prepare_dirs {
            return;
        }
        for dir in [&config.report_dir, &config.screenshot_dir] {
            if let Err(e) = folders::prepare_dir(dir) {
                tracing::warn!("{e}");
            }
        }
    }

    /// Suite finished: flush the report. Returns the artifact path on success.
    pub fn on_finish(&self) -> Option<PathBuf> {
        if !self.manager.flush() {
            return None;
        }
        let path = self.manager.suite().map(|s| s.path().to_path_buf());
        if let Some(path) = &path {
            tracing::info!("Execution report flushed: {}", path.display());
        }
        path
    }

    // ------------------------------------------------------------------
    // Test signals
    // ------------------------------------------------------------------

    /// Test started: create its entry and bind it to this worker
    pub fn on_test_start(&self, class: &str, method: &str) -> TestHandle {
        self.start_test(&format!("{class}::{method}"))
    }

    /// Create an entry named `name` and bind it to this worker
    ///
    /// With no report open the entry is console-only and held by the listener
    /// until the test's terminal signal or [`ReportListener::end_test`], so the
    /// returned handle may be dropped either way.
    pub fn start_test(&self, name: &str) -> TestHandle {
        let handle = match self.manager.suite() {
            Some(suite) => suite.create_test(name),
            None => {
                tracing::warn!(
                    "No execution report open; '{name}' is logged to the console only"
                );
                let handle = TestHandle::detached(name, WorkerId::current());
                self.lock_detached().push(handle.clone());
                handle
            }
        };
        self.registry.bind(&handle);
        handle.log(
            LogLevel::Info,
            &format!("Test case '{name}' execution started."),
        );
        tracing::info!("Execution of '{name}' test has started.");
        handle
    }

    /// Test passed
    pub fn on_test_success(&self, method: &str) {
        let text = format!("Test case '{method}' execution passed.");
        tracing::info!("{text}");
        self.finish(TestStatus::Passed, LogRecord::text(LogLevel::Pass, &text));
    }

    /// Test skipped
    pub fn on_test_skipped(&self, method: &str, reason: Option<&str>) {
        let text = match reason {
            Some(reason) => format!("Test case '{method}' execution skipped: {reason}"),
            None => format!("Test case '{method}' execution skipped."),
        };
        tracing::info!("{text}");
        self.finish(TestStatus::Skipped, LogRecord::text(LogLevel::Skip, &text));
    }

    /// Test failed: record diagnostics and a screenshot, then mark it failed
    pub fn on_test_failure(&self, class: &str, method: &str, failure: &Failure) {
        let diagnosis = FailureDiagnosis::extract(failure, class);
        let message = diagnosis.message(method, class);
        tracing::error!(
            "Test '{method}' in class '{class}' failed at {}: {failure}",
            diagnosis.failing_frame.as_deref().unwrap_or_default()
        );

        self.log_screenshot_record(LogRecord::markup(LogLevel::Fail, message));

        let mut trace = failure.to_string();
        for frame in &failure.frames {
            trace.push_str(&format!("\n    at {frame}"));
        }
        self.finish(
            TestStatus::Failed,
            LogRecord::markup(LogLevel::Fail, "Failure trace")
                .with_attachment(Attachment::Text(trace)),
        );
    }

    fn finish(&self, status: TestStatus, record: LogRecord) {
        let handle = match self.registry.current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("{e}; {status:?} signal not recorded");
                return;
            }
        };
        match handle.finish(status) {
            Ok(()) => handle.record(record),
            Err(e) => tracing::warn!("{e}"),
        }
        self.unbind(&handle);
    }

    /// Close the current test from glue code, logging that it ended
    pub fn end_test(&self) {
        match self.registry.current() {
            Ok(handle) => {
                handle.log(LogLevel::Info, "Test case execution ended.");
                tracing::info!("Execution of test case ended.");
                self.unbind(&handle);
            }
            Err(_) => self.registry.clear(),
        }
    }

    fn lock_detached(&self) -> MutexGuard<'_, Vec<TestHandle>> {
        self.detached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unbind(&self, handle: &TestHandle) {
        self.registry.clear();
        self.lock_detached().retain(|held| !held.same_entry(handle));
    }

    /// Number of console-only entries still held for a terminal signal
    #[must_use]
    pub fn detached_count(&self) -> usize {
        self.lock_detached().len()
    }

    // ------------------------------------------------------------------
    // Browser session
    // ------------------------------------------------------------------

    /// Bind this worker's browser session for screenshots
    pub fn bind_session(&self, session: Arc<dyn BrowserSession>) {
        self.registry.bind_session(session);
    }

    /// Forget this worker's browser session and any bound entry
    pub fn release_session(&self) {
        if let Ok(handle) = self.registry.current() {
            self.lock_detached().retain(|held| !held.same_entry(&handle));
        }
        self.registry.clear_all();
    }

    // ------------------------------------------------------------------
    // Logging from glue code
    // ------------------------------------------------------------------

    /// Log an informational step
    pub fn log_step(&self, text: &str) -> bool {
        self.log_step_with(LogLevel::Info, text)
    }

    /// Log a step at a given level. Returns `false` if no test is bound.
    pub fn log_step_with(&self, level: LogLevel, text: &str) -> bool {
        self.log_record(LogRecord::text(level, text))
    }

    /// Log a step with an inline text or HTML attachment
    pub fn attach(&self, level: LogLevel, text: &str, attachment: Attachment) -> bool {
        self.log_record(LogRecord::text(level, text).with_attachment(attachment))
    }

    fn log_record(&self, record: LogRecord) -> bool {
        match self.registry.current() {
            Ok(handle) => {
                tracing::info!("{}", record.message);
                handle.record(record);
                true
            }
            Err(e) => {
                tracing::warn!("{e}; dropping '{}'", record.message);
                false
            }
        }
    }

    /// Log a step followed by a screenshot of the worker's browser
    pub fn log_screenshot_step(&self, level: LogLevel, text: &str) -> bool {
        self.log_screenshot_record(LogRecord::text(level, text))
    }

    fn log_screenshot_record(&self, record: LogRecord) -> bool {
        let handle = match self.registry.current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("{e}; dropping '{}'", record.message);
                return false;
            }
        };
        tracing::info!("{}", record.message);
        handle.record(record);

        let shot = match self.registry.session() {
            Some(session) => self.capture.capture(session.as_ref()),
            None => Err(crate::result::ReportError::capture(
                "no browser session bound to this worker",
            )),
        };
        match shot {
            Ok(shot) => handle.record(
                LogRecord::text(LogLevel::Info, "Screenshot:").with_attachment(shot.attachment()),
            ),
            Err(e) => {
                tracing::warn!("{e}");
                handle.log(LogLevel::Warning, &e.to_string());
            }
        }
        true
    }

    /// Log the outcome of a browser interaction and hand its result back.
    ///
    /// `Ok` logs `step` as a passing line. `Err` logs a failure line naming the
    /// step and the error, then returns the same error untouched.
    pub fn observe<T, E: Display>(&self, step: &str, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                self.log_step_with(LogLevel::Pass, step);
            }
            Err(e) => {
                self.log_step_with(
                    LogLevel::Fail,
                    &format!("An error occurred while '{step}': {e}"),
                );
            }
        }
        result
    }
}
