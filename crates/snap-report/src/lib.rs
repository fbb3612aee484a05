//! snap-report: execution reporting for browser UI test suites
//!
//! Collects what each test did (ordered log lines, screenshots, failure
//! diagnostics) while many tests run in parallel, and writes one HTML report
//! for the whole run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        snap-report pipeline                         │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  worker threads                         shared                      │
//! │  ┌──────────────┐   bind    ┌──────────────────┐                    │
//! │  │ TestHarness  │──────────►│ ContextRegistry  │ (per-worker slot)  │
//! │  │ or runner    │           └────────┬─────────┘                    │
//! │  └──────┬───────┘                    │ current()                    │
//! │         │ signals                    ▼                              │
//! │  ┌──────▼───────┐  create  ┌──────────────────┐  flush  ┌─────────┐ │
//! │  │ReportListener│─────────►│   SuiteReport    │────────►│  .html  │ │
//! │  └──────┬───────┘          │  [TestEntry...]  │         │  .json  │ │
//! │         │ failure          └──────────────────┘         └─────────┘ │
//! │  ┌──────▼───────────┐   ┌────────────────────┐                      │
//! │  │ FailureDiagnosis │   │ ScreenshotCapture  │──► Screenshot_*.png  │
//! │  └──────────────────┘   └────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use snap_report::prelude::*;
//!
//! let harness = TestHarness::new(ReportConfig::new().with_application("Nexus"));
//! let login = TestClass::new("LoginTest").with_method("tc_login", |report| {
//!     report.log_step("Opened login page");
//!     Err(Failure::new("password field not visible").into())
//! });
//! let results = harness.run(&[login]);
//! assert_eq!(results.count(TestStatus::Failed), 1);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod capture;
mod config;
mod diagnostics;
mod entry;
mod folders;
mod harness;
mod listener;
mod registry;
mod render;
mod result;
mod suite;

/// Console logging setup
pub mod logging;

pub use capture::{
    BrowserSession, CapturedScreenshot, MockSession, ScreenshotCapture, FILE_STAMP_FORMAT,
};
pub use config::{keys, ConfigSource, ReportConfig};
pub use diagnostics::{disclosure, Failure, FailureDiagnosis, StackFrame, LINE_BREAK};
pub use entry::{
    Attachment, LogLevel, LogRecord, TestEntry, TestHandle, TestStatus, WeakTestHandle,
};
pub use folders::{clear_except, create_unique, prepare_dir};
pub use harness::{
    Interrupt, MethodOutcome, SessionFactory, SuiteResults, TestClass, TestFn, TestHarness,
    TestMethod,
};
pub use listener::ReportListener;
pub use registry::{ContextRegistry, WorkerId};
pub use render::{escape_html, render_html, render_json, SuiteSnapshot, DISPLAY_TIME_FORMAT};
pub use result::{ReportError, ReportResult};
pub use suite::{format_execution_time, SuiteReport, SuiteReportManager, TOTAL_TIME_KEY};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::capture::*;
    pub use super::config::*;
    pub use super::diagnostics::*;
    pub use super::entry::*;
    pub use super::harness::*;
    pub use super::listener::*;
    pub use super::logging::{init as init_logging, Verbosity};
    pub use super::registry::*;
    pub use super::result::*;
    pub use super::suite::*;
}
