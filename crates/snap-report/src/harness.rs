//! Concurrent test harness.
//!
//! Runs test classes in parallel, one worker thread per class, and drives a
//! [`ReportListener`] with the lifecycle signals a test runner would emit.
//!
//! ```text
//!            TestHarness::run
//!                  │ on_start
//!     ┌────────────┼────────────┐
//!     ▼            ▼            ▼
//!  [LoginTest]  [CartTest]  [SearchTest]     one named thread each
//!   method 1     method 1     method 1       sequential within a class
//!   method 2     method 2       ...
//!     └────────────┼────────────┘
//!                  │ join
//!                  ▼ on_finish (single flush)
//! ```

use crate::capture::BrowserSession;
use crate::config::ReportConfig;
use crate::diagnostics::{Failure, StackFrame};
use crate::entry::TestStatus;
use crate::listener::ReportListener;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Why a test method stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// The test failed
    Failed(Failure),
    /// The test was skipped, with a reason
    Skipped(String),
}

impl Interrupt {
    /// Fail with a message and the current call stack
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Failed(Failure::capture(message))
    }

    /// Skip with a reason
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

impl From<Failure> for Interrupt {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}

/// Body of a test method
pub type TestFn = Box<dyn Fn(&ReportListener) -> Result<(), Interrupt> + Send + Sync>;

/// Opens the browser session a worker uses for all of its methods
pub type SessionFactory = Box<dyn Fn() -> Arc<dyn BrowserSession> + Send + Sync>;

/// A single test method
pub struct TestMethod {
    /// Method name
    pub name: String,
    body: TestFn,
}

impl TestMethod {
    /// Create a test method
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&ReportListener) -> Result<(), Interrupt> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod").field("name", &self.name).finish()
    }
}

/// A group of test methods run in order on one worker
pub struct TestClass {
    /// Class name, also the worker thread's name
    pub name: String,
    /// Methods in declaration order
    pub methods: Vec<TestMethod>,
    session: Option<SessionFactory>,
}

impl TestClass {
    /// Create an empty test class
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            session: None,
        }
    }

    /// Add a test method
    #[must_use]
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&ReportListener) -> Result<(), Interrupt> + Send + Sync + 'static,
    ) -> Self {
        self.methods.push(TestMethod::new(name, body));
        self
    }

    /// Open a browser session for this class's worker before its first method
    #[must_use]
    pub fn with_session(
        mut self,
        factory: impl Fn() -> Arc<dyn BrowserSession> + Send + Sync + 'static,
    ) -> Self {
        self.session = Some(Box::new(factory));
        self
    }

    /// Get the number of methods
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl fmt::Debug for TestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("session", &self.session.is_some())
            .finish()
    }
}

/// Result of running a single test method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodOutcome {
    /// Report entry name, `Class::method`
    pub name: String,
    /// Final status
    pub status: TestStatus,
    /// Wall-clock duration
    pub duration: Duration,
}

/// Results from a harness run
#[derive(Debug, Clone, Default)]
pub struct SuiteResults {
    /// Individual method outcomes, grouped by class in class order
    pub results: Vec<MethodOutcome>,
    /// Total duration
    pub duration: Duration,
    /// Written report, if the report could be created
    pub report: Option<PathBuf>,
}

impl SuiteResults {
    /// Check if no test failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failed())
    }

    /// Count tests with a given status
    #[must_use]
    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&MethodOutcome> {
        self.results.iter().filter(|r| r.status.is_failed()).collect()
    }
}

/// Runs test classes and reports them
#[derive(Debug)]
pub struct TestHarness {
    listener: ReportListener,
}

impl TestHarness {
    /// Create a harness reporting with the given configuration
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        Self {
            listener: ReportListener::new(config),
        }
    }

    /// The listener receiving this harness's signals
    #[must_use]
    pub const fn listener(&self) -> &ReportListener {
        &self.listener
    }

    /// Run every class, one worker thread per class, then flush the report once
    #[must_use]
    pub fn run(&self, classes: &[TestClass]) -> SuiteResults {
        let start = Instant::now();
        self.listener.on_start();

        let mut per_class: Vec<Vec<MethodOutcome>> = vec![Vec::new(); classes.len()];
        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(classes.len());
            for (index, class) in classes.iter().enumerate() {
                let spawned = thread::Builder::new()
                    .name(class.name.clone())
                    .spawn_scoped(scope, move || self.run_class(class));
                match spawned {
                    Ok(worker) => workers.push((index, worker)),
                    Err(e) => {
                        tracing::warn!(
                            "Could not start worker for {}: {e}; running inline",
                            class.name
                        );
                        per_class[index] = self.run_class(class);
                    }
                }
            }
            for (index, worker) in workers {
                match worker.join() {
                    Ok(outcomes) => per_class[index] = outcomes,
                    Err(_) => tracing::error!("A worker thread panicked outside a test method"),
                }
            }
        });

        let report = self.listener.on_finish();
        SuiteResults {
            results: per_class.into_iter().flatten().collect(),
            duration: start.elapsed(),
            report,
        }
    }

    fn run_class(&self, class: &TestClass) -> Vec<MethodOutcome> {
        if let Some(open) = &class.session {
            self.listener.bind_session(open());
        }
        let outcomes = class
            .methods
            .iter()
            .map(|method| self.run_method(&class.name, method))
            .collect();
        self.listener.release_session();
        outcomes
    }

    fn run_method(&self, class: &str, method: &TestMethod) -> MethodOutcome {
        let start = Instant::now();
        let handle = self.listener.on_test_start(class, &method.name);

        let result = panic::catch_unwind(AssertUnwindSafe(|| (method.body)(&self.listener)))
            .unwrap_or_else(|payload| {
                let frames = vec![StackFrame::new(class, method.name.as_str())];
                Err(Interrupt::Failed(Failure::from_panic(&*payload, frames)))
            });

        match result {
            Ok(()) => self.listener.on_test_success(&method.name),
            Err(Interrupt::Failed(failure)) => {
                self.listener.on_test_failure(class, &method.name, &failure);
            }
            Err(Interrupt::Skipped(reason)) => {
                self.listener.on_test_skipped(&method.name, Some(&reason));
            }
        }

        MethodOutcome {
            name: handle.name(),
            status: handle.status(),
            duration: start.elapsed(),
        }
    }
}
