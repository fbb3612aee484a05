//! Execution Context Registry
//!
//! Maps the test currently running on a worker to its report entry and its
//! browser session.
//!
//! A worker is a thread. Each [`ContextRegistry`] keeps its contexts in
//! thread-local storage, so a `bind`/`current`/`clear` sequence on one worker
//! is invisible to every other worker and needs no lock. The storage is private
//! to this module; the only way in is through a registry handle.
//!
//! The registry never owns an entry. It holds a weak reference, and an entry
//! dropped by its suite reads back as unbound.
//!
//! Reads never create a slot. A slot lives until its worker calls
//! [`ContextRegistry::clear_all`] or the worker thread exits; dropping the
//! registry only reclaims the slot of the thread that drops it.

use crate::capture::BrowserSession;
use crate::entry::{TestHandle, WeakTestHandle};
use crate::result::{ReportError, ReportResult};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONTEXTS: RefCell<HashMap<u64, ExecutionContext>> = RefCell::new(HashMap::new());
}

/// Name of a concurrent worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a worker id from a name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Id of the calling thread: its name if it has one, otherwise its thread id
    #[must_use]
    pub fn current() -> Self {
        let thread = std::thread::current();
        match thread.name() {
            Some(name) => Self::new(name),
            None => Self(format!("{:?}", thread.id())),
        }
    }

    /// Borrow the id as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a single worker is currently doing
#[derive(Clone, Default)]
struct ExecutionContext {
    entry: Option<WeakTestHandle>,
    session: Option<Arc<dyn BrowserSession>>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("entry", &self.entry.as_ref().and_then(WeakTestHandle::upgrade))
            .field("session", &self.session.is_some())
            .finish()
    }
}

/// Per-worker association of test entries and browser sessions
///
/// Long-lived worker pools should call [`ContextRegistry::clear_all`] on each
/// worker thread when it is done with the registry.
#[derive(Debug)]
pub struct ContextRegistry {
    id: u64,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn with_context<R>(&self, f: impl FnOnce(&mut ExecutionContext) -> R) -> R {
        CONTEXTS.with(|contexts| {
            let mut contexts = contexts.borrow_mut();
            f(contexts.entry(self.id).or_default())
        })
    }

    fn read_context<R>(&self, f: impl FnOnce(&ExecutionContext) -> Option<R>) -> Option<R> {
        CONTEXTS.with(|contexts| contexts.borrow().get(&self.id).and_then(f))
    }

    /// Bind an entry to the calling worker, replacing any previous binding
    pub fn bind(&self, entry: &TestHandle) {
        let weak = entry.downgrade();
        self.with_context(|ctx| ctx.entry = Some(weak));
    }

    /// Bind a browser session to the calling worker
    pub fn bind_session(&self, session: Arc<dyn BrowserSession>) {
        self.with_context(|ctx| ctx.session = Some(session));
    }

    /// Entry bound to the calling worker
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnboundContext`] if nothing is bound, or the bound
    /// entry no longer exists.
    pub fn current(&self) -> ReportResult<TestHandle> {
        self.read_context(|ctx| ctx.entry.as_ref().and_then(WeakTestHandle::upgrade))
            .ok_or_else(|| ReportError::UnboundContext {
                worker: WorkerId::current().to_string(),
            })
    }

    /// Browser session bound to the calling worker
    #[must_use]
    pub fn session(&self) -> Option<Arc<dyn BrowserSession>> {
        self.read_context(|ctx| ctx.session.clone())
    }

    /// Check if the calling worker has a live entry bound
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.current().is_ok()
    }

    /// Remove the calling worker's entry binding, keeping its session
    pub fn clear(&self) {
        CONTEXTS.with(|contexts| {
            let mut contexts = contexts.borrow_mut();
            let emptied = contexts.get_mut(&self.id).is_some_and(|ctx| {
                ctx.entry = None;
                ctx.session.is_none()
            });
            if emptied {
                contexts.remove(&self.id);
            }
        });
    }

    /// Remove everything bound to the calling worker
    ///
    /// Only the calling worker's slot is reclaimed; every worker that bound
    /// something must call this itself.
    pub fn clear_all(&self) {
        CONTEXTS.with(|contexts| {
            contexts.borrow_mut().remove(&self.id);
        });
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        // Other threads' slots die with their thread-local storage.
        let _ = CONTEXTS.try_with(|contexts| {
            if let Ok(mut contexts) = contexts.try_borrow_mut() {
                contexts.remove(&self.id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockSession;
    use crate::entry::LogLevel;
    use proptest::prelude::*;
    use std::sync::Barrier;

    fn entry(name: &str) -> TestHandle {
        TestHandle::detached(name, WorkerId::current())
    }

    mod worker_id_tests {
        use super::*;

        #[test]
        fn test_named_thread_uses_name() {
            let id = std::thread::Builder::new()
                .name("LoginTest".to_string())
                .spawn(WorkerId::current)
                .unwrap()
                .join()
                .unwrap();
            assert_eq!(id.as_str(), "LoginTest");
        }

        #[test]
        fn test_display() {
            assert_eq!(WorkerId::new("w").to_string(), "w");
        }
    }

    mod binding_tests {
        use super::*;

        #[test]
        fn test_current_before_bind_is_unbound() {
            let registry = ContextRegistry::new();
            let err = registry.current().unwrap_err();
            assert!(matches!(err, ReportError::UnboundContext { .. }));
            assert!(!registry.is_bound());
        }

        #[test]
        fn test_bind_then_current() {
            let registry = ContextRegistry::new();
            let a = entry("a");
            registry.bind(&a);
            assert!(registry.current().unwrap().same_entry(&a));
        }

        #[test]
        fn test_rebind_replaces() {
            let registry = ContextRegistry::new();
            let a = entry("a");
            let b = entry("b");
            registry.bind(&a);
            registry.bind(&b);
            assert!(registry.current().unwrap().same_entry(&b));
        }

        #[test]
        fn test_clear_unbinds() {
            let registry = ContextRegistry::new();
            let a = entry("a");
            registry.bind(&a);
            registry.clear();
            assert!(registry.current().is_err());
        }

        #[test]
        fn test_dropped_entry_reads_as_unbound() {
            let registry = ContextRegistry::new();
            let a = entry("a");
            registry.bind(&a);
            drop(a);
            assert!(registry.current().is_err());
        }

        #[test]
        fn test_registries_are_independent() {
            let first = ContextRegistry::new();
            let second = ContextRegistry::new();
            let a = entry("a");
            first.bind(&a);
            assert!(first.is_bound());
            assert!(!second.is_bound());
        }

        #[test]
        fn test_session_survives_clear_but_not_clear_all() {
            let registry = ContextRegistry::new();
            registry.bind_session(Arc::new(MockSession::new()));
            registry.bind(&entry("a"));
            registry.clear();
            assert!(registry.session().is_some());
            registry.clear_all();
            assert!(registry.session().is_none());
        }

        #[test]
        fn test_reads_do_not_create_slots() {
            let registry = ContextRegistry::new();
            let has_slot = || CONTEXTS.with(|c| c.borrow().contains_key(&registry.id));

            assert!(registry.current().is_err());
            assert!(registry.session().is_none());
            assert!(!registry.is_bound());
            registry.clear();
            assert!(!has_slot());

            registry.bind(&entry("a"));
            assert!(has_slot());
            registry.clear();
            assert!(!has_slot());
        }

        #[test]
        fn test_clear_all_is_per_worker() {
            let registry = ContextRegistry::new();
            let a = entry("a");
            registry.bind(&a);
            std::thread::scope(|scope| {
                scope.spawn(|| registry.clear_all());
            });
            assert!(registry.current().unwrap().same_entry(&a));
        }

        #[test]
        fn test_logging_through_current() {
            let registry = ContextRegistry::new();
            let a = entry("a");
            registry.bind(&a);
            registry.current().unwrap().log(LogLevel::Info, "hello");
            assert_eq!(a.records().len(), 1);
        }
    }

    mod concurrency_tests {
        use super::*;

        #[test]
        fn test_workers_never_see_each_other() {
            const WORKERS: usize = 8;
            let registry = ContextRegistry::new();
            let barrier = Barrier::new(WORKERS);

            std::thread::scope(|scope| {
                for i in 0..WORKERS {
                    let registry = &registry;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let mine = entry(&format!("test-{i}"));
                        registry.bind(&mine);
                        barrier.wait();
                        for _ in 0..200 {
                            let current = registry.current().unwrap();
                            assert!(current.same_entry(&mine));
                            std::thread::yield_now();
                        }
                        registry.clear();
                        assert!(registry.current().is_err());
                    });
                }
            });

            assert!(registry.current().is_err());
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Bind(usize),
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(0usize..4).prop_map(Op::Bind), Just(Op::Clear)]
    }

    proptest! {
        #[test]
        fn prop_current_is_last_bound(ops in prop::collection::vec(op(), 0..40)) {
            let registry = ContextRegistry::new();
            let entries: Vec<_> = (0..4).map(|i| entry(&format!("e{i}"))).collect();
            let mut expected: Option<usize> = None;

            for op in ops {
                match op {
                    Op::Bind(i) => {
                        registry.bind(&entries[i]);
                        expected = Some(i);
                    }
                    Op::Clear => {
                        registry.clear();
                        expected = None;
                    }
                }
                match expected {
                    Some(i) => prop_assert!(registry.current().unwrap().same_entry(&entries[i])),
                    None => prop_assert!(registry.current().is_err()),
                }
            }
        }

        #[test]
        fn prop_parallel_workers_keep_their_binding(workers in 2usize..6, rounds in 1usize..30) {
            let registry = ContextRegistry::new();
            std::thread::scope(|scope| {
                for i in 0..workers {
                    let registry = &registry;
                    scope.spawn(move || {
                        let mine = entry(&format!("w{i}"));
                        for _ in 0..rounds {
                            registry.bind(&mine);
                            std::thread::yield_now();
                            assert!(registry.current().unwrap().same_entry(&mine));
                        }
                    });
                }
            });
        }
    }
}
