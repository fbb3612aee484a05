//! Concurrency tests: many workers logging into one suite at the same time.

use snap_report::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn config(dir: &TempDir) -> ReportConfig {
    ReportConfig::new()
        .with_report_dir(dir.path().join("Reports"))
        .with_screenshot_dir(dir.path().join("Screenshots"))
}

// ============================================================================
// Listener shared across raw threads
// ============================================================================

#[test]
fn interleaved_workers_never_cross_log() {
    const WORKERS: usize = 8;
    const STEPS: usize = 25;

    let dir = TempDir::new().unwrap();
    let listener = ReportListener::new(config(&dir));
    let suite = listener.on_start().unwrap();
    let barrier = Barrier::new(WORKERS);

    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let (listener, barrier) = (&listener, &barrier);
            thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn_scoped(scope, move || {
                    listener.on_test_start("Parallel", &format!("t{worker}"));
                    barrier.wait();
                    for step in 0..STEPS {
                        assert!(listener.log_step(&format!("w{worker} step {step}")));
                    }
                    listener.on_test_success(&format!("t{worker}"));
                })
                .unwrap();
        }
    });

    assert_eq!(suite.tests().len(), WORKERS);
    for test in suite.tests() {
        let entry = test.snapshot();
        let worker = entry.name.trim_start_matches("Parallel::t");
        let prefix = format!("w{worker} ");
        let steps: Vec<_> = entry
            .records
            .iter()
            .filter(|r| r.level == LogLevel::Info && r.message.starts_with('w'))
            .collect();
        assert_eq!(steps.len(), STEPS);
        assert!(steps.iter().all(|r| r.message.starts_with(&prefix)));
        assert_eq!(entry.worker.as_str(), format!("worker-{worker}"));
        assert_eq!(entry.status, TestStatus::Passed);
    }
    assert_eq!(suite.count(TestStatus::Passed), WORKERS);
}

#[test]
fn each_worker_uses_its_own_session() {
    let dir = TempDir::new().unwrap();
    let listener = ReportListener::new(config(&dir));
    listener.on_start().unwrap();
    let sessions: Vec<Arc<MockSession>> = (0..4).map(|_| Arc::new(MockSession::new())).collect();

    thread::scope(|scope| {
        for (i, session) in sessions.iter().enumerate() {
            let listener = &listener;
            let session = Arc::clone(session);
            scope.spawn(move || {
                listener.bind_session(session);
                listener.on_test_start("Shots", &format!("t{i}"));
                listener.on_test_failure("Shots", &format!("t{i}"), &Failure::new("broken"));
                listener.release_session();
            });
        }
    });

    assert!(sessions.iter().all(|s| s.captures() == 1));
}

// ============================================================================
// Harness
// ============================================================================

#[test]
fn harness_reports_every_class() {
    let dir = TempDir::new().unwrap();
    let classes: Vec<TestClass> = (0..6)
        .map(|i| {
            TestClass::new(format!("Class{i}"))
                .with_session(|| Arc::new(MockSession::new()) as Arc<dyn BrowserSession>)
                .with_method("opens", |report| {
                    report.log_step("Opened page");
                    Ok(())
                })
                .with_method("checks", move |report| {
                    report.log_screenshot_step(LogLevel::Info, "Checked header");
                    if i % 2 == 0 {
                        Ok(())
                    } else {
                        Err(Failure::new(format!("header missing on Class{i}")).into())
                    }
                })
        })
        .collect();

    let harness = TestHarness::new(config(&dir));
    let results = harness.run(&classes);

    assert_eq!(results.total(), 12);
    assert_eq!(results.count(TestStatus::Passed), 9);
    assert_eq!(results.count(TestStatus::Failed), 3);

    let html = std::fs::read_to_string(results.report.unwrap()).unwrap();
    for i in 0..6 {
        assert!(html.contains(&format!("Class{i}::opens")));
    }
    assert!(html.contains("header missing on Class1"));
    assert_eq!(
        harness.listener().manager().suite().unwrap().flush_count(),
        1
    );
}
