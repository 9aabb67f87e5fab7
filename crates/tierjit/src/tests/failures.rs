//! Compile failures stay inside the coordinator.

use std::sync::Arc;

use super::test_helpers::{
    FailingCompiler, PanickingCompiler, PanickingReporter, RecordingReporter,
    dispatcher_with_reporter,
};
use crate::config::TieringConfig;
use crate::coordinator::RequestOutcome;
use crate::types::{CompileMode, MethodId, Tier};

#[test]
fn always_failing_compiler_keeps_method_interpreted() {
    let compiler = Arc::new(FailingCompiler::default());
    let reporter = Arc::new(RecordingReporter::default());
    let dispatcher = dispatcher_with_reporter(
        TieringConfig::default(),
        Arc::clone(&compiler),
        Arc::clone(&reporter),
    );
    let method = MethodId(1);

    for _ in 0..11_000 {
        let result = dispatcher.execute_method(method);
        assert_eq!(result.method, method);
        assert_eq!(result.tier, Tier::Interpreted);
    }

    assert_eq!(dispatcher.state().cache.tier_of(method), Tier::Interpreted);
    // Every call past the T1 threshold retries after the previous failure.
    assert_eq!(compiler.attempts(), 6_000);
    assert_eq!(reporter.len(), 6_000);
    assert_eq!(dispatcher.state().metrics.snapshot().compilation_failures, 6_000);
    assert!(!dispatcher.state().coordinator().is_in_flight(method));

    let failures = reporter.failures();
    assert_eq!(failures.first().map(|f| f.1), Some(Tier::T1));
    assert_eq!(failures.last().map(|f| f.1), Some(Tier::T2));
    assert!(failures.iter().all(|f| f.0 == method));
    assert!(failures[0].2.contains("compilation failed"));
}

#[test]
fn panicking_compiler_is_contained() {
    let compiler = Arc::new(PanickingCompiler::default());
    let reporter = Arc::new(RecordingReporter::default());
    let config = TieringConfig::default().with_thresholds(1, 3);
    let dispatcher = dispatcher_with_reporter(config, Arc::clone(&compiler), Arc::clone(&reporter));
    let method = MethodId(2);

    for _ in 0..10 {
        assert_eq!(dispatcher.execute_method(method).tier, Tier::Interpreted);
    }

    // The single worker survived every panic and kept taking jobs.
    assert_eq!(compiler.attempts(), 9);
    assert_eq!(reporter.len(), 9);
    assert!(
        reporter
            .failures()
            .iter()
            .all(|(_, _, error)| error.contains("code generator crashed on m#2"))
    );
}

#[test]
fn non_blocking_failures_never_reach_callers() {
    let compiler = Arc::new(FailingCompiler::default());
    let reporter = Arc::new(RecordingReporter::default());
    let config = TieringConfig::default()
        .with_mode(CompileMode::NonBlocking)
        .with_workers(2)
        .with_thresholds(5, 10);
    let dispatcher = dispatcher_with_reporter(config, Arc::clone(&compiler), Arc::clone(&reporter));

    for call in 0..2_000u64 {
        let method = MethodId(call % 3);
        assert_eq!(dispatcher.execute_method(method).tier, Tier::Interpreted);
    }

    assert!(dispatcher.state().cache.is_empty());
    assert!(compiler.attempts() > 0);
}

#[test]
fn panicking_reporter_does_not_stop_compiles() {
    let compiler = Arc::new(FailingCompiler::default());
    let reporter = Arc::new(PanickingReporter::default());
    let config = TieringConfig::default().with_thresholds(1, 3);
    let dispatcher = dispatcher_with_reporter(config, Arc::clone(&compiler), Arc::clone(&reporter));
    let method = MethodId(3);

    dispatcher.execute_method(method);
    assert_eq!(dispatcher.execute_method(method).tier, Tier::Interpreted);
    assert_eq!(reporter.calls(), 1);

    // The only worker must still accept jobs after its reporter panicked.
    let outcome = dispatcher
        .state()
        .coordinator()
        .request(MethodId(4), Tier::T1, CompileMode::Blocking);
    assert!(matches!(outcome, RequestOutcome::Submitted(_)));
    assert_eq!(compiler.attempts(), 2);

    for _ in 0..5 {
        assert_eq!(dispatcher.execute_method(method).tier, Tier::Interpreted);
    }
    assert_eq!(compiler.attempts(), 7);
    assert_eq!(reporter.calls(), 7);
}
