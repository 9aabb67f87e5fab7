//! Many callers hitting the same hot method at once.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use super::test_helpers::{InstrumentedCompiler, dispatcher, install, wait_for_tier};
use crate::config::TieringConfig;
use crate::dispatch::Dispatcher;
use crate::types::{CompileMode, ExecutionResult, MethodId, Tier};

const CALLERS: usize = 100;

fn storm(dispatcher: &Dispatcher, method: MethodId) -> Vec<ExecutionResult> {
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dispatcher.execute_method(method)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("caller thread panicked"))
        .collect()
}

#[test]
fn blocking_storm_compiles_t2_exactly_once() {
    let compiler = Arc::new(InstrumentedCompiler::with_delay(Duration::from_millis(20)));
    let config = TieringConfig::default().with_workers(4);
    let dispatcher = dispatcher(config, Arc::clone(&compiler));
    let method = MethodId(100);

    install(dispatcher.state(), method, Tier::T1);
    dispatcher.state().counter.warm(method, 10_001);

    let results = storm(&dispatcher, method);

    assert_eq!(compiler.calls(method, Tier::T2), 1);
    assert_eq!(compiler.overlaps(), 0);
    // Every blocking caller either waited on the job or saw its result.
    assert!(results.iter().all(|r| r.tier == Tier::T2));
    assert_eq!(dispatcher.state().metrics.snapshot().compilations, 1);
}

#[test]
fn non_blocking_storm_compiles_t2_exactly_once() {
    let compiler = Arc::new(InstrumentedCompiler::with_delay(Duration::from_millis(20)));
    let config = TieringConfig::default()
        .with_workers(4)
        .with_mode(CompileMode::NonBlocking);
    let dispatcher = dispatcher(config, Arc::clone(&compiler));
    let method = MethodId(101);

    install(dispatcher.state(), method, Tier::T1);
    dispatcher.state().counter.warm(method, 10_001);

    let results = storm(&dispatcher, method);
    assert!(results.iter().all(|r| r.tier >= Tier::T1));
    assert!(wait_for_tier(
        dispatcher.state(),
        method,
        Tier::T2,
        Duration::from_secs(10)
    ));

    // Late callers after the install must not trigger a second compile.
    for _ in 0..10 {
        assert_eq!(dispatcher.execute_method(method).tier, Tier::T2);
    }
    assert_eq!(compiler.calls(method, Tier::T2), 1);
}

#[test]
fn cold_storm_at_t1_threshold_compiles_once() {
    let compiler = Arc::new(InstrumentedCompiler::with_delay(Duration::from_millis(10)));
    let config = TieringConfig::default().with_workers(2);
    let dispatcher = dispatcher(config, Arc::clone(&compiler));
    let method = MethodId(102);

    dispatcher.state().counter.warm(method, 5_000);

    let results = storm(&dispatcher, method);
    assert_eq!(compiler.calls(method, Tier::T1), 1);
    assert_eq!(compiler.calls(method, Tier::T2), 0);
    assert!(results.iter().all(|r| r.tier == Tier::T1));
}
