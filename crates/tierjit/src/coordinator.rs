//! Background compilation.
//!
//! [`CompilerThreadPool`] is a fixed set of worker threads fed from one
//! MPMC channel. [`CompilationCoordinator`] sits in front of it: it claims a
//! method in the in-flight set before queuing a job, so a method is never
//! compiled by two workers at once and a storm of identical requests turns
//! into a single job. Callers that lose the claim get the running job's
//! [`CompileTicket`] and may wait on it.
//!
//! A job installs its artifact into the [`MethodCache`] *before* releasing
//! the claim. A caller that wins a claim afterwards re-checks the cache, sees
//! the installed tier and drops the request, so each tier of a method is
//! compiled once per successful transition.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

use crate::cache::MethodCache;
use crate::dispatch::Compiler;
use crate::error::{CompileFailure, TieringError};
use crate::reporter::FailureReporter;
use crate::types::{CompileMode, MethodId, Tier, TieringMetrics};

/// Methods with a compile in progress, mapped to that compile's ticket.
type InFlightSet = DashMap<MethodId, Arc<CompileTicket>, FxBuildHasher>;

/// Completion signal for one in-flight compile.
#[derive(Debug)]
pub struct CompileTicket {
    tier: Tier,
    finished: Mutex<bool>,
    signal: Condvar,
}

impl CompileTicket {
    fn new(tier: Tier) -> Self {
        Self {
            tier,
            finished: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    /// Tier the job behind this ticket is compiling.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn is_finished(&self) -> bool {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let finished = self.finished.lock().unwrap();
        *finished
    }

    /// Block until the job has finished, successfully or not.
    #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
    pub fn wait(&self) {
        let mut finished = self.finished.lock().unwrap();
        while !*finished {
            finished = self.signal.wait(finished).unwrap();
        }
    }

    /// Block until the job has finished or `timeout` elapses.
    ///
    /// Returns `true` if the job finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let finished = self.finished.lock().unwrap();
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let (finished, _) = self
            .signal
            .wait_timeout_while(finished, timeout, |finished| !*finished)
            .unwrap();
        *finished
    }

    fn finish(&self) {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let mut finished = self.finished.lock().unwrap();
        *finished = true;
        self.signal.notify_all();
    }
}

/// A claimed compile waiting for a worker.
#[derive(Debug)]
pub struct CompileJob {
    pub method: MethodId,
    pub tier: Tier,
    ticket: Arc<CompileTicket>,
}

/// Fixed-size pool of background compiler threads.
///
/// Holds the sender half of an unbounded crossbeam channel; every worker
/// pulls from the shared receiver. Sending never blocks the caller.
///
/// A job that panics is logged and the worker moves on to the next one.
/// On `Drop`, the sender is closed, workers drain the jobs still queued and
/// exit, and every worker is joined.
pub struct CompilerThreadPool {
    sender: Option<Sender<CompileJob>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl CompilerThreadPool {
    /// Start `workers` threads that run `handler` for every job.
    pub fn start<F>(workers: usize, handler: F) -> Self
    where
        F: Fn(CompileJob) + Send + Sync + 'static,
    {
        let (sender, receiver) = channel::unbounded::<CompileJob>();
        let handler = Arc::new(handler);

        let handles = (0..workers.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let handler = Arc::clone(&handler);
                #[expect(clippy::expect_used, reason = "thread spawn failure is unrecoverable")]
                let handle = thread::Builder::new()
                    .name(format!("tierjit-compiler-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            let (method, tier) = (job.method, job.tier);
                            // A panic anywhere in the job must not take the worker down.
                            if let Err(payload) =
                                panic::catch_unwind(AssertUnwindSafe(|| handler(job)))
                            {
                                tracing::error!(
                                    method = %method,
                                    tier = %tier,
                                    panic = %panic_message(payload.as_ref()),
                                    "Compile job panicked, worker keeps running"
                                );
                            }
                        }
                    })
                    .expect("failed to spawn compiler worker thread");
                handle
            })
            .collect();

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Queue a job. Returns `false` if the pool has shut down.
    pub fn send(&self, job: CompileJob) -> bool {
        self.sender
            .as_ref()
            .map(|s| s.send(job).is_ok())
            .unwrap_or(false)
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Stop accepting jobs, let the workers drain the queue, and join them.
    fn shutdown(&mut self) {
        drop(self.sender.take());

        for handle in self.handles.drain(..) {
            if let Err(payload) = handle.join() {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "Compiler worker thread panicked"
                );
            }
        }
    }
}

impl Drop for CompilerThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CompilerThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerThreadPool")
            .field("active", &self.sender.is_some())
            .field("workers", &self.handles.len())
            .finish()
    }
}

/// What happened to a compile request.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// This request claimed the method and queued a job.
    Submitted(Arc<CompileTicket>),
    /// A job for the method was already running; the request merged into it.
    Coalesced(Arc<CompileTicket>),
    /// The cache already held the requested tier when the claim was made.
    AlreadySatisfied,
    /// The pool has shut down; the failure was reported.
    Rejected,
}

impl RequestOutcome {
    /// Ticket of the job this request ended up attached to, if any.
    pub fn ticket(&self) -> Option<&Arc<CompileTicket>> {
        match self {
            RequestOutcome::Submitted(ticket) | RequestOutcome::Coalesced(ticket) => Some(ticket),
            RequestOutcome::AlreadySatisfied | RequestOutcome::Rejected => None,
        }
    }
}

/// Deduplicates compile requests and runs them on a [`CompilerThreadPool`].
pub struct CompilationCoordinator {
    in_flight: Arc<InFlightSet>,
    cache: MethodCache,
    reporter: Arc<dyn FailureReporter>,
    metrics: Arc<TieringMetrics>,
    pool: CompilerThreadPool,
}

impl CompilationCoordinator {
    /// Start the worker pool. Jobs install their artifacts into `cache`.
    pub fn start(
        workers: usize,
        compiler: Arc<dyn Compiler>,
        cache: MethodCache,
        reporter: Arc<dyn FailureReporter>,
        metrics: Arc<TieringMetrics>,
    ) -> Self {
        let in_flight: Arc<InFlightSet> = Arc::new(DashMap::with_hasher(FxBuildHasher::default()));

        let worker = CompileWorker {
            compiler,
            cache: cache.clone(),
            in_flight: Arc::clone(&in_flight),
            reporter: Arc::clone(&reporter),
            metrics: Arc::clone(&metrics),
        };
        let pool = CompilerThreadPool::start(workers, move |job| worker.run(job));

        Self {
            in_flight,
            cache,
            reporter,
            metrics,
            pool,
        }
    }

    /// Request that `method` be compiled at `tier`.
    ///
    /// In [`CompileMode::Blocking`] the caller waits for the job it submitted
    /// or coalesced onto. In [`CompileMode::NonBlocking`] it returns as soon
    /// as the request is queued.
    pub fn request(&self, method: MethodId, tier: Tier, mode: CompileMode) -> RequestOutcome {
        let outcome = self.submit(method, tier);
        if mode == CompileMode::Blocking
            && let Some(ticket) = outcome.ticket()
        {
            ticket.wait();
        }
        outcome
    }

    fn submit(&self, method: MethodId, tier: Tier) -> RequestOutcome {
        let claim = match self.in_flight.entry(method) {
            Entry::Occupied(running) => Err(Arc::clone(running.get())),
            Entry::Vacant(slot) => {
                let ticket = Arc::new(CompileTicket::new(tier));
                slot.insert(Arc::clone(&ticket));
                Ok(ticket)
            }
        };

        let ticket = match claim {
            Ok(ticket) => ticket,
            Err(running) => {
                TieringMetrics::bump(&self.metrics.coalesced_requests);
                tracing::debug!(
                    method = %method,
                    requested = %tier,
                    running = %running.tier(),
                    "Compile already in flight, request coalesced"
                );
                return RequestOutcome::Coalesced(running);
            }
        };

        // A job may have installed this tier between the caller's cache
        // snapshot and the claim.
        if self.cache.tier_of(method) >= tier {
            release(&self.in_flight, method, &ticket);
            TieringMetrics::bump(&self.metrics.satisfied_requests);
            return RequestOutcome::AlreadySatisfied;
        }

        let job = CompileJob {
            method,
            tier,
            ticket: Arc::clone(&ticket),
        };
        if !self.pool.send(job) {
            release(&self.in_flight, method, &ticket);
            TieringMetrics::bump(&self.metrics.compilation_failures);
            report_failure(
                self.reporter.as_ref(),
                CompileFailure {
                    method,
                    tier,
                    error: TieringError::PoolShutdown,
                },
            );
            return RequestOutcome::Rejected;
        }

        tracing::debug!(method = %method, tier = %tier, "Compile job queued");
        RequestOutcome::Submitted(ticket)
    }

    /// Whether a compile for `method` is currently claimed.
    pub fn is_in_flight(&self, method: MethodId) -> bool {
        self.in_flight.contains_key(&method)
    }

    /// Number of methods with a compile in progress.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }
}

impl std::fmt::Debug for CompilationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationCoordinator")
            .field("in_flight", &self.in_flight.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// State each worker needs to run a job.
struct CompileWorker {
    compiler: Arc<dyn Compiler>,
    cache: MethodCache,
    in_flight: Arc<InFlightSet>,
    reporter: Arc<dyn FailureReporter>,
    metrics: Arc<TieringMetrics>,
}

impl CompileWorker {
    fn run(&self, job: CompileJob) {
        let CompileJob {
            method,
            tier,
            ticket,
        } = job;

        // Releases the claim and wakes waiters however the job ends.
        let _guard = ClaimGuard {
            in_flight: &self.in_flight,
            method,
            ticket: &ticket,
        };

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.compiler.compile(method, tier)))
            .unwrap_or_else(|payload| {
                Err(TieringError::CompilerPanicked(panic_message(payload.as_ref())))
            });

        match result {
            Ok(compiled) => {
                if self.cache.try_upgrade(method, tier, compiled) {
                    TieringMetrics::bump(&self.metrics.compilations);
                    tracing::info!(
                        method = %method,
                        tier = %tier,
                        elapsed = ?started.elapsed(),
                        "Compiled method installed"
                    );
                } else {
                    TieringMetrics::bump(&self.metrics.rejected_upgrades);
                    tracing::debug!(
                        method = %method,
                        tier = %tier,
                        "Cache already holds an equal or higher tier, artifact discarded"
                    );
                }
            }
            Err(error) => {
                TieringMetrics::bump(&self.metrics.compilation_failures);
                report_failure(
                    self.reporter.as_ref(),
                    CompileFailure {
                        method,
                        tier,
                        error,
                    },
                );
            }
        }
    }
}

struct ClaimGuard<'a> {
    in_flight: &'a InFlightSet,
    method: MethodId,
    ticket: &'a Arc<CompileTicket>,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        release(self.in_flight, self.method, self.ticket);
    }
}

/// Drop the claim on `method` if `ticket` still owns it, then wake waiters.
fn release(in_flight: &InFlightSet, method: MethodId, ticket: &Arc<CompileTicket>) {
    in_flight.remove_if(&method, |_, current| Arc::ptr_eq(current, ticket));
    ticket.finish();
}

/// Hand `failure` to the reporter. A panicking reporter is logged and
/// otherwise ignored, since this may run on a caller's thread.
fn report_failure(reporter: &dyn FailureReporter, failure: CompileFailure) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| reporter.report(&failure))) {
        tracing::error!(
            method = %failure.method,
            tier = %failure.tier,
            error = %failure.error,
            panic = %panic_message(payload.as_ref()),
            "Failure reporter panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
