//! Bounded worker pool with a priority channel and a dispatch loop.
//!
//! Each pool owns a [`PriorityChannel`] of jobs, a counting permit sized to
//! `max_concurrency`, and one logical dispatch loop. The loop pulls the
//! highest-priority job, lets the runner prepare it (synchronously, in
//! dequeue order; this is where per-session turns are registered), acquires
//! a permit, and spawns the job body so the loop itself never blocks on a
//! running job.
//!
//! # Failure policy
//!
//! A failed job is logged once, with its kind and correlating identifier,
//! then dropped. There is **no automatic retry**: retrying a side-effecting
//! chat-interaction handler without idempotency keys risks duplicate
//! user-visible actions, so the pool favors fast, visible failure over
//! silent duplication. One job's fault never affects another job, the
//! queue, or the loop.
//!
//! # Lifecycle
//!
//! Pools can start paused and be paused/resumed without losing enqueued
//! items, so a consumer can delay processing until its transport connection
//! is up. Shutdown closes the channel, stops the loop and repeating timers,
//! and drains in-flight job bodies before returning.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::queue::{ChannelClosed, Job, Priority, PriorityChannel};
use crate::turn::Turn;

/// Error type returned by job bodies.
///
/// Type-erased because the pool only logs and drops it; the concrete
/// taxonomy lives with the runner.
pub type JobError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Executes jobs on behalf of a pool.
pub trait JobRunner: Send + Sync + 'static {
    /// Called synchronously on the dispatch loop, in dequeue order, before
    /// the job body is spawned.
    ///
    /// Spawned tasks have no start-order guarantee, so anything that must
    /// observe dequeue order (registering a session's turn, above all)
    /// happens here. The returned [`Turn`] is handed back to
    /// [`run`](JobRunner::run) with the job.
    fn prepare(&self, job: &Job) -> Option<Turn> {
        let _ = job;
        None
    }

    /// Executes one job body on a worker slot.
    fn run(&self, job: Job, turn: Option<Turn>)
    -> impl Future<Output = Result<(), JobError>> + Send;
}

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name used in log lines.
    pub name: String,

    /// Maximum number of concurrently executing job bodies. `1` yields a
    /// strictly serial pool.
    pub max_concurrency: usize,

    /// Whether the pool starts with its dispatch loop paused.
    pub start_paused: bool,
}

impl PoolConfig {
    /// Creates a pool configuration.
    ///
    /// `max_concurrency` is clamped to at least 1.
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        PoolConfig {
            name: name.into(),
            max_concurrency: max_concurrency.max(1),
            start_paused: false,
        }
    }

    /// Starts the pool paused; call [`WorkerPool::resume`] once setup is
    /// complete.
    pub fn with_start_paused(mut self, start_paused: bool) -> Self {
        self.start_paused = start_paused;
        self
    }
}

/// A worker pool: priority channel, permit-bounded execution, dispatch loop.
pub struct WorkerPool<R> {
    config: PoolConfig,
    channel: Arc<PriorityChannel<Job>>,
    runner: Arc<R>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    loops: Mutex<Vec<JoinHandle<()>>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    paused: AtomicBool,
    resumed: Notify,
}

impl<R: JobRunner> WorkerPool<R> {
    /// Creates a pool around `runner`.
    pub fn new(config: PoolConfig, runner: Arc<R>) -> Self {
        info!(
            pool = %config.name,
            max_concurrency = config.max_concurrency,
            start_paused = config.start_paused,
            "creating worker pool"
        );
        let paused = AtomicBool::new(config.start_paused);
        WorkerPool {
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            channel: Arc::new(PriorityChannel::new()),
            runner,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            loops: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
            paused,
            resumed: Notify::new(),
        }
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Enqueues a job at the given priority.
    pub fn enqueue(&self, job: Job, priority: Priority) -> Result<(), ChannelClosed> {
        self.channel.write(job, priority)
    }

    /// Number of jobs currently enqueued (not yet dispatched).
    pub fn queued(&self) -> usize {
        self.channel.len()
    }

    /// Arms a timer that re-enqueues a clone of `job` every `interval` at
    /// Normal priority.
    ///
    /// When `run_immediately` is set, the job is also enqueued once at
    /// registration time. Registrations are independent of each other; all
    /// share only the pool's concurrency cap. Timers stop at shutdown.
    pub fn schedule_repeating(&self, interval: Duration, job: Job, run_immediately: bool) {
        debug!(
            pool = %self.config.name,
            job = job.kind(),
            interval_ms = interval.as_millis() as u64,
            run_immediately,
            "arming repeating job"
        );

        if run_immediately && self.channel.write(job.clone(), Priority::Normal).is_err() {
            warn!(pool = %self.config.name, job = job.kind(), "pool closed; repeating job not armed");
            return;
        }

        let channel = Arc::clone(&self.channel);
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // An interval's first tick completes immediately; the immediate
            // run is handled above, so swallow it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if channel.write(job.clone(), Priority::Normal).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        self.timers.lock().push(handle);
    }

    /// Stops pulling from the channel. Already-enqueued items are kept.
    pub fn pause(&self) {
        debug!(pool = %self.config.name, "pausing dispatch loop");
        self.paused.store(true, Ordering::Release);
    }

    /// Resumes pulling from the channel.
    pub fn resume(&self) {
        debug!(pool = %self.config.name, "resuming dispatch loop");
        self.paused.store(false, Ordering::Release);
        self.resumed.notify_waiters();
    }

    /// Returns true while the dispatch loop is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    async fn wait_while_paused(&self) {
        while self.paused.load(Ordering::Acquire) {
            let resumed = self.resumed.notified();
            if !self.paused.load(Ordering::Acquire) {
                return;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = resumed => {}
            }
        }
    }

    /// Runs the dispatch loop until shutdown.
    ///
    /// Usually entered through [`WorkerPool::start`]; exposed for callers
    /// that want to drive the loop on a task of their own.
    pub async fn run(&self) {
        info!(pool = %self.config.name, "dispatch loop started");
        loop {
            self.wait_while_paused().await;

            let job = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                read = self.channel.read() => match read {
                    Ok(job) => job,
                    Err(ChannelClosed) => break,
                },
            };

            // Dequeue order is the only well-defined order; turns must be
            // registered here, not in the spawned body.
            let turn = self.runner.prepare(&job);

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let runner = Arc::clone(&self.runner);
            let pool = self.config.name.clone();
            self.tracker.spawn(async move {
                let kind = job.kind();
                let correlation = job.correlation().to_string();
                if let Err(error) = runner.run(job, turn).await {
                    error!(
                        pool = %pool,
                        job = kind,
                        correlation = %correlation,
                        error = %error,
                        "job failed; dropped without retry"
                    );
                }
                drop(permit);
            });
        }
        info!(pool = %self.config.name, "dispatch loop stopped");
    }

    /// Spawns the dispatch loop as a tokio task.
    ///
    /// Takes an owned handle to the pool (clone the `Arc` to keep one). The
    /// task handle is retained so [`shutdown`](WorkerPool::shutdown) can
    /// wait for the loop to wind down before draining in-flight bodies.
    pub fn start(self: Arc<Self>) {
        let pool = Arc::clone(&self);
        let handle = tokio::spawn(async move { pool.run().await });
        self.loops.lock().push(handle);
    }

    /// Shuts the pool down: closes the channel, stops the loop and timers,
    /// then waits for in-flight job bodies to finish.
    pub async fn shutdown(&self) {
        info!(pool = %self.config.name, queued = self.queued(), "shutting down worker pool");
        self.channel.close();
        self.shutdown.cancel();

        let loops: Vec<_> = self.loops.lock().drain(..).collect();
        for handle in loops {
            let _ = handle.await;
        }
        let timers: Vec<_> = self.timers.lock().drain(..).collect();
        for timer in timers {
            let _ = timer.await;
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!(pool = %self.config.name, "worker pool drained");
    }
}
