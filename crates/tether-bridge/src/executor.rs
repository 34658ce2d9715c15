// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Execution contexts.
//
// Handlers declare where they must run (`ExecutionContext`); the scheduler
// maps that onto concrete executors:
//
//   Primary    -> `MainLoop`, one dedicated thread draining a FIFO queue.
//                 Hosts with a real UI run loop plug in their own executor.
//   Background -> `BackgroundPool`, the tokio blocking pool. Handlers there
//                 may block on network or disk.
//   Caller     -> run inline on the dispatching thread.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, info};

use tether_core::config::BridgeConfig;
use tether_core::error::{BridgeError, Result};
use tether_core::types::ExecutionContext;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs on a particular execution context.
pub trait Executor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Queue a job. Must return without waiting for the job to run.
    fn submit(&self, job: Job) -> Result<()>;

    /// Whether the calling thread belongs to this executor.
    fn is_current(&self) -> bool;
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Primary context
// ---------------------------------------------------------------------------

/// Dedicated thread standing in for the UI run loop.
///
/// Jobs run one at a time in submission order. A panicking job is logged and
/// the loop keeps going.
pub struct MainLoop {
    name: String,
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MainLoop {
    /// Start the loop thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        error!(panic = %panic_message(payload.as_ref()), "job panicked on primary context");
                    }
                }
                debug!("primary loop drained and stopped");
            })
            .map_err(|e| BridgeError::Executor(format!("spawn primary thread: {e}")))?;

        info!(thread = %name, "primary loop started");
        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop accepting jobs, let queued ones finish, and join the thread.
    ///
    /// When called from the loop thread itself the join is skipped; the
    /// thread exits once the current job returns.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(thread = %self.name, "primary loop thread panicked");
            }
        }
    }
}

impl Executor for MainLoop {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, job: Job) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| BridgeError::Executor(format!("{} is shut down", self.name)))?;
        tx.send(job)
            .map_err(|_| BridgeError::Executor(format!("{} has stopped", self.name)))
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Background context
// ---------------------------------------------------------------------------

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Pool id of the job currently running on this thread, if any.
    static CURRENT_POOL: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Clears the thread's pool mark when a job returns or unwinds.
struct PoolMark;

impl PoolMark {
    fn set(id: u64) -> Self {
        CURRENT_POOL.with(|c| c.set(Some(id)));
        Self
    }
}

impl Drop for PoolMark {
    fn drop(&mut self) {
        CURRENT_POOL.with(|c| c.set(None));
    }
}

/// Worker pool for handlers that may block.
///
/// Jobs go to tokio's blocking pool, either on a runtime the pool owns or on
/// one the host already runs.
pub struct BackgroundPool {
    id: u64,
    name: String,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl BackgroundPool {
    /// Build a pool with its own runtime and at most `workers` blocking threads.
    pub fn new(workers: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("tether-background")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        info!(workers, "background pool started");
        Ok(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name: "background".into(),
            handle,
            runtime: Some(runtime),
        })
    }

    /// Use the blocking pool of an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name: "background".into(),
            handle,
            runtime: None,
        }
    }
}

impl Executor for BackgroundPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, job: Job) -> Result<()> {
        let id = self.id;
        self.handle.spawn_blocking(move || {
            let _mark = PoolMark::set(id);
            job();
        });
        Ok(())
    }

    fn is_current(&self) -> bool {
        CURRENT_POOL.with(|c| c.get() == Some(self.id))
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        // `shutdown_background` is safe to call from inside another runtime,
        // unlike dropping the runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ---------------------------------------------------------------------------
// Caller context
// ---------------------------------------------------------------------------

/// Runs jobs immediately on the submitting thread.
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn name(&self) -> &str {
        "caller"
    }

    fn submit(&self, job: Job) -> Result<()> {
        job();
        Ok(())
    }

    fn is_current(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Maps execution contexts onto executors.
pub struct Scheduler {
    primary: Arc<dyn Executor>,
    background: Arc<dyn Executor>,
    caller: Arc<dyn Executor>,
}

impl Scheduler {
    pub fn new(primary: Arc<dyn Executor>, background: Arc<dyn Executor>) -> Self {
        Self {
            primary,
            background,
            caller: Arc::new(InlineExecutor),
        }
    }

    /// Spawn a `MainLoop` and a `BackgroundPool` sized from the config.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let primary = MainLoop::spawn(config.primary_thread_name.clone())?;
        let background = BackgroundPool::new(config.background_workers)?;
        Ok(Self::new(Arc::new(primary), Arc::new(background)))
    }

    pub fn executor(&self, context: ExecutionContext) -> &Arc<dyn Executor> {
        match context {
            ExecutionContext::Primary => &self.primary,
            ExecutionContext::Background => &self.background,
            ExecutionContext::Caller => &self.caller,
        }
    }

    /// Submit `job` to the executor for `context`.
    pub fn schedule(&self, context: ExecutionContext, job: Job) -> Result<()> {
        self.executor(context).submit(job)
    }

    /// Whether the calling thread is the primary context.
    pub fn on_primary(&self) -> bool {
        self.primary.is_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn main_loop_runs_jobs_in_order_on_its_thread() {
        let main = MainLoop::spawn("test-primary").expect("spawn");
        let (tx, rx) = channel();
        for i in 0..5 {
            let tx = tx.clone();
            main.submit(Box::new(move || {
                tx.send((i, thread::current().name().map(str::to_owned)))
                    .expect("send");
            }))
            .expect("submit");
        }

        for expected in 0..5 {
            let (i, name) = rx.recv_timeout(Duration::from_secs(5)).expect("job ran");
            assert_eq!(i, expected);
            assert_eq!(name.as_deref(), Some("test-primary"));
        }
        assert!(!main.is_current());
    }

    #[test]
    fn main_loop_survives_a_panicking_job() {
        let main = MainLoop::spawn("panic-primary").expect("spawn");
        main.submit(Box::new(|| panic!("boom"))).expect("submit");

        let (tx, rx) = channel();
        main.submit(Box::new(move || tx.send(()).expect("send")))
            .expect("submit");
        rx.recv_timeout(Duration::from_secs(5))
            .expect("loop kept running");
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let main = MainLoop::spawn("stopped-primary").expect("spawn");
        main.shutdown();
        assert!(matches!(
            main.submit(Box::new(|| {})),
            Err(BridgeError::Executor(_))
        ));
    }

    #[test]
    fn background_pool_runs_off_the_calling_thread() {
        let pool = Arc::new(BackgroundPool::new(2).expect("pool"));
        let caller = thread::current().id();
        let (tx, rx) = channel();
        let worker_pool = Arc::clone(&pool);
        pool.submit(Box::new(move || {
            tx.send((thread::current().id(), worker_pool.is_current()))
                .expect("send");
        }))
        .expect("submit");

        let (worker, current) = rx.recv_timeout(Duration::from_secs(5)).expect("job ran");
        assert_ne!(worker, caller);
        assert!(current);
        assert!(!pool.is_current());
    }

    #[test]
    fn pool_mark_is_cleared_when_a_job_panics() {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let pool = Arc::new(BackgroundPool::from_handle(runtime.handle().clone()));
        pool.submit(Box::new(|| panic!("job failed"))).expect("submit");

        // One blocking thread, so this runs on the thread that just unwound.
        let worker_pool = Arc::clone(&pool);
        let still_marked = runtime
            .block_on(runtime.handle().spawn_blocking(move || worker_pool.is_current()))
            .expect("join");
        assert!(!still_marked);
    }

    #[test]
    fn caller_context_runs_inline() {
        let scheduler = Scheduler::from_config(&BridgeConfig::default()).expect("scheduler");
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        scheduler
            .schedule(ExecutionContext::Caller, Box::new(move || *flag.lock() = true))
            .expect("schedule");
        assert!(*ran.lock());
        assert!(!scheduler.on_primary());
    }
}
