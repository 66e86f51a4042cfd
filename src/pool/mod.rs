//! Fixed-size worker pool for render/copy/remove jobs.
//!
//! Jobs carry a monotonically increasing id, the correlation key between a
//! dispatched unit of work and its eventual reply. Workers are isolated
//! threads: they receive `{id, kind, path}` requests over a private channel
//! and post exactly one reply per request onto a shared channel. A reply
//! pump matches replies back to pending jobs, runs observer callbacks, and
//! settles each job's ticket.
//!
//! Crash policy: a panic escaping a job marks the worker dead. The
//! in-flight job is rejected immediately (callers never hang on a dead
//! worker) and a replacement worker takes the slot before the next
//! dispatch. Each worker carries at most one in-flight job; dispatch
//! asserts the slot is free.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::config::SiteConfig;
use crate::render::{self, RenderResult};

/// Kinds of work the pool executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Render,
    CopyAsset,
    RemovePage,
    RemoveAsset,
}

impl JobKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::CopyAsset => "copy",
            Self::RemovePage => "remove-page",
            Self::RemoveAsset => "remove-asset",
        }
    }

    /// Past-tense verb for result logging.
    pub fn action(self) -> &'static str {
        match self {
            Self::Render => "rendered",
            Self::CopyAsset => "copied",
            Self::RemovePage | Self::RemoveAsset => "removed",
        }
    }
}

/// One unit of work.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub kind: JobKind,
    pub path: PathBuf,
}

impl JobSpec {
    pub fn new(kind: JobKind, path: PathBuf) -> Self {
        Self { kind, path }
    }
}

/// Successful job payload.
#[derive(Debug, Clone)]
pub enum JobOutput {
    /// Render finished; dependency set for the graph commit.
    Rendered(RenderResult),
    /// Asset copy finished; output files written.
    Copied(Vec<PathBuf>),
    /// Removal finished.
    Removed,
}

/// Failed job payload.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    /// The failure killed the worker (panic), not just the job.
    pub crashed: bool,
}

impl JobError {
    fn pool_closed() -> Self {
        Self {
            message: "worker pool closed".into(),
            crashed: false,
        }
    }
}

/// Reply view handed to observer callbacks.
pub struct JobReply<'a> {
    pub id: u64,
    pub spec: &'a JobSpec,
    pub outcome: &'a Result<JobOutput, JobError>,
}

/// Observer hook run when a job's reply arrives, before the ticket settles.
pub type JobCallback = Box<dyn Fn(&JobReply) + Send + 'static>;

/// Await handle for one pushed job.
pub struct JobTicket {
    pub id: u64,
    rx: oneshot::Receiver<Result<JobOutput, JobError>>,
}

impl JobTicket {
    /// Suspend until the job's reply is delivered.
    pub async fn wait(self) -> Result<JobOutput, JobError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(JobError::pool_closed()),
        }
    }
}

// =============================================================================
// Job execution seam
// =============================================================================

/// Executes one job inside a worker thread.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, spec: &JobSpec) -> Result<JobOutput>;
}

/// Production runner: drives the render pipeline.
pub struct RenderRunner {
    config: Arc<SiteConfig>,
}

impl RenderRunner {
    pub fn new(config: Arc<SiteConfig>) -> Self {
        Self { config }
    }
}

impl JobRunner for RenderRunner {
    fn run(&self, spec: &JobSpec) -> Result<JobOutput> {
        match spec.kind {
            JobKind::Render => {
                render::render_page(&spec.path, &self.config).map(JobOutput::Rendered)
            }
            JobKind::CopyAsset => {
                render::copy_asset(&spec.path, &self.config).map(JobOutput::Copied)
            }
            JobKind::RemovePage => {
                render::remove_page(&spec.path, &self.config).map(|()| JobOutput::Removed)
            }
            JobKind::RemoveAsset => {
                render::remove_asset(&spec.path, &self.config).map(|()| JobOutput::Removed)
            }
        }
    }
}

// =============================================================================
// Pool internals
// =============================================================================

struct WorkerRequest {
    id: u64,
    spec: JobSpec,
}

struct WorkerReply {
    id: u64,
    outcome: Result<JobOutput, JobError>,
}

struct Worker {
    job_tx: Sender<WorkerRequest>,
    /// Id of the in-flight job, for crash attribution. At most one job is
    /// in flight per worker.
    current: Option<u64>,
}

struct QueuedJob {
    id: u64,
    spec: JobSpec,
}

struct PendingJob {
    spec: JobSpec,
    callbacks: Vec<JobCallback>,
    resolve: oneshot::Sender<Result<JobOutput, JobError>>,
}

struct PoolState {
    workers: Vec<Worker>,
    idle: Vec<usize>,
    queue: VecDeque<QueuedJob>,
    pending: FxHashMap<u64, PendingJob>,
    next_id: u64,
    closed: bool,
    /// Template for replacement workers; dropped on close so the reply
    /// pump disconnects once the last worker exits.
    reply_tx: Option<Sender<WorkerReply>>,
}

/// Fixed-size pool of isolated worker threads with a FIFO job queue.
pub struct WorkerPool {
    state: Arc<Mutex<PoolState>>,
    runner: Arc<dyn JobRunner>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers (minimum one) plus the reply pump.
    pub fn new(size: usize, runner: Arc<dyn JobRunner>) -> Self {
        let size = size.max(1);
        let (reply_tx, reply_rx) = unbounded::<WorkerReply>();

        let mut workers = Vec::with_capacity(size);
        let mut idle = Vec::with_capacity(size);
        for index in 0..size {
            workers.push(spawn_worker(&runner, reply_tx.clone()));
            idle.push(index);
        }

        let state = Arc::new(Mutex::new(PoolState {
            workers,
            idle,
            queue: VecDeque::new(),
            pending: FxHashMap::default(),
            next_id: 0,
            closed: false,
            reply_tx: Some(reply_tx),
        }));

        let pump_state = Arc::clone(&state);
        let pump_runner = Arc::clone(&runner);
        let pump = std::thread::spawn(move || {
            while let Ok(reply) = reply_rx.recv() {
                handle_reply(&pump_state, &pump_runner, reply);
            }
        });

        Self {
            state,
            runner,
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Enqueue a job; dispatch is attempted immediately.
    pub fn push(&self, spec: JobSpec) -> JobTicket {
        self.push_with(spec, Vec::new())
    }

    /// Enqueue a job with observer callbacks.
    pub fn push_with(&self, spec: JobSpec, callbacks: Vec<JobCallback>) -> JobTicket {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();

        if state.closed {
            let _ = tx.send(Err(JobError::pool_closed()));
            return JobTicket { id: 0, rx };
        }

        state.next_id += 1;
        let id = state.next_id;
        state.pending.insert(
            id,
            PendingJob {
                spec: spec.clone(),
                callbacks,
                resolve: tx,
            },
        );
        state.queue.push_back(QueuedJob { id, spec });
        dispatch(&mut state, &self.runner);

        JobTicket { id, rx }
    }

    /// Terminate every worker and clear all internal queues and maps.
    /// Tickets still waiting observe a closed-pool error.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.workers.clear();
        state.idle.clear();
        state.queue.clear();
        state.pending.clear();
        state.reply_tx = None;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
        if let Some(pump) = self.pump.lock().take() {
            let _ = pump.join();
        }
    }
}

/// Hand queued jobs to idle workers, oldest job first.
fn dispatch(state: &mut PoolState, runner: &Arc<dyn JobRunner>) {
    while !state.queue.is_empty() && !state.idle.is_empty() {
        let index = state.idle.pop().expect("idle checked non-empty");
        let job = state.queue.pop_front().expect("queue checked non-empty");

        assert!(
            state.workers[index].current.is_none(),
            "dispatch to a busy worker"
        );

        let request = WorkerRequest {
            id: job.id,
            spec: job.spec.clone(),
        };
        if state.workers[index].job_tx.send(request).is_err() {
            // Worker died without a reply: replace it and retry the job.
            crate::log!("pool"; "worker {} unreachable, replacing", index);
            let Some(reply_tx) = state.reply_tx.clone() else {
                break;
            };
            state.workers[index] = spawn_worker(runner, reply_tx);
            state.queue.push_front(job);
            state.idle.push(index);
            continue;
        }
        state.workers[index].current = Some(job.id);
    }
}

/// Match a reply to its pending job, settle it, and dispatch the next.
fn handle_reply(state: &Arc<Mutex<PoolState>>, runner: &Arc<dyn JobRunner>, reply: WorkerReply) {
    let crashed = matches!(&reply.outcome, Err(e) if e.crashed);

    let job = {
        let mut state = state.lock();

        if let Some(index) = state
            .workers
            .iter()
            .position(|w| w.current == Some(reply.id))
        {
            state.workers[index].current = None;
            if crashed {
                crate::log!("pool"; "worker {} crashed, replacing", index);
                if let Some(reply_tx) = state.reply_tx.clone() {
                    state.workers[index] = spawn_worker(runner, reply_tx);
                }
            }
            if !state.idle.contains(&index) {
                state.idle.push(index);
            }
        }

        // Stale or duplicate replies have no pending entry: ignore.
        state.pending.remove(&reply.id)
    };

    if let Some(job) = job {
        let view = JobReply {
            id: reply.id,
            spec: &job.spec,
            outcome: &reply.outcome,
        };
        for callback in &job.callbacks {
            // One misbehaving observer must not break the pipeline.
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&view)));
            if result.is_err() {
                crate::log!("pool"; "job callback panicked for {}", job.spec.path.display());
            }
        }
        let _ = job.resolve.send(reply.outcome);
    }

    let mut state = state.lock();
    dispatch(&mut state, runner);
}

/// Spawn one worker thread with a private request channel.
fn spawn_worker(runner: &Arc<dyn JobRunner>, reply_tx: Sender<WorkerReply>) -> Worker {
    let (job_tx, job_rx) = unbounded::<WorkerRequest>();
    let runner = Arc::clone(runner);
    std::thread::spawn(move || worker_loop(&job_rx, &reply_tx, &runner));
    Worker {
        job_tx,
        current: None,
    }
}

fn worker_loop(
    job_rx: &Receiver<WorkerRequest>,
    reply_tx: &Sender<WorkerReply>,
    runner: &Arc<dyn JobRunner>,
) {
    while let Ok(request) = job_rx.recv() {
        crate::debug!("pool"; "{} -- {}", request.spec.kind.label(), request.spec.path.display());

        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runner.run(&request.spec)));
        match result {
            Ok(Ok(output)) => {
                let _ = reply_tx.send(WorkerReply {
                    id: request.id,
                    outcome: Ok(output),
                });
            }
            Ok(Err(error)) => {
                let _ = reply_tx.send(WorkerReply {
                    id: request.id,
                    outcome: Err(JobError {
                        message: format!("{error:#}"),
                        crashed: false,
                    }),
                });
            }
            Err(panic) => {
                let _ = reply_tx.send(WorkerReply {
                    id: request.id,
                    outcome: Err(JobError {
                        message: panic_message(panic.as_ref()),
                        crashed: true,
                    }),
                });
                // The execution context is dead; the pool replaces it.
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Runner that records execution order and panics on request.
    struct StubRunner {
        order: Mutex<Vec<PathBuf>>,
        delay: Duration,
    }

    impl StubRunner {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                order: Mutex::new(Vec::new()),
                delay,
            })
        }
    }

    impl JobRunner for StubRunner {
        fn run(&self, spec: &JobSpec) -> Result<JobOutput> {
            if spec.path.to_string_lossy().contains("panic") {
                panic!("stub worker exploded");
            }
            std::thread::sleep(self.delay);
            self.order.lock().push(spec.path.clone());
            if spec.path.to_string_lossy().contains("fail") {
                anyhow::bail!("stub failure");
            }
            Ok(JobOutput::Removed)
        }
    }

    fn job(path: &str) -> JobSpec {
        JobSpec::new(JobKind::Render, PathBuf::from(path))
    }

    #[tokio::test]
    async fn fifo_order_with_single_worker() {
        let runner = StubRunner::new(Duration::from_millis(5));
        let pool = WorkerPool::new(1, runner.clone());

        let tickets: Vec<_> = (0..5).map(|i| pool.push(job(&format!("/p{i}")))).collect();
        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        let order = runner.order.lock().clone();
        let expected: Vec<_> = (0..5).map(|i| PathBuf::from(format!("/p{i}"))).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn job_ids_are_monotonic() {
        let runner = StubRunner::new(Duration::ZERO);
        let pool = WorkerPool::new(2, runner);
        let a = pool.push(job("/a"));
        let b = pool.push(job("/b"));
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn failed_job_rejects_without_affecting_others() {
        let runner = StubRunner::new(Duration::ZERO);
        let pool = WorkerPool::new(1, runner);

        let bad = pool.push(job("/fail"));
        let good = pool.push(job("/ok"));

        let err = bad.wait().await.unwrap_err();
        assert!(err.message.contains("stub failure"));
        assert!(!err.crashed);
        good.wait().await.unwrap();
    }

    #[tokio::test]
    async fn panicking_worker_is_replaced_and_queue_continues() {
        let runner = StubRunner::new(Duration::ZERO);
        let pool = WorkerPool::new(1, runner.clone());

        let boom = pool.push(job("/panic"));
        let after = pool.push(job("/after"));

        let err = boom.wait().await.unwrap_err();
        assert!(err.crashed);
        assert!(err.message.contains("exploded"));

        // Replacement worker serves the rest of the queue.
        after.wait().await.unwrap();
        assert_eq!(runner.order.lock().last().unwrap(), &PathBuf::from("/after"));
    }

    #[tokio::test]
    async fn callbacks_observe_reply_and_panics_are_contained() {
        let runner = StubRunner::new(Duration::ZERO);
        let pool = WorkerPool::new(1, runner);
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_cb = Arc::clone(&seen);
        let callbacks: Vec<JobCallback> = vec![
            Box::new(move |reply| {
                assert!(reply.outcome.is_ok());
                seen_cb.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|_| panic!("observer bug")),
        ];

        let ticket = pool.push_with(job("/ok"), callbacks);
        // A panicking observer never rejects the job itself.
        ticket.wait().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_rejects_new_jobs() {
        let runner = StubRunner::new(Duration::ZERO);
        let pool = WorkerPool::new(1, runner);
        pool.close();

        let err = pool.push(job("/late")).wait().await.unwrap_err();
        assert!(err.message.contains("closed"));
    }

    #[tokio::test]
    async fn bounded_concurrency() {
        // With two workers and four slow jobs, at most two run at once.
        struct GaugeRunner {
            active: AtomicUsize,
            max_seen: AtomicUsize,
        }
        impl JobRunner for GaugeRunner {
            fn run(&self, _spec: &JobSpec) -> Result<JobOutput> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(JobOutput::Removed)
            }
        }

        let runner = Arc::new(GaugeRunner {
            active: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });
        let pool = WorkerPool::new(2, runner.clone());

        let tickets: Vec<_> = (0..4).map(|i| pool.push(job(&format!("/j{i}")))).collect();
        for ticket in tickets {
            ticket.wait().await.unwrap();
        }
        assert!(runner.max_seen.load(Ordering::SeqCst) <= 2);
    }
}
