//! # Job Queue Module
//!
//! Deployments run in the background, strictly one at a time and in the order they were
//! queued. Callers [`JobQueue::enqueue`] a [`Job`] without blocking and receive a
//! [`JobTicket`]; a single worker ([`run_worker`]) dequeues and executes jobs until its
//! cancellation token fires.
//!
//! ## Failure containment
//!
//! Each job runs on its own spawned task, which the worker awaits before dequeuing the next
//! one. An error returned by a job or a panic inside it is recorded as that job's outcome and
//! the worker carries on with the rest of the queue.
//!
//! ## Idle tracking
//!
//! The queue counts jobs that were enqueued but have not reported an outcome yet, including
//! jobs enqueued by other jobs. [`JobQueue::wait_idle`] returns once that count drops to zero.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobError {
    #[error("Job {0} was dropped before it reported an outcome")]
    Abandoned(u64),
}

/// A deferred unit of work. Nothing runs until the worker polls it.
pub struct Job {
    name: String,
    future: JobFuture,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            future: Box::pin(future),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Outcome of a finished job, kept by the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: u64,
    pub name: String,
    pub outcome: JobOutcome,
}

/// Resolves to the outcome of one queued job
#[derive(Debug)]
pub struct JobTicket {
    id: u64,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn outcome(self) -> Result<JobOutcome, JobError> {
        self.rx.await.map_err(|_| JobError::Abandoned(self.id))
    }
}

/// A job taken off the queue together with the channel its outcome goes to
pub struct QueuedJob {
    pub id: u64,
    pub job: Job,
    reply: oneshot::Sender<JobOutcome>,
}

pub struct JobQueue {
    jobs: Mutex<VecDeque<QueuedJob>>,
    /// One permit per queued job
    available: Semaphore,
    next_id: AtomicU64,
    /// Enqueued jobs without an outcome yet
    outstanding: AtomicUsize,
    idle: Notify,
    reports: Mutex<Vec<JobReport>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
            next_id: AtomicU64::new(1),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Appends a job. Never blocks.
    pub fn enqueue(&self, job: Job) -> JobTicket {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply, rx) = oneshot::channel();
        info!(job = id, "Queued {}", job.name);

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        lock(&self.jobs).push_back(QueuedJob { id, job, reply });
        self.available.add_permits(1);

        JobTicket { id, rx }
    }

    /// Waits for the next job, or returns `None` once `token` is cancelled.
    pub async fn dequeue(&self, token: &CancellationToken) -> Option<QueuedJob> {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            permit = self.available.acquire() => permit.ok()?,
        };
        permit.forget();
        lock(&self.jobs).pop_front()
    }

    /// Jobs waiting to be dequeued
    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns once every enqueued job has reported an outcome.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Outcomes of all finished jobs, in completion order
    pub fn reports(&self) -> Vec<JobReport> {
        lock(&self.reports).clone()
    }

    fn finish(&self, queued: QueuedJobReply, outcome: JobOutcome) {
        lock(&self.reports).push(JobReport {
            id: queued.id,
            name: queued.name,
            outcome: outcome.clone(),
        });
        // the caller may have stopped waiting for the ticket
        let _ = queued.reply.send(outcome);

        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct QueuedJobReply {
    id: u64,
    name: String,
    reply: oneshot::Sender<JobOutcome>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Executes queued jobs one at a time until `token` is cancelled.
///
/// Cancellation is only observed between jobs; a running job is always awaited to the end.
pub async fn run_worker(queue: Arc<JobQueue>, token: CancellationToken) {
    info!("Job worker started");

    while let Some(QueuedJob { id, job, reply }) = queue.dequeue(&token).await {
        let Job { name, future } = job;
        info!(job = id, "Running {}", name);

        let outcome = match tokio::spawn(future).await {
            Ok(Ok(())) => {
                info!(job = id, "{} succeeded", name);
                JobOutcome::Succeeded
            }
            Ok(Err(e)) => {
                error!(job = id, "{} failed: {:#}", name, e);
                JobOutcome::Failed(format!("{e:#}"))
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(job = id, "{} panicked: {}", name, message);
                JobOutcome::Panicked(message)
            }
            Err(e) => {
                error!(job = id, "{} was cancelled: {}", name, e);
                JobOutcome::Failed(e.to_string())
            }
        };

        queue.finish(QueuedJobReply { id, name, reply }, outcome);
    }

    info!("Job worker stopped");
}
