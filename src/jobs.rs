// src/jobs.rs

//! Background work queue and the serve-count ledger built on it.
//!
//! Serving a quiz enqueues a [`Job::QuizServed`]; a consumer task applies the
//! increment later. When the queue is absent, closed or full, the increment is
//! applied inline instead, so bookkeeping is never dropped just because the
//! asynchronous path is unavailable. Failed increments are logged and not
//! retried.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::store::{QuizRepository, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    QuizServed { quiz_id: i64 },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::QuizServed { .. } => "quiz-served",
        }
    }
}

/// The queue refused a job. The caller falls back to inline processing.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full(Job),

    #[error("queue consumer has stopped")]
    Closed(Job),
}

impl QueueError {
    pub fn into_job(self) -> Job {
        match self {
            QueueError::Full(job) | QueueError::Closed(job) => job,
        }
    }
}

/// Bounded in-process job queue. Enqueueing never waits.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => QueueError::Full(job),
            TrySendError::Closed(job) => QueueError::Closed(job),
        })
    }
}

/// Handle to the consumer task.
pub struct JobWorker {
    handle: JoinHandle<()>,
}

impl JobWorker {
    /// Waits for the consumer to drain the queue and exit.
    ///
    /// The consumer stops once every [`JobQueue`] clone has been dropped.
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Job worker terminated abnormally: {}", e);
        }
        tracing::info!("Background job worker shut down");
    }
}

/// Applies one job. Errors are logged, never propagated.
async fn process(store: &dyn Store, job: Job) {
    match job {
        Job::QuizServed { quiz_id } => {
            if let Err(e) = store.increment_served(quiz_id, Utc::now()).await {
                tracing::error!(quiz_id, "Failed to record quiz serve: {}", e);
            }
        }
    }
}

async fn consume(store: Arc<dyn Store>, mut receiver: mpsc::Receiver<Job>) {
    while let Some(job) = receiver.recv().await {
        tracing::debug!(job = job.name(), "Processing background job");
        process(store.as_ref(), job).await;
    }
}

/// Records that a quiz was served.
#[derive(Clone)]
pub struct ServeLedger {
    store: Arc<dyn Store>,
    queue: Option<JobQueue>,
}

impl ServeLedger {
    /// Ledger without a queue: every increment is applied inline.
    pub fn synchronous(store: Arc<dyn Store>) -> Self {
        Self { store, queue: None }
    }

    /// Starts the consumer task and returns a ledger feeding it.
    pub fn start(store: Arc<dyn Store>, capacity: usize) -> (Self, JobWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(consume(store.clone(), receiver));
        tracing::info!("Background job queue initialized (capacity {})", capacity.max(1));

        let ledger = Self {
            store,
            queue: Some(JobQueue { sender }),
        };
        (ledger, JobWorker { handle })
    }

    pub fn is_async(&self) -> bool {
        self.queue.is_some()
    }

    /// Hands the increment to the queue, or applies it inline when the queue
    /// cannot take it. Never fails.
    pub async fn record_served(&self, quiz_id: i64) {
        let job = Job::QuizServed { quiz_id };

        let job = match &self.queue {
            Some(queue) => match queue.enqueue(job) {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(quiz_id, "{}, recording serve inline", e);
                    e.into_job()
                }
            },
            None => job,
        };

        process(self.store.as_ref(), job).await;
    }
}
