//! Delivery of submission jobs to the processor.
//!
//! Two interchangeable backends sit behind [`SubmissionQueue`]: a Redis-backed
//! broker for multi-process deployments and an in-process channel for local
//! runs and tests. The backend is chosen once at startup by
//! [`QueueBackend::from_config`] and handed to the worker loop by reference.

mod broker;
mod in_process;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, warn};

use super::domain::SubmissionId;
use super::service::ProcessError;
use crate::config::QueueConfig;

pub use broker::BrokerQueue;
pub use in_process::InProcessQueue;

/// One unit of work: evaluate a single submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionJob {
    pub submission_id: SubmissionId,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl SubmissionJob {
    pub fn new(submission_id: SubmissionId) -> Self {
        Self {
            submission_id,
            attempt: first_attempt(),
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            submission_id: self.submission_id.clone(),
            attempt: self.attempt.saturating_add(1),
        }
    }
}

/// Receives delivered jobs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &SubmissionJob) -> Result<(), ProcessError>;
}

#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    async fn enqueue(&self, submission_id: SubmissionId) -> Result<(), QueueError>;

    /// Delivers jobs to `handler` until `shutdown` flips to `true` (or its
    /// sender is dropped), then waits for in-flight jobs.
    async fn consume(
        &self,
        handler: Arc<dyn JobHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),
    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("queue already has an active consumer")]
    AlreadyConsuming,
    #[error("queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackendKind {
    Broker,
    InProcess,
}

impl QueueBackendKind {
    /// A broker is used whenever one is configured, unless explicitly overridden.
    pub fn select(config: &QueueConfig) -> Self {
        match (&config.broker_url, config.force_in_process) {
            (Some(_), false) => Self::Broker,
            _ => Self::InProcess,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::InProcess => "in-process",
        }
    }
}

/// The queue strategy selected for this process.
pub enum QueueBackend {
    Broker(BrokerQueue),
    InProcess(InProcessQueue),
}

impl QueueBackend {
    pub async fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        match (config.broker_url.as_deref(), config.force_in_process) {
            (Some(url), false) => Ok(Self::Broker(BrokerQueue::connect(url, config).await?)),
            _ => Ok(Self::InProcess(InProcessQueue::new(config))),
        }
    }

    pub fn kind(&self) -> QueueBackendKind {
        match self {
            Self::Broker(_) => QueueBackendKind::Broker,
            Self::InProcess(_) => QueueBackendKind::InProcess,
        }
    }
}

#[async_trait]
impl SubmissionQueue for QueueBackend {
    async fn enqueue(&self, submission_id: SubmissionId) -> Result<(), QueueError> {
        match self {
            Self::Broker(queue) => queue.enqueue(submission_id).await,
            Self::InProcess(queue) => queue.enqueue(submission_id).await,
        }
    }

    async fn consume(
        &self,
        handler: Arc<dyn JobHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        match self {
            Self::Broker(queue) => queue.consume(handler, shutdown).await,
            Self::InProcess(queue) => queue.consume(handler, shutdown).await,
        }
    }
}

/// Runs one delivery and returns the job to redeliver, if any.
pub(crate) async fn run_job(
    handler: &dyn JobHandler,
    job: &SubmissionJob,
    max_attempts: u32,
) -> Option<SubmissionJob> {
    match handler.handle(job).await {
        Ok(()) => None,
        Err(err) if job.attempt < max_attempts => {
            warn!(
                submission_id = %job.submission_id,
                attempt = job.attempt,
                error = %err,
                "job failed, scheduling redelivery"
            );
            Some(job.next_attempt())
        }
        Err(err) => {
            error!(
                submission_id = %job.submission_id,
                attempt = job.attempt,
                error = %err,
                "job failed permanently"
            );
            metrics::counter!("codegate_jobs_failed_total").increment(1);
            None
        }
    }
}

/// Largest doubling applied to the base retry delay (64x).
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Delay before redelivering a job whose attempt number `attempt` just failed.
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1 << exponent)
}

/// Waits out `delay`. Returns `false` if shutdown was requested first.
pub(crate) async fn backoff(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        if shutdown_requested(shutdown) {
            return false;
        }
        tokio::select! {
            () = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Panicking job tasks are logged here instead of taking the worker down.
pub(crate) fn log_join_result(result: Result<(), JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "job task terminated abnormally");
        metrics::counter!("codegate_jobs_failed_total").increment(1);
    }
}

pub(crate) fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}
