use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::{
    backoff, log_join_result, retry_delay, run_job, shutdown_requested, JobHandler, QueueError,
    SubmissionJob, SubmissionQueue,
};
use crate::config::QueueConfig;
use crate::workflows::submissions::domain::SubmissionId;

/// Single-process queue backed by an unbounded channel. Jobs do not survive a
/// restart.
pub struct InProcessQueue {
    sender: mpsc::UnboundedSender<SubmissionJob>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<SubmissionJob>>>,
    concurrency: usize,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl InProcessQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            concurrency: config.worker_concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
        }
    }
}

#[async_trait]
impl SubmissionQueue for InProcessQueue {
    async fn enqueue(&self, submission_id: SubmissionId) -> Result<(), QueueError> {
        debug!(%submission_id, "job queued in process");
        self.sender
            .send(SubmissionJob::new(submission_id))
            .map_err(|_| QueueError::Closed)
    }

    async fn consume(
        &self,
        handler: Arc<dyn JobHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyConsuming)?;
        let mut tasks = JoinSet::new();

        info!(concurrency = self.concurrency, "in-process consumer started");

        while !shutdown_requested(&shutdown) {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join_result(joined),
                job = receiver.recv(), if tasks.len() < self.concurrency => {
                    let Some(job) = job else { break };
                    let handler = handler.clone();
                    let sender = self.sender.clone();
                    let max_attempts = self.max_attempts;
                    let delay = retry_delay(self.retry_backoff, job.attempt);
                    let mut shutdown = shutdown.clone();
                    tasks.spawn(async move {
                        let Some(retry) = run_job(handler.as_ref(), &job, max_attempts).await else {
                            return;
                        };
                        // Interrupted retries still go back on the channel for the next consumer.
                        backoff(delay, &mut shutdown).await;
                        if let Err(err) = sender.send(retry) {
                            error!(submission_id = %err.0.submission_id, "failed to requeue job");
                        }
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join_result(joined);
        }

        *self.receiver.lock().await = Some(receiver);
        info!("in-process consumer stopped");
        Ok(())
    }
}
