use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{
    backoff, log_join_result, retry_delay, run_job, shutdown_requested, JobHandler, QueueError,
    SubmissionJob, SubmissionQueue,
};
use crate::config::QueueConfig;
use crate::workflows::submissions::domain::SubmissionId;

/// Seconds a blocking pop waits before re-checking for shutdown.
const POP_TIMEOUT_SECS: u64 = 1;

/// Redis reliable-list queue. Producers `LPUSH` onto the queue list; each
/// worker atomically moves jobs onto its own processing list and removes them
/// once handled, so a crashed worker's jobs are redelivered on its next start.
pub struct BrokerQueue {
    client: redis::Client,
    connection: MultiplexedConnection,
    queue_key: String,
    processing_key: String,
    concurrency: usize,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl BrokerQueue {
    pub async fn connect(url: &str, config: &QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            connection,
            queue_key: config.queue_name.clone(),
            processing_key: processing_key(&config.queue_name, &config.worker_id),
            concurrency: config.worker_concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
        })
    }

    /// Moves jobs left on this worker's processing list back onto the queue.
    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut connection = self.connection.clone();
        let mut recovered = 0;
        loop {
            let moved: Option<String> = redis::cmd("RPOPLPUSH")
                .arg(&self.processing_key)
                .arg(&self.queue_key)
                .query_async(&mut connection)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Starts a task for one popped payload. Malformed payloads are dropped
    /// from the processing list straight away.
    async fn dispatch(
        &self,
        tasks: &mut JoinSet<()>,
        handler: &Arc<dyn JobHandler>,
        shutdown: &watch::Receiver<bool>,
        payload: String,
    ) {
        let mut connection = self.connection.clone();
        let job = match serde_json::from_str::<SubmissionJob>(&payload) {
            Ok(job) => job,
            Err(err) => {
                error!(error = %err, payload = %payload, "discarding malformed job");
                if let Err(err) = acknowledge(&mut connection, &self.processing_key, &payload).await {
                    error!(error = %err, "failed to discard malformed job");
                }
                return;
            }
        };

        let handler = handler.clone();
        let mut shutdown = shutdown.clone();
        let queue_key = self.queue_key.clone();
        let processing_key = self.processing_key.clone();
        let max_attempts = self.max_attempts;
        let delay = retry_delay(self.retry_backoff, job.attempt);
        tasks.spawn(async move {
            if let Some(retry) = run_job(handler.as_ref(), &job, max_attempts).await {
                // Unacknowledged jobs stay on the processing list for recovery.
                if !backoff(delay, &mut shutdown).await {
                    info!(submission_id = %retry.submission_id, "shutdown during retry backoff, leaving job in flight");
                    return;
                }
                if let Err(err) = push(&mut connection, &queue_key, &retry).await {
                    error!(submission_id = %retry.submission_id, error = %err, "failed to requeue job");
                    return;
                }
            }
            if let Err(err) = acknowledge(&mut connection, &processing_key, &payload).await {
                error!(submission_id = %job.submission_id, error = %err, "failed to acknowledge job");
            }
        });
    }
}

fn processing_key(queue_name: &str, worker_id: &str) -> String {
    format!("{queue_name}:processing:{worker_id}")
}

async fn push(
    connection: &mut MultiplexedConnection,
    queue_key: &str,
    job: &SubmissionJob,
) -> Result<(), QueueError> {
    let payload = serde_json::to_string(job)?;
    let _: () = redis::cmd("LPUSH")
        .arg(queue_key)
        .arg(payload)
        .query_async(connection)
        .await?;
    Ok(())
}

async fn pop(
    mut connection: MultiplexedConnection,
    command: redis::Cmd,
) -> redis::RedisResult<Option<String>> {
    command.query_async(&mut connection).await
}

async fn acknowledge(
    connection: &mut MultiplexedConnection,
    processing_key: &str,
    payload: &str,
) -> Result<(), QueueError> {
    let _: () = redis::cmd("LREM")
        .arg(processing_key)
        .arg(1)
        .arg(payload)
        .query_async(connection)
        .await?;
    Ok(())
}

#[async_trait]
impl SubmissionQueue for BrokerQueue {
    async fn enqueue(&self, submission_id: SubmissionId) -> Result<(), QueueError> {
        let mut connection = self.connection.clone();
        push(
            &mut connection,
            &self.queue_key,
            &SubmissionJob::new(submission_id.clone()),
        )
        .await?;
        debug!(%submission_id, queue = %self.queue_key, "job published to broker");
        Ok(())
    }

    async fn consume(
        &self,
        handler: Arc<dyn JobHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        let recovered = self.recover_in_flight().await?;
        if recovered > 0 {
            warn!(recovered, "requeued jobs left in flight by a previous run");
        }

        // Blocking pops get their own connection so they never stall acks.
        let blocking = self.client.get_multiplexed_async_connection().await?;
        let mut pop_command = redis::cmd("BRPOPLPUSH");
        pop_command
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg(POP_TIMEOUT_SECS);
        let mut tasks = JoinSet::new();

        info!(
            queue = %self.queue_key,
            concurrency = self.concurrency,
            "broker consumer started"
        );

        // One pop stays in flight across iterations. A dropped BRPOPLPUSH
        // would strand the job it moves onto the processing list.
        let mut stopping = shutdown_requested(&shutdown);
        let pop_future = pop(blocking.clone(), pop_command.clone());
        tokio::pin!(pop_future);
        let mut pop_armed = !stopping;

        loop {
            if !pop_armed && !stopping && tasks.len() < self.concurrency {
                pop_future.set(pop(blocking.clone(), pop_command.clone()));
                pop_armed = true;
            }
            if stopping && !pop_armed {
                break;
            }

            tokio::select! {
                changed = shutdown.changed(), if !stopping => {
                    if changed.is_err() || shutdown_requested(&shutdown) {
                        stopping = true;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join_result(joined),
                popped = &mut pop_future, if pop_armed => {
                    pop_armed = false;
                    match popped {
                        Ok(Some(payload)) => {
                            self.dispatch(&mut tasks, &handler, &shutdown, payload).await;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            error!(error = %err, "failed to pop job from broker");
                            tokio::time::sleep(Duration::from_secs(POP_TIMEOUT_SECS)).await;
                        }
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join_result(joined);
        }

        info!(queue = %self.queue_key, "broker consumer stopped");
        Ok(())
    }
}
