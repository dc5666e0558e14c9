use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::repository::{Notifier, NotifyError, SubmissionEvent};

/// Notifier that only records the event in the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: SubmissionEvent) -> Result<(), NotifyError> {
        info!(
            submission_id = %event.submission_id,
            status = event.status.label(),
            "submission processed"
        );
        Ok(())
    }
}

/// Posts each event as JSON to a configured endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Builds a notifier with its own client bounded by `timeout`.
    pub fn build(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, endpoint))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: SubmissionEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&event)
            .send()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}
