use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{ProjectId, RuleSet, Submission, SubmissionId, SubmissionStatus};

/// Submission storage. `save` overwrites the stored record, results included.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError>;
    async fn save(&self, submission: Submission) -> Result<(), RepositoryError>;
}

/// Read-only lookup of the rule sets bound to a project.
#[async_trait]
pub trait RuleSetRepository: Send + Sync {
    async fn rule_sets_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<RuleSet>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionEventKind {
    Processed,
}

/// Payload handed to the notifier once a submission reaches a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEvent {
    pub event: SubmissionEventKind,
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
}

/// Outbound hook (websocket fan-out, webhooks) informed after processing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: SubmissionEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}
