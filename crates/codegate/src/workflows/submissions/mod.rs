//! Automated review of uploaded project archives.
//!
//! A submission points at a zip archive. Workers pull submission jobs off a
//! queue, evaluate the archive against every rule set bound to the project,
//! persist the verdict, and notify interested parties.

pub mod archive;
pub mod domain;
pub mod evaluation;
pub mod notify;
pub mod queue;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;

pub use archive::{ArchiveFetcher, ArchiveLoadError, ArchiveLoader};
pub use domain::{
    ArchiveFile, EvaluationResult, Finding, FindingLocation, ProjectId, Rule, RuleKind, RuleSet,
    Severity, Submission, SubmissionId, SubmissionStatus,
};
pub use evaluation::{EvaluationError, RuleConfigError, RuleEngine};
pub use notify::{LogNotifier, WebhookNotifier};
pub use queue::{
    JobHandler, QueueBackend, QueueBackendKind, QueueError, SubmissionJob, SubmissionQueue,
};
pub use repository::{
    Notifier, NotifyError, RepositoryError, RuleSetRepository, SubmissionEvent,
    SubmissionEventKind, SubmissionRepository,
};
pub use service::{ProcessError, ProcessOutcome, SubmissionProcessor};
