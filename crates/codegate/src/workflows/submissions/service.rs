use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::archive::{ArchiveFetcher, ArchiveLoadError};
use super::domain::{
    flatten_rules, EvaluationResult, Finding, Rule, Submission, SubmissionId, SubmissionStatus,
};
use super::evaluation::{EvaluationError, RuleEngine};
use super::queue::{JobHandler, SubmissionJob};
use super::repository::{
    Notifier, RepositoryError, RuleSetRepository, SubmissionEvent, SubmissionEventKind,
    SubmissionRepository,
};

/// What a processing attempt did with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The submission no longer exists; nothing was written.
    Skipped,
    Completed {
        status: SubmissionStatus,
        result: EvaluationResult,
    },
}

/// Failures that leave the submission untouched and warrant redelivery.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Everything that can go wrong between fetching the archive and producing
/// findings. Always folded into a synthetic finding, never returned.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Archive(#[from] ArchiveLoadError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("evaluation task failed: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

/// Orchestrates load → evaluate → persist → notify for one submission.
pub struct SubmissionProcessor<S, R, N, F> {
    submissions: Arc<S>,
    rule_sets: Arc<R>,
    notifier: Arc<N>,
    fetcher: Arc<F>,
    engine: RuleEngine,
}

impl<S, R, N, F> SubmissionProcessor<S, R, N, F>
where
    S: SubmissionRepository + 'static,
    R: RuleSetRepository + 'static,
    N: Notifier + 'static,
    F: ArchiveFetcher + 'static,
{
    pub fn new(submissions: Arc<S>, rule_sets: Arc<R>, notifier: Arc<N>, fetcher: Arc<F>) -> Self {
        Self {
            submissions,
            rule_sets,
            notifier,
            fetcher,
            engine: RuleEngine::new(),
        }
    }

    /// Process one submission. Every path that loads the submission ends with
    /// exactly one terminal write; only repository outages are returned.
    pub async fn process(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<ProcessOutcome, ProcessError> {
        let Some(mut submission) = self.submissions.fetch(submission_id).await? else {
            info!(%submission_id, "submission not found, dropping job");
            return Ok(ProcessOutcome::Skipped);
        };

        let rule_sets = self
            .rule_sets
            .rule_sets_for_project(&submission.project_id)
            .await?;
        let rules = flatten_rules(&rule_sets);

        let result = if rules.is_empty() {
            warn!(%submission_id, project_id = %submission.project_id, "no ruleset configured");
            EvaluationResult::from_findings(vec![Finding::system_error(
                "no ruleset configured for this project",
            )])
        } else if !RuleEngine::has_evaluable_rules(&rules) {
            warn!(%submission_id, rules = rules.len(), "no evaluable rules");
            RuleEngine::no_evaluable_rules()
        } else {
            self.mark_evaluating(&submission).await;
            self.evaluate(&submission, rules).await
        };

        let status = result.verdict();
        submission.status = status;
        submission.results = Some(result.clone());
        submission.evaluated_at = Some(Utc::now());
        self.submissions.save(submission).await?;

        info!(
            %submission_id,
            status = status.label(),
            findings = result.findings.len(),
            "submission evaluated"
        );
        metrics::counter!("codegate_submissions_processed_total", "status" => status.label())
            .increment(1);

        self.notify(submission_id, status).await;

        Ok(ProcessOutcome::Completed { status, result })
    }

    async fn mark_evaluating(&self, submission: &Submission) {
        let mut transient = submission.clone();
        transient.status = SubmissionStatus::Evaluating;
        if let Err(err) = self.submissions.save(transient).await {
            debug!(submission_id = %submission.id, error = %err, "could not mark submission as evaluating");
        }
    }

    async fn evaluate(&self, submission: &Submission, rules: Vec<Rule>) -> EvaluationResult {
        match self.attempt(&submission.archive, rules).await {
            Ok(result) => result,
            Err(err) => {
                error!(submission_id = %submission.id, error = %err, "rule evaluation failed");
                EvaluationResult::from_findings(vec![Finding::evaluation_error(format!(
                    "rule evaluation failed: {err}"
                ))])
            }
        }
    }

    async fn attempt(
        &self,
        location: &str,
        rules: Vec<Rule>,
    ) -> Result<EvaluationResult, AttemptError> {
        // A panic while fetching or decoding surfaces as `Aborted`.
        let fetcher = Arc::clone(&self.fetcher);
        let engine = self.engine;
        let location = location.to_string();
        tokio::spawn(async move {
            let files = fetcher.fetch(&location).await?;
            let result =
                tokio::task::spawn_blocking(move || engine.evaluate(&files, &rules)).await??;
            Ok::<_, AttemptError>(result)
        })
        .await?
    }

    async fn notify(&self, submission_id: &SubmissionId, status: SubmissionStatus) {
        let event = SubmissionEvent {
            event: SubmissionEventKind::Processed,
            submission_id: submission_id.clone(),
            status,
        };
        if let Err(err) = self.notifier.notify(event).await {
            warn!(%submission_id, error = %err, "submission notification failed");
        }
    }
}

#[async_trait]
impl<S, R, N, F> JobHandler for SubmissionProcessor<S, R, N, F>
where
    S: SubmissionRepository + 'static,
    R: RuleSetRepository + 'static,
    N: Notifier + 'static,
    F: ArchiveFetcher + 'static,
{
    async fn handle(&self, job: &SubmissionJob) -> Result<(), ProcessError> {
        self.process(&job.submission_id).await.map(|_| ())
    }
}
