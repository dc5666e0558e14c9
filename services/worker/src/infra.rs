use async_trait::async_trait;
use codegate::config::AppConfig;
use codegate::error::AppError;
use codegate::workflows::submissions::{
    LogNotifier, Notifier, NotifyError, ProjectId, RepositoryError, RuleSet, RuleSetRepository,
    Submission, SubmissionEvent, SubmissionId, SubmissionRepository, SubmissionStatus,
    WebhookNotifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seed data for the in-memory stores.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Fixtures {
    #[serde(default)]
    pub(crate) submissions: Vec<Submission>,
    #[serde(default)]
    pub(crate) rule_sets: Vec<RuleSet>,
}

impl Fixtures {
    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(crate) fn pending_ids(&self) -> Vec<SubmissionId> {
        self.submissions
            .iter()
            .filter(|submission| submission.status == SubmissionStatus::Pending)
            .map(|submission| submission.id.clone())
            .collect()
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySubmissionRepository {
    records: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
}

impl InMemorySubmissionRepository {
    pub(crate) fn seeded(submissions: Vec<Submission>) -> Self {
        let records = submissions
            .into_iter()
            .map(|submission| (submission.id.clone(), submission))
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SubmissionId, Submission>>, RepositoryError>
    {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("submission store poisoned".to_string()))
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn save(&self, submission: Submission) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&submission.id) {
            guard.insert(submission.id.clone(), submission);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRuleSetRepository {
    by_project: Arc<HashMap<ProjectId, Vec<RuleSet>>>,
}

impl InMemoryRuleSetRepository {
    pub(crate) fn seeded(rule_sets: Vec<RuleSet>) -> Self {
        let mut by_project: HashMap<ProjectId, Vec<RuleSet>> = HashMap::new();
        for rule_set in rule_sets {
            by_project
                .entry(rule_set.project_id.clone())
                .or_default()
                .push(rule_set);
        }
        Self {
            by_project: Arc::new(by_project),
        }
    }
}

#[async_trait]
impl RuleSetRepository for InMemoryRuleSetRepository {
    async fn rule_sets_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<RuleSet>, RepositoryError> {
        Ok(self.by_project.get(project_id).cloned().unwrap_or_default())
    }
}

/// Notifier picked from configuration at startup.
pub(crate) enum ConfiguredNotifier {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl ConfiguredNotifier {
    pub(crate) fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        match &config.notify_url {
            Some(url) => Ok(Self::Webhook(WebhookNotifier::build(
                url.clone(),
                config.archive.fetch_timeout,
            )?)),
            None => Ok(Self::Log(LogNotifier)),
        }
    }
}

#[async_trait]
impl Notifier for ConfiguredNotifier {
    async fn notify(&self, event: SubmissionEvent) -> Result<(), NotifyError> {
        match self {
            Self::Log(notifier) => notifier.notify(event).await,
            Self::Webhook(notifier) => notifier.notify(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixtures() -> Fixtures {
        serde_json::from_value(json!({
            "submissions": [
                { "id": "sub-1", "projectId": "proj-1", "archive": "/tmp/a.zip", "status": "PENDING" },
                { "id": "sub-2", "projectId": "proj-1", "archive": "/tmp/b.zip", "status": "PASSED" }
            ],
            "ruleSets": [
                {
                    "id": "rs-1",
                    "name": "Hygiene",
                    "projectId": "proj-1",
                    "rules": [
                        { "id": "readme", "type": "FILE_PATTERN", "severity": "ERROR",
                          "payload": { "require": ["README.md"] } }
                    ]
                }
            ]
        }))
        .expect("fixtures parse")
    }

    #[test]
    fn pending_ids_skip_evaluated_submissions() {
        assert_eq!(
            fixtures().pending_ids(),
            vec![SubmissionId("sub-1".to_string())]
        );
    }

    #[tokio::test]
    async fn rule_sets_are_grouped_by_project() {
        let repository = InMemoryRuleSetRepository::seeded(fixtures().rule_sets);
        let found = repository
            .rule_sets_for_project(&ProjectId("proj-1".to_string()))
            .await
            .expect("lookup succeeds");
        assert_eq!(found.len(), 1);
        let missing = repository
            .rule_sets_for_project(&ProjectId("proj-2".to_string()))
            .await
            .expect("lookup succeeds");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn saving_unknown_submission_is_rejected() {
        let repository = InMemorySubmissionRepository::seeded(fixtures().submissions);
        let stranger = Submission::pending(
            SubmissionId("sub-9".to_string()),
            ProjectId("proj-1".to_string()),
            "/tmp/c.zip",
        );
        assert!(matches!(
            repository.save(stranger).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
