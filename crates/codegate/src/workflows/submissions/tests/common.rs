use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::workflows::submissions::archive::{ArchiveFetcher, ArchiveLoadError, FetchError};
use crate::workflows::submissions::domain::{
    ArchiveFile, ProjectId, Rule, RuleKind, RuleSet, Severity, Submission, SubmissionId,
};
use crate::workflows::submissions::repository::{
    Notifier, NotifyError, RepositoryError, RuleSetRepository, SubmissionEvent,
    SubmissionRepository,
};
use crate::workflows::submissions::service::SubmissionProcessor;

pub(super) const PROJECT: &str = "proj-1";
pub(super) const ARCHIVE: &str = "https://storage.test/archives/sub-1.zip";

pub(super) fn submission_id(value: &str) -> SubmissionId {
    SubmissionId(value.to_string())
}

pub(super) fn pending(id: &str) -> Submission {
    Submission::pending(submission_id(id), ProjectId(PROJECT.to_string()), ARCHIVE)
}

pub(super) fn rule(id: &str, kind: RuleKind, severity: Severity, payload: Value) -> Rule {
    Rule {
        id: id.to_string(),
        kind,
        severity,
        message: String::new(),
        payload,
    }
}

pub(super) fn rule_set(rules: Vec<Rule>) -> RuleSet {
    RuleSet {
        id: "rs-1".to_string(),
        name: "Default checks".to_string(),
        project_id: ProjectId(PROJECT.to_string()),
        rules,
    }
}

pub(super) fn sample_files() -> Vec<ArchiveFile> {
    vec![
        ArchiveFile::new("src/a.ts", "const token = 'secret';\nexport const a = 1;\n"),
        ArchiveFile::new("README.md", "# Project\n"),
    ]
}

pub(super) type TestProcessor =
    SubmissionProcessor<MemorySubmissions, MemoryRuleSets, RecordingNotifier, StubFetcher>;

pub(super) struct Harness {
    pub(super) processor: TestProcessor,
    pub(super) submissions: Arc<MemorySubmissions>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) fetcher: Arc<StubFetcher>,
}

pub(super) fn harness(rule_sets: Vec<RuleSet>, fetcher: StubFetcher) -> Harness {
    let submissions = Arc::new(MemorySubmissions::default());
    submissions.insert(pending("sub-1"));
    let rule_sets = Arc::new(MemoryRuleSets::new(rule_sets));
    let notifier = Arc::new(RecordingNotifier::default());
    let fetcher = Arc::new(fetcher);
    let processor = SubmissionProcessor::new(
        submissions.clone(),
        rule_sets,
        notifier.clone(),
        fetcher.clone(),
    );
    Harness {
        processor,
        submissions,
        notifier,
        fetcher,
    }
}

#[derive(Default)]
pub(super) struct MemorySubmissions {
    records: Mutex<HashMap<SubmissionId, Submission>>,
    saves: Mutex<Vec<Submission>>,
    unavailable: Mutex<bool>,
}

impl MemorySubmissions {
    pub(super) fn insert(&self, submission: Submission) {
        self.records
            .lock()
            .expect("submission mutex poisoned")
            .insert(submission.id.clone(), submission);
    }

    pub(super) fn get(&self, id: &str) -> Option<Submission> {
        self.records
            .lock()
            .expect("submission mutex poisoned")
            .get(&submission_id(id))
            .cloned()
    }

    pub(super) fn saves(&self) -> Vec<Submission> {
        self.saves.lock().expect("save log mutex poisoned").clone()
    }

    pub(super) fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().expect("flag mutex poisoned") = unavailable;
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if *self.unavailable.lock().expect("flag mutex poisoned") {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionRepository for MemorySubmissions {
    async fn fetch(&self, id: &SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .expect("submission mutex poisoned")
            .get(id)
            .cloned())
    }

    async fn save(&self, submission: Submission) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.saves
            .lock()
            .expect("save log mutex poisoned")
            .push(submission.clone());
        self.insert(submission);
        Ok(())
    }
}

pub(super) struct MemoryRuleSets {
    rule_sets: Vec<RuleSet>,
}

impl MemoryRuleSets {
    pub(super) fn new(rule_sets: Vec<RuleSet>) -> Self {
        Self { rule_sets }
    }
}

#[async_trait]
impl RuleSetRepository for MemoryRuleSets {
    async fn rule_sets_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<RuleSet>, RepositoryError> {
        Ok(self
            .rule_sets
            .iter()
            .filter(|rule_set| &rule_set.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<SubmissionEvent>>,
    reject: Mutex<bool>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<SubmissionEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn reject_all(&self) {
        *self.reject.lock().expect("notifier mutex poisoned") = true;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: SubmissionEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        if *self.reject.lock().expect("notifier mutex poisoned") {
            return Err(NotifyError::Rejected(503));
        }
        Ok(())
    }
}

/// Serves a swappable archive (or a fixed failure) and counts fetches.
pub(super) struct StubFetcher {
    files: Mutex<Option<Vec<ArchiveFile>>>,
    panics: bool,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub(super) fn serving(files: Vec<ArchiveFile>) -> Self {
        Self::with(Some(files), false)
    }

    pub(super) fn unreachable() -> Self {
        Self::with(None, false)
    }

    /// Panics mid-fetch, standing in for a decoder crash.
    pub(super) fn panicking() -> Self {
        Self::with(None, true)
    }

    fn with(files: Option<Vec<ArchiveFile>>, panics: bool) -> Self {
        Self {
            files: Mutex::new(files),
            panics,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn replace_files(&self, files: Vec<ArchiveFile>) {
        *self.files.lock().expect("fetcher mutex poisoned") = Some(files);
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveFetcher for StubFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<ArchiveFile>, ArchiveLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("archive decoder crashed on {location}");
        }
        match self.files.lock().expect("fetcher mutex poisoned").clone() {
            Some(files) => Ok(files),
            None => Err(FetchError::Io {
                location: location.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such object"),
            }
            .into()),
        }
    }
}
