//! Analysis jobs
//!
//! An [`AnalysisJob`] tracks one URL through the pipeline stages. Jobs are
//! persisted through a [`JobRepository`] after every transition and become
//! immutable once they reach `Completed` or `Failed`.

mod orchestrator;
mod registry;

pub use orchestrator::Orchestrator;

use crate::error::{Error, ErrorKind, Result};
use crate::nlp::NlpResult;
use crate::platform::PlatformVariant;
use crate::seo::ScoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Pipeline stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Detecting,
    Fetching,
    /// Waiting to fetch again after a transient outcome
    Retrying,
    Normalizing,
    Analyzing,
    Scoring,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Detecting => "detecting",
            JobStage::Fetching => "fetching",
            JobStage::Retrying => "retrying",
            JobStage::Normalizing => "normalizing",
            JobStage::Analyzing => "analyzing",
            JobStage::Scoring => "scoring",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// Progress reported on entering this stage; `None` keeps the previous value
    pub fn progress(&self) -> Option<u8> {
        match self {
            JobStage::Queued => Some(0),
            JobStage::Detecting => Some(10),
            JobStage::Fetching | JobStage::Retrying => Some(30),
            JobStage::Normalizing => Some(50),
            JobStage::Analyzing => Some(70),
            JobStage::Scoring => Some(90),
            JobStage::Completed => Some(100),
            JobStage::Failed => None,
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStage::Queued),
            "detecting" => Ok(JobStage::Detecting),
            "fetching" => Ok(JobStage::Fetching),
            "retrying" => Ok(JobStage::Retrying),
            "normalizing" => Ok(JobStage::Normalizing),
            "analyzing" => Ok(JobStage::Analyzing),
            "scoring" => Ok(JobStage::Scoring),
            "completed" => Ok(JobStage::Completed),
            "failed" => Ok(JobStage::Failed),
            _ => Err(Error::Internal(format!("Unknown job stage: {}", s))),
        }
    }
}

/// One recorded stage change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: JobStage,
    pub progress_percent: u8,
    pub at: DateTime<Utc>,
}

/// What was fetched and normalized, kept with the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub title: String,
    pub final_url: String,
    pub language: String,
    pub word_count: usize,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub status_code: u16,
    pub rendered: bool,
    pub fetch_attempts: u32,
    pub elapsed_ms: u64,
    pub content_hash: String,
}

/// Composite result of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub document: DocumentSummary,
    pub score: ScoreResult,
    pub nlp: NlpResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub target_url: String,
    /// Target keywords as submitted (empty means auto-derived)
    pub keywords: Vec<String>,
    pub stage: JobStage,
    /// Fetch attempts made at the job level
    pub attempt_count: u32,
    pub progress_percent: u8,
    pub platform: Option<PlatformVariant>,
    pub result: Option<AnalysisOutput>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Last completed job for the same URL at submission time
    pub supersedes: Option<Uuid>,
    pub history: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn new(target_url: impl Into<String>, keywords: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.into(),
            keywords,
            stage: JobStage::Queued,
            attempt_count: 0,
            progress_percent: 0,
            platform: None,
            result: None,
            error_kind: None,
            error_message: None,
            supersedes: None,
            history: vec![StageTransition {
                stage: JobStage::Queued,
                progress_percent: 0,
                at: now,
            }],
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::Internal(format!(
                "job {} is {} and can no longer change",
                self.id, self.stage
            )));
        }
        Ok(())
    }

    /// Move to a non-terminal stage, recording the transition
    pub fn transition(&mut self, stage: JobStage) -> Result<()> {
        self.ensure_mutable()?;
        if stage.is_terminal() {
            return Err(Error::Internal(format!(
                "use complete() or fail() to enter {}",
                stage
            )));
        }
        self.record(stage);
        Ok(())
    }

    pub fn complete(&mut self, output: AnalysisOutput) -> Result<()> {
        self.ensure_mutable()?;
        self.result = Some(output);
        self.record(JobStage::Completed);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        self.record(JobStage::Failed);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    fn record(&mut self, stage: JobStage) {
        let now = Utc::now();
        if let Some(progress) = stage.progress() {
            self.progress_percent = progress;
        }
        self.stage = stage;
        self.updated_at = now;
        self.history.push(StageTransition {
            stage,
            progress_percent: self.progress_percent,
            at: now,
        });
    }
}

/// Exported artifact of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// The job without its embedded result
    pub job: AnalysisJob,
    pub document: DocumentSummary,
    pub score: ScoreResult,
    pub nlp: NlpResult,
}

impl AnalysisReport {
    /// Report for a completed job; `None` while the job has no result
    pub fn from_job(job: &AnalysisJob) -> Option<Self> {
        let output = job.result.clone()?;
        let mut job = job.clone();
        job.result = None;
        Some(Self {
            job,
            document: output.document,
            score: output.score,
            nlp: output.nlp,
        })
    }
}

/// Durable job storage
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert or replace a job, regardless of who holds it
    async fn save(&self, job: &AnalysisJob) -> Result<()>;

    /// Overwrite a job only while it has not finished, whoever holds it.
    /// `false` when it already reached a terminal stage.
    async fn save_if_active(&self, job: &AnalysisJob) -> Result<bool>;

    /// Insert a new job under `lease` unless its URL already has a
    /// non-terminal job. Returns whichever job now holds the URL.
    async fn create(&self, job: &AnalysisJob, lease: &Lease) -> Result<AnalysisJob>;

    /// Take a non-terminal job that is unowned, already ours, or whose
    /// owner let its lease run out
    async fn claim(&self, id: Uuid, lease: &Lease) -> Result<bool>;

    /// Extend our lease; `false` once the job is terminal or held by someone else
    async fn renew(&self, id: Uuid, lease: &Lease) -> Result<bool>;

    /// Write a job we hold, extending the lease. A terminal job is released.
    /// `false` (and nothing written) when we no longer hold it.
    async fn save_claimed(&self, job: &AnalysisJob, lease: &Lease) -> Result<bool>;

    async fn load(&self, id: Uuid) -> Result<Option<AnalysisJob>>;

    /// The non-terminal job for a URL, if any
    async fn find_active_by_url(&self, url: &str) -> Result<Option<AnalysisJob>>;

    /// Every non-terminal job, oldest first
    async fn list_active(&self) -> Result<Vec<AnalysisJob>>;

    /// Most recently created jobs first
    async fn list_recent(&self, limit: usize) -> Result<Vec<AnalysisJob>>;

    async fn latest_completed_for_url(&self, url: &str) -> Result<Option<AnalysisJob>>;
}

/// One process's hold on a job.
///
/// Only the owner advances a leased job. The owner renews well before
/// `until`; a lease that runs out means the owner is gone and the job may
/// be claimed by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub owner: Uuid,
    pub until: DateTime<Utc>,
}

impl Lease {
    pub fn new(owner: Uuid, length: chrono::Duration) -> Self {
        Self {
            owner,
            until: Utc::now() + length,
        }
    }

    /// Whether `claimant` may take over a job held under this lease
    pub fn yields_to(&self, claimant: Uuid, now: DateTime<Utc>) -> bool {
        self.owner == claimant || self.until <= now
    }
}

struct Record {
    job: AnalysisJob,
    lease: Option<Lease>,
}

impl Record {
    fn claimable_by(&self, claimant: Uuid, now: DateTime<Utc>) -> bool {
        !self.job.is_terminal()
            && self
                .lease
                .map_or(true, |lease| lease.yields_to(claimant, now))
    }

    fn held_by(&self, owner: Uuid) -> bool {
        !self.job.is_terminal() && self.lease.map_or(false, |lease| lease.owner == owner)
    }
}

/// In-process repository
#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<BTreeMap<Uuid, Record>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn save(&self, job: &AnalysisJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let lease = jobs.get(&job.id).and_then(|r| r.lease);
        jobs.insert(
            job.id,
            Record {
                job: job.clone(),
                lease,
            },
        );
        Ok(())
    }

    async fn save_if_active(&self, job: &AnalysisJob) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(record) if !record.job.is_terminal() => {
                record.job = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create(&self, job: &AnalysisJob, lease: &Lease) -> Result<AnalysisJob> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs
            .values()
            .find(|r| r.job.target_url == job.target_url && !r.job.is_terminal())
        {
            return Ok(existing.job.clone());
        }
        jobs.insert(
            job.id,
            Record {
                job: job.clone(),
                lease: Some(*lease),
            },
        );
        Ok(job.clone())
    }

    async fn claim(&self, id: Uuid, lease: &Lease) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(record) if record.claimable_by(lease.owner, Utc::now()) => {
                record.lease = Some(*lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renew(&self, id: Uuid, lease: &Lease) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(record) if record.held_by(lease.owner) => {
                record.lease = Some(*lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_claimed(&self, job: &AnalysisJob, lease: &Lease) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(record) if record.held_by(lease.owner) => {
                record.job = job.clone();
                record.lease = (!job.is_terminal()).then_some(*lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        Ok(self.jobs.read().await.get(&id).map(|r| r.job.clone()))
    }

    async fn find_active_by_url(&self, url: &str) -> Result<Option<AnalysisJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .map(|r| &r.job)
            .find(|j| j.target_url == url && !j.is_terminal())
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<AnalysisJob>> {
        let mut jobs: Vec<AnalysisJob> = self
            .jobs
            .read()
            .await
            .values()
            .map(|r| &r.job)
            .filter(|j| !j.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AnalysisJob>> {
        let mut jobs: Vec<AnalysisJob> = self.jobs.read().await.values().map(|r| r.job.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn latest_completed_for_url(&self, url: &str) -> Result<Option<AnalysisJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .map(|r| &r.job)
            .filter(|j| j.target_url == url && j.stage == JobStage::Completed)
            .max_by(|a, b| a.completed_at.cmp(&b.completed_at))
            .cloned())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::nlp::{Analysis, NlpResult};
    use crate::seo::score_document;

    /// A minimal completed-job output
    pub fn output() -> AnalysisOutput {
        let doc = crate::seo::test_support::document("Title", "Body text.");
        let score = score_document(&doc, &["body".to_string()], &Default::default());
        AnalysisOutput {
            document: DocumentSummary {
                title: doc.title.clone(),
                final_url: doc.url.clone(),
                language: doc.language.clone(),
                word_count: doc.word_count(),
                author: None,
                published_at: None,
                status_code: 200,
                rendered: false,
                fetch_attempts: 1,
                elapsed_ms: 12,
                content_hash: String::new(),
            },
            score,
            nlp: NlpResult {
                language: "en".to_string(),
                tokenizer: "english".to_string(),
                token_count: 2,
                keywords: Analysis::Available { value: Vec::new() },
                topics: Analysis::Available { value: Vec::new() },
                sentiment: Analysis::Unavailable {
                    reason: "test".to_string(),
                },
                unavailable: vec!["sentiment".to_string()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::output;
    use super::*;

    #[test]
    fn test_progress_schedule() {
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        let expected = [
            (JobStage::Detecting, 10),
            (JobStage::Fetching, 30),
            (JobStage::Retrying, 30),
            (JobStage::Fetching, 30),
            (JobStage::Normalizing, 50),
            (JobStage::Analyzing, 70),
            (JobStage::Scoring, 90),
        ];
        for (stage, progress) in expected {
            job.transition(stage).unwrap();
            assert_eq!(job.progress_percent, progress, "{}", stage);
        }
        job.complete(output()).unwrap();
        assert_eq!(job.progress_percent, 100);
        assert_eq!(job.history.len(), expected.len() + 2);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_failed_keeps_progress_and_is_immutable() {
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        job.transition(JobStage::Detecting).unwrap();
        job.transition(JobStage::Fetching).unwrap();
        job.fail(ErrorKind::FetchFailed, "HTTP 404").unwrap();

        assert_eq!(job.stage, JobStage::Failed);
        assert_eq!(job.progress_percent, 30);
        assert_eq!(job.error_kind, Some(ErrorKind::FetchFailed));

        assert!(job.transition(JobStage::Fetching).is_err());
        assert!(job.complete(output()).is_err());
        assert!(job.fail(ErrorKind::InternalError, "again").is_err());
        assert_eq!(job.error_message.as_deref(), Some("HTTP 404"));
    }

    #[test]
    fn test_terminal_stages_need_explicit_calls() {
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        assert!(job.transition(JobStage::Completed).is_err());
        assert!(job.transition(JobStage::Failed).is_err());
    }

    #[test]
    fn test_stage_strings() {
        for stage in [JobStage::Queued, JobStage::Retrying, JobStage::Completed] {
            assert_eq!(stage.as_str().parse::<JobStage>().unwrap(), stage);
        }
        assert!("paused".parse::<JobStage>().is_err());
    }

    #[test]
    fn test_report_from_job() {
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        assert!(AnalysisReport::from_job(&job).is_none());
        job.transition(JobStage::Scoring).unwrap();
        job.complete(output()).unwrap();

        let report = AnalysisReport::from_job(&job).unwrap();
        assert!(report.job.result.is_none());
        assert_eq!(report.document.status_code, 200);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["job"]["stage"], "completed");
    }

    #[tokio::test]
    async fn test_memory_repository() {
        let repo = MemoryJobRepository::new();
        let mut first = AnalysisJob::new("https://a.test/post", vec![]);
        repo.save(&first).await.unwrap();

        assert_eq!(repo.find_active_by_url("https://a.test/post").await.unwrap().map(|j| j.id), Some(first.id));
        assert_eq!(repo.list_active().await.unwrap().len(), 1);

        first.transition(JobStage::Scoring).unwrap();
        first.complete(output()).unwrap();
        repo.save(&first).await.unwrap();

        assert!(repo.find_active_by_url("https://a.test/post").await.unwrap().is_none());
        assert_eq!(
            repo.latest_completed_for_url("https://a.test/post").await.unwrap().map(|j| j.id),
            Some(first.id)
        );

        let second = AnalysisJob::new("https://b.test/post", vec![]);
        repo.save(&second).await.unwrap();
        let recent = repo.list_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, second.id);
        assert_eq!(repo.load(first.id).await.unwrap().unwrap().stage, JobStage::Completed);
    }

    fn lease(owner: Uuid, ms: i64) -> Lease {
        Lease::new(owner, chrono::Duration::milliseconds(ms))
    }

    #[tokio::test]
    async fn test_create_yields_to_active_job() {
        let repo = MemoryJobRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = AnalysisJob::new("https://a.test/post", vec![]);
        assert_eq!(repo.create(&first, &lease(a, 60_000)).await.unwrap().id, first.id);

        let second = AnalysisJob::new("https://a.test/post", vec![]);
        assert_eq!(repo.create(&second, &lease(b, 60_000)).await.unwrap().id, first.id);
        assert!(repo.load(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_live_lease() {
        let repo = MemoryJobRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        repo.save(&job).await.unwrap();

        // Unowned jobs are free to take
        assert!(repo.claim(job.id, &lease(a, 60_000)).await.unwrap());
        assert!(!repo.claim(job.id, &lease(b, 60_000)).await.unwrap());
        assert!(!repo.renew(job.id, &lease(b, 60_000)).await.unwrap());
        assert!(repo.renew(job.id, &lease(a, 60_000)).await.unwrap());

        job.transition(JobStage::Detecting).unwrap();
        assert!(!repo.save_claimed(&job, &lease(b, 60_000)).await.unwrap());
        assert_eq!(repo.load(job.id).await.unwrap().unwrap().stage, JobStage::Queued);
        assert!(repo.save_claimed(&job, &lease(a, 60_000)).await.unwrap());
        assert_eq!(repo.load(job.id).await.unwrap().unwrap().stage, JobStage::Detecting);
    }

    #[tokio::test]
    async fn test_lapsed_lease_can_be_taken_over() {
        let repo = MemoryJobRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        repo.create(&job, &lease(a, -1)).await.unwrap();

        assert!(repo.claim(job.id, &lease(b, 60_000)).await.unwrap());
        // The previous owner can no longer write
        job.transition(JobStage::Detecting).unwrap();
        assert!(!repo.save_claimed(&job, &lease(a, 60_000)).await.unwrap());
        assert!(!repo.renew(job.id, &lease(a, 60_000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_jobs_cannot_be_claimed() {
        let repo = MemoryJobRepository::new();
        let owner = Uuid::new_v4();
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        repo.create(&job, &lease(owner, 60_000)).await.unwrap();

        job.fail(ErrorKind::Cancelled, "cancelled elsewhere").unwrap();
        repo.save(&job).await.unwrap();

        assert!(!repo.renew(job.id, &lease(owner, 60_000)).await.unwrap());
        assert!(!repo.claim(job.id, &lease(owner, 60_000)).await.unwrap());
        assert!(!repo.save_claimed(&job, &lease(owner, 60_000)).await.unwrap());
        assert!(!repo.save_if_active(&job).await.unwrap());
    }
}
