//! Job orchestration
//!
//! Runs each job through `Detecting → Fetching → Normalizing → Analyzing →
//! Scoring` on a bounded worker pool. Submission is idempotent per URL,
//! cancellation is observed at stage boundaries, and every transition is
//! persisted before it is published to waiters.
//!
//! Several processes may share one repository. Each job is advanced only by
//! the process holding its lease; others follow its persisted state and take
//! it over if the holder stops renewing.

use super::registry::JobRegistry;
use super::{AnalysisJob, AnalysisOutput, DocumentSummary, JobRepository, JobStage, Lease};
use crate::config::{JobConfig, ScoringConfig};
use crate::crawl::{Crawler, FetchResult};
use crate::error::{Error, ErrorKind, Result};
use crate::nlp::NlpEngine;
use crate::normalize::normalize;
use crate::platform::{detect, select_strategy, FetchStrategy, PlatformVariant};
use crate::seo::score_document;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// How often a job run by another process is re-read
const FOLLOW_POLL: Duration = Duration::from_millis(200);

/// Schedules and runs analysis jobs
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    crawler: Arc<Crawler>,
    nlp: Arc<NlpEngine>,
    scoring: ScoringConfig,
    jobs: JobConfig,
    repository: Arc<dyn JobRepository>,
    registry: Mutex<JobRegistry>,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    /// Identifies this orchestrator in job leases
    owner: Uuid,
}

enum Followed {
    /// Finished, or no longer tracked here
    Settled,
    /// The holder's lease ran out and this process took the job
    Claimed,
}

/// Canonical form used as the deduplication key.
///
/// Fragments never reach the server, so `post#a` and `post#b` are one page.
fn canonical_url(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url.trim())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!("Unsupported URL scheme: {}", url)));
    }
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

impl Orchestrator {
    pub fn new(
        crawler: Arc<Crawler>,
        nlp: Arc<NlpEngine>,
        scoring: ScoringConfig,
        jobs: JobConfig,
        repository: Arc<dyn JobRepository>,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(jobs.workers.max(1)));
        let owner = Uuid::new_v4();
        debug!("Orchestrator {} starting with {} workers", owner, jobs.workers.max(1));
        Self {
            inner: Arc::new(Inner {
                crawler,
                nlp,
                scoring,
                jobs,
                repository,
                registry: Mutex::new(JobRegistry::default()),
                workers,
                shutdown: CancellationToken::new(),
                owner,
            }),
        }
    }

    /// Queue a URL for analysis.
    ///
    /// Returns the id of the existing job when the URL already has a
    /// non-terminal one, in this process or persisted by another. A persisted
    /// job is run here only if nobody else holds its lease; otherwise this
    /// orchestrator follows it.
    pub async fn submit(&self, url: &str, keywords: Vec<String>) -> Result<Uuid> {
        let target = canonical_url(url)?;
        let mut registry = self.inner.registry.lock().await;

        if let Some(id) = registry.active_for(&target) {
            debug!("Job {} already active for {}", id, target);
            return Ok(id);
        }

        let holder = match self.inner.repository.find_active_by_url(&target).await? {
            Some(existing) => existing,
            None => {
                let mut job = AnalysisJob::new(target.clone(), keywords);
                job.supersedes = self
                    .inner
                    .repository
                    .latest_completed_for_url(&target)
                    .await?
                    .map(|previous| previous.id);

                let holder = self.inner.repository.create(&job, &self.inner.lease()).await?;
                if holder.id == job.id {
                    let id = job.id;
                    let cancel = registry.register(job, &self.inner.shutdown, true);
                    drop(registry);

                    info!("Queued job {} for {}", id, target);
                    self.spawn(id, cancel, true);
                    return Ok(id);
                }
                // Another process created one first
                holder
            }
        };

        let id = holder.id;
        let owned = self.inner.repository.claim(id, &self.inner.lease()).await?;
        let job = if owned {
            info!("Resuming persisted job {} for {}", id, target);
            self.inner.repository.load(id).await?.unwrap_or(holder)
        } else {
            info!("Job {} for {} is running elsewhere, following it", id, target);
            holder
        };
        let cancel = registry.register(job, &self.inner.shutdown, owned);
        drop(registry);

        self.spawn(id, cancel, owned);
        Ok(id)
    }

    fn spawn(&self, id: Uuid, cancel: CancellationToken, owned: bool) {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.drive(id, cancel, owned).await });
    }

    /// Request cancellation; `false` when the job is already terminal
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        {
            let registry = self.inner.registry.lock().await;
            if let Some(handle) = registry.get(&id) {
                if handle.state.borrow().is_terminal() {
                    return Ok(false);
                }
                if handle.owned {
                    info!("Cancelling job {}", id);
                    handle.cancel.cancel();
                    return Ok(true);
                }
            }
        }

        // Run by another process, or not tracked here at all. The holder
        // notices at its next write or lease renewal.
        let mut job = self
            .inner
            .repository
            .load(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if job.is_terminal() {
            return Ok(false);
        }
        job.fail(ErrorKind::Cancelled, format!("Job cancelled: {}", id))?;
        let cancelled = self.inner.repository.save_if_active(&job).await?;
        if cancelled {
            info!("Cancelled job {} held by another process", id);
        }
        Ok(cancelled)
    }

    /// Cancel every running job
    pub fn cancel_all(&self) {
        self.inner.shutdown.cancel();
    }

    /// Wait for a job to reach `Completed` or `Failed`
    pub async fn wait(&self, id: Uuid) -> Result<AnalysisJob> {
        let receiver = self.inner.registry.lock().await.subscribe(&id);
        if let Some(mut receiver) = receiver {
            if let Ok(job) = receiver.wait_for(|job| job.is_terminal()).await {
                return Ok(job.clone());
            }
            debug!("Stopped tracking job {} before it finished", id);
        }
        self.inner
            .repository
            .load(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Live updates for a job tracked by this orchestrator
    pub async fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<AnalysisJob>> {
        self.inner
            .registry
            .lock()
            .await
            .subscribe(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Current state of a job
    pub async fn snapshot(&self, id: Uuid) -> Result<AnalysisJob> {
        if let Some(job) = self.inner.registry.lock().await.snapshot(&id) {
            return Ok(job);
        }
        self.inner
            .repository
            .load(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Re-queue non-terminal jobs left in the repository by an earlier run.
    ///
    /// Jobs another live process holds are left to it.
    pub async fn resume_pending(&self) -> Result<Vec<Uuid>> {
        let pending = self.inner.repository.list_active().await?;
        let mut resumed = Vec::new();

        for job in pending {
            let mut registry = self.inner.registry.lock().await;
            if registry.contains(&job.id) || registry.active_for(&job.target_url).is_some() {
                continue;
            }
            let id = job.id;
            if !self.inner.repository.claim(id, &self.inner.lease()).await? {
                debug!("Job {} is held by another process", id);
                continue;
            }
            let job = self.inner.repository.load(id).await?.unwrap_or(job);
            if job.is_terminal() {
                continue;
            }

            info!("Resuming job {} for {} (was {})", id, job.target_url, job.stage);
            let cancel = registry.register(job, &self.inner.shutdown, true);
            drop(registry);
            self.spawn(id, cancel, true);
            resumed.push(id);
        }

        Ok(resumed)
    }

    /// Release crawler resources (the headless browser, if started)
    pub async fn close(&self) -> Result<()> {
        self.inner.crawler.close().await
    }
}

impl Inner {
    fn lease(&self) -> Lease {
        let length = i64::try_from(self.jobs.lease_ms).unwrap_or(i64::MAX);
        Lease::new(self.owner, chrono::Duration::milliseconds(length))
    }

    /// Run or follow a job until it settles, switching whenever its lease changes hands
    async fn drive(self: Arc<Self>, id: Uuid, cancel: CancellationToken, mut owned: bool) {
        loop {
            if owned {
                if self.run(id, &cancel).await {
                    return;
                }
                self.registry.lock().await.set_owned(&id, false);
                owned = false;
            } else {
                match self.follow(id, &cancel).await {
                    Followed::Settled => return,
                    Followed::Claimed => {
                        self.registry.lock().await.set_owned(&id, true);
                        owned = true;
                    }
                }
            }
        }
    }

    /// Run the pipeline while holding the lease. `false` when the lease was
    /// lost on the way and the job now belongs to someone else.
    async fn run(self: &Arc<Self>, id: Uuid, cancel: &CancellationToken) -> bool {
        let run_cancel = cancel.child_token();
        let heartbeat = tokio::spawn(self.clone().heartbeat(id, run_cancel.clone()));

        let permit = tokio::select! {
            permit = self.workers.clone().acquire_owned() => {
                permit.map_err(|e| Error::Internal(format!("worker pool closed: {}", e)))
            }
            _ = run_cancel.cancelled() => Err(Error::Cancelled(format!("job {} cancelled while queued", id))),
        };

        let outcome = match permit {
            Ok(_permit) => self.pipeline(id, &run_cancel).await,
            Err(e) => Err(e),
        };
        let settled = self.finish(id, outcome).await;
        heartbeat.abort();
        settled
    }

    /// Renew the lease until the run ends; a refused renewal stops the run
    async fn heartbeat(self: Arc<Self>, id: Uuid, cancel: CancellationToken) {
        let mut ticks = tokio::time::interval(Duration::from_millis((self.jobs.lease_ms / 3).max(1)));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticks.tick().await;
        loop {
            tokio::select! {
                _ = ticks.tick() => {}
                _ = cancel.cancelled() => return,
            }
            match self.repository.renew(id, &self.lease()).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Job {} lost its lease, stopping", id);
                    cancel.cancel();
                    return;
                }
                Err(e) => warn!("Failed to renew lease on job {}: {}", id, e),
            }
        }
    }

    /// Mirror a job run elsewhere into the registry until it finishes, or
    /// until its holder's lease runs out and this process claims it
    async fn follow(&self, id: Uuid, cancel: &CancellationToken) -> Followed {
        let mut ticks = tokio::time::interval(FOLLOW_POLL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticks.tick() => {}
                _ = cancel.cancelled() => {
                    self.registry.lock().await.forget(&id);
                    return Followed::Settled;
                }
            }

            match self.repository.load(id).await {
                Ok(Some(job)) => {
                    let terminal = job.is_terminal();
                    self.registry.lock().await.publish(job);
                    if terminal {
                        return Followed::Settled;
                    }
                }
                Ok(None) => {
                    warn!("Job {} disappeared from the repository", id);
                    self.registry.lock().await.forget(&id);
                    return Followed::Settled;
                }
                Err(e) => {
                    warn!("Failed to read job {}: {}", id, e);
                    continue;
                }
            }

            match self.repository.claim(id, &self.lease()).await {
                Ok(true) => {
                    info!("Lease on job {} ran out, taking it over", id);
                    // The previous holder may have written once more before the claim
                    if let Ok(Some(job)) = self.repository.load(id).await {
                        self.registry.lock().await.publish(job);
                    }
                    return Followed::Claimed;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to claim job {}: {}", id, e),
            }
        }
    }

    fn checkpoint(id: Uuid, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("job {} cancelled", id)));
        }
        Ok(())
    }

    /// Apply a change to the live job, persist it under our lease, then publish it
    async fn update<F>(&self, id: Uuid, change: F) -> Result<AnalysisJob>
    where
        F: FnOnce(&mut AnalysisJob) -> Result<()>,
    {
        let mut job = self
            .registry
            .lock()
            .await
            .snapshot(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        change(&mut job)?;
        if !self.repository.save_claimed(&job, &self.lease()).await? {
            return Err(Error::Cancelled(format!("job {} is no longer held here", id)));
        }
        self.registry.lock().await.publish(job.clone());
        Ok(job)
    }

    async fn advance(&self, id: Uuid, stage: JobStage) -> Result<()> {
        let job = self.update(id, |job| job.transition(stage)).await?;
        debug!("Job {} -> {} ({}%)", id, stage, job.progress_percent);
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        Duration::from_millis(
            self.jobs
                .retry_backoff_ms
                .saturating_mul(factor)
                .min(self.jobs.max_backoff_ms),
        )
    }

    async fn pipeline(&self, id: Uuid, cancel: &CancellationToken) -> Result<AnalysisOutput> {
        Self::checkpoint(id, cancel)?;
        self.advance(id, JobStage::Detecting).await?;

        let job = self
            .registry
            .lock()
            .await
            .snapshot(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        let url = job.target_url.clone();
        let keywords = job.keywords.clone();

        let mut platform = detect(&url, None);
        let strategy = select_strategy(platform);
        self.update(id, |job| {
            job.platform = Some(platform);
            Ok(())
        })
        .await?;
        debug!("Job {}: platform {}, {:?} fetch", id, platform, strategy);

        Self::checkpoint(id, cancel)?;
        let fetch = self.fetch(id, &url, strategy, platform, cancel).await?;

        Self::checkpoint(id, cancel)?;
        self.advance(id, JobStage::Normalizing).await?;
        if platform == PlatformVariant::Generic {
            let refined = detect(&fetch.final_url, Some(&fetch.raw_html));
            if refined != PlatformVariant::Generic {
                platform = refined;
                self.update(id, |job| {
                    job.platform = Some(refined);
                    Ok(())
                })
                .await?;
            }
        }

        let summary_fetch = (fetch.status_code, fetch.rendered, fetch.attempts, fetch.elapsed_ms);
        let doc = tokio::task::spawn_blocking(move || normalize(&fetch, platform)).await??;

        Self::checkpoint(id, cancel)?;
        self.advance(id, JobStage::Analyzing).await?;

        let scoring = self.scoring.clone();
        let scored_doc = doc.clone();
        let (nlp, score) = tokio::join!(
            self.nlp.analyze(&doc),
            tokio::task::spawn_blocking(move || score_document(&scored_doc, &keywords, &scoring)),
        );
        let score = score?;

        Self::checkpoint(id, cancel)?;
        self.advance(id, JobStage::Scoring).await?;

        let (status_code, rendered, fetch_attempts, elapsed_ms) = summary_fetch;
        Ok(AnalysisOutput {
            document: DocumentSummary {
                word_count: doc.word_count(),
                title: doc.title,
                final_url: doc.url,
                language: doc.language,
                author: doc.author,
                published_at: doc.published_at,
                status_code,
                rendered,
                fetch_attempts,
                elapsed_ms,
                content_hash: doc.content_hash,
            },
            score,
            nlp,
        })
    }

    /// Fetch with stage-level retries on transient statuses
    async fn fetch(
        &self,
        id: Uuid,
        url: &str,
        strategy: FetchStrategy,
        platform: PlatformVariant,
        cancel: &CancellationToken,
    ) -> Result<FetchResult> {
        let max_retries = self.jobs.max_retries;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.update(id, |job| {
                job.transition(JobStage::Fetching)?;
                job.attempt_count = attempt;
                Ok(())
            })
            .await?;

            // An in-flight fetch runs to completion; its result is dropped on cancel
            let result = self.crawler.fetch(url, strategy, platform).await?;
            Self::checkpoint(id, cancel)?;

            if result.is_success() {
                return Ok(result);
            }

            let status = result.status_code;
            if !result.is_transient_status() {
                return Err(Error::FetchFailed(format!("HTTP {} for {}", status, url)));
            }
            if attempt > max_retries {
                return Err(Error::FetchFailed(format!(
                    "HTTP {} for {} after {} attempts",
                    status, url, attempt
                )));
            }

            let delay = self.backoff(attempt);
            warn!(
                "Job {}: HTTP {} from {}, retrying in {:?} ({}/{})",
                id, status, url, delay, attempt, max_retries
            );
            self.advance(id, JobStage::Retrying).await?;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("job {} cancelled", id)));
                }
            }
        }
    }

    /// Record the outcome. `false` when the job is no longer ours to finish.
    async fn finish(&self, id: Uuid, outcome: Result<AnalysisOutput>) -> bool {
        let Some(mut job) = self.registry.lock().await.snapshot(&id) else {
            error!("Job {} vanished from the registry", id);
            return true;
        };

        let applied = match outcome {
            Ok(output) => {
                info!(
                    "Job {} completed: {} scored {}",
                    id, job.target_url, output.score.aggregate
                );
                job.complete(output)
            }
            Err(err) => {
                let kind = err.kind();
                match kind {
                    ErrorKind::InternalError => error!("Job {} failed: {}", id, err),
                    ErrorKind::Cancelled => info!("Job {} cancelled", id),
                    _ => warn!("Job {} failed ({}): {}", id, kind, err),
                }
                job.fail(kind, err.to_string())
            }
        };
        if let Err(e) = applied {
            error!("Job {} could not be finalized: {}", id, e);
            return true;
        }

        match self.repository.save_claimed(&job, &self.lease()).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Job {} was finished or taken over elsewhere, following it", id);
                return false;
            }
            Err(e) => error!("Failed to persist job {}: {}", id, e),
        }
        self.registry.lock().await.publish(job);
        true
    }
}
