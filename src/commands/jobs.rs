//! Job listing and inspection commands

use crate::crawl::CrawlLogEntry;
use crate::error::{Error, Result};
use crate::jobs::{AnalysisJob, AnalysisReport, JobRepository};
use crate::store::JobDb;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// One row of `jobs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub target_url: String,
    pub stage: String,
    pub progress_percent: u8,
    pub aggregate_score: Option<u8>,
    pub error_kind: Option<String>,
    pub created_at: String,
}

impl From<&AnalysisJob> for JobInfo {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            id: job.id,
            target_url: job.target_url.clone(),
            stage: job.stage.to_string(),
            progress_percent: job.progress_percent,
            aggregate_score: job.result.as_ref().map(|r| r.score.aggregate),
            error_kind: job.error_kind.map(|k| k.to_string()),
            created_at: job.created_at.to_rfc3339(),
        }
    }
}

/// Details for `show`: the report when the job completed, the bare job
/// otherwise, plus the crawl log of its URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<AnalysisJob>,
    pub crawl_log: Vec<CrawlLogEntry>,
}

/// List the most recent jobs
pub async fn cmd_list_jobs(db: &JobDb, limit: usize) -> Result<Vec<JobInfo>> {
    info!("Listing jobs");
    let jobs = db.list_recent(limit).await?;
    Ok(jobs.iter().map(JobInfo::from).collect())
}

/// Load one job by id
pub async fn cmd_show_job(db: &JobDb, job_id: &str) -> Result<JobDetails> {
    let id = Uuid::parse_str(job_id.trim())
        .map_err(|_| Error::JobNotFound(job_id.to_string()))?;
    let job = db
        .load(id)
        .await?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
    let crawl_log = db.crawl_log_for(&job.target_url).await?;

    Ok(match AnalysisReport::from_job(&job) {
        Some(report) => JobDetails {
            report: Some(report),
            job: None,
            crawl_log,
        },
        None => JobDetails {
            report: None,
            job: Some(job),
            crawl_log,
        },
    })
}

/// Print jobs list to console
pub fn print_jobs(jobs: &[JobInfo]) {
    println!("\n🗂  Recent Jobs\n");

    if jobs.is_empty() {
        println!("No jobs yet. Use 'blogseo analyze <URL>' to start one.");
        return;
    }

    for job in jobs {
        let outcome = match (&job.aggregate_score, &job.error_kind) {
            (Some(score), _) => format!("score {}", score),
            (None, Some(kind)) => kind.clone(),
            (None, None) => format!("{}%", job.progress_percent),
        };
        println!("• {} [{}] {}", job.target_url, job.stage, outcome);
        println!("  ID: {}", job.id);
        println!("  Created: {}", job.created_at);
        println!();
    }
}

/// Print the crawl log of a job's URL
pub fn print_crawl_log(entries: &[CrawlLogEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("\nCrawl log:");
    for entry in entries {
        let outcome = match (&entry.status_code, &entry.error) {
            (_, Some(error)) => error.clone(),
            (Some(status), None) => format!("HTTP {}", status),
            (None, None) => "no response".to_string(),
        };
        println!(
            "  {} attempt {} {}ms{} {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.attempt,
            entry.elapsed_ms,
            if entry.rendered { " rendered" } else { "" },
            outcome
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::jobs::test_support;
    use tempfile::TempDir;

    async fn setup_test_db() -> (JobDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = JobDb::open(&tmp.path().join("test.db")).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let (db, _tmp) = setup_test_db().await;

        let mut done = AnalysisJob::new("https://blog.example.com/a", vec![]);
        done.complete(test_support::output()).unwrap();
        db.save(&done).await.unwrap();

        let mut failed = AnalysisJob::new("https://blog.example.com/b", vec![]);
        failed.created_at += chrono::Duration::seconds(1);
        failed.fail(ErrorKind::PolicyBlocked, "robots").unwrap();
        db.save(&failed).await.unwrap();

        let jobs = cmd_list_jobs(&db, 10).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, failed.id);
        assert_eq!(jobs[0].error_kind.as_deref(), Some("policy_blocked"));
        assert_eq!(jobs[1].stage, "completed");
        assert!(jobs[1].aggregate_score.is_some());
    }

    #[tokio::test]
    async fn test_show_job() {
        let (db, _tmp) = setup_test_db().await;

        let mut done = AnalysisJob::new("https://blog.example.com/a", vec![]);
        done.complete(test_support::output()).unwrap();
        db.save(&done).await.unwrap();

        let details = cmd_show_job(&db, &done.id.to_string()).await.unwrap();
        let report = details.report.unwrap();
        assert_eq!(report.job.id, done.id);
        assert!(report.job.result.is_none());
        assert!(details.job.is_none());

        let queued = AnalysisJob::new("https://blog.example.com/b", vec![]);
        db.save(&queued).await.unwrap();
        let details = cmd_show_job(&db, &queued.id.to_string()).await.unwrap();
        assert!(details.report.is_none());
        assert_eq!(details.job.unwrap().id, queued.id);

        assert!(matches!(
            cmd_show_job(&db, "not-a-uuid").await,
            Err(Error::JobNotFound(_))
        ));
        assert!(matches!(
            cmd_show_job(&db, &Uuid::new_v4().to_string()).await,
            Err(Error::JobNotFound(_))
        ));
    }
}
