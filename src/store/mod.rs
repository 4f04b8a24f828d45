//! Job storage using SQLite
//!
//! This module handles all local persistence:
//! - Analysis jobs (state, history and results)
//! - Crawl log (one row per fetch attempt)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::crawl::{CrawlLogEntry, CrawlLogSink};
use crate::error::{Error, Result};
use crate::jobs::{AnalysisJob, JobRepository, Lease};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, FromRow)]
struct JobRow {
    job_json: String,
}

impl JobRow {
    fn decode(self) -> Result<AnalysisJob> {
        Ok(serde_json::from_str(&self.job_json)?)
    }
}

#[derive(Debug, FromRow)]
struct CrawlLogRow {
    url: String,
    status_code: Option<i64>,
    elapsed_ms: i64,
    error: Option<String>,
    attempt: i64,
    rendered: bool,
    proxy: Option<String>,
    recorded_at: String,
}

impl CrawlLogRow {
    fn decode(self) -> Result<CrawlLogEntry> {
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|e| Error::Internal(format!("bad crawl_log timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(CrawlLogEntry {
            url: self.url,
            status_code: self.status_code.map(|s| s as u16),
            elapsed_ms: self.elapsed_ms as u64,
            error: self.error,
            attempt: self.attempt as u32,
            rendered: self.rendered,
            proxy: self.proxy,
            recorded_at,
        })
    }
}

/// Job database handle
#[derive(Clone)]
pub struct JobDb {
    pool: SqlitePool,
}

impl JobDb {
    /// Connect to the job database configured in `config.paths`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Connect to a database file directly
    pub async fn open(db_path: &Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        self.add_lease_columns().await?;
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Databases created before job leases lack the ownership columns
    async fn add_lease_columns(&self) -> Result<()> {
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('analysis_jobs')")
                .fetch_all(&self.pool)
                .await?;
        if columns.is_empty() {
            return Ok(());
        }
        for (name, kind) in LEASE_COLUMNS {
            if !columns.iter().any(|(c,)| c == name) {
                debug!("Adding analysis_jobs.{}", name);
                let statement = format!("ALTER TABLE analysis_jobs ADD COLUMN {} {}", name, kind);
                sqlx::query(&statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='analysis_jobs'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Crawl-log entries for a URL in the order they were recorded
    pub async fn crawl_log_for(&self, url: &str) -> Result<Vec<CrawlLogEntry>> {
        let rows = sqlx::query_as::<_, CrawlLogRow>(
            "SELECT url, status_code, elapsed_ms, error, attempt, rendered, proxy, recorded_at \
             FROM crawl_log WHERE url = ? ORDER BY id",
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CrawlLogRow::decode).collect()
    }

    /// Job counts per stage
    pub async fn stage_counts(&self) -> Result<Vec<(String, i64)>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT stage, COUNT(*) FROM analysis_jobs GROUP BY stage ORDER BY stage",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn fetch_jobs(&self, query: &str, bind: Option<&str>) -> Result<Vec<AnalysisJob>> {
        let mut q = sqlx::query_as::<_, JobRow>(query);
        if let Some(value) = bind {
            q = q.bind(value);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(JobRow::decode).collect()
    }
}

#[async_trait]
impl JobRepository for JobDb {
    async fn save(&self, job: &AnalysisJob) -> Result<()> {
        let job_json = serde_json::to_string(job)?;
        sqlx::query(
            r#"
            INSERT INTO analysis_jobs
                (id, target_url, stage, error_kind, supersedes, created_at, updated_at, completed_at, job_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                stage = excluded.stage,
                error_kind = excluded.error_kind,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at,
                job_json = excluded.job_json
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.target_url)
        .bind(job.stage.as_str())
        .bind(job.error_kind.map(|k| k.as_str()))
        .bind(job.supersedes.map(|id| id.to_string()))
        .bind(timestamp(&job.created_at))
        .bind(timestamp(&job.updated_at))
        .bind(job.completed_at.as_ref().map(timestamp))
        .bind(job_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_if_active(&self, job: &AnalysisJob) -> Result<bool> {
        let saved = sqlx::query(
            r#"
            UPDATE analysis_jobs SET
                stage = ?, error_kind = ?, updated_at = ?, completed_at = ?, job_json = ?
            WHERE id = ? AND stage NOT IN ('completed', 'failed')
            "#,
        )
        .bind(job.stage.as_str())
        .bind(job.error_kind.map(|k| k.as_str()))
        .bind(timestamp(&job.updated_at))
        .bind(job.completed_at.as_ref().map(timestamp))
        .bind(serde_json::to_string(job)?)
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(saved == 1)
    }

    async fn create(&self, job: &AnalysisJob, lease: &Lease) -> Result<AnalysisJob> {
        // One statement, so the existence check and the insert share SQLite's write lock
        let inserted = sqlx::query(
            r#"
            INSERT INTO analysis_jobs
                (id, target_url, stage, error_kind, supersedes, created_at, updated_at, completed_at,
                 job_json, owner, lease_until)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM analysis_jobs
                WHERE target_url = ? AND stage NOT IN ('completed', 'failed')
            )
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.target_url)
        .bind(job.stage.as_str())
        .bind(job.error_kind.map(|k| k.as_str()))
        .bind(job.supersedes.map(|id| id.to_string()))
        .bind(timestamp(&job.created_at))
        .bind(timestamp(&job.updated_at))
        .bind(job.completed_at.as_ref().map(timestamp))
        .bind(serde_json::to_string(job)?)
        .bind(lease.owner.to_string())
        .bind(timestamp(&lease.until))
        .bind(&job.target_url)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(job.clone());
        }
        self.find_active_by_url(&job.target_url)
            .await?
            .ok_or_else(|| Error::Internal(format!("no active job for {} after insert conflict", job.target_url)))
    }

    async fn claim(&self, id: Uuid, lease: &Lease) -> Result<bool> {
        let claimed = sqlx::query(
            r#"
            UPDATE analysis_jobs SET owner = ?, lease_until = ?
            WHERE id = ? AND stage NOT IN ('completed', 'failed')
              AND (owner IS NULL OR owner = ? OR lease_until IS NULL OR lease_until <= ?)
            "#,
        )
        .bind(lease.owner.to_string())
        .bind(timestamp(&lease.until))
        .bind(id.to_string())
        .bind(lease.owner.to_string())
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(claimed == 1)
    }

    async fn renew(&self, id: Uuid, lease: &Lease) -> Result<bool> {
        let renewed = sqlx::query(
            "UPDATE analysis_jobs SET lease_until = ? \
             WHERE id = ? AND owner = ? AND stage NOT IN ('completed', 'failed')",
        )
        .bind(timestamp(&lease.until))
        .bind(id.to_string())
        .bind(lease.owner.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(renewed == 1)
    }

    async fn save_claimed(&self, job: &AnalysisJob, lease: &Lease) -> Result<bool> {
        // A terminal job is written without an owner, releasing it
        let held = (!job.is_terminal()).then_some(lease);
        let saved = sqlx::query(
            r#"
            UPDATE analysis_jobs SET
                stage = ?, error_kind = ?, updated_at = ?, completed_at = ?, job_json = ?,
                owner = ?, lease_until = ?
            WHERE id = ? AND owner = ? AND stage NOT IN ('completed', 'failed')
            "#,
        )
        .bind(job.stage.as_str())
        .bind(job.error_kind.map(|k| k.as_str()))
        .bind(timestamp(&job.updated_at))
        .bind(job.completed_at.as_ref().map(timestamp))
        .bind(serde_json::to_string(job)?)
        .bind(held.map(|l| l.owner.to_string()))
        .bind(held.map(|l| timestamp(&l.until)))
        .bind(job.id.to_string())
        .bind(lease.owner.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(saved == 1)
    }

    async fn load(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT job_json FROM analysis_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::decode).transpose()
    }

    async fn find_active_by_url(&self, url: &str) -> Result<Option<AnalysisJob>> {
        let mut jobs = self
            .fetch_jobs(
                "SELECT job_json FROM analysis_jobs \
                 WHERE target_url = ? AND stage NOT IN ('completed', 'failed') \
                 ORDER BY created_at, rowid LIMIT 1",
                Some(url),
            )
            .await?;
        Ok(jobs.pop())
    }

    async fn list_active(&self) -> Result<Vec<AnalysisJob>> {
        self.fetch_jobs(
            "SELECT job_json FROM analysis_jobs \
             WHERE stage NOT IN ('completed', 'failed') ORDER BY created_at, rowid",
            None,
        )
        .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AnalysisJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_json FROM analysis_jobs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::decode).collect()
    }

    async fn latest_completed_for_url(&self, url: &str) -> Result<Option<AnalysisJob>> {
        let mut jobs = self
            .fetch_jobs(
                "SELECT job_json FROM analysis_jobs \
                 WHERE target_url = ? AND stage = 'completed' \
                 ORDER BY completed_at DESC LIMIT 1",
                Some(url),
            )
            .await?;
        Ok(jobs.pop())
    }
}

#[async_trait]
impl CrawlLogSink for JobDb {
    async fn record(&self, entry: CrawlLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_log (url, status_code, elapsed_ms, error, attempt, rendered, proxy, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.url)
        .bind(entry.status_code.map(i64::from))
        .bind(entry.elapsed_ms as i64)
        .bind(&entry.error)
        .bind(i64::from(entry.attempt))
        .bind(entry.rendered)
        .bind(&entry.proxy)
        .bind(timestamp(&entry.recorded_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::jobs::{test_support, JobStage};
    use tempfile::TempDir;

    async fn setup_test_db() -> (JobDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = JobDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_schema_init() {
        let tmp = TempDir::new().unwrap();
        let db = JobDb::open(&tmp.path().join("nested/jobs.db")).await.unwrap();
        assert!(!db.is_initialized().await.unwrap());
        db.init_schema().await.unwrap();
        db.init_schema().await.unwrap();
        assert!(db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_job_save_and_update() {
        let (db, _tmp) = setup_test_db().await;

        let mut job = AnalysisJob::new("https://blog.example.com/a", vec!["rust".into()]);
        db.save(&job).await.unwrap();
        assert_eq!(db.load(job.id).await.unwrap().unwrap(), job);

        job.transition(JobStage::Detecting).unwrap();
        job.transition(JobStage::Fetching).unwrap();
        job.attempt_count = 1;
        db.save(&job).await.unwrap();

        let loaded = db.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.history.len(), 3);
        assert!(db.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_result_survives_round_trip() {
        let (db, _tmp) = setup_test_db().await;

        let mut job = AnalysisJob::new("https://blog.example.com/a", vec![]);
        let output = test_support::output();
        job.complete(output.clone()).unwrap();
        db.save(&job).await.unwrap();

        let loaded = db.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, JobStage::Completed);
        let result = loaded.result.unwrap();
        assert_eq!(result.score.aggregate, output.score.aggregate);
        assert_eq!(result.document, output.document);
        assert_eq!(loaded.completed_at, job.completed_at);
    }

    #[tokio::test]
    async fn test_active_and_completed_lookups() {
        let (db, _tmp) = setup_test_db().await;
        let url = "https://blog.example.com/a";

        let mut done = AnalysisJob::new(url, vec![]);
        done.complete(test_support::output()).unwrap();
        db.save(&done).await.unwrap();

        let mut failed = AnalysisJob::new(url, vec![]);
        failed.fail(ErrorKind::FetchFailed, "HTTP 404").unwrap();
        db.save(&failed).await.unwrap();

        assert!(db.find_active_by_url(url).await.unwrap().is_none());

        let active = AnalysisJob::new(url, vec![]);
        db.save(&active).await.unwrap();
        let other = AnalysisJob::new("https://blog.example.com/b", vec![]);
        db.save(&other).await.unwrap();

        assert_eq!(db.find_active_by_url(url).await.unwrap().unwrap().id, active.id);
        assert_eq!(db.latest_completed_for_url(url).await.unwrap().unwrap().id, done.id);
        assert!(db
            .latest_completed_for_url("https://blog.example.com/b")
            .await
            .unwrap()
            .is_none());

        let pending: Vec<Uuid> = db.list_active().await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(pending, vec![active.id, other.id]);
    }

    #[tokio::test]
    async fn test_list_recent() {
        let (db, _tmp) = setup_test_db().await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let mut job = AnalysisJob::new(format!("https://blog.example.com/{}", i), vec![]);
            job.created_at += chrono::Duration::seconds(i);
            db.save(&job).await.unwrap();
            ids.push(job.id);
        }

        let recent: Vec<Uuid> = db.list_recent(2).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(recent, vec![ids[2], ids[1]]);

        let counts = db.stage_counts().await.unwrap();
        assert_eq!(counts, vec![("queued".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_jobs_survive_reconnect() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobs.db");

        let job = AnalysisJob::new("https://blog.example.com/a", vec![]);
        {
            let db = JobDb::open(&path).await.unwrap();
            db.init_schema().await.unwrap();
            db.save(&job).await.unwrap();
        }

        let db = JobDb::open(&path).await.unwrap();
        let pending = db.list_active().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, job.id);
    }

    fn lease(owner: Uuid, ms: i64) -> Lease {
        Lease::new(owner, chrono::Duration::milliseconds(ms))
    }

    #[tokio::test]
    async fn test_create_keeps_one_active_job_per_url() {
        let (db, _tmp) = setup_test_db().await;
        let url = "https://blog.example.com/a";

        let first = AnalysisJob::new(url, vec![]);
        let second = AnalysisJob::new(url, vec![]);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(db.create(&first, &lease(a, 60_000)).await.unwrap().id, first.id);
        assert_eq!(db.create(&second, &lease(b, 60_000)).await.unwrap().id, first.id);
        assert!(db.load(second.id).await.unwrap().is_none());

        // The index backs the same rule for plain saves
        assert!(db.save(&second).await.is_err());
    }

    #[tokio::test]
    async fn test_claim_and_lease_lapse() {
        let (db, _tmp) = setup_test_db().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut job = AnalysisJob::new("https://blog.example.com/a", vec![]);
        db.create(&job, &lease(a, 60_000)).await.unwrap();

        assert!(!db.claim(job.id, &lease(b, 60_000)).await.unwrap());
        assert!(db.claim(job.id, &lease(a, 60_000)).await.unwrap());
        assert!(db.renew(job.id, &lease(a, 60_000)).await.unwrap());

        job.transition(JobStage::Detecting).unwrap();
        assert!(!db.save_claimed(&job, &lease(b, 60_000)).await.unwrap());
        assert_eq!(db.load(job.id).await.unwrap().unwrap().stage, JobStage::Queued);
        assert!(db.save_claimed(&job, &lease(a, 60_000)).await.unwrap());

        // A lapsed lease hands the job over and locks the old owner out
        assert!(db.save_claimed(&job, &lease(a, -1)).await.unwrap());
        assert!(db.claim(job.id, &lease(b, 60_000)).await.unwrap());
        assert!(!db.renew(job.id, &lease(a, 60_000)).await.unwrap());

        job.fail(ErrorKind::Cancelled, "cancelled").unwrap();
        assert!(db.save_if_active(&job).await.unwrap());
        assert!(!db.save_if_active(&job).await.unwrap());
        assert!(!db.save_claimed(&job, &lease(b, 60_000)).await.unwrap());
        assert!(!db.claim(job.id, &lease(b, 60_000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unowned_jobs_are_claimable() {
        let (db, _tmp) = setup_test_db().await;
        let job = AnalysisJob::new("https://blog.example.com/a", vec![]);
        db.save(&job).await.unwrap();
        assert!(db.claim(job.id, &lease(Uuid::new_v4(), 60_000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_columns_added_to_older_database() {
        let tmp = TempDir::new().unwrap();
        let db = JobDb::open(&tmp.path().join("old.db")).await.unwrap();
        sqlx::query(
            "CREATE TABLE analysis_jobs (id TEXT PRIMARY KEY, target_url TEXT NOT NULL, \
             stage TEXT NOT NULL, error_kind TEXT, supersedes TEXT, created_at TEXT NOT NULL, \
             updated_at TEXT NOT NULL, completed_at TEXT, job_json TEXT NOT NULL)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        db.init_schema().await.unwrap();
        let job = AnalysisJob::new("https://blog.example.com/a", vec![]);
        db.save(&job).await.unwrap();
        assert!(db.claim(job.id, &lease(Uuid::new_v4(), 60_000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_crawl_log() {
        let (db, _tmp) = setup_test_db().await;
        let url = "https://blog.example.com/a";

        let mut first = CrawlLogEntry::new(url, 1);
        first.error = Some("connection reset".to_string());
        db.record(first).await.unwrap();

        let mut second = CrawlLogEntry::new(url, 2);
        second.status_code = Some(200);
        second.elapsed_ms = 120;
        second.rendered = true;
        db.record(second.clone()).await.unwrap();

        db.record(CrawlLogEntry::new("https://other.example.com", 1))
            .await
            .unwrap();

        let entries = db.crawl_log_for(url).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status_code, None);
        assert_eq!(entries[0].error.as_deref(), Some("connection reset"));
        assert_eq!(entries[1].status_code, Some(200));
        assert_eq!(entries[1].elapsed_ms, 120);
        assert!(entries[1].rendered);
    }
}
