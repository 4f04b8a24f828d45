//! SQLite schema definition

/// SQL schema for the job database
pub const SCHEMA_SQL: &str = r#"
-- Analysis jobs: the full job (including its result) is kept as JSON,
-- the columns below only serve lookups
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id TEXT PRIMARY KEY,
    target_url TEXT NOT NULL,
    stage TEXT NOT NULL,
    error_kind TEXT,
    supersedes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    job_json TEXT NOT NULL,
    -- Process currently running the job and how long its claim lasts
    owner TEXT,
    lease_until TEXT
);

-- Crawl log: one row per fetch attempt
CREATE TABLE IF NOT EXISTS crawl_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    status_code INTEGER,
    elapsed_ms INTEGER NOT NULL,
    error TEXT,
    attempt INTEGER NOT NULL,
    rendered INTEGER NOT NULL DEFAULT 0,
    proxy TEXT,
    recorded_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_jobs_url_stage ON analysis_jobs(target_url, stage);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_one_active_per_url ON analysis_jobs(target_url)
    WHERE stage NOT IN ('completed', 'failed');
CREATE INDEX IF NOT EXISTS idx_jobs_created ON analysis_jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_crawl_log_url ON crawl_log(url);
"#;

/// Columns added after the first release, applied to older databases
pub const LEASE_COLUMNS: [(&str, &str); 2] = [("owner", "TEXT"), ("lease_until", "TEXT")];
