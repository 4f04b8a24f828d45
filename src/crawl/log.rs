//! Crawl-log telemetry
//!
//! One entry per fetch attempt. Entries outlive the fetched content, which is
//! dropped once the post has been normalized.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Record of one fetch attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlLogEntry {
    pub url: String,
    /// HTTP status, absent when no response was received
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    /// 1-based attempt number within one fetch
    pub attempt: u32,
    pub rendered: bool,
    pub proxy: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl CrawlLogEntry {
    pub fn new(url: &str, attempt: u32) -> Self {
        Self {
            url: url.to_string(),
            status_code: None,
            elapsed_ms: 0,
            error: None,
            attempt,
            rendered: false,
            proxy: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for crawl-log entries
#[async_trait]
pub trait CrawlLogSink: Send + Sync {
    async fn record(&self, entry: CrawlLogEntry) -> Result<()>;
}

/// Emits entries as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlLog;

#[async_trait]
impl CrawlLogSink for TracingCrawlLog {
    async fn record(&self, entry: CrawlLogEntry) -> Result<()> {
        match &entry.error {
            Some(error) => warn!(
                url = %entry.url,
                attempt = entry.attempt,
                elapsed_ms = entry.elapsed_ms,
                "fetch attempt failed: {}",
                error
            ),
            None => debug!(
                url = %entry.url,
                status = entry.status_code.unwrap_or_default(),
                attempt = entry.attempt,
                elapsed_ms = entry.elapsed_ms,
                rendered = entry.rendered,
                "fetch attempt"
            ),
        }
        Ok(())
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryCrawlLog {
    entries: Mutex<Vec<CrawlLogEntry>>,
}

impl MemoryCrawlLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CrawlLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl CrawlLogSink for MemoryCrawlLog {
    async fn record(&self, entry: CrawlLogEntry) -> Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_log_keeps_order() {
        let log = MemoryCrawlLog::new();
        for attempt in 1..=3 {
            let mut entry = CrawlLogEntry::new("https://example.com/post", attempt);
            entry.status_code = Some(503);
            log.record(entry).await.unwrap();
        }

        let entries = log.entries().await;
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.iter().map(|e| e.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_tracing_log_accepts_entries() {
        let mut entry = CrawlLogEntry::new("https://example.com", 1);
        entry.error = Some("connection reset".to_string());
        assert!(TracingCrawlLog.record(entry).await.is_ok());
    }
}
