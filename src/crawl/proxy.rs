//! Proxy rotation
//!
//! One reqwest client per proxy; selection is round-robin over proxies that
//! have not failed `unhealthy_after` times in a row.

use crate::error::{Error, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tracing::{debug, warn};

struct ProxyEntry {
    url: String,
    client: Client,
    consecutive_failures: AtomicU32,
}

/// A proxy picked for one attempt
#[derive(Clone)]
pub struct ProxySlot {
    pub index: usize,
    pub url: String,
    pub client: Client,
}

/// Round-robin pool of proxied clients
pub struct ProxyPool {
    entries: Vec<ProxyEntry>,
    cursor: AtomicUsize,
    unhealthy_after: u32,
}

impl ProxyPool {
    /// Build a pool, creating one client per proxy URL with `make_client`
    pub fn build<F>(proxy_urls: &[String], unhealthy_after: u32, make_client: F) -> Result<Self>
    where
        F: Fn(Option<reqwest::Proxy>) -> Result<Client>,
    {
        let entries = proxy_urls
            .iter()
            .map(|url| {
                let proxy = reqwest::Proxy::all(url.as_str())
                    .map_err(|e| Error::Config(format!("Invalid proxy {}: {}", url, e)))?;
                Ok(ProxyEntry {
                    url: url.clone(),
                    client: make_client(Some(proxy))?,
                    consecutive_failures: AtomicU32::new(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entries,
            cursor: AtomicUsize::new(0),
            unhealthy_after: unhealthy_after.max(1),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_healthy(&self, entry: &ProxyEntry) -> bool {
        entry.consecutive_failures.load(Ordering::Relaxed) < self.unhealthy_after
    }

    /// Next healthy proxy, or `None` for a direct connection when the pool is empty
    pub fn next(&self) -> Option<ProxySlot> {
        let n = self.entries.len();
        if n == 0 {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let healthy = (0..n)
            .map(|offset| (start + offset) % n)
            .find(|&i| self.is_healthy(&self.entries[i]));

        let index = match healthy {
            Some(i) => i,
            None => {
                warn!("All {} proxies unhealthy, resetting failure counts", n);
                for entry in &self.entries {
                    entry.consecutive_failures.store(0, Ordering::Relaxed);
                }
                start % n
            }
        };

        let entry = &self.entries[index];
        debug!("Using proxy {}", entry.url);
        Some(ProxySlot {
            index,
            url: entry.url.clone(),
            client: entry.client.clone(),
        })
    }

    pub fn record_success(&self, index: usize) {
        if let Some(entry) = self.entries.get(index) {
            entry.consecutive_failures.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, index: usize) {
        if let Some(entry) = self.entries.get(index) {
            let failures = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if failures == self.unhealthy_after {
                warn!("Proxy {} marked unhealthy after {} failures", entry.url, failures);
            }
        }
    }
}
