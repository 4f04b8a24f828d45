//! Adaptive page fetching with robots.txt support and rate limiting
//!
//! This module provides:
//! - Static and headless-rendered fetching of a single post
//! - robots.txt parsing and respect
//! - Per-host rate limiting under a global concurrency cap
//! - Proxy rotation with network-level retries
//! - SPA shell detection and render upgrade
//! - Per-attempt crawl-log telemetry

mod detection;
mod log;
mod proxy;
mod rate_limit;
mod renderer;
mod robots;

pub use detection::*;
pub use log::*;
pub use proxy::*;
pub use rate_limit::*;
pub use renderer::*;
pub use robots::*;

use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use crate::platform::{FetchStrategy, PlatformVariant};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of fetching one URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub status_code: u16,
    /// URL after redirects
    pub final_url: String,
    pub raw_html: String,
    pub elapsed_ms: u64,
    pub rendered: bool,
    /// Set for non-2xx responses
    pub error: Option<String>,
    /// Network attempts made, including the successful one
    pub attempts: u32,
    pub content_type: Option<String>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Statuses worth retrying at the job level (5xx, 408, 429)
    pub fn is_transient_status(&self) -> bool {
        matches!(self.status_code, 408 | 429) || (500..600).contains(&self.status_code)
    }
}

/// Post fetcher shared by all jobs
pub struct Crawler {
    config: CrawlConfig,
    client: Client,
    proxies: ProxyPool,
    robots: RobotsCache,
    host_pacers: HostPacers,
    global_limiter: GlobalRateLimiter,
    permits: Semaphore,
    renderer: Option<Arc<dyn PageRenderer>>,
    crawl_log: Arc<dyn CrawlLogSink>,
}

fn build_client(config: &CrawlConfig, proxy: Option<reqwest::Proxy>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_millis(config.timeout_ms))
        .gzip(true)
        .brotli(true)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .default_headers(headers);

    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Split reqwest failures into retryable network faults and terminal errors
fn classify(err: reqwest::Error) -> Error {
    if err.is_redirect() || err.is_builder() {
        Error::FetchFailed(err.to_string())
    } else if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        Error::Transient(err.to_string())
    } else {
        Error::Http(err)
    }
}

fn host_key(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::FetchFailed(format!("URL has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

impl Crawler {
    /// Create a crawler that logs attempts through tracing
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = build_client(&config, None)?;
        let proxies = ProxyPool::build(&config.proxy_pool, config.proxy_unhealthy_after, |p| {
            build_client(&config, p)
        })?;

        if !proxies.is_empty() {
            info!("Rotating over {} proxies", proxies.len());
        }

        Ok(Self {
            client,
            proxies,
            robots: RobotsCache::new(&config.user_agent),
            host_pacers: HostPacers::new(),
            global_limiter: GlobalRateLimiter::new(config.global_requests_per_second),
            permits: Semaphore::new(config.max_concurrent_requests),
            renderer: default_renderer(&config),
            crawl_log: Arc::new(TracingCrawlLog),
            config,
        })
    }

    /// Render client-hydrated pages with `renderer` instead of the built-in browser
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Send crawl-log entries to a different sink
    pub fn with_crawl_log(mut self, sink: Arc<dyn CrawlLogSink>) -> Self {
        self.crawl_log = sink;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Fetch one post.
    ///
    /// HTTP error statuses are returned in the result; only policy blocks and
    /// exhausted network retries are errors.
    pub async fn fetch(
        &self,
        url: &str,
        strategy: FetchStrategy,
        platform: PlatformVariant,
    ) -> Result<FetchResult> {
        let parsed_url = Url::parse(url)?;
        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(Error::FetchFailed(format!("Unsupported URL scheme: {}", url)));
        }
        let host = host_key(&parsed_url)?;

        let base_delay = Duration::from_millis(self.config.delay_for_platform(platform.as_str()));
        let pacer = self.host_pacers.for_host(&host, base_delay);

        if self.config.respect_robots {
            let policy = self
                .robots
                .policy(&self.robots_client(), parsed_url.scheme(), &host)
                .await;
            if !policy.allows(url) {
                return Err(Error::PolicyBlocked(url.to_string()));
            }
            if let Some(delay) = policy.crawl_delay() {
                pacer.raise_interval(delay);
            }
        }

        if strategy == FetchStrategy::Rendered {
            match self.render(url, platform, &pacer, 1).await {
                Ok(result) => return Ok(result),
                Err(e) => warn!("Rendering {} failed, falling back to static fetch: {}", url, e),
            }
        }

        let result = self.fetch_static(url, &pacer).await?;

        if strategy == FetchStrategy::Static
            && platform == PlatformVariant::Generic
            && self.config.auto_render_spa
            && self.renderer.is_some()
            && result.is_success()
        {
            let analysis = analyze_page(&result.raw_html, &result.final_url);
            if analysis.needs_js_rendering {
                info!(
                    "Client-rendered shell detected (confidence {:.0}%), upgrading {} to rendered fetch",
                    analysis.confidence * 100.0,
                    url
                );
                for indicator in &analysis.indicators {
                    debug!("  - {}", indicator);
                }
                match self.render(url, platform, &pacer, result.attempts + 1).await {
                    Ok(rendered) => return Ok(rendered),
                    Err(e) => warn!("Render upgrade failed, keeping static content: {}", e),
                }
            }
        }

        Ok(result)
    }

    /// Shut down the headless browser, if one was started
    pub async fn close(&self) -> Result<()> {
        if let Some(renderer) = &self.renderer {
            renderer.close().await?;
        }
        Ok(())
    }

    async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("Crawler request semaphore closed".to_string()))
    }

    async fn fetch_static(&self, url: &str, pacer: &HostPacer) -> Result<FetchResult> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            pacer.wait().await;
            self.global_limiter.wait().await;

            let slot = self.proxies.next();
            let client = slot.as_ref().map(|s| &s.client).unwrap_or(&self.client);
            let mut entry = CrawlLogEntry::new(url, attempt);
            entry.proxy = slot.as_ref().map(|s| s.url.clone());

            debug!("Fetching: {} (attempt {})", url, attempt);
            let start = Instant::now();
            let outcome = {
                let _permit = self.acquire_permit().await?;
                Self::send(client, url).await
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;
            entry.elapsed_ms = elapsed_ms;

            match outcome {
                Ok(mut result) => {
                    if let Some(slot) = &slot {
                        self.proxies.record_success(slot.index);
                    }
                    entry.status_code = Some(result.status_code);
                    self.log(entry).await;

                    result.elapsed_ms = elapsed_ms;
                    result.attempts = attempt;
                    return Ok(result);
                }
                Err(e) => {
                    if let Some(slot) = &slot {
                        self.proxies.record_failure(slot.index);
                    }
                    entry.error = Some(e.to_string());
                    self.log(entry).await;

                    if e.is_transient() && attempt <= self.config.max_retries {
                        let backoff = self
                            .config
                            .retry_backoff_ms
                            .saturating_mul(1u64 << (attempt - 1).min(16));
                        warn!(
                            "Transient error fetching {} (attempt {}/{}), retrying in {}ms: {}",
                            url,
                            attempt,
                            self.config.max_retries + 1,
                            backoff,
                            e
                        );
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        continue;
                    }

                    return Err(Error::FetchFailed(format!(
                        "{} failed after {} attempt(s): {}",
                        url, attempt, e
                    )));
                }
            }
        }
    }

    async fn send(client: &Client, url: &str) -> Result<FetchResult> {
        let response = client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let raw_html = response.text().await.map_err(classify)?;

        Ok(FetchResult {
            status_code: status.as_u16(),
            final_url,
            raw_html,
            elapsed_ms: 0,
            rendered: false,
            error: (!status.is_success()).then(|| format!("HTTP {}", status)),
            attempts: 0,
            content_type,
        })
    }

    async fn render(
        &self,
        url: &str,
        platform: PlatformVariant,
        pacer: &HostPacer,
        attempt: u32,
    ) -> Result<FetchResult> {
        let renderer = self.renderer.as_ref().ok_or_else(|| {
            Error::Render(
                "JavaScript rendering not available; compile with --features js-rendering"
                    .to_string(),
            )
        })?;

        pacer.wait().await;
        self.global_limiter.wait().await;

        let deadline =
            Duration::from_millis(self.config.render_timeout_ms + self.config.render_wait_ms);
        let start = Instant::now();
        let outcome = {
            let _permit = self.acquire_permit().await?;
            match tokio::time::timeout(deadline, renderer.render(url, platform)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Render(format!("Render deadline exceeded: {}", url))),
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut entry = CrawlLogEntry::new(url, attempt);
        entry.rendered = true;
        entry.elapsed_ms = elapsed_ms;

        match outcome {
            Ok(page) => {
                entry.status_code = Some(200);
                self.log(entry).await;
                info!("Rendered {} in {}ms ({} bytes)", url, elapsed_ms, page.html.len());
                Ok(FetchResult {
                    status_code: 200,
                    final_url: page.final_url,
                    raw_html: page.html,
                    elapsed_ms,
                    rendered: true,
                    error: None,
                    attempts: attempt,
                    content_type: Some("text/html".to_string()),
                })
            }
            Err(e) => {
                entry.error = Some(e.to_string());
                self.log(entry).await;
                Err(e)
            }
        }
    }

    async fn log(&self, entry: CrawlLogEntry) {
        if let Err(e) = self.crawl_log.record(entry).await {
            warn!("Failed to record crawl log entry: {}", e);
        }
    }

    /// Client for robots.txt requests, routed like page fetches
    fn robots_client(&self) -> Client {
        self.proxies
            .next()
            .map(|slot| slot.client)
            .unwrap_or_else(|| self.client.clone())
    }
}
