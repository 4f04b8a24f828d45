//! Default values for configuration

use std::collections::BTreeMap;

/// Default user agent
pub fn default_crawl_user_agent() -> String {
    format!(
        "blogseo/{} (+https://github.com/sealad886/blogseo)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Default minimum delay between requests to one host (1 second)
pub fn default_request_delay_ms() -> u64 {
    1000
}

/// Default global concurrent request cap
pub fn default_max_concurrent_requests() -> usize {
    16
}

/// Default request timeout (30 seconds)
pub fn default_timeout_ms() -> u64 {
    30_000
}

/// Default: respect robots.txt
pub fn default_respect_robots() -> bool {
    true
}

/// Default network-level retries per fetch
pub fn default_crawl_max_retries() -> u32 {
    3
}

/// Default base backoff for network retries
pub fn default_crawl_retry_backoff_ms() -> u64 {
    500
}

/// Default redirect limit
pub fn default_max_redirects() -> usize {
    5
}

/// Default global requests per second across all hosts
pub fn default_global_requests_per_second() -> u32 {
    20
}

/// Default consecutive failures before a proxy is considered unhealthy
pub fn default_proxy_unhealthy_after() -> u32 {
    3
}

/// Default page load timeout for headless rendering (30 seconds)
pub fn default_render_timeout_ms() -> u64 {
    30_000
}

/// Default settle time after load for hydrated content (2 seconds)
pub fn default_render_wait_ms() -> u64 {
    2000
}

/// Default: upgrade client-rendered shells to headless rendering
pub fn default_auto_render_spa() -> bool {
    true
}

/// Default Accept-Language header
pub fn default_accept_language() -> String {
    "ko-KR,ko;q=0.8,en-US;q=0.5,en;q=0.3".to_string()
}

/// Default per-platform request delays
pub fn default_platform_delays_ms() -> BTreeMap<String, u64> {
    [
        ("naver", 2000),
        ("tistory", 1000),
        ("wordpress", 500),
        ("medium", 1500),
        ("brunch", 2000),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Default sub-score weights (sum to 1.0)
pub fn default_weight_keyword() -> f64 {
    0.20
}

pub fn default_weight_metadata() -> f64 {
    0.20
}

pub fn default_weight_heading() -> f64 {
    0.15
}

pub fn default_weight_link() -> f64 {
    0.10
}

pub fn default_weight_image() -> f64 {
    0.10
}

pub fn default_weight_readability() -> f64 {
    0.15
}

pub fn default_weight_technical() -> f64 {
    0.10
}

/// Default optimal keyword density band (percent)
pub fn default_keyword_density_min() -> f64 {
    1.0
}

pub fn default_keyword_density_max() -> f64 {
    3.0
}

/// Default ideal title length band (characters)
pub fn default_title_min_chars() -> usize {
    30
}

pub fn default_title_max_chars() -> usize {
    60
}

/// Default ideal meta description length band (characters)
pub fn default_description_min_chars() -> usize {
    120
}

pub fn default_description_max_chars() -> usize {
    160
}

/// Default word count at which content counts as long-form
pub fn default_long_form_words() -> usize {
    300
}

/// Default healthy internal link ratio band
pub fn default_internal_ratio_min() -> f64 {
    0.3
}

pub fn default_internal_ratio_max() -> f64 {
    0.8
}

/// Default oversize image thresholds
pub fn default_max_image_width() -> u32 {
    2000
}

pub fn default_max_image_bytes() -> u64 {
    200_000
}

/// Default number of auto-derived keywords used for scoring
pub fn default_auto_keywords() -> usize {
    3
}

/// Default number of ranked keywords returned
pub fn default_nlp_top_keywords() -> usize {
    10
}

/// Default maximum number of topics
pub fn default_nlp_max_topics() -> usize {
    5
}

/// Default inference deadline (5 seconds)
pub fn default_inference_timeout_ms() -> u64 {
    5000
}

/// Default worker pool size
pub fn default_job_workers() -> usize {
    4
}

/// Default stage-level fetch retries
pub fn default_job_max_retries() -> u32 {
    3
}

/// Default base backoff between stage retries
pub fn default_job_retry_backoff_ms() -> u64 {
    1000
}

/// Default cap on stage retry backoff (30 seconds)
pub fn default_job_max_backoff_ms() -> u64 {
    30_000
}

/// Default job lease (30 seconds), renewed at a third of that
pub fn default_job_lease_ms() -> u64 {
    30_000
}
