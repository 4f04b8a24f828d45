//! Configuration management for blogseo
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Crawler configuration
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// SEO scoring weights and thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// NLP analysis configuration
    #[serde(default)]
    pub nlp: NlpConfig,

    /// Job orchestration configuration
    #[serde(default)]
    pub jobs: JobConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Crawler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// User agent string (also used for robots.txt matching)
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,

    /// Minimum delay between requests to the same host
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Global cap on in-flight requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Proxy URLs rotated between requests (empty = direct)
    #[serde(default)]
    pub proxy_pool: Vec<String>,

    /// Whether to respect robots.txt
    #[serde(default = "default_respect_robots")]
    pub respect_robots: bool,

    /// Network-level retries before a fetch fails
    #[serde(default = "default_crawl_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between network retries
    #[serde(default = "default_crawl_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum redirects followed
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Requests per second across all hosts
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,

    /// Consecutive failures before a proxy is skipped
    #[serde(default = "default_proxy_unhealthy_after")]
    pub proxy_unhealthy_after: u32,

    /// Page load timeout for headless rendering
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Settle time after load for hydrated content
    #[serde(default = "default_render_wait_ms")]
    pub render_wait_ms: u64,

    /// Upgrade static fetches of client-rendered shells to headless rendering
    #[serde(default = "default_auto_render_spa")]
    pub auto_render_spa: bool,

    /// Disable browser sandbox (required in some Docker/CI environments)
    #[serde(default)]
    pub js_no_sandbox: bool,

    /// Accept-Language header sent with static fetches
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Per-platform request delay overrides, keyed by platform name
    #[serde(default = "default_platform_delays_ms")]
    pub platform_delays_ms: BTreeMap<String, u64>,
}

/// Sub-score weights for the aggregate SEO score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_weight_keyword")]
    pub keyword: f64,
    #[serde(default = "default_weight_metadata")]
    pub metadata: f64,
    #[serde(default = "default_weight_heading")]
    pub heading: f64,
    #[serde(default = "default_weight_link")]
    pub link: f64,
    #[serde(default = "default_weight_image")]
    pub image: f64,
    #[serde(default = "default_weight_readability")]
    pub readability: f64,
    #[serde(default = "default_weight_technical")]
    pub technical: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.keyword
            + self.metadata
            + self.heading
            + self.link
            + self.image
            + self.readability
            + self.technical
    }

    fn all(&self) -> [f64; 7] {
        [
            self.keyword,
            self.metadata,
            self.heading,
            self.link,
            self.image,
            self.readability,
            self.technical,
        ]
    }
}

/// SEO scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Lower bound of the optimal keyword density band (percent)
    #[serde(default = "default_keyword_density_min")]
    pub keyword_density_min: f64,

    /// Upper bound of the optimal keyword density band (percent)
    #[serde(default = "default_keyword_density_max")]
    pub keyword_density_max: f64,

    #[serde(default = "default_title_min_chars")]
    pub title_min_chars: usize,

    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    #[serde(default = "default_description_min_chars")]
    pub description_min_chars: usize,

    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,

    /// Word count from which a post counts as long-form
    #[serde(default = "default_long_form_words")]
    pub long_form_words: usize,

    /// Healthy band for internal / (internal + external) links
    #[serde(default = "default_internal_ratio_min")]
    pub internal_ratio_min: f64,

    #[serde(default = "default_internal_ratio_max")]
    pub internal_ratio_max: f64,

    /// Images wider than this are flagged as oversized
    #[serde(default = "default_max_image_width")]
    pub max_image_width: u32,

    /// Embedded images larger than this are flagged as oversized
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    /// Keywords derived automatically when none are supplied
    #[serde(default = "default_auto_keywords")]
    pub auto_keywords: usize,
}

/// NLP analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpConfig {
    /// Directory with sentiment lexicons (`sentiment-<lang>.txt`).
    /// When unset, the built-in lexicons are used.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,

    /// Number of ranked keywords returned
    #[serde(default = "default_nlp_top_keywords")]
    pub top_keywords: usize,

    /// Maximum number of topics returned
    #[serde(default = "default_nlp_max_topics")]
    pub max_topics: usize,

    /// Deadline for each inference step
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
}

/// Job orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Concurrent pipeline workers
    #[serde(default = "default_job_workers")]
    pub workers: usize,

    /// Stage-level retries for transient fetch outcomes
    #[serde(default = "default_job_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between stage retries
    #[serde(default = "default_job_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Cap on stage retry backoff
    #[serde(default = "default_job_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How long a claim on a job lasts without renewal. Another process may
    /// take over a non-terminal job once its owner's lease has run out.
    #[serde(default = "default_job_lease_ms")]
    pub lease_ms: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for blogseo data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: default_crawl_user_agent(),
            request_delay_ms: default_request_delay_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
            timeout_ms: default_timeout_ms(),
            proxy_pool: Vec::new(),
            respect_robots: default_respect_robots(),
            max_retries: default_crawl_max_retries(),
            retry_backoff_ms: default_crawl_retry_backoff_ms(),
            max_redirects: default_max_redirects(),
            global_requests_per_second: default_global_requests_per_second(),
            proxy_unhealthy_after: default_proxy_unhealthy_after(),
            render_timeout_ms: default_render_timeout_ms(),
            render_wait_ms: default_render_wait_ms(),
            auto_render_spa: default_auto_render_spa(),
            js_no_sandbox: false,
            accept_language: default_accept_language(),
            platform_delays_ms: default_platform_delays_ms(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword: default_weight_keyword(),
            metadata: default_weight_metadata(),
            heading: default_weight_heading(),
            link: default_weight_link(),
            image: default_weight_image(),
            readability: default_weight_readability(),
            technical: default_weight_technical(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            keyword_density_min: default_keyword_density_min(),
            keyword_density_max: default_keyword_density_max(),
            title_min_chars: default_title_min_chars(),
            title_max_chars: default_title_max_chars(),
            description_min_chars: default_description_min_chars(),
            description_max_chars: default_description_max_chars(),
            long_form_words: default_long_form_words(),
            internal_ratio_min: default_internal_ratio_min(),
            internal_ratio_max: default_internal_ratio_max(),
            max_image_width: default_max_image_width(),
            max_image_bytes: default_max_image_bytes(),
            auto_keywords: default_auto_keywords(),
        }
    }
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            top_keywords: default_nlp_top_keywords(),
            max_topics: default_nlp_max_topics(),
            inference_timeout_ms: default_inference_timeout_ms(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: default_job_workers(),
            max_retries: default_job_max_retries(),
            retry_backoff_ms: default_job_retry_backoff_ms(),
            max_backoff_ms: default_job_max_backoff_ms(),
            lease_ms: default_job_lease_ms(),
        }
    }
}

impl CrawlConfig {
    /// Request delay for a platform, falling back to `request_delay_ms`
    pub fn delay_for_platform(&self, platform: &str) -> u64 {
        self.platform_delays_ms
            .get(platform)
            .copied()
            .unwrap_or(self.request_delay_ms)
    }
}

impl Config {
    /// Get the default base directory for blogseo (~/.blogseo)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".blogseo")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("jobs.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("jobs.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, using defaults when absent
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let weights = &self.scoring.weights;
        if weights.all().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(
                "scoring.weights must be finite and not negative".to_string(),
            ));
        }
        if (weights.sum() - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "scoring.weights must sum to 1.0 (got {:.4})",
                weights.sum()
            )));
        }

        let scoring = &self.scoring;
        if scoring.keyword_density_min < 0.0
            || scoring.keyword_density_min >= scoring.keyword_density_max
        {
            return Err(Error::Config(
                "scoring.keyword_density_min must be >= 0 and < keyword_density_max".to_string(),
            ));
        }
        if scoring.title_min_chars >= scoring.title_max_chars {
            return Err(Error::Config(
                "scoring.title_min_chars must be < title_max_chars".to_string(),
            ));
        }
        if scoring.description_min_chars >= scoring.description_max_chars {
            return Err(Error::Config(
                "scoring.description_min_chars must be < description_max_chars".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&scoring.internal_ratio_min)
            || !(0.0..=1.0).contains(&scoring.internal_ratio_max)
            || scoring.internal_ratio_min > scoring.internal_ratio_max
        {
            return Err(Error::Config(
                "scoring.internal_ratio_min/max must be within 0.0..=1.0 and ordered".to_string(),
            ));
        }

        if self.crawl.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "crawl.max_concurrent_requests must be positive".to_string(),
            ));
        }
        if self.crawl.timeout_ms == 0 {
            return Err(Error::Config("crawl.timeout_ms must be positive".to_string()));
        }
        for proxy in &self.crawl.proxy_pool {
            url::Url::parse(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL {}: {}", proxy, e)))?;
        }

        if self.jobs.workers == 0 {
            return Err(Error::Config("jobs.workers must be positive".to_string()));
        }
        if !(100..=86_400_000).contains(&self.jobs.lease_ms) {
            return Err(Error::Config(
                "jobs.lease_ms must be between 100 and 86400000".to_string(),
            ));
        }
        if self.nlp.inference_timeout_ms == 0 {
            return Err(Error::Config(
                "nlp.inference_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.crawl.respect_robots);
        assert!((config.scoring.weights.sum() - 1.0).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.crawl.request_delay_ms = 250;
        config.crawl.proxy_pool = vec!["http://127.0.0.1:8080".to_string()];

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.crawl.request_delay_ms, 250);
        assert_eq!(loaded.crawl.proxy_pool.len(), 1);
        assert_eq!(loaded.paths.db_file, tmp.path().join("jobs.db"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawl]
            respect_robots = false

            [scoring.weights]
            keyword = 0.2
            "#,
        )
        .unwrap();
        assert!(!config.crawl.respect_robots);
        assert_eq!(config.crawl.timeout_ms, default_timeout_ms());
        assert_eq!(config.scoring.weights.metadata, default_weight_metadata());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = Config::default();
        config.scoring.weights.keyword = 0.5;
        assert!(config.validate().is_err());

        config.scoring.weights.keyword = default_weight_keyword();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_finite_weights_rejected() {
        // NaN compares false against every bound, so only is_finite catches it
        let mut config = Config::default();
        config.scoring.weights.keyword = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.weights.readability = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lease_bounds() {
        let mut config = Config::default();
        config.jobs.lease_ms = 10;
        assert!(config.validate().is_err());
        config.jobs.lease_ms = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_band_validation() {
        let mut config = Config::default();
        config.scoring.keyword_density_min = 4.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.title_min_chars = 80;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.proxy_pool = vec!["not a url".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_platform_delay_lookup() {
        let config = CrawlConfig::default();
        assert_eq!(config.delay_for_platform("naver"), 2000);
        assert_eq!(config.delay_for_platform("generic"), config.request_delay_ms);
    }
}
