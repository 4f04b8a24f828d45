//! Blog platform detection and fetch strategy selection
//!
//! Detection walks an ordered signature table: URL host patterns first, then
//! HTML fingerprints when the host is ambiguous. First match wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Recognized publishing platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformVariant {
    Naver,
    Tistory,
    WordPress,
    Medium,
    Brunch,
    Generic,
}

impl PlatformVariant {
    pub const ALL: [PlatformVariant; 6] = [
        PlatformVariant::Naver,
        PlatformVariant::Tistory,
        PlatformVariant::WordPress,
        PlatformVariant::Medium,
        PlatformVariant::Brunch,
        PlatformVariant::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformVariant::Naver => "naver",
            PlatformVariant::Tistory => "tistory",
            PlatformVariant::WordPress => "wordpress",
            PlatformVariant::Medium => "medium",
            PlatformVariant::Brunch => "brunch",
            PlatformVariant::Generic => "generic",
        }
    }
}

impl std::fmt::Display for PlatformVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformVariant {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        PlatformVariant::ALL
            .into_iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .ok_or_else(|| crate::error::Error::Internal(format!("Unknown platform: {}", s)))
    }
}

/// How a page should be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Plain HTTP GET
    Static,
    /// Headless browser with script execution
    Rendered,
}

/// One row of the signature table
struct Signature {
    platform: PlatformVariant,
    host_patterns: &'static [&'static str],
    html_patterns: &'static [&'static str],
}

const SIGNATURES: &[Signature] = &[
    Signature {
        platform: PlatformVariant::Naver,
        host_patterns: &[r"(^|\.)blog\.naver\.com$"],
        html_patterns: &[
            r#"class\s*=\s*["'][^"']*se-main-container"#,
            r#"<meta[^>]+property\s*=\s*["']og:site_name["'][^>]+content\s*=\s*["']네이버 블로그"#,
        ],
    },
    Signature {
        platform: PlatformVariant::Tistory,
        host_patterns: &[r"(^|\.)tistory\.com$"],
        html_patterns: &[
            r#"<meta[^>]+name\s*=\s*["']generator["'][^>]+content\s*=\s*["']tistory"#,
            r"tt_article_useless_p_margin",
            r"t1\.daumcdn\.net/tistory",
        ],
    },
    Signature {
        platform: PlatformVariant::WordPress,
        host_patterns: &[r"(^|\.)wordpress\.com$", r"(^|\.)wp\.com$"],
        html_patterns: &[
            r#"<meta[^>]+name\s*=\s*["']generator["'][^>]+content\s*=\s*["']wordpress"#,
            r"/wp-content/",
            r"/wp-includes/",
        ],
    },
    Signature {
        platform: PlatformVariant::Medium,
        host_patterns: &[r"(^|\.)medium\.com$"],
        html_patterns: &[
            r#"<meta[^>]+property\s*=\s*["']al:android:package["'][^>]+content\s*=\s*["']com\.medium\.reader"#,
            r"cdn-images-\d+\.medium\.com",
        ],
    },
    Signature {
        platform: PlatformVariant::Brunch,
        host_patterns: &[r"(^|\.)brunch\.co\.kr$"],
        html_patterns: &[r#"class\s*=\s*["'][^"']*wrap_body"#],
    },
];

struct CompiledSignature {
    platform: PlatformVariant,
    hosts: Vec<Regex>,
    html: Vec<Regex>,
}

fn compiled_signatures() -> &'static [CompiledSignature] {
    static COMPILED: OnceLock<Vec<CompiledSignature>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SIGNATURES
            .iter()
            .map(|sig| CompiledSignature {
                platform: sig.platform,
                hosts: sig
                    .host_patterns
                    .iter()
                    .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                    .collect(),
                html: sig
                    .html_patterns
                    .iter()
                    .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                    .collect(),
            })
            .collect()
    })
}

/// Classify a URL (and optional HTML sample) into a platform variant
pub fn detect(url: &str, html_sample: Option<&str>) -> PlatformVariant {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()));

    if let Some(host) = host.as_deref() {
        for sig in compiled_signatures() {
            if sig.hosts.iter().any(|re| re.is_match(host)) {
                debug!("Platform {} matched by host {}", sig.platform, host);
                return sig.platform;
            }
        }
    }

    if let Some(html) = html_sample {
        for sig in compiled_signatures() {
            if sig.html.iter().any(|re| re.is_match(html)) {
                debug!("Platform {} matched by HTML fingerprint", sig.platform);
                return sig.platform;
            }
        }
    }

    PlatformVariant::Generic
}

/// Pick the fetch strategy for a platform.
///
/// Naver and Medium hydrate post bodies with client-side scripts.
pub fn select_strategy(platform: PlatformVariant) -> FetchStrategy {
    match platform {
        PlatformVariant::Naver | PlatformVariant::Medium => FetchStrategy::Rendered,
        _ => FetchStrategy::Static,
    }
}
