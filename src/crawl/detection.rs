//! Client-rendered page detection
//!
//! A static fetch of a single-page application usually returns an empty shell
//! (`<div id="root"></div>` plus a bundle). These heuristics score the shell so
//! the crawler can upgrade the fetch to headless rendering.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Known SPA frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaFramework {
    React,
    Angular,
    Vue,
    Svelte,
    NextJs,
    Nuxt,
    Gatsby,
    Ember,
}

impl std::fmt::Display for SpaFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SpaFramework::React => "React",
            SpaFramework::Angular => "Angular",
            SpaFramework::Vue => "Vue",
            SpaFramework::Svelte => "Svelte",
            SpaFramework::NextJs => "Next.js",
            SpaFramework::Nuxt => "Nuxt",
            SpaFramework::Gatsby => "Gatsby",
            SpaFramework::Ember => "Ember",
        };
        f.write_str(name)
    }
}

/// Result of page analysis
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    /// Framework fingerprint, when one was found
    pub framework: Option<SpaFramework>,
    /// Accumulated evidence (0.0 - 1.0)
    pub confidence: f32,
    /// Whether JS rendering is recommended
    pub needs_js_rendering: bool,
    /// Detected indicators that led to this conclusion
    pub indicators: Vec<String>,
    /// Visible text / total HTML size
    pub content_ratio: f32,
}

const SPA_THRESHOLD: f32 = 0.5;

const SHELL_PATTERNS: &[(&str, &str)] = &[
    (r"<app-root[^>]*>\s*</app-root>", "Angular <app-root> shell"),
    (r"<app-root[^>]*>\s*Loading", "Angular <app-root> loading state"),
    (r#"<div\s+id\s*=\s*["']root["'][^>]*>\s*</div>"#, "#root shell"),
    (r#"<div\s+id\s*=\s*["']app["'][^>]*>\s*</div>"#, "#app shell"),
    (r#"<div\s+id\s*=\s*["']__next["'][^>]*>\s*</div>"#, "Next.js #__next shell"),
    (r#"<div\s+id\s*=\s*["']__nuxt["'][^>]*>\s*</div>"#, "Nuxt #__nuxt shell"),
    (r#"<div\s+id\s*=\s*["']svelte["'][^>]*>\s*</div>"#, "Svelte #svelte shell"),
];

const FRAMEWORK_MARKERS: &[(SpaFramework, &[&str])] = &[
    (SpaFramework::Angular, &["ng-version", "_ngcontent", "_nghost"]),
    (SpaFramework::NextJs, &["__next_data__", "/_next/static"]),
    (SpaFramework::Nuxt, &["__nuxt", "/_nuxt/"]),
    (SpaFramework::Gatsby, &["___gatsby", "/page-data/"]),
    (SpaFramework::React, &["data-reactroot", "data-reactid"]),
    (SpaFramework::Vue, &["data-v-app", "v-cloak"]),
    (SpaFramework::Svelte, &["__svelte", "svelte-announcer"]),
    (SpaFramework::Ember, &["ember-view", "data-ember"]),
];

const HYDRATION_MARKERS: &[&str] = &[
    "data-server-rendered",
    "data-hydrate",
    "window.__initial_state__",
    "window.__apollo_state__",
    "window.__preloaded_state__",
];

struct Patterns {
    script_block: Regex,
    style_block: Regex,
    tag: Regex,
    script_open: Regex,
    shells: Vec<(Regex, &'static str)>,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                script_block: Regex::new(r"(?is)<script[^>]*>.*?</script>").ok()?,
                style_block: Regex::new(r"(?is)<style[^>]*>.*?</style>").ok()?,
                tag: Regex::new(r"<[^>]+>").ok()?,
                script_open: Regex::new(r"(?i)<script\b").ok()?,
                shells: SHELL_PATTERNS
                    .iter()
                    .filter_map(|(p, d)| Regex::new(&format!("(?i){}", p)).ok().map(|re| (re, *d)))
                    .collect(),
            })
        })
        .as_ref()
}

/// Score a statically fetched page for client-side rendering
pub fn analyze_page(html: &str, url: &str) -> PageAnalysis {
    let Some(patterns) = patterns() else {
        return PageAnalysis {
            framework: None,
            confidence: 0.0,
            needs_js_rendering: false,
            indicators: Vec::new(),
            content_ratio: 1.0,
        };
    };

    let html_lower = html.to_lowercase();
    let mut indicators = Vec::new();
    let mut score: f32 = 0.0;

    let content_ratio = content_ratio(html, patterns);
    debug!("Content ratio for {}: {:.2}", url, content_ratio);

    if content_ratio < 0.05 {
        score += 0.4;
        indicators.push(format!("Very low content ratio: {:.1}%", content_ratio * 100.0));
    } else if content_ratio < 0.15 {
        score += 0.2;
        indicators.push(format!("Low content ratio: {:.1}%", content_ratio * 100.0));
    }

    let shells: Vec<&str> = patterns
        .shells
        .iter()
        .filter(|(re, _)| re.is_match(html))
        .map(|(_, d)| *d)
        .collect();
    if !shells.is_empty() {
        score += 0.3;
        indicators.extend(shells.into_iter().map(String::from));
    }

    let framework = FRAMEWORK_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| html_lower.contains(m)))
        .map(|(fw, _)| *fw);
    if let Some(fw) = framework {
        score += 0.2;
        indicators.push(format!("{} markers", fw));
    }

    let script_count = patterns.script_open.find_iter(html).count();
    if script_count > 5 {
        score += 0.15;
        indicators.push(format!("Heavy JS: {} scripts", script_count));
    }

    if HYDRATION_MARKERS.iter().any(|m| html_lower.contains(m)) {
        score += 0.1;
        indicators.push("Client-side hydration markers".to_string());
    }

    PageAnalysis {
        framework,
        confidence: score.min(1.0),
        needs_js_rendering: score >= SPA_THRESHOLD,
        indicators,
        content_ratio,
    }
}

fn content_ratio(html: &str, patterns: &Patterns) -> f32 {
    let total_size = html.len() as f32;
    if total_size == 0.0 {
        return 0.0;
    }

    // Scripts and styles go before tags so their bodies are not counted as text
    let cleaned = patterns.script_block.replace_all(html, "");
    let cleaned = patterns.style_block.replace_all(&cleaned, "");
    let text_only = patterns.tag.replace_all(&cleaned, " ");

    let text_size: usize = text_only
        .split_whitespace()
        .map(|w| w.len() + 1)
        .sum::<usize>()
        .saturating_sub(1);

    text_size as f32 / total_size
}
