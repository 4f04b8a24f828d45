//! Technical SEO signals and URL structure

use super::{Findings, SubScore};
use crate::normalize::Document;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const MAX_URL_CHARS: usize = 100;

fn readable_path() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    // Non-ASCII slugs arrive percent-encoded
    PATTERN
        .get_or_init(|| Regex::new(r"^/[\w\-/%.]*$").ok())
        .as_ref()
}

fn score_url(doc: &Document, findings: &mut Findings) {
    let len = doc.url.chars().count();
    if len <= MAX_URL_CHARS {
        findings.add(15.0);
    } else {
        findings.flag(
            format!("URL is {} characters long", len),
            format!("Keep URLs under {} characters", MAX_URL_CHARS),
        );
    }

    let Ok(url) = Url::parse(&doc.url) else {
        findings.flag("URL could not be parsed", "Publish the post at a valid URL");
        return;
    };

    let path = url.path();
    let clean = readable_path().is_some_and(|re| re.is_match(path)) && url.query().is_none();
    let descriptive = path.split('/').any(|segment| segment.chars().count() > 2);
    if clean && descriptive {
        findings.add(10.0);
    } else {
        findings.flag(
            "URL is not a readable slug",
            "Use a short descriptive slug without query parameters",
        );
    }
}

pub(super) fn score(doc: &Document) -> SubScore {
    let mut findings = Findings::default();
    let technical = &doc.technical;

    if technical.https {
        findings.add(25.0);
    } else {
        findings.flag("Page is not served over HTTPS", "Serve the blog over HTTPS");
    }

    score_url(doc, &mut findings);

    if technical.canonical_url.is_some() {
        findings.add(15.0);
    } else {
        findings.flag("No canonical link", "Declare a canonical URL");
    }

    if technical.has_viewport {
        findings.add(15.0);
    } else {
        findings.flag("No viewport meta tag", "Add a viewport meta tag for mobile rendering");
    }

    if technical.structured_data.is_empty() {
        findings.flag(
            "No structured data",
            "Add schema.org BlogPosting markup (JSON-LD)",
        );
    } else {
        findings.add(10.0);
    }

    if technical.html_lang.is_some() {
        findings.add(10.0);
    } else {
        findings.flag("No lang attribute on <html>", "Declare the page language");
    }

    findings.finish()
}
