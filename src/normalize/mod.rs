//! Content normalization
//!
//! Turns a fetched page from any supported platform into one canonical
//! [`Document`]:
//! - Platform selector rules with a heuristic fallback
//! - Whitespace normalization and encoding repair
//! - Ordered headings, deduplicated link and image sets
//! - Page metadata (description, keywords, social tags, technical signals)

mod html;
mod rules;
mod text;

pub use html::*;
pub use rules::*;
pub use text::*;

use crate::crawl::FetchResult;
use crate::error::{Error, Result};
use crate::platform::PlatformVariant;
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use tracing::debug;
use url::Url;

/// A heading in the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level (1-6)
    pub level: u8,
    pub text: String,
}

/// An outgoing link
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    /// Absolute URL without fragment
    pub href: String,
    pub anchor_text: String,
    /// Same host as the post (ignoring `www.`)
    pub is_internal: bool,
    pub nofollow: bool,
}

/// An embedded image
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    pub alt_text_present: bool,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Known only for inline `data:` images
    pub size_bytes: Option<u64>,
}

/// Page-level technical SEO signals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalSignals {
    pub https: bool,
    pub canonical_url: Option<String>,
    pub has_viewport: bool,
    /// Distinct structured data kinds: json-ld, microdata, rdfa
    pub structured_data: Vec<String>,
    pub html_lang: Option<String>,
}

/// Canonical representation of one blog post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub platform: PlatformVariant,
    pub title: String,
    pub body_text: String,
    pub raw_html: String,
    pub meta_description: Option<String>,
    pub meta_keywords: Vec<String>,
    pub headings: Vec<Heading>,
    pub links: BTreeSet<Link>,
    pub images: BTreeSet<Image>,
    pub published_at: Option<DateTime<Utc>>,
    pub language: String,
    pub author: Option<String>,
    pub social_tags: BTreeMap<String, String>,
    pub technical: TechnicalSignals,
    /// blake3 of `body_text`
    pub content_hash: String,
}

impl Document {
    pub fn word_count(&self) -> usize {
        self.body_text.split_whitespace().count()
    }

    pub fn first_paragraph(&self) -> &str {
        paragraphs(&self.body_text).next().unwrap_or("")
    }

    pub fn internal_link_count(&self) -> usize {
        self.links.iter().filter(|l| l.is_internal).count()
    }

    pub fn external_link_count(&self) -> usize {
        self.links.iter().filter(|l| !l.is_internal).count()
    }

    /// Re-serialize into HTML that normalizes back to the same title,
    /// heading order and link set
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n",
            escape_html(&self.language),
            escape_html(&self.title)
        );
        if let Some(description) = &self.meta_description {
            let _ = writeln!(out, "<meta name=\"description\" content=\"{}\">", escape_html(description));
        }
        if !self.meta_keywords.is_empty() {
            let _ = writeln!(
                out,
                "<meta name=\"keywords\" content=\"{}\">",
                escape_html(&self.meta_keywords.join(", "))
            );
        }
        if let Some(author) = &self.author {
            let _ = writeln!(out, "<meta name=\"author\" content=\"{}\">", escape_html(author));
        }
        if let Some(published) = &self.published_at {
            let _ = writeln!(
                out,
                "<meta property=\"article:published_time\" content=\"{}\">",
                published.to_rfc3339()
            );
        }
        for (key, value) in &self.social_tags {
            let attr = if key.starts_with("og:") { "property" } else { "name" };
            let _ = writeln!(
                out,
                "<meta {}=\"{}\" content=\"{}\">",
                attr,
                escape_html(key),
                escape_html(value)
            );
        }
        if self.technical.has_viewport {
            out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        }
        if let Some(canonical) = &self.technical.canonical_url {
            let _ = writeln!(out, "<link rel=\"canonical\" href=\"{}\">", escape_html(canonical));
        }
        out.push_str("</head>\n<body>\n<article>\n");

        for heading in &self.headings {
            let _ = writeln!(
                out,
                "<h{level}>{}</h{level}>",
                escape_html(&heading.text),
                level = heading.level.clamp(1, 6)
            );
        }
        for paragraph in paragraphs(&self.body_text) {
            let _ = writeln!(out, "<p>{}</p>", escape_html(paragraph));
        }

        if !self.links.is_empty() {
            out.push_str("<ul>\n");
            for link in &self.links {
                let rel = if link.nofollow { " rel=\"nofollow\"" } else { "" };
                let _ = writeln!(
                    out,
                    "<li><a href=\"{}\"{}>{}</a></li>",
                    escape_html(&link.href),
                    rel,
                    escape_html(&link.anchor_text)
                );
            }
            out.push_str("</ul>\n");
        }

        for image in &self.images {
            let _ = write!(out, "<img src=\"{}\"", escape_html(&image.src));
            if let Some(alt) = &image.alt {
                let _ = write!(out, " alt=\"{}\"", escape_html(alt));
            }
            if let Some(width) = image.width {
                let _ = write!(out, " width=\"{}\"", width);
            }
            if let Some(height) = image.height {
                let _ = write!(out, " height=\"{}\"", height);
            }
            out.push_str(">\n");
        }

        out.push_str("</article>\n</body>\n</html>\n");
        out
    }
}

/// Build a [`Document`] from a fetched page.
///
/// Fails with `ExtractionFailed` when no title or no body text can be found.
pub fn normalize(fetch: &FetchResult, platform: PlatformVariant) -> Result<Document> {
    let url = fetch.final_url.clone();
    let page_url = Url::parse(&url).ok();
    let document = Html::parse_document(&fetch.raw_html);

    let extraction = extract_for(platform, &document);

    let title = extraction
        .title
        .map(|t| collapse_inline(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::ExtractionFailed(format!("No title found at {}", url)))?;
    let body_text = extraction
        .body_text
        .map(|b| clean_text(&b))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::ExtractionFailed(format!("No body text found at {}", url)))?;

    let meta_keywords = meta_name(&document, "keywords")
        .map(|k| {
            k.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let technical = extract_technical(&document, page_url.as_ref());
    let language = detect_language(technical.html_lang.as_deref(), &body_text);
    let content_hash = blake3::hash(body_text.as_bytes()).to_hex().to_string();

    let doc = Document {
        platform,
        title,
        meta_description: meta_name(&document, "description"),
        meta_keywords,
        headings: extract_headings(&document),
        links: extract_links(&document, page_url.as_ref()),
        images: extract_images(&document, page_url.as_ref()),
        published_at: extraction.published_raw.as_deref().and_then(parse_date),
        author: extraction
            .author
            .or_else(|| meta_name(&document, "author")),
        social_tags: extract_social_tags(&document),
        technical,
        language,
        content_hash,
        body_text,
        raw_html: fetch.raw_html.clone(),
        url,
    };

    debug!(
        "Normalized {}: {} words, {} headings, {} links, {} images",
        doc.url,
        doc.word_count(),
        doc.headings.len(),
        doc.links.len(),
        doc.images.len()
    );

    Ok(doc)
}
