//! HTML extraction helpers: visible text, headings, links, images and page metadata

use super::text::{clean_text, collapse_inline};
use super::{Heading, Image, Link, TechnicalSignals};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// Elements whose content never counts as post text
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "aside", "form", "noscript", "template", "iframe", "svg",
    "head",
];

/// Elements that end a paragraph
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "br", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote", "pre", "tr", "table", "figure", "figcaption", "header", "hr",
];

pub(crate) fn select_first<'a>(document: &'a Html, selectors: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selectors).ok()?;
    document.select(&selector).next()
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_TAGS.contains(&name)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if is_excluded(name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    let block = BLOCK_TAGS.contains(&name);
                    if block {
                        out.push_str("\n\n");
                    }
                    collect_text(child_el, out);
                    if block {
                        out.push_str("\n\n");
                    }
                }
            }
            _ => {}
        }
    }
}

/// Visible text of an element with paragraph breaks between block elements
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    clean_text(&raw)
}

/// Text of a single element collapsed to one line
pub fn inline_text(element: ElementRef<'_>) -> String {
    collapse_inline(&element.text().collect::<String>())
}

fn is_inside_excluded(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "script" | "noscript" | "template"))
}

/// Headings h1-h6 in document order
pub fn extract_headings(document: &Html) -> Vec<Heading> {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter(|el| !is_inside_excluded(*el))
        .filter_map(|el| {
            let level = el.value().name()[1..].parse::<u8>().ok()?;
            let text = inline_text(el);
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Resolve an href against the page, skipping non-navigational schemes
pub fn resolve_href(base: Option<&Url>, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// All navigational links on the page
pub fn extract_links(document: &Html, page_url: Option<&Url>) -> BTreeSet<Link> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return BTreeSet::new();
    };
    let page_host = page_url.and_then(|u| u.host_str()).map(strip_www);

    document
        .select(&selector)
        .filter(|el| !is_inside_excluded(*el))
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let mut resolved = resolve_href(page_url, href)?;
            resolved.set_fragment(None);

            let is_internal = match (page_host, resolved.host_str()) {
                (Some(page), Some(host)) => strip_www(host) == page,
                _ => false,
            };
            let nofollow = el
                .value()
                .attr("rel")
                .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")))
                .unwrap_or(false);

            Some(Link {
                href: resolved.to_string(),
                anchor_text: inline_text(el),
                is_internal,
                nofollow,
            })
        })
        .collect()
}

/// Decoded size of a base64 `data:` URI payload
fn data_uri_size(src: &str) -> Option<u64> {
    let rest = src.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if header.ends_with(";base64") {
        let trimmed = payload.trim();
        let padding = trimmed.chars().rev().take_while(|c| *c == '=').count();
        Some((trimmed.len() as u64 * 3 / 4).saturating_sub(padding as u64))
    } else {
        Some(payload.len() as u64)
    }
}

fn dimension(value: Option<&str>) -> Option<u32> {
    let digits: String = value?
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// All images on the page, with size metadata when the markup carries it
pub fn extract_images(document: &Html, page_url: Option<&Url>) -> BTreeSet<Image> {
    let Ok(selector) = Selector::parse("img") else {
        return BTreeSet::new();
    };

    document
        .select(&selector)
        .filter(|el| !is_inside_excluded(*el))
        .filter_map(|el| {
            let attrs = el.value();
            // Lazy-loading platforms keep the real source in data attributes
            let raw_src = ["src", "data-src", "data-lazy-src", "data-original"]
                .iter()
                .filter_map(|name| attrs.attr(name))
                .map(str::trim)
                .find(|s| !s.is_empty())?;

            let (src, size_bytes) = if raw_src.starts_with("data:") {
                (raw_src.to_string(), data_uri_size(raw_src))
            } else {
                let resolved = match page_url {
                    Some(base) => base.join(raw_src).ok()?.to_string(),
                    None => raw_src.to_string(),
                };
                (resolved, None)
            };

            let alt = attrs
                .attr("alt")
                .map(collapse_inline)
                .filter(|a| !a.is_empty());

            Some(Image {
                src,
                alt_text_present: alt.is_some(),
                alt,
                width: dimension(attrs.attr("width")),
                height: dimension(attrs.attr("height")),
                size_bytes,
            })
        })
        .collect()
}

/// `<meta name=...>` content
pub fn meta_name(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse("meta[name][content]").ok()?;
    document
        .select(&selector)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|el| el.value().attr("content"))
        .map(collapse_inline)
        .filter(|s| !s.is_empty())
}

/// `<meta property=...>` content
pub fn meta_property(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse("meta[property][content]").ok()?;
    document
        .select(&selector)
        .find(|el| {
            el.value()
                .attr("property")
                .is_some_and(|p| p.eq_ignore_ascii_case(property))
        })
        .and_then(|el| el.value().attr("content"))
        .map(collapse_inline)
        .filter(|s| !s.is_empty())
}

/// All `og:*` and `twitter:*` tags; the first occurrence of a key wins
pub fn extract_social_tags(document: &Html) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    let Ok(selector) = Selector::parse("meta[content]") else {
        return tags;
    };

    for el in document.select(&selector) {
        let attrs = el.value();
        let Some(key) = attrs.attr("property").or_else(|| attrs.attr("name")) else {
            continue;
        };
        let key = key.trim().to_lowercase();
        if !(key.starts_with("og:") || key.starts_with("twitter:")) {
            continue;
        }
        if let Some(content) = attrs.attr("content").map(collapse_inline) {
            if !content.is_empty() {
                tags.entry(key).or_insert(content);
            }
        }
    }

    tags
}

/// Page-level technical SEO signals
pub fn extract_technical(document: &Html, page_url: Option<&Url>) -> TechnicalSignals {
    let canonical_url = Selector::parse("link[rel][href]").ok().and_then(|selector| {
        document
            .select(&selector)
            .find(|el| {
                el.value()
                    .attr("rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
            })
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve_href(page_url, href))
            .map(|u| u.to_string())
    });

    let mut structured_data = BTreeSet::new();
    if select_first(document, r#"script[type="application/ld+json"]"#).is_some() {
        structured_data.insert("json-ld".to_string());
    }
    if select_first(document, "[itemscope]").is_some() {
        structured_data.insert("microdata".to_string());
    }
    if select_first(document, "[typeof], [vocab]").is_some() {
        structured_data.insert("rdfa".to_string());
    }

    let html_lang = select_first(document, "html[lang]")
        .and_then(|el| el.value().attr("lang"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    TechnicalSignals {
        https: page_url.is_some_and(|u| u.scheme() == "https"),
        canonical_url,
        has_viewport: meta_name(document, "viewport").is_some(),
        structured_data: structured_data.into_iter().collect(),
        html_lang,
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
