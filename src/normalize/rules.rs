//! Per-platform extraction rules
//!
//! Native platforms are described by a table of selector values; everything
//! else (and any platform rule that misses) goes through the heuristic ruleset.

use super::html::{inline_text, meta_name, meta_property, select_first, visible_text};
use crate::platform::PlatformVariant;
use scraper::{ElementRef, Html, Selector};

/// Fields pulled out of a page by one ruleset; `None` means "not found"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub title: Option<String>,
    pub body_text: Option<String>,
    pub author: Option<String>,
    /// Raw date string (`datetime` attribute or element text)
    pub published_raw: Option<String>,
}

impl Extraction {
    /// Fill missing fields from a fallback extraction
    pub fn or(self, fallback: Extraction) -> Extraction {
        Extraction {
            title: self.title.or(fallback.title),
            body_text: self.body_text.or(fallback.body_text),
            author: self.author.or(fallback.author),
            published_raw: self.published_raw.or(fallback.published_raw),
        }
    }
}

/// Something that can pull post fields out of a parsed page
pub trait Extract {
    fn extract(&self, document: &Html) -> Extraction;
}

/// CSS selectors for one native platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorRules {
    pub platform: PlatformVariant,
    pub title: &'static str,
    pub body: &'static str,
    pub author: &'static str,
    pub date: &'static str,
}

pub const PLATFORM_RULES: &[SelectorRules] = &[
    SelectorRules {
        platform: PlatformVariant::Naver,
        title: "h3.se_title, .se-title-text, .pcol1",
        body: ".se-main-container, #postViewArea, .se_component_wrap",
        author: ".nick, .blog_nick",
        date: ".se_publishDate, .se-date, .blog_date",
    },
    SelectorRules {
        platform: PlatformVariant::Tistory,
        title: "h1.entry-title, .article-header h1, .titleWrap h2",
        body: ".entry-content, .article-view, .tt_article_useless_p_margin",
        author: ".author, .writer",
        date: ".article-date, .published, .date",
    },
    SelectorRules {
        platform: PlatformVariant::WordPress,
        title: "h1.entry-title, .wp-block-post-title",
        body: ".entry-content, .wp-block-post-content",
        author: ".author, .wp-block-post-author",
        date: "time.entry-date, .entry-date, .wp-block-post-date",
    },
    SelectorRules {
        platform: PlatformVariant::Medium,
        title: "article h1, h1",
        body: "article section, .postArticle-content, article",
        author: ".postMetaInline a, .author, a[rel=\"author\"]",
        date: "time, .date",
    },
    SelectorRules {
        platform: PlatformVariant::Brunch,
        title: ".wrap_title h1, .cover_title",
        body: ".wrap_body",
        author: ".by_author, .txt_by",
        date: ".wrap_date, .date",
    },
];

/// Rules for a platform; `None` for `Generic`
pub fn rules_for(platform: PlatformVariant) -> Option<&'static SelectorRules> {
    PLATFORM_RULES.iter().find(|r| r.platform == platform)
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn first_text(document: &Html, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    document.select(&selector).map(inline_text).find_map(non_empty)
}

fn first_body(document: &Html, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    document.select(&selector).map(visible_text).find_map(non_empty)
}

fn first_date(document: &Html, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    document.select(&selector).find_map(|el| {
        el.value()
            .attr("datetime")
            .map(str::to_string)
            .and_then(non_empty)
            .or_else(|| non_empty(inline_text(el)))
    })
}

impl Extract for SelectorRules {
    fn extract(&self, document: &Html) -> Extraction {
        Extraction {
            title: first_text(document, self.title),
            body_text: first_body(document, self.body),
            author: first_text(document, self.author),
            published_raw: first_date(document, self.date),
        }
    }
}

/// Generic ruleset for unknown platforms and platform rules that miss
#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristic;

const CONTENT_CONTAINERS: &str =
    "article, main, .post-content, .entry-content, .content, .post, .entry";

impl Heuristic {
    /// The div/section holding the most paragraph text
    fn largest_text_block<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
        let blocks = Selector::parse("div, section").ok()?;

        document
            .select(&blocks)
            .map(|block| {
                let len: usize = block
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|child| child.value().name() == "p")
                    .map(|p| p.text().map(str::len).sum::<usize>())
                    .sum();
                (block, len)
            })
            .filter(|(_, len)| *len > 0)
            // First block wins ties so the choice is stable
            .fold(None, |best: Option<(ElementRef<'a>, usize)>, (block, len)| match best {
                Some((_, best_len)) if best_len >= len => best,
                _ => Some((block, len)),
            })
            .map(|(block, _)| block)
    }

    fn body_text(document: &Html) -> Option<String> {
        first_body(document, CONTENT_CONTAINERS)
            .or_else(|| Self::largest_text_block(document).map(visible_text).and_then(non_empty))
            .or_else(|| select_first(document, "body").map(visible_text).and_then(non_empty))
    }
}

impl Extract for Heuristic {
    fn extract(&self, document: &Html) -> Extraction {
        Extraction {
            title: first_text(document, "title, h1")
                .or_else(|| meta_property(document, "og:title")),
            body_text: Self::body_text(document),
            author: first_text(document, ".author, .writer, .by, [rel=\"author\"]")
                .or_else(|| meta_name(document, "author")),
            published_raw: meta_property(document, "article:published_time")
                .or_else(|| meta_name(document, "date"))
                .or_else(|| first_date(document, "time, .date, .published")),
        }
    }
}

/// Run the platform ruleset, filling anything it misses from the heuristic
pub fn extract_for(platform: PlatformVariant, document: &Html) -> Extraction {
    let heuristic = Heuristic.extract(document);
    match rules_for(platform) {
        Some(rules) => {
            let mut extraction = rules.extract(document);
            // Article metadata beats a guessed date element
            if let Some(published) = meta_property(document, "article:published_time") {
                if extraction.published_raw.is_none() {
                    extraction.published_raw = Some(published);
                }
            }
            extraction.or(heuristic)
        }
        None => heuristic,
    }
}
