//! Deterministic SEO scoring
//!
//! Seven sub-scores, each in 0..=100, combined with the configured weights.
//! Everything here is a pure function of the [`Document`] and configuration.

mod headings;
mod images;
mod keyword;
mod links;
mod metadata;
mod readability;
mod technical;

pub use keyword::{find_keyword, KeywordStat};
pub use readability::ReadabilityStats;

use crate::config::ScoringConfig;
use crate::nlp::extract_keywords;
use crate::normalize::Document;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One scored dimension with its findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: u8,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Accumulates points and findings for one sub-score
#[derive(Debug, Default)]
pub(crate) struct Findings {
    points: f64,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

impl Findings {
    pub(crate) fn add(&mut self, points: f64) {
        self.points += points;
    }

    pub(crate) fn flag(&mut self, issue: impl Into<String>, recommendation: impl Into<String>) {
        self.issues.push(issue.into());
        self.recommendations.push(recommendation.into());
    }

    pub(crate) fn finish(self) -> SubScore {
        SubScore {
            score: clamp_score(self.points),
            issues: self.issues,
            recommendations: self.recommendations,
        }
    }
}

pub(crate) fn clamp_score(points: f64) -> u8 {
    if points.is_nan() {
        return 0;
    }
    points.round().clamp(0.0, 100.0) as u8
}

/// Linear score inside/outside a band: full marks inside, losing
/// `below_rate`/`above_rate` points per unit outside
pub(crate) fn band_points(
    value: f64,
    min: f64,
    max: f64,
    full: f64,
    below_rate: f64,
    above_rate: f64,
) -> f64 {
    if value < min {
        (full - (min - value) * below_rate).max(0.0)
    } else if value > max {
        (full - (value - max) * above_rate).max(0.0)
    } else {
        full
    }
}

/// Complete SEO evaluation of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub keyword: SubScore,
    pub metadata: SubScore,
    pub heading: SubScore,
    pub link: SubScore,
    pub image: SubScore,
    pub readability: SubScore,
    pub technical: SubScore,
    /// Weighted combination of the sub-scores
    pub aggregate: u8,
    /// Keywords scored (supplied or derived)
    pub keywords: Vec<String>,
    pub keywords_derived: bool,
    pub keyword_stats: Vec<KeywordStat>,
    pub readability_stats: ReadabilityStats,
    /// Overall verdict first, then per-dimension advice without duplicates
    pub recommendations: Vec<String>,
}

impl ScoreResult {
    /// Sub-scores in a fixed order with their names
    pub fn sub_scores(&self) -> [(&'static str, &SubScore); 7] {
        [
            ("keyword", &self.keyword),
            ("metadata", &self.metadata),
            ("heading", &self.heading),
            ("link", &self.link),
            ("image", &self.image),
            ("readability", &self.readability),
            ("technical", &self.technical),
        ]
    }
}

fn verdict(aggregate: u8) -> &'static str {
    match aggregate {
        0..=49 => "Focus on improving meta tags and content structure",
        50..=69 => "Good foundation: focus on keyword optimization and readability",
        70..=89 => "Strong SEO: fine-tune technical aspects for perfection",
        _ => "Excellent SEO: keep content fresh and monitor performance",
    }
}

/// Score a document against target keywords.
///
/// With no keywords supplied, the top `auto_keywords` terms from the NLP
/// keyword extractor are used.
pub fn score_document(doc: &Document, keywords: &[String], config: &ScoringConfig) -> ScoreResult {
    let supplied: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    let keywords_derived = supplied.is_empty();
    let keywords = if keywords_derived {
        extract_keywords(&doc.body_text, &doc.language, config.auto_keywords)
            .into_iter()
            .map(|k| k.term)
            .collect()
    } else {
        supplied
    };

    let (keyword, keyword_stats) = keyword::score(doc, &keywords, config);
    let metadata = metadata::score(doc, config);
    let heading = headings::score(doc, config);
    let link = links::score(doc, config);
    let image = images::score(doc, config);
    let (readability, readability_stats) = readability::score(doc);
    let technical = technical::score(doc);

    let w = &config.weights;
    let weighted = keyword.score as f64 * w.keyword
        + metadata.score as f64 * w.metadata
        + heading.score as f64 * w.heading
        + link.score as f64 * w.link
        + image.score as f64 * w.image
        + readability.score as f64 * w.readability
        + technical.score as f64 * w.technical;
    let aggregate = clamp_score(weighted);

    let mut result = ScoreResult {
        keyword,
        metadata,
        heading,
        link,
        image,
        readability,
        technical,
        aggregate,
        keywords,
        keywords_derived,
        keyword_stats,
        readability_stats,
        recommendations: Vec::new(),
    };

    let mut recommendations = vec![verdict(aggregate).to_string()];
    for (_, sub) in result.sub_scores() {
        for rec in &sub.recommendations {
            if !recommendations.contains(rec) {
                recommendations.push(rec.clone());
            }
        }
    }
    result.recommendations = recommendations;

    debug!(
        "Scored {}: aggregate {} (keyword {}, metadata {}, heading {}, link {}, image {}, readability {}, technical {})",
        doc.url,
        result.aggregate,
        result.keyword.score,
        result.metadata.score,
        result.heading.score,
        result.link.score,
        result.image.score,
        result.readability.score,
        result.technical.score
    );

    result
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::normalize::{Document, Heading, Image, Link, TechnicalSignals};
    use crate::platform::PlatformVariant;
    use std::collections::{BTreeMap, BTreeSet};

    /// A bare document; tests fill in what they need
    pub fn document(title: &str, body: &str) -> Document {
        Document {
            url: "https://blog.example.com/posts/sample-post".to_string(),
            platform: PlatformVariant::Generic,
            title: title.to_string(),
            body_text: body.to_string(),
            raw_html: String::new(),
            meta_description: None,
            meta_keywords: Vec::new(),
            headings: Vec::new(),
            links: BTreeSet::new(),
            images: BTreeSet::new(),
            published_at: None,
            language: "en".to_string(),
            author: None,
            social_tags: BTreeMap::new(),
            technical: TechnicalSignals::default(),
            content_hash: String::new(),
        }
    }

    pub fn heading(level: u8, text: &str) -> Heading {
        Heading {
            level,
            text: text.to_string(),
        }
    }

    pub fn link(href: &str, anchor: &str, internal: bool) -> Link {
        Link {
            href: href.to_string(),
            anchor_text: anchor.to_string(),
            is_internal: internal,
            nofollow: false,
        }
    }

    pub fn image(src: &str, alt: Option<&str>) -> Image {
        Image {
            src: src.to_string(),
            alt_text_present: alt.is_some(),
            alt: alt.map(str::to_string),
            width: None,
            height: None,
            size_bytes: None,
        }
    }

    /// Body of exactly `total` words with `keyword` appearing `hits` times,
    /// the first occurrence in the opening paragraph
    pub fn body_with_density(keyword: &str, hits: usize, total: usize) -> String {
        let filler = [
            "the", "garden", "needs", "water", "every", "morning", "before", "sun", "gets",
            "hot", "and", "soil", "dries",
        ];
        let mut words: Vec<String> = Vec::with_capacity(total);
        let spacing = total / hits.max(1);
        for i in 0..total {
            if hits > 0 && i % spacing == 1 && words.iter().filter(|w| *w == keyword).count() < hits
            {
                words.push(keyword.to_string());
            } else {
                words.push(filler[i % filler.len()].to_string());
            }
        }
        // Paragraph breaks every 60 words
        words
            .chunks(60)
            .map(|chunk| format!("{}.", chunk.join(" ")))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn scenario_a() -> Document {
        // 55-char title, 140-char description
        let title = "Composting at home: a practical guide for beginners 101";
        assert_eq!(title.chars().count(), 55);
        let description = "Learn composting at home with simple steps, the right bins and materials, and common mistakes to avoid so your garden thrives all year long.";
        assert_eq!(description.chars().count(), 140);

        let mut doc = document(title, &body_with_density("composting", 8, 400));
        doc.meta_description = Some(description.to_string());
        doc.headings = vec![
            heading(1, "Composting at home"),
            heading(2, "Choosing a bin"),
            heading(2, "What to add"),
            heading(2, "Common mistakes"),
        ];
        doc
    }

    #[test]
    fn test_scenario_a_keyword_and_metadata_good() {
        let doc = scenario_a();
        let result = score_document(&doc, &["composting".to_string()], &ScoringConfig::default());

        let stat = &result.keyword_stats[0];
        assert!((stat.density - 2.0).abs() < 1e-9, "density {}", stat.density);
        assert!(stat.in_title && stat.in_first_paragraph);

        assert!(result.keyword.score >= 80, "keyword {}", result.keyword.score);
        assert!(result.metadata.score >= 80, "metadata {}", result.metadata.score);
        assert_eq!(result.heading.score, 100);
        assert!(!result.keywords_derived);
    }

    #[test]
    fn test_scenario_b_images_without_alt() {
        let mut doc = scenario_a();
        doc.images = (0..5)
            .map(|i| image(&format!("https://blog.example.com/img/{}.jpg", i), None))
            .collect();
        let result = score_document(&doc, &[], &ScoringConfig::default());
        assert!(result.image.score <= 20, "image {}", result.image.score);
    }

    #[test]
    fn test_scores_are_bounded_and_deterministic() {
        let config = ScoringConfig::default();
        let docs = vec![
            scenario_a(),
            document("x", "y"),
            document(&"Very long title ".repeat(20), &"word ".repeat(3000)),
        ];

        for doc in docs {
            let a = score_document(&doc, &[], &config);
            let b = score_document(&doc, &[], &config);
            assert_eq!(a, b);
            assert!(a.aggregate <= 100);
            for (_, sub) in a.sub_scores() {
                assert!(sub.score <= 100);
            }
        }
    }

    #[test]
    fn test_keywords_derived_when_missing() {
        let doc = scenario_a();
        let result = score_document(&doc, &[], &ScoringConfig::default());
        assert!(result.keywords_derived);
        assert!(!result.keywords.is_empty());
        assert!(result.keywords.len() <= ScoringConfig::default().auto_keywords);
    }

    #[test]
    fn test_recommendations_start_with_verdict() {
        let doc = document("short", "tiny body");
        let result = score_document(&doc, &[], &ScoringConfig::default());
        assert_eq!(result.recommendations[0], verdict(result.aggregate));
        let unique: std::collections::BTreeSet<_> = result.recommendations.iter().collect();
        assert_eq!(unique.len(), result.recommendations.len());
    }

    #[test]
    fn test_aggregate_follows_weights() {
        let mut config = ScoringConfig::default();
        config.weights.keyword = 0.0;
        config.weights.metadata = 0.0;
        config.weights.heading = 0.0;
        config.weights.link = 0.0;
        config.weights.image = 1.0;
        config.weights.readability = 0.0;
        config.weights.technical = 0.0;

        let doc = document("Title", "Body words here.");
        let result = score_document(&doc, &[], &config);
        assert_eq!(result.aggregate, result.image.score);
    }

    #[test]
    fn test_band_points() {
        assert_eq!(band_points(5.0, 1.0, 10.0, 40.0, 2.0, 1.0), 40.0);
        assert_eq!(band_points(0.0, 1.0, 10.0, 40.0, 2.0, 1.0), 38.0);
        assert_eq!(band_points(15.0, 1.0, 10.0, 40.0, 2.0, 1.0), 35.0);
        assert_eq!(band_points(100.0, 1.0, 10.0, 40.0, 2.0, 1.0), 0.0);
    }
}
