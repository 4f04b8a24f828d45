//! Title, meta description and social tags

use super::{band_points, Findings, SubScore};
use crate::config::ScoringConfig;
use crate::normalize::Document;

const TITLE_POINTS: f64 = 40.0;
const DESCRIPTION_POINTS: f64 = 40.0;
const OPEN_GRAPH_POINTS: f64 = 10.0;
const TWITTER_POINTS: f64 = 10.0;

const OPEN_GRAPH_TAGS: [&str; 4] = ["og:title", "og:description", "og:url", "og:type"];
const TWITTER_TAGS: [(&str, f64); 3] = [
    ("twitter:card", 5.0),
    ("twitter:title", 2.5),
    ("twitter:description", 2.5),
];

fn has_tag(doc: &Document, key: &str) -> bool {
    doc.social_tags
        .get(key)
        .is_some_and(|value| !value.trim().is_empty())
}

fn score_title(doc: &Document, config: &ScoringConfig, findings: &mut Findings) {
    let len = doc.title.trim().chars().count();
    if len == 0 {
        findings.flag("Missing title", "Add a descriptive title");
        return;
    }

    let (min, max) = (config.title_min_chars, config.title_max_chars);
    // Short titles lose more per character than long ones
    findings.add(band_points(len as f64, min as f64, max as f64, TITLE_POINTS, 2.0, 1.0));
    if len < min {
        findings.flag(
            format!("Title is {} characters (shorter than {})", len, min),
            format!("Expand the title to {}-{} characters", min, max),
        );
    } else if len > max {
        findings.flag(
            format!("Title is {} characters (longer than {})", len, max),
            format!("Shorten the title to at most {} characters", max),
        );
    }
}

fn score_description(doc: &Document, config: &ScoringConfig, findings: &mut Findings) {
    let len = doc
        .meta_description
        .as_deref()
        .map(|d| d.trim().chars().count())
        .unwrap_or(0);
    if len == 0 {
        findings.flag(
            "Missing meta description",
            "Write a meta description summarizing the post",
        );
        return;
    }

    let (min, max) = (config.description_min_chars, config.description_max_chars);
    findings.add(band_points(
        len as f64,
        min as f64,
        max as f64,
        DESCRIPTION_POINTS,
        0.4,
        0.8,
    ));
    if len < min {
        findings.flag(
            format!("Meta description is {} characters (shorter than {})", len, min),
            format!("Expand the meta description to {}-{} characters", min, max),
        );
    } else if len > max {
        findings.flag(
            format!("Meta description is {} characters (longer than {})", len, max),
            format!("Trim the meta description to at most {} characters", max),
        );
    }
}

fn score_social(doc: &Document, findings: &mut Findings) {
    let missing_og: Vec<&str> = OPEN_GRAPH_TAGS
        .iter()
        .copied()
        .filter(|tag| !has_tag(doc, tag))
        .collect();
    let present_og = OPEN_GRAPH_TAGS.len() - missing_og.len();
    findings.add(OPEN_GRAPH_POINTS * present_og as f64 / OPEN_GRAPH_TAGS.len() as f64);
    if !missing_og.is_empty() {
        findings.flag(
            format!("Missing Open Graph tags: {}", missing_og.join(", ")),
            "Add Open Graph tags so shares render a rich preview",
        );
    }

    let mut twitter_card = false;
    for (tag, points) in TWITTER_TAGS {
        if has_tag(doc, tag) {
            findings.add(points);
            twitter_card |= tag == "twitter:card";
        }
    }
    if !twitter_card {
        findings.flag("Missing Twitter card tags", "Add twitter:card, twitter:title and twitter:description");
    }
}

pub(super) fn score(doc: &Document, config: &ScoringConfig) -> SubScore {
    let mut findings = Findings::default();
    score_title(doc, config, &mut findings);
    score_description(doc, config, &mut findings);
    score_social(doc, &mut findings);
    findings.finish()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn with_social(mut doc: Document) -> Document {
        for tag in OPEN_GRAPH_TAGS.iter().chain(["twitter:card", "twitter:title", "twitter:description"].iter()) {
            doc.social_tags.insert(tag.to_string(), "value".to_string());
        }
        doc
    }

    #[test]
    fn test_complete_metadata() {
        let mut doc = document(&"t".repeat(45), "body");
        doc.meta_description = Some("d".repeat(150));
        let sub = score(&with_social(doc), &ScoringConfig::default());
        assert_eq!(sub.score, 100);
        assert!(sub.issues.is_empty());
    }

    #[test]
    fn test_short_title_falls_off_faster_than_long() {
        let config = ScoringConfig::default();
        let mut short = document(&"t".repeat(20), "body");
        short.meta_description = Some("d".repeat(150));
        let mut long = document(&"t".repeat(70), "body");
        long.meta_description = Some("d".repeat(150));

        // 10 characters out of band either way
        let short = score(&with_social(short), &config);
        let long = score(&with_social(long), &config);
        assert_eq!(short.score, 80);
        assert_eq!(long.score, 90);
    }

    #[test]
    fn test_missing_everything() {
        let doc = document("", "body");
        let sub = score(&doc, &ScoringConfig::default());
        assert_eq!(sub.score, 0);
        assert_eq!(sub.issues.len(), 4);
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        // 30 Hangul characters, 90 bytes
        let mut doc = document(&"가".repeat(30), "body");
        doc.meta_description = Some("d".repeat(150));
        let sub = score(&with_social(doc), &ScoringConfig::default());
        assert_eq!(sub.score, 100);
    }
}
