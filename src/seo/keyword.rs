//! Keyword presence and density

use super::{band_points, Findings, SubScore};
use crate::config::ScoringConfig;
use crate::normalize::{is_hangul, Document};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Where and how often one keyword appears
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordStat {
    pub keyword: String,
    pub occurrences: usize,
    /// Occurrences per hundred body words
    pub density: f64,
    pub in_title: bool,
    pub in_first_paragraph: bool,
    pub in_heading: bool,
}

const DENSITY_POINTS: f64 = 50.0;
const TITLE_POINTS: f64 = 20.0;
const FIRST_PARAGRAPH_POINTS: f64 = 15.0;
const HEADING_POINTS: f64 = 15.0;

fn words(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Korean attaches particles to the noun, so `여행을` counts as `여행`
fn word_matches(token: &str, keyword_word: &str) -> bool {
    token == keyword_word
        || (keyword_word.chars().next().is_some_and(is_hangul) && token.starts_with(keyword_word))
}

fn count_occurrences(haystack: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || haystack.len() < phrase.len() {
        return 0;
    }
    haystack
        .windows(phrase.len())
        .filter(|window| window.iter().zip(phrase).all(|(t, k)| word_matches(t, k)))
        .count()
}

/// Whether `keyword` occurs in `text` as a whole word sequence
pub fn find_keyword(text: &str, keyword: &str) -> bool {
    count_occurrences(&words(text), &words(keyword)) > 0
}

fn stat_for(doc: &Document, body_words: &[String], keyword: &str) -> KeywordStat {
    let phrase = words(keyword);
    let occurrences = count_occurrences(body_words, &phrase);
    let density = if body_words.is_empty() {
        0.0
    } else {
        occurrences as f64 / body_words.len() as f64 * 100.0
    };

    KeywordStat {
        keyword: keyword.to_string(),
        occurrences,
        density,
        in_title: find_keyword(&doc.title, keyword),
        in_first_paragraph: find_keyword(doc.first_paragraph(), keyword),
        in_heading: doc.headings.iter().any(|h| find_keyword(&h.text, keyword)),
    }
}

pub(super) fn score(
    doc: &Document,
    keywords: &[String],
    config: &ScoringConfig,
) -> (SubScore, Vec<KeywordStat>) {
    let mut findings = Findings::default();

    if keywords.is_empty() {
        findings.flag(
            "No target keywords could be determined",
            "Supply target keywords or expand the post body",
        );
        return (findings.finish(), Vec::new());
    }

    let body_words = words(&doc.body_text);
    let stats: Vec<KeywordStat> = keywords
        .iter()
        .map(|k| stat_for(doc, &body_words, k))
        .collect();

    let (min, max) = (config.keyword_density_min, config.keyword_density_max);
    let mut total = 0.0;

    for stat in &stats {
        let k = &stat.keyword;
        let mut points = 0.0;

        if stat.occurrences == 0 {
            findings.flag(
                format!("Keyword '{}' does not appear in the body", k),
                format!("Use '{}' naturally in the body text", k),
            );
        } else if stat.density < min {
            points += DENSITY_POINTS * stat.density / min;
            findings.flag(
                format!("Keyword '{}' density {:.1}% is below {:.1}%", k, stat.density, min),
                format!("Mention '{}' a few more times", k),
            );
        } else {
            points += band_points(stat.density, min, max, DENSITY_POINTS, 0.0, 10.0);
            if stat.density > max {
                findings.flag(
                    format!("Keyword '{}' density {:.1}% exceeds {:.1}% (stuffing)", k, stat.density, max),
                    format!("Reduce repetitions of '{}' and use synonyms", k),
                );
            }
        }

        if stat.in_title {
            points += TITLE_POINTS;
        } else {
            findings.flag(
                format!("Keyword '{}' missing from the title", k),
                format!("Include '{}' in the title", k),
            );
        }

        if stat.in_first_paragraph {
            points += FIRST_PARAGRAPH_POINTS;
        } else {
            findings.flag(
                format!("Keyword '{}' missing from the first paragraph", k),
                format!("Introduce '{}' in the opening paragraph", k),
            );
        }

        if stat.in_heading {
            points += HEADING_POINTS;
        } else {
            findings.flag(
                format!("Keyword '{}' missing from headings", k),
                format!("Use '{}' in at least one heading", k),
            );
        }

        total += points;
    }

    findings.add(total / stats.len() as f64);
    (findings.finish(), stats)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_phrase_and_korean_matching() {
        assert!(find_keyword("How to brew Cold Brew coffee", "cold brew"));
        assert!(!find_keyword("colder brewing", "cold brew"));
        assert!(find_keyword("제주도 여행을 떠났다", "여행"));
        assert!(!find_keyword("travelling light", "travel"));
    }

    #[test]
    fn test_density_and_placement() {
        let mut doc = document("Sourdough basics", &body_with_density("sourdough", 4, 200));
        doc.headings = vec![heading(2, "Why sourdough")];
        let (sub, stats) = score(&doc, &["sourdough".to_string()], &ScoringConfig::default());

        assert_eq!(stats[0].occurrences, 4);
        assert!((stats[0].density - 2.0).abs() < 1e-9);
        assert!(stats[0].in_title && stats[0].in_first_paragraph && stats[0].in_heading);
        assert_eq!(sub.score, 100);
        assert!(sub.issues.is_empty());
    }

    #[test]
    fn test_stuffing_penalized() {
        let doc = document("Sourdough", &body_with_density("sourdough", 20, 200));
        let (sub, stats) = score(&doc, &["sourdough".to_string()], &ScoringConfig::default());
        assert!(stats[0].density > 3.0);
        assert!(sub.score < 85);
        assert!(sub.issues.iter().any(|i| i.contains("stuffing")));
    }

    #[test]
    fn test_absent_keyword() {
        let doc = document("Bread", "Nothing relevant in here at all.");
        let (sub, _) = score(&doc, &["sourdough".to_string()], &ScoringConfig::default());
        assert_eq!(sub.score, 0);
        assert_eq!(sub.issues.len(), 4);
    }

    #[test]
    fn test_no_keywords() {
        let doc = document("", "");
        let (sub, stats) = score(&doc, &[], &ScoringConfig::default());
        assert_eq!(sub.score, 0);
        assert!(stats.is_empty());
        assert_eq!(sub.issues.len(), 1);
    }
}
