//! Heading structure

use super::{Findings, SubScore};
use crate::config::ScoringConfig;
use crate::normalize::Document;

const SINGLE_H1_POINTS: f64 = 40.0;
const MULTIPLE_H1_POINTS: f64 = 15.0;
const HIERARCHY_POINTS: f64 = 30.0;
const SKIP_PENALTY: f64 = 10.0;
const SUBHEADING_POINTS: f64 = 30.0;

/// Level jumps deeper by more than one (h2 -> h4)
fn skipped_levels(doc: &Document) -> Vec<(u8, u8)> {
    doc.headings
        .windows(2)
        .map(|pair| (pair[0].level, pair[1].level))
        .filter(|(from, to)| *to > from + 1)
        .collect()
}

pub(super) fn score(doc: &Document, config: &ScoringConfig) -> SubScore {
    let mut findings = Findings::default();

    let h1_count = doc.headings.iter().filter(|h| h.level == 1).count();
    match h1_count {
        0 => findings.flag("No H1 heading", "Add exactly one H1 stating the topic"),
        1 => findings.add(SINGLE_H1_POINTS),
        n => {
            findings.add(MULTIPLE_H1_POINTS);
            findings.flag(
                format!("{} H1 headings", n),
                "Keep a single H1 and demote the rest",
            );
        }
    }

    if !doc.headings.is_empty() {
        let skips = skipped_levels(doc);
        findings.add((HIERARCHY_POINTS - SKIP_PENALTY * skips.len() as f64).max(0.0));
        for (from, to) in skips {
            findings.flag(
                format!("Heading level skips from H{} to H{}", from, to),
                "Nest headings one level at a time",
            );
        }
    }

    let has_subheadings = doc.headings.iter().any(|h| h.level >= 2);
    if has_subheadings || doc.word_count() < config.long_form_words {
        findings.add(SUBHEADING_POINTS);
    } else {
        findings.flag(
            format!("No subheadings in {} words of content", doc.word_count()),
            "Break long content into sections with H2/H3 subheadings",
        );
    }

    findings.finish()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_clean_structure() {
        let mut doc = document("t", "short body");
        doc.headings = vec![heading(1, "Main"), heading(2, "A"), heading(3, "A.1"), heading(2, "B")];
        let sub = score(&doc, &ScoringConfig::default());
        assert_eq!(sub.score, 100);
    }

    #[test]
    fn test_multiple_h1_and_skips() {
        let mut doc = document("t", "short body");
        doc.headings = vec![heading(1, "One"), heading(3, "Skip"), heading(1, "Two"), heading(4, "Skip")];
        let sub = score(&doc, &ScoringConfig::default());
        // 15 + (30 - 20) + 30
        assert_eq!(sub.score, 55);
        assert_eq!(sub.issues.len(), 3);
    }

    #[test]
    fn test_long_form_without_subheadings() {
        let mut doc = document("t", &"word ".repeat(500));
        doc.headings = vec![heading(1, "Only")];
        let sub = score(&doc, &ScoringConfig::default());
        assert_eq!(sub.score, 70);
        assert!(sub.issues[0].contains("No subheadings"));
    }

    #[test]
    fn test_no_headings() {
        let doc = document("t", "short body");
        let sub = score(&doc, &ScoringConfig::default());
        assert_eq!(sub.score, 30);
    }
}
