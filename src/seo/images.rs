//! Image alt text and size

use super::{Findings, SubScore};
use crate::config::ScoringConfig;
use crate::normalize::{Document, Image};

const OVERSIZE_PENALTY: f64 = 50.0;

fn has_alt(image: &Image) -> bool {
    image.alt_text_present && image.alt.as_deref().is_some_and(|a| !a.trim().is_empty())
}

fn is_oversized(image: &Image, config: &ScoringConfig) -> bool {
    image.width.is_some_and(|w| w > config.max_image_width)
        || image.size_bytes.is_some_and(|b| b > config.max_image_bytes)
}

pub(super) fn score(doc: &Document, config: &ScoringConfig) -> SubScore {
    let mut findings = Findings::default();

    let total = doc.images.len();
    if total == 0 {
        findings.add(100.0);
        return findings.finish();
    }

    let with_alt = doc.images.iter().filter(|i| has_alt(i)).count();
    let oversized = doc.images.iter().filter(|i| is_oversized(i, config)).count();

    findings.add(100.0 * with_alt as f64 / total as f64);
    findings.add(-OVERSIZE_PENALTY * oversized as f64 / total as f64);

    if with_alt < total {
        findings.flag(
            format!("{} of {} images lack alt text", total - with_alt, total),
            "Describe every image with alt text",
        );
    }
    if oversized > 0 {
        findings.flag(
            format!("{} oversized images", oversized),
            format!(
                "Resize images to at most {}px wide and compress below {} KB",
                config.max_image_width,
                config.max_image_bytes / 1000
            ),
        );
    }

    findings.finish()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_no_images_is_perfect() {
        let sub = score(&document("t", "b"), &ScoringConfig::default());
        assert_eq!(sub.score, 100);
    }

    #[test]
    fn test_alt_ratio() {
        let mut doc = document("t", "b");
        doc.images.insert(image("https://x.test/1.png", Some("A cat")));
        doc.images.insert(image("https://x.test/2.png", None));
        doc.images.insert(image("https://x.test/3.png", Some("  ")));
        doc.images.insert(image("https://x.test/4.png", Some("A dog")));
        let sub = score(&doc, &ScoringConfig::default());
        assert_eq!(sub.score, 50);
        assert_eq!(sub.issues, vec!["2 of 4 images lack alt text"]);
    }

    #[test]
    fn test_oversized_penalty() {
        let mut doc = document("t", "b");
        let mut wide = image("https://x.test/wide.png", Some("Wide"));
        wide.width = Some(4000);
        doc.images.insert(wide);
        doc.images.insert(image("https://x.test/ok.png", Some("Fine")));
        let sub = score(&doc, &ScoringConfig::default());
        assert_eq!(sub.score, 75);
    }
}
