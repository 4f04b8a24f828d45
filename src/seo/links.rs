//! Internal/external link balance and anchor quality

use super::{band_points, Findings, SubScore};
use crate::config::ScoringConfig;
use crate::normalize::Document;

const NO_LINKS_POINTS: f64 = 50.0;
const RATIO_POINTS: f64 = 40.0;
const INTERNAL_POINTS: f64 = 15.0;
const EXTERNAL_POINTS: f64 = 15.0;
const ANCHOR_POINTS: f64 = 30.0;

const GENERIC_ANCHORS: &[&str] = &[
    "click here", "here", "read more", "more", "link", "this", "여기", "클릭", "더보기", "바로가기",
];

fn is_descriptive(anchor: &str) -> bool {
    let anchor = anchor.trim().to_lowercase();
    anchor.chars().count() > 3 && !GENERIC_ANCHORS.contains(&anchor.as_str())
}

pub(super) fn score(doc: &Document, config: &ScoringConfig) -> SubScore {
    let mut findings = Findings::default();

    let internal = doc.internal_link_count();
    let external = doc.external_link_count();

    if internal == 0 {
        findings.flag("No internal links", "Link to related posts on the same blog");
    }
    if external == 0 {
        findings.flag("No external links", "Cite authoritative external sources");
    }

    let total = internal + external;
    if total == 0 {
        findings.add(NO_LINKS_POINTS);
        return findings.finish();
    }

    let ratio = internal as f64 / total as f64;
    let (min, max) = (config.internal_ratio_min, config.internal_ratio_max);
    findings.add(band_points(ratio, min, max, RATIO_POINTS, 100.0, 100.0));
    if internal > 0 && external > 0 && !(min..=max).contains(&ratio) {
        findings.flag(
            format!("Internal link ratio {:.0}% is outside {:.0}-{:.0}%", ratio * 100.0, min * 100.0, max * 100.0),
            "Balance internal and external links",
        );
    }

    if internal > 0 {
        findings.add(INTERNAL_POINTS);
    }
    if external > 0 {
        findings.add(EXTERNAL_POINTS);
    }

    let generic = doc
        .links
        .iter()
        .filter(|l| !is_descriptive(&l.anchor_text))
        .count();
    findings.add(ANCHOR_POINTS * (total - generic) as f64 / total as f64);
    if generic > 0 {
        findings.flag(
            format!("{} links with empty or generic anchor text", generic),
            "Use descriptive anchor text that names the target",
        );
    }

    findings.finish()
}
