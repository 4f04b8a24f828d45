//! Readability
//!
//! English text uses Flesch reading ease. Korean has no syllable-stress
//! model, so a proxy built from syllables per eojeol (space-delimited word)
//! and eojeols per sentence stands in for it. Both blend in sentence and
//! paragraph length bands.

use super::{Findings, SubScore};
use crate::normalize::{is_hangul, paragraphs, sentences, Document};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityStats {
    pub language: String,
    pub sentences: usize,
    pub words: usize,
    pub paragraphs: usize,
    pub avg_sentence_length: f64,
    pub avg_paragraph_length: f64,
    pub avg_syllables_per_word: f64,
    /// Only for non-Korean text
    pub flesch_reading_ease: Option<f64>,
}

/// Vowel groups, ignoring a silent trailing `e`; at least one per word
fn english_syllables(word: &str) -> usize {
    let word = word.to_lowercase();
    let mut count = 0;
    let mut previous_vowel = false;
    for c in word.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }
    if word.ends_with('e') && !word.ends_with("le") && count > 1 {
        count -= 1;
    }
    count.max(1)
}

fn korean_syllables(word: &str) -> usize {
    word.chars().filter(|c| is_hangul(*c)).count().max(1)
}

fn flesch(words: usize, sentences: usize, syllables: usize) -> f64 {
    206.835 - 1.015 * (words as f64 / sentences as f64) - 84.6 * (syllables as f64 / words as f64)
}

fn collect_stats(doc: &Document, korean: bool) -> ReadabilityStats {
    let sentence_list = sentences(&doc.body_text);
    let words: Vec<&str> = if korean {
        doc.body_text.split_whitespace().collect()
    } else {
        doc.body_text.unicode_words().collect()
    };
    let paragraph_count = paragraphs(&doc.body_text).count();

    let syllables: usize = words
        .iter()
        .map(|w| if korean { korean_syllables(w) } else { english_syllables(w) })
        .sum();

    let mut stats = ReadabilityStats {
        language: doc.language.clone(),
        sentences: sentence_list.len(),
        words: words.len(),
        paragraphs: paragraph_count,
        ..Default::default()
    };
    if stats.sentences == 0 || stats.words == 0 {
        return stats;
    }

    stats.avg_sentence_length = stats.words as f64 / stats.sentences as f64;
    stats.avg_paragraph_length = stats.words as f64 / paragraph_count.max(1) as f64;
    stats.avg_syllables_per_word = syllables as f64 / stats.words as f64;
    if !korean {
        stats.flesch_reading_ease = Some(flesch(stats.words, stats.sentences, syllables));
    }
    stats
}

fn score_english(stats: &ReadabilityStats, findings: &mut Findings) {
    let ease = stats.flesch_reading_ease.unwrap_or(0.0);
    findings.add(match ease {
        e if (60.0..=80.0).contains(&e) => 50.0,
        e if e > 80.0 => 40.0,
        e if e >= 50.0 => 35.0,
        _ => 20.0,
    });
    if ease < 50.0 {
        findings.flag(
            format!("Flesch reading ease {:.0} is hard to read", ease),
            "Use shorter words and simpler sentences",
        );
    }

    let sentence = stats.avg_sentence_length;
    findings.add(match sentence {
        s if (15.0..=25.0).contains(&s) => 25.0,
        s if s < 15.0 => 15.0,
        s => (25.0 - (s - 25.0)).max(0.0),
    });
    if sentence > 25.0 {
        findings.flag(
            format!("Average sentence length {:.1} words", sentence),
            "Split long sentences; aim for 15-25 words",
        );
    }

    let paragraph = stats.avg_paragraph_length;
    findings.add(match paragraph {
        p if (50.0..=150.0).contains(&p) => 25.0,
        p if p < 50.0 => 15.0,
        p => (25.0 - (p - 150.0) / 10.0).max(0.0),
    });
    if paragraph > 150.0 {
        findings.flag(
            format!("Average paragraph length {:.0} words", paragraph),
            "Break up long paragraphs",
        );
    }
}

fn score_korean(stats: &ReadabilityStats, findings: &mut Findings) {
    let per_word = stats.avg_syllables_per_word;
    findings.add(match per_word {
        s if (2.0..=4.0).contains(&s) => 50.0,
        s if s < 2.0 => 40.0,
        s => (50.0 - (s - 4.0) * 15.0).max(0.0),
    });
    if per_word > 4.0 {
        findings.flag(
            format!("Average {:.1} syllables per word", per_word),
            "Prefer plain words over long compound terms",
        );
    }

    let sentence = stats.avg_sentence_length;
    findings.add(match sentence {
        s if (6.0..=15.0).contains(&s) => 25.0,
        s if s < 6.0 => 15.0,
        s => (25.0 - (s - 15.0) * 2.0).max(0.0),
    });
    if sentence > 15.0 {
        findings.flag(
            format!("Average sentence length {:.1} words", sentence),
            "Split long sentences; aim for 6-15 words",
        );
    }

    let paragraph = stats.avg_paragraph_length;
    findings.add(match paragraph {
        p if (20.0..=80.0).contains(&p) => 25.0,
        p if p < 20.0 => 15.0,
        p => (25.0 - (p - 80.0) / 5.0).max(0.0),
    });
    if paragraph > 80.0 {
        findings.flag(
            format!("Average paragraph length {:.0} words", paragraph),
            "Break up long paragraphs",
        );
    }
}

pub(super) fn score(doc: &Document) -> (SubScore, ReadabilityStats) {
    let mut findings = Findings::default();
    let korean = doc.language.starts_with("ko");
    let stats = collect_stats(doc, korean);

    if stats.sentences == 0 || stats.words == 0 {
        findings.flag("No readable text", "Add body content");
        return (findings.finish(), stats);
    }

    if korean {
        score_korean(&stats, &mut findings);
    } else {
        score_english(&stats, &mut findings);
    }
    (findings.finish(), stats)
}
