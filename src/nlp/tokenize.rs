//! Tokenizers
//!
//! Each tokenizer turns text into [`Token`]s carrying a normalized term (the
//! key used for counting), a readable surface form and the index of the
//! sentence it came from. Stop words are kept but flagged, since sentiment
//! needs negators that keyword ranking should ignore.

use crate::normalize::{is_hangul, sentences};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Normalized form (stemmed or particle-stripped)
    pub term: String,
    /// Readable form shown to users
    pub surface: String,
    pub sentence: usize,
    pub stop: bool,
}

pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tokens of one sentence
    fn tokenize_sentence(&self, sentence: &str, index: usize, out: &mut Vec<Token>);

    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (index, sentence) in sentences(text).into_iter().enumerate() {
            self.tokenize_sentence(sentence, index, &mut tokens);
        }
        tokens
    }
}

/// Tokenizer for a document language tag
pub fn tokenizer_for(language: &str) -> Box<dyn Tokenizer> {
    match language.split(['-', '_']).next().unwrap_or_default() {
        "en" => Box::new(EnglishTokenizer),
        "ko" => Box::new(KoreanTokenizer),
        _ => Box::new(RuleBasedTokenizer),
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "even", "every", "few",
    "for", "from", "further", "get", "gets", "got", "had", "has", "have", "having", "he", "her",
    "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me",
    "more", "most", "my", "never", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "us", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "you", "your", "yours",
];

/// Unicode word segmentation, English stop words and light suffix stemming
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishTokenizer;

/// Strip one common inflectional suffix
pub fn stem_english(word: &str) -> String {
    let len = word.chars().count();
    if !word.is_ascii() {
        return word.to_string();
    }
    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    for (suffix, min_len) in [("ing", 6), ("ed", 5), ("ly", 6)] {
        if len >= min_len && word.ends_with(suffix) {
            return word[..word.len() - suffix.len()].to_string();
        }
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

impl Tokenizer for EnglishTokenizer {
    fn name(&self) -> &'static str {
        "english"
    }

    fn tokenize_sentence(&self, sentence: &str, index: usize, out: &mut Vec<Token>) {
        for word in sentence.unicode_words() {
            let surface = word.to_lowercase();
            let stop = ENGLISH_STOP_WORDS.contains(&surface.as_str())
                || surface.chars().all(|c| c.is_numeric())
                || surface.chars().count() < 2;
            out.push(Token {
                term: stem_english(&surface),
                surface,
                sentence: index,
                stop,
            });
        }
    }
}

/// Particles and endings, longest first
const KOREAN_SUFFIXES: &[&str] = &[
    "했습니다", "에서는", "으로는", "에게서", "습니다", "입니다", "합니다", "에서", "에게",
    "으로", "까지", "부터", "처럼", "보다", "이나", "하고", "이다", "하다", "했다", "였다", "었다",
    "았다", "니다", "은", "는", "이", "가", "을", "를", "의", "에", "도", "로", "만", "과", "와",
    "다", "요",
];

const KOREAN_STOP_WORDS: &[&str] = &[
    "그리고", "그러나", "하지만", "그래서", "또한", "그런데", "이것", "그것", "저것", "우리", "정말",
    "아주", "너무", "많이", "조금", "있", "없", "하", "되",
];

/// Eojeol split with particle and ending stripping as a morpheme proxy
#[derive(Debug, Clone, Copy, Default)]
pub struct KoreanTokenizer;

/// Strip the longest matching particle or ending, keeping at least one syllable
pub fn strip_korean_suffix(eojeol: &str) -> &str {
    for suffix in KOREAN_SUFFIXES {
        if let Some(stem) = eojeol.strip_suffix(suffix) {
            if stem.chars().any(is_hangul) {
                return stem;
            }
        }
    }
    eojeol
}

impl Tokenizer for KoreanTokenizer {
    fn name(&self) -> &'static str {
        "korean"
    }

    fn tokenize_sentence(&self, sentence: &str, index: usize, out: &mut Vec<Token>) {
        for raw in sentence.split_whitespace() {
            let eojeol = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if eojeol.is_empty() {
                continue;
            }

            let term = if eojeol.chars().any(is_hangul) {
                strip_korean_suffix(eojeol).to_string()
            } else {
                eojeol.to_lowercase()
            };
            let stop = KOREAN_STOP_WORDS.contains(&term.as_str())
                || ENGLISH_STOP_WORDS.contains(&term.as_str())
                || term.chars().count() < 2;

            out.push(Token {
                surface: term.clone(),
                term,
                sentence: index,
                stop,
            });
        }
    }
}

/// Whitespace and punctuation split for other languages
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedTokenizer;

impl Tokenizer for RuleBasedTokenizer {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn tokenize_sentence(&self, sentence: &str, index: usize, out: &mut Vec<Token>) {
        for word in sentence
            .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
            .filter(|w| !w.is_empty())
        {
            let term = word.to_lowercase();
            out.push(Token {
                surface: term.clone(),
                stop: term.chars().count() < 2,
                term,
                sentence: index,
            });
        }
    }
}
