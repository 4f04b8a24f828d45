//! Sentiment scoring
//!
//! [`SentimentModel`] is the seam for any pre-trained scorer. The shipped
//! model is a weighted lexicon with negation handling; lexicons are either
//! built in (English, Korean) or loaded from `sentiment-<lang>.txt`.

use super::tokenize::Token;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Polarity beyond which a text is no longer neutral
const NEUTRAL_BAND: f64 = 0.1;
/// Lexicon hits needed for full confidence
const CONFIDENT_HITS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    /// -1.0 ..= 1.0
    pub polarity: f64,
}

pub trait SentimentModel: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, tokens: &[Token]) -> Sentiment;
}

const ENGLISH_LEXICON: &[(&str, f64)] = &[
    ("amazing", 2.0), ("awesome", 2.0), ("beautiful", 1.5), ("best", 1.5), ("better", 1.0),
    ("delicious", 1.5), ("easy", 1.0), ("enjoy", 1.0), ("excellent", 2.0), ("fantastic", 2.0),
    ("fast", 0.5), ("favorite", 1.5), ("fun", 1.0), ("good", 1.0), ("great", 1.5), ("happy", 1.5),
    ("helpful", 1.0), ("love", 2.0), ("nice", 1.0), ("perfect", 2.0), ("recommend", 1.5),
    ("useful", 1.0), ("wonderful", 2.0),
    ("annoying", -1.5), ("awful", -2.0), ("bad", -1.0), ("boring", -1.0), ("broken", -1.5),
    ("confusing", -1.0), ("difficult", -0.5), ("disappointing", -1.5), ("hate", -2.0),
    ("horrible", -2.0), ("poor", -1.0), ("problem", -0.5), ("sad", -1.0), ("slow", -0.5),
    ("terrible", -2.0), ("ugly", -1.5), ("useless", -1.5), ("waste", -1.5), ("worst", -2.0),
];

const ENGLISH_NEGATORS: &[&str] = &["not", "no", "never", "without", "hardly", "isn't", "don't", "didn't", "wasn't"];

const KOREAN_LEXICON: &[(&str, f64)] = &[
    ("좋", 1.0), ("좋아", 1.0), ("훌륭", 2.0), ("최고", 2.0), ("추천", 1.5), ("만족", 1.5),
    ("행복", 1.5), ("맛있", 1.5), ("편리", 1.0), ("즐겁", 1.0), ("즐거", 1.0), ("재미있", 1.0),
    ("감동", 1.5), ("친절", 1.0), ("깔끔", 1.0), ("아름답", 1.5), ("예쁘", 1.0), ("성공", 1.0),
    ("나쁘", -1.0), ("나빠", -1.0), ("최악", -2.0), ("실망", -1.5), ("불편", -1.0), ("별로", -1.0),
    ("아쉽", -0.5), ("아쉬", -0.5), ("짜증", -1.5), ("후회", -1.5), ("불친절", -1.5), ("지루", -1.0),
    ("어렵", -0.5), ("비싸", -0.5), ("실패", -1.0), ("문제", -0.5),
];

/// Korean negates before (`안 좋다`) and after (`좋지 않다`) the predicate
const KOREAN_NEGATORS_BEFORE: &[&str] = &["안", "못"];
const KOREAN_NEGATORS_AFTER: &[&str] = &["않", "못하", "없"];

/// Lexicon scorer with negation handling
#[derive(Debug, Clone)]
pub struct LexiconModel {
    language: String,
    lexicon: BTreeMap<String, f64>,
    /// Match lexicon entries as prefixes of a term (agglutinative languages)
    prefix_match: bool,
    negators_before: Vec<String>,
    negators_after: Vec<String>,
}

impl LexiconModel {
    fn new(language: &str, lexicon: BTreeMap<String, f64>) -> Self {
        let korean = language == "ko";
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(|w| w.to_string()).collect() };
        Self {
            language: language.to_string(),
            lexicon,
            prefix_match: korean,
            negators_before: if korean {
                owned(KOREAN_NEGATORS_BEFORE)
            } else {
                owned(ENGLISH_NEGATORS)
            },
            negators_after: if korean { owned(KOREAN_NEGATORS_AFTER) } else { Vec::new() },
        }
    }

    /// Built-in lexicon for `language`, if one ships
    pub fn builtin(language: &str) -> Option<Self> {
        let entries = match language {
            "en" => ENGLISH_LEXICON,
            "ko" => KOREAN_LEXICON,
            _ => return None,
        };
        let lexicon = entries.iter().map(|(t, w)| (t.to_string(), *w)).collect();
        Some(Self::new(language, lexicon))
    }

    /// Parse `term<TAB>weight` lines; blank lines and `#` comments are skipped
    pub fn parse(language: &str, content: &str) -> Result<Self> {
        let mut lexicon = BTreeMap::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (term, weight) = line
                .split_once('\t')
                .ok_or_else(|| Error::Unavailable(format!("lexicon line {}: expected term<TAB>weight", number + 1)))?;
            let weight: f64 = weight.trim().parse().map_err(|_| {
                Error::Unavailable(format!("lexicon line {}: invalid weight '{}'", number + 1, weight.trim()))
            })?;
            lexicon.insert(term.trim().to_lowercase(), weight);
        }
        if lexicon.is_empty() {
            return Err(Error::Unavailable("lexicon has no entries".to_string()));
        }
        Ok(Self::new(language, lexicon))
    }

    pub fn from_file(language: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Unavailable(format!("sentiment lexicon {}: {}", path.display(), e))
        })?;
        Self::parse(language, &content)
    }

    fn weight_of(&self, token: &Token) -> Option<f64> {
        for candidate in [&token.surface, &token.term] {
            if let Some(weight) = self.lexicon.get(candidate.as_str()) {
                return Some(*weight);
            }
        }
        if !self.prefix_match {
            return None;
        }
        // Longest lexicon entry that prefixes the term
        let term = token.term.as_str();
        term.char_indices()
            .map(|(i, c)| &term[..i + c.len_utf8()])
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .find_map(|prefix| self.lexicon.get(prefix).copied())
    }

    fn is_negator(token: &Token, words: &[String], prefix: bool) -> bool {
        words.iter().any(|n| {
            token.surface == *n || token.term == *n || (prefix && token.term.starts_with(n.as_str()))
        })
    }

    fn negated(&self, tokens: &[Token], i: usize) -> bool {
        let sentence = tokens[i].sentence;
        let before = tokens[..i]
            .iter()
            .rev()
            .take(2)
            .take_while(|t| t.sentence == sentence)
            .any(|t| Self::is_negator(t, &self.negators_before, false));
        let after = tokens[i + 1..]
            .iter()
            .take(2)
            .take_while(|t| t.sentence == sentence)
            .any(|t| Self::is_negator(t, &self.negators_after, true));
        before || after
    }
}

impl SentimentModel for LexiconModel {
    fn name(&self) -> &str {
        &self.language
    }

    fn score(&self, tokens: &[Token]) -> Sentiment {
        let mut sum = 0.0;
        let mut magnitude = 0.0;
        let mut hits = 0usize;

        for (i, token) in tokens.iter().enumerate() {
            let Some(mut weight) = self.weight_of(token) else {
                continue;
            };
            if self.negated(tokens, i) {
                weight = -weight;
            }
            sum += weight;
            magnitude += weight.abs();
            hits += 1;
        }

        if hits == 0 {
            return Sentiment {
                label: SentimentLabel::Neutral,
                confidence: 0.0,
                polarity: 0.0,
            };
        }

        let polarity = (sum / magnitude).clamp(-1.0, 1.0);
        let label = if polarity > NEUTRAL_BAND {
            SentimentLabel::Positive
        } else if polarity < -NEUTRAL_BAND {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };
        let coverage = (hits as f64 / CONFIDENT_HITS).min(1.0);
        let confidence = match label {
            SentimentLabel::Neutral => (1.0 - polarity.abs()) * coverage,
            _ => (0.5 + 0.5 * polarity.abs()) * coverage,
        };

        Sentiment {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            polarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::tokenize::{EnglishTokenizer, KoreanTokenizer, Tokenizer};

    fn english(text: &str) -> Sentiment {
        let model = LexiconModel::builtin("en").unwrap();
        model.score(&EnglishTokenizer.tokenize(text))
    }

    fn korean(text: &str) -> Sentiment {
        let model = LexiconModel::builtin("ko").unwrap();
        model.score(&KoreanTokenizer.tokenize(text))
    }

    #[test]
    fn test_english_polarity() {
        let positive = english("This is a great recipe. I love it and highly recommend it.");
        assert_eq!(positive.label, SentimentLabel::Positive);
        assert_eq!(positive.polarity, 1.0);
        assert_eq!(positive.confidence, 1.0);

        let negative = english("Terrible service and awful food.");
        assert_eq!(negative.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_english_negation() {
        let sentiment = english("The movie was not good.");
        assert_eq!(sentiment.label, SentimentLabel::Negative);
        assert_eq!(sentiment.polarity, -1.0);
    }

    #[test]
    fn test_neutral_without_hits() {
        let sentiment = english("The train leaves at noon.");
        assert_eq!(sentiment.label, SentimentLabel::Neutral);
        assert_eq!(sentiment.confidence, 0.0);
    }

    #[test]
    fn test_korean_polarity_and_negation() {
        let positive = korean("음식이 정말 맛있고 직원도 친절했다. 강력 추천합니다.");
        assert_eq!(positive.label, SentimentLabel::Positive);

        let negated = korean("음식이 좋지 않았다.");
        assert_eq!(negated.label, SentimentLabel::Negative);

        let before = korean("서비스가 안 좋다.");
        assert_eq!(before.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_bounds() {
        for text in ["good bad good", "not not bad", "", "love hate love hate"] {
            let s = english(text);
            assert!((-1.0..=1.0).contains(&s.polarity));
            assert!((0.0..=1.0).contains(&s.confidence));
        }
    }

    #[test]
    fn test_parse_lexicon() {
        let model = LexiconModel::parse("en", "# comment\nsplendid\t2.0\n\ndreadful\t-2\n").unwrap();
        let s = model.score(&EnglishTokenizer.tokenize("A splendid day."));
        assert_eq!(s.label, SentimentLabel::Positive);

        assert!(LexiconModel::parse("en", "no tab here").is_err());
        assert!(LexiconModel::parse("en", "word\tabc").is_err());
        assert!(LexiconModel::parse("en", "# only comments").is_err());
    }

    #[test]
    fn test_builtin_languages() {
        assert!(LexiconModel::builtin("en").is_some());
        assert!(LexiconModel::builtin("ko").is_some());
        assert!(LexiconModel::builtin("fr").is_none());
    }
}
