//! TextRank keyword extraction

use super::tokenize::{tokenizer_for, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Co-occurrence window in tokens
pub const WINDOW: usize = 4;
pub const DAMPING: f64 = 0.85;
const MAX_ITERATIONS: usize = 100;
const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedKeyword {
    pub term: String,
    /// Relative to the top keyword (1.0)
    pub score: f64,
}

/// A ranked term with its counting key
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoredTerm {
    pub key: String,
    pub display: String,
    pub score: f64,
}

/// Most frequent surface form per term; ties go to the lexically smallest
pub(crate) fn display_forms(tokens: &[Token]) -> BTreeMap<String, String> {
    let mut counts: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for token in tokens.iter().filter(|t| !t.stop) {
        *counts
            .entry(token.term.as_str())
            .or_default()
            .entry(token.surface.as_str())
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(term, surfaces)| {
            let mut best = ("", 0usize);
            for (surface, count) in surfaces {
                if count > best.1 {
                    best = (surface, count);
                }
            }
            (term.to_string(), best.0.to_string())
        })
        .collect()
}

/// Sort by score descending, then display form
pub(crate) fn sort_terms(terms: &mut [ScoredTerm]) {
    terms.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.display.cmp(&b.display))
    });
}

/// Rank every content term of the token stream
pub(crate) fn rank_terms(tokens: &[Token]) -> Vec<ScoredTerm> {
    let content: Vec<&Token> = tokens.iter().filter(|t| !t.stop).collect();
    let display = display_forms(tokens);
    if content.is_empty() {
        return Vec::new();
    }

    let index: BTreeMap<&str, usize> = display
        .keys()
        .enumerate()
        .map(|(i, term)| (term.as_str(), i))
        .collect();
    let n = index.len();

    let mut edges: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    for (i, token) in content.iter().enumerate() {
        let a = index[token.term.as_str()];
        for other in content.iter().skip(i + 1).take(WINDOW - 1) {
            if other.sentence != token.sentence {
                break;
            }
            let b = index[other.term.as_str()];
            if a != b {
                *edges[a].entry(b).or_default() += 1.0;
                *edges[b].entry(a).or_default() += 1.0;
            }
        }
    }
    let out_weight: Vec<f64> = edges.iter().map(|e| e.values().sum()).collect();

    let mut scores = vec![1.0; n];
    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![1.0 - DAMPING; n];
        for (j, neighbours) in edges.iter().enumerate() {
            if out_weight[j] == 0.0 {
                continue;
            }
            for (&i, &weight) in neighbours {
                next[i] += DAMPING * weight / out_weight[j] * scores[j];
            }
        }

        let delta = next
            .iter()
            .zip(&scores)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        scores = next;
        if delta < EPSILON {
            break;
        }
    }

    let max = scores.iter().copied().fold(0.0, f64::max);
    let mut ranked: Vec<ScoredTerm> = display
        .into_iter()
        .zip(scores)
        .map(|((key, display), score)| ScoredTerm {
            key,
            display,
            score: if max > 0.0 { score / max } else { 0.0 },
        })
        .collect();
    sort_terms(&mut ranked);
    ranked
}

/// Top `top_n` keywords of a token stream
pub fn text_rank(tokens: &[Token], top_n: usize) -> Vec<RankedKeyword> {
    rank_terms(tokens)
        .into_iter()
        .take(top_n)
        .map(|t| RankedKeyword {
            term: t.display,
            score: t.score,
        })
        .collect()
}

/// Tokenize `text` for `language` and rank its keywords
pub fn extract_keywords(text: &str, language: &str, top_n: usize) -> Vec<RankedKeyword> {
    let tokens = tokenizer_for(language).tokenize(text);
    text_rank(&tokens, top_n)
}
