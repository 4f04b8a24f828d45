//! Topic grouping
//!
//! Salient terms are weighted (TextRank for a lone document, TF-IDF when a
//! corpus of related posts is available) and grouped by sentence
//! co-occurrence: two terms sharing at least two sentences end up in the
//! same topic.

use super::keywords::{display_forms, rank_terms, sort_terms, ScoredTerm};
use super::tokenize::Token;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Candidate terms considered per requested topic
const TERMS_PER_TOPIC: usize = 4;
const MIN_SHARED_SENTENCES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Highest-weight term
    pub label: String,
    pub terms: Vec<String>,
    /// Share of the candidate term weight
    pub weight: f64,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// The smaller index becomes the root
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Group weighted terms into at most `max_topics` topics
fn cluster(tokens: &[Token], mut terms: Vec<ScoredTerm>, max_topics: usize) -> Vec<Topic> {
    sort_terms(&mut terms);
    terms.truncate(max_topics * TERMS_PER_TOPIC);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut sentences: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
    for token in tokens.iter().filter(|t| !t.stop) {
        sentences
            .entry(token.term.as_str())
            .or_default()
            .insert(token.sentence);
    }

    let empty = BTreeSet::new();
    let sets: Vec<&BTreeSet<usize>> = terms
        .iter()
        .map(|t| sentences.get(t.key.as_str()).unwrap_or(&empty))
        .collect();

    let mut groups = DisjointSet::new(terms.len());
    for i in 0..terms.len() {
        for j in (i + 1)..terms.len() {
            if sets[i].intersection(sets[j]).count() >= MIN_SHARED_SENTENCES {
                groups.union(i, j);
            }
        }
    }

    let total: f64 = terms.iter().map(|t| t.score).sum();
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..terms.len() {
        members.entry(groups.find(i)).or_default().push(i);
    }

    // Terms are sorted, so each group's first member is its label
    let mut topics: Vec<Topic> = members
        .into_values()
        .map(|indices| {
            let weight: f64 = indices.iter().map(|&i| terms[i].score).sum();
            Topic {
                label: terms[indices[0]].display.clone(),
                terms: indices.iter().map(|&i| terms[i].display.clone()).collect(),
                weight: if total > 0.0 { weight / total } else { 0.0 },
            }
        })
        .collect();

    topics.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.label.cmp(&b.label)));
    topics.truncate(max_topics);
    topics
}

/// Topics of a single document, weighted by TextRank
pub fn document_topics(tokens: &[Token], max_topics: usize) -> Vec<Topic> {
    cluster(tokens, rank_terms(tokens), max_topics)
}

/// Topics weighted by TF-IDF against a corpus of related posts
pub fn corpus_topics(tokens: &[Token], corpus: &[Vec<Token>], max_topics: usize) -> Vec<Topic> {
    let display = display_forms(tokens);
    let content = tokens.iter().filter(|t| !t.stop).count();
    if content == 0 {
        return Vec::new();
    }

    let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
    for token in tokens.iter().filter(|t| !t.stop) {
        *tf.entry(token.term.as_str()).or_default() += 1;
    }

    let corpus_terms: Vec<BTreeSet<&str>> = corpus
        .iter()
        .map(|doc| doc.iter().filter(|t| !t.stop).map(|t| t.term.as_str()).collect())
        .collect();
    let n = corpus_terms.len() as f64;

    let terms = tf
        .into_iter()
        .map(|(term, count)| {
            let df = corpus_terms.iter().filter(|doc| doc.contains(term)).count() as f64;
            let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
            ScoredTerm {
                key: term.to_string(),
                display: display.get(term).cloned().unwrap_or_else(|| term.to_string()),
                score: count as f64 / content as f64 * idf,
            }
        })
        .collect();

    cluster(tokens, terms, max_topics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::tokenize::{EnglishTokenizer, Tokenizer};

    const TEXT: &str = "Sourdough bread needs a starter. \
        The starter feeds on flour and water. \
        Sourdough bread rises slowly with the starter. \
        Cycling routes follow the river. \
        Cycling near the river is calm.";

    #[test]
    fn test_co_occurring_terms_group_together() {
        let tokens = EnglishTokenizer.tokenize(TEXT);
        let topics = document_topics(&tokens, 5);
        assert!(!topics.is_empty());

        let bread = topics
            .iter()
            .find(|t| t.terms.contains(&"bread".to_string()))
            .unwrap();
        assert!(bread.terms.contains(&"sourdough".to_string()));
        assert!(bread.terms.contains(&"starter".to_string()));
        assert!(!bread.terms.contains(&"cycling".to_string()));

        let cycling = topics
            .iter()
            .find(|t| t.terms.contains(&"cycling".to_string()))
            .unwrap();
        assert!(cycling.terms.contains(&"river".to_string()));

        let total: f64 = topics.iter().map(|t| t.weight).sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_max_topics_respected() {
        let tokens = EnglishTokenizer.tokenize(TEXT);
        assert_eq!(document_topics(&tokens, 1).len(), 1);
        assert!(document_topics(&tokens, 0).is_empty());
        assert!(document_topics(&[], 3).is_empty());
    }

    #[test]
    fn test_corpus_downweights_common_terms() {
        let tokens = EnglishTokenizer.tokenize(TEXT);
        let corpus: Vec<Vec<Token>> = [
            "Sourdough bread recipes. Sourdough bread history.",
            "Sourdough bread for beginners. More sourdough bread.",
        ]
        .iter()
        .map(|t| EnglishTokenizer.tokenize(t))
        .collect();

        let topics = corpus_topics(&tokens, &corpus, 5);
        let baking = topics
            .iter()
            .find(|t| t.terms.contains(&"sourdough".to_string()))
            .unwrap();
        // Terms every post shares fall behind ones unique to this post
        assert_eq!(baking.label, "starter");
        assert_eq!(baking.terms, vec!["starter", "bread", "sourdough"]);
    }
}
