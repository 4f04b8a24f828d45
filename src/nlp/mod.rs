//! NLP analysis
//!
//! Keyword ranking, topic grouping and sentiment for a [`Document`]. Every
//! inference step runs on the blocking pool under a deadline; a missing
//! resource or an expired deadline degrades that step to
//! [`Analysis::Unavailable`] instead of failing the analysis.

pub mod keywords;
pub mod sentiment;
pub mod tokenize;
pub mod topics;

pub use keywords::{extract_keywords, text_rank, RankedKeyword};
pub use sentiment::{LexiconModel, Sentiment, SentimentLabel, SentimentModel};
pub use tokenize::{tokenizer_for, EnglishTokenizer, KoreanTokenizer, RuleBasedTokenizer, Token, Tokenizer};
pub use topics::{corpus_topics, document_topics, Topic};

use crate::config::NlpConfig;
use crate::normalize::Document;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one sub-analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis<T> {
    Available { value: T },
    Unavailable { reason: String },
}

impl<T> Analysis<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Analysis::Available { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Analysis::Available { value } => Some(value),
            Analysis::Unavailable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Analysis::Available { .. } => None,
            Analysis::Unavailable { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpResult {
    pub language: String,
    pub tokenizer: String,
    pub token_count: usize,
    pub keywords: Analysis<Vec<RankedKeyword>>,
    pub topics: Analysis<Vec<Topic>>,
    pub sentiment: Analysis<Sentiment>,
    /// Names of the sub-analyses that were unavailable
    pub unavailable: Vec<String>,
}

/// Runs the NLP sub-analyses for documents
pub struct NlpEngine {
    config: NlpConfig,
    /// Overrides lexicon lookup when set
    sentiment_model: Option<Arc<dyn SentimentModel>>,
}

impl NlpEngine {
    pub fn new(config: NlpConfig) -> Self {
        Self {
            config,
            sentiment_model: None,
        }
    }

    /// Use a specific sentiment model for every language
    pub fn with_sentiment_model(mut self, model: Arc<dyn SentimentModel>) -> Self {
        self.sentiment_model = Some(model);
        self
    }

    pub fn config(&self) -> &NlpConfig {
        &self.config
    }

    fn primary_language(language: &str) -> String {
        language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Sentiment model for a language: `sentiment-<lang>.txt` when a models
    /// directory is configured, otherwise the built-in lexicon
    fn load_sentiment_model(
        &self,
        language: &str,
    ) -> std::result::Result<Arc<dyn SentimentModel>, String> {
        if let Some(model) = &self.sentiment_model {
            return Ok(model.clone());
        }
        match &self.config.models_dir {
            Some(dir) => {
                let path = dir.join(format!("sentiment-{}.txt", language));
                if !path.exists() {
                    return Err(format!("sentiment lexicon not found: {}", path.display()));
                }
                LexiconModel::from_file(language, &path)
                    .map(|m| Arc::new(m) as Arc<dyn SentimentModel>)
                    .map_err(|e| e.to_string())
            }
            None => LexiconModel::builtin(language)
                .map(|m| Arc::new(m) as Arc<dyn SentimentModel>)
                .ok_or_else(|| format!("no built-in sentiment lexicon for '{}'", language)),
        }
    }

    /// Run `task` on the blocking pool under the inference deadline
    async fn infer<T, F>(&self, step: &'static str, task: F) -> Analysis<T>
    where
        T: Send + 'static,
        F: FnOnce() -> std::result::Result<T, String> + Send + 'static,
    {
        let deadline = Duration::from_millis(self.config.inference_timeout_ms);
        let outcome = tokio::time::timeout(deadline, tokio::task::spawn_blocking(task)).await;

        let reason = match outcome {
            Ok(Ok(Ok(value))) => return Analysis::Available { value },
            Ok(Ok(Err(reason))) => reason,
            Ok(Err(join_error)) => format!("{} task failed: {}", step, join_error),
            Err(_) => format!("{} timed out after {}ms", step, self.config.inference_timeout_ms),
        };
        warn!("NLP {} unavailable: {}", step, reason);
        Analysis::Unavailable { reason }
    }

    /// Analyze a single document
    pub async fn analyze(&self, doc: &Document) -> NlpResult {
        self.analyze_with_corpus(doc, &[]).await
    }

    /// Analyze a document; a non-empty corpus of related posts switches
    /// topic weighting to TF-IDF
    pub async fn analyze_with_corpus(&self, doc: &Document, corpus: &[Document]) -> NlpResult {
        let language = Self::primary_language(&doc.language);
        let tokenizer_name = tokenizer_for(&language).name().to_string();

        let text = doc.body_text.clone();
        let lang = language.clone();
        let tokens = self
            .infer("tokenization", move || Ok(tokenizer_for(&lang).tokenize(&text)))
            .await;

        let tokens = match tokens {
            Analysis::Available { value } => Arc::new(value),
            Analysis::Unavailable { reason } => {
                return NlpResult {
                    language,
                    tokenizer: tokenizer_name,
                    token_count: 0,
                    keywords: Analysis::Unavailable { reason: reason.clone() },
                    topics: Analysis::Unavailable { reason: reason.clone() },
                    sentiment: Analysis::Unavailable { reason },
                    unavailable: vec!["keywords".into(), "topics".into(), "sentiment".into()],
                };
            }
        };

        let top_keywords = self.config.top_keywords;
        let max_topics = self.config.max_topics;

        let keyword_tokens = tokens.clone();
        let keywords = self.infer("keywords", move || Ok(text_rank(&keyword_tokens, top_keywords)));

        let topic_tokens = tokens.clone();
        let corpus_texts: Vec<(String, String)> = corpus
            .iter()
            .map(|d| (Self::primary_language(&d.language), d.body_text.clone()))
            .collect();
        let topics = self.infer("topics", move || {
            if corpus_texts.is_empty() {
                return Ok(document_topics(&topic_tokens, max_topics));
            }
            let corpus_tokens: Vec<Vec<Token>> = corpus_texts
                .iter()
                .map(|(lang, text)| tokenizer_for(lang).tokenize(text))
                .collect();
            Ok(corpus_topics(&topic_tokens, &corpus_tokens, max_topics))
        });

        let sentiment = match self.load_sentiment_model(&language) {
            Ok(model) => {
                let sentiment_tokens = tokens.clone();
                futures::future::Either::Left(
                    self.infer("sentiment", move || Ok(model.score(&sentiment_tokens))),
                )
            }
            Err(reason) => {
                warn!("NLP sentiment unavailable: {}", reason);
                futures::future::Either::Right(futures::future::ready(Analysis::Unavailable {
                    reason,
                }))
            }
        };

        let (keywords, topics, sentiment) = tokio::join!(keywords, topics, sentiment);

        let mut unavailable = Vec::new();
        if !keywords.is_available() {
            unavailable.push("keywords".to_string());
        }
        if !topics.is_available() {
            unavailable.push("topics".to_string());
        }
        if !sentiment.is_available() {
            unavailable.push("sentiment".to_string());
        }

        debug!(
            "NLP for {}: {} tokens, unavailable: {:?}",
            doc.url,
            tokens.len(),
            unavailable
        );

        NlpResult {
            language,
            tokenizer: tokenizer_name,
            token_count: tokens.len(),
            keywords,
            topics,
            sentiment,
            unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seo::test_support::document;
    use tempfile::TempDir;

    fn config() -> NlpConfig {
        NlpConfig::default()
    }

    fn review() -> Document {
        document(
            "Review",
            "The espresso machine is excellent. Espresso shots pull fast and taste great.\n\n\
             Cleaning the espresso machine is easy.",
        )
    }

    #[tokio::test]
    async fn test_full_analysis() {
        let engine = NlpEngine::new(config());
        let result = engine.analyze(&review()).await;

        assert_eq!(result.language, "en");
        assert_eq!(result.tokenizer, "english");
        assert!(result.unavailable.is_empty());

        let keywords = result.keywords.value().unwrap();
        assert_eq!(keywords[0].term, "espresso");
        assert!(result.topics.is_available());
        assert_eq!(result.sentiment.value().unwrap().label, SentimentLabel::Positive);
    }

    #[tokio::test]
    async fn test_missing_lexicon_degrades_sentiment_only() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.models_dir = Some(dir.path().to_path_buf());

        let result = NlpEngine::new(config).analyze(&review()).await;
        assert!(result.keywords.is_available());
        assert!(result.topics.is_available());
        assert!(result.sentiment.reason().unwrap().contains("sentiment-en.txt"));
        assert_eq!(result.unavailable, vec!["sentiment"]);
    }

    #[tokio::test]
    async fn test_lexicon_file_used() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sentiment-en.txt"), "excellent\t-2\ngreat\t-2\neasy\t-1\n").unwrap();
        let mut config = config();
        config.models_dir = Some(dir.path().to_path_buf());

        let result = NlpEngine::new(config).analyze(&review()).await;
        assert_eq!(result.sentiment.value().unwrap().label, SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn test_unknown_language_has_no_builtin_lexicon() {
        let mut doc = review();
        doc.language = "fr".to_string();
        let result = NlpEngine::new(config()).analyze(&doc).await;
        assert_eq!(result.tokenizer, "rule_based");
        assert_eq!(result.unavailable, vec!["sentiment"]);
    }

    struct SlowModel;

    impl SentimentModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        fn score(&self, _tokens: &[Token]) -> Sentiment {
            std::thread::sleep(Duration::from_millis(300));
            Sentiment {
                label: SentimentLabel::Neutral,
                confidence: 0.0,
                polarity: 0.0,
            }
        }
    }

    #[tokio::test]
    async fn test_inference_timeout() {
        let mut config = config();
        config.inference_timeout_ms = 50;
        let engine = NlpEngine::new(config).with_sentiment_model(Arc::new(SlowModel));

        let result = engine.analyze(&review()).await;
        assert!(result.sentiment.reason().unwrap().contains("timed out"));
        assert!(result.keywords.is_available());
    }

    #[tokio::test]
    async fn test_corpus_topics() {
        let corpus = vec![document("Other", "Espresso machines compared. Espresso grinders.")];
        let result = NlpEngine::new(config())
            .analyze_with_corpus(&review(), &corpus)
            .await;
        assert!(!result.topics.value().unwrap().is_empty());
    }

    #[test]
    fn test_analysis_serialization() {
        let unavailable: Analysis<Sentiment> = Analysis::Unavailable {
            reason: "missing".to_string(),
        };
        let json = serde_json::to_value(&unavailable).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "missing");
    }
}
