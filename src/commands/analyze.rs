//! Analyze command implementation

use crate::config::Config;
use crate::crawl::Crawler;
use crate::error::Result;
use crate::jobs::{AnalysisJob, AnalysisReport, JobRepository, JobStage, Orchestrator};
use crate::nlp::NlpEngine;
use crate::progress::track_job;
use crate::store::JobDb;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub urls: Vec<String>,
    /// Target keywords; empty means derive them from the post
    pub keywords: Vec<String>,
    /// Also re-run jobs left unfinished by an earlier invocation
    pub resume: bool,
    pub show_progress: bool,
}

/// Build an orchestrator persisting jobs and crawl log to `db`
pub fn build_orchestrator(config: &Config, db: &JobDb) -> Result<Orchestrator> {
    let crawler = Crawler::new(config.crawl.clone())?.with_crawl_log(Arc::new(db.clone()));
    let repository: Arc<dyn JobRepository> = Arc::new(db.clone());
    Ok(Orchestrator::new(
        Arc::new(crawler),
        Arc::new(NlpEngine::new(config.nlp.clone())),
        config.scoring.clone(),
        config.jobs.clone(),
        repository,
    ))
}

/// Submit every URL, wait for all jobs and return them in submission order.
///
/// Ctrl-C cancels the running jobs; they still finish as `Failed`
/// (`cancelled`) and are returned.
pub async fn cmd_analyze(config: &Config, db: &JobDb, options: AnalyzeOptions) -> Result<Vec<AnalysisJob>> {
    let orchestrator = build_orchestrator(config, db)?;

    let mut ids: Vec<Uuid> = Vec::new();
    if options.resume {
        let resumed = orchestrator.resume_pending().await?;
        info!("Resumed {} unfinished job(s)", resumed.len());
        ids.extend(resumed);
    }
    for url in &options.urls {
        let id = orchestrator.submit(url, options.keywords.clone()).await?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut watchers = Vec::new();
    if options.show_progress {
        for id in &ids {
            watchers.push(track_job(orchestrator.subscribe(*id).await?));
        }
    }

    let waiting = async {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in &ids {
            jobs.push(orchestrator.wait(*id).await?);
        }
        Ok::<_, crate::error::Error>(jobs)
    };
    tokio::pin!(waiting);

    let jobs = tokio::select! {
        jobs = &mut waiting => jobs?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling {} job(s)", ids.len());
            orchestrator.cancel_all();
            waiting.await?
        }
    };

    for watcher in watchers {
        let _ = watcher.await;
    }
    orchestrator.close().await?;
    Ok(jobs)
}

/// Print one finished job to console
pub fn print_job_outcome(job: &AnalysisJob) {
    match job.stage {
        JobStage::Completed => match AnalysisReport::from_job(job) {
            Some(report) => print_report(&report),
            None => println!("✓ {} completed without a result", job.target_url),
        },
        JobStage::Failed => {
            println!("\n✗ {}", job.target_url);
            println!("  Job: {}", job.id);
            println!(
                "  Failed ({}): {}",
                job.error_kind.map(|k| k.as_str()).unwrap_or("unknown"),
                job.error_message.as_deref().unwrap_or("")
            );
            println!("  Fetch attempts: {}", job.attempt_count);
        }
        stage => {
            println!("\n… {}", job.target_url);
            println!("  Job: {}", job.id);
            println!("  Stage: {} ({}%)", stage, job.progress_percent);
        }
    }
}

/// Print a completed job's report to console
pub fn print_report(report: &AnalysisReport) {
    let score = &report.score;
    let doc = &report.document;

    println!("\n📝 {}", doc.title);
    println!("  URL: {}", doc.final_url);
    println!("  Job: {}", report.job.id);
    if let Some(platform) = report.job.platform {
        println!("  Platform: {}", platform);
    }
    println!(
        "  Language: {}, Words: {}, Fetch: HTTP {} in {}ms{}",
        doc.language,
        doc.word_count,
        doc.status_code,
        doc.elapsed_ms,
        if doc.rendered { " (rendered)" } else { "" }
    );
    if let Some(previous) = report.job.supersedes {
        println!("  Supersedes: {}", previous);
    }

    println!("\nSEO score: {}/100", score.aggregate);
    for (name, sub) in score.sub_scores() {
        println!("  {:<12} {:>3}", name, sub.score);
    }
    println!(
        "  Keywords{}: {}",
        if score.keywords_derived { " (derived)" } else { "" },
        score.keywords.join(", ")
    );

    let nlp = &report.nlp;
    println!("\nContent ({} tokenizer):", nlp.tokenizer);
    match nlp.keywords.value() {
        Some(keywords) => println!(
            "  Keywords: {}",
            keywords
                .iter()
                .map(|k| format!("{} ({:.2})", k.term, k.score))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        None => println!("  Keywords: unavailable ({})", nlp.keywords.reason().unwrap_or("")),
    }
    match nlp.topics.value() {
        Some(topics) => {
            for topic in topics {
                println!("  Topic {}: {}", topic.label, topic.terms.join(", "));
            }
        }
        None => println!("  Topics: unavailable ({})", nlp.topics.reason().unwrap_or("")),
    }
    match nlp.sentiment.value() {
        Some(sentiment) => println!(
            "  Sentiment: {:?} (polarity {:.2}, confidence {:.2})",
            sentiment.label, sentiment.polarity, sentiment.confidence
        ),
        None => println!("  Sentiment: unavailable ({})", nlp.sentiment.reason().unwrap_or("")),
    }

    if !score.recommendations.is_empty() {
        println!("\nRecommendations:");
        for rec in &score.recommendations {
            println!("  • {}", rec);
        }
    }
}
