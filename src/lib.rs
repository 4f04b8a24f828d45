//! blogseo - blog post SEO and content-quality analysis
//!
//! This crate provides:
//! - An adaptive crawler (static or headless-rendered, robots.txt aware,
//!   per-host rate limited) with platform detection for common blog hosts
//! - Normalization of fetched posts into a platform-independent document
//! - SEO scoring across seven weighted dimensions
//! - Keyword, topic and sentiment analysis for English and Korean
//! - A job orchestrator with idempotent submission, retries and cancellation,
//!   persisted in SQLite

pub mod commands;
pub mod config;
pub mod crawl;
pub mod error;
pub mod jobs;
pub mod nlp;
pub mod normalize;
pub mod platform;
pub mod progress;
pub mod seo;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
