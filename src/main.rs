//! blogseo CLI entry point

use blogseo::{
    commands::{
        cmd_analyze, cmd_init, cmd_list_jobs, cmd_show_job, open_db, print_crawl_log,
        print_job_outcome, print_jobs, print_report, AnalyzeOptions,
    },
    config::Config,
    error::{Error, Result},
    jobs::AnalysisReport,
    progress::LogWriterFactory,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "blogseo")]
#[command(version, about = "Blog post SEO and content-quality analyzer", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "BLOGSEO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize blogseo configuration and database
    Init {
        /// Overwrite an existing config with defaults
        #[arg(long)]
        force: bool,
    },

    /// Analyze one or more blog posts
    Analyze {
        /// Post URLs
        #[arg(required_unless_present = "resume")]
        urls: Vec<String>,

        /// Target keyword (repeatable); derived from the post when omitted
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Also finish jobs left unfinished by an earlier run
        #[arg(long)]
        resume: bool,
    },

    /// List recent analysis jobs
    Jobs {
        /// Maximum number of jobs
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one job's report and crawl log
    Show {
        /// Job ID (use 'blogseo jobs' to list)
        job_id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, log_json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(fmt::layer().json().with_writer(LogWriterFactory::default()))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(LogWriterFactory::default()))
            .init();
    }
}

/// Base directory for a `--config` argument naming either a file or a directory
fn base_dir_for(path: &std::path::Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => Config::load(path),
        Some(path) => Config::load_from(Some(base_dir_for(path))),
        None => Config::load_from(None),
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Init { force } => {
            let base_dir = cli.config.as_deref().map(base_dir_for);
            let report = cmd_init(base_dir, force).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ blogseo initialized successfully");
                if report.config_written {
                    println!("  Config: {}", report.config_path.display());
                } else {
                    println!("  Config: {} (kept existing)", report.config_path.display());
                }
                println!("  Database: {}", report.db_path.display());
                println!("\nNext steps:");
                println!("  1. Edit the config file to tune crawling and scoring");
                println!("  2. Analyze a post: blogseo analyze https://example.com/post");
            }
        }

        Commands::Analyze {
            urls,
            keywords,
            resume,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_db(&config).await?;
            let options = AnalyzeOptions {
                urls,
                keywords,
                resume,
                show_progress: !cli.json,
            };

            let jobs = cmd_analyze(&config, &db, options).await?;

            if cli.json {
                let reports: Vec<serde_json::Value> = jobs
                    .iter()
                    .map(|job| match AnalysisReport::from_job(job) {
                        Some(report) => serde_json::to_value(report),
                        None => serde_json::to_value(job),
                    })
                    .collect::<std::result::Result<_, _>>()?;
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for job in &jobs {
                    print_job_outcome(job);
                }
            }

            if jobs.iter().any(|job| job.result.is_none()) {
                std::process::exit(2);
            }
        }

        Commands::Jobs { limit } => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_db(&config).await?;
            let jobs = cmd_list_jobs(&db, limit).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                print_jobs(&jobs);
            }
        }

        Commands::Show { job_id } => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_db(&config).await?;
            let details = cmd_show_job(&db, &job_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                match (&details.report, &details.job) {
                    (Some(report), _) => print_report(report),
                    (None, Some(job)) => print_job_outcome(job),
                    (None, None) => return Err(Error::JobNotFound(job_id)),
                }
                print_crawl_log(&details.crawl_log);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "blogseo", &mut std::io::stdout());
        }
    }

    Ok(())
}
