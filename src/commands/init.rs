//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::JobDb;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Where `init` put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    /// False when an existing config file was kept
    pub config_written: bool,
}

/// Write the default configuration and create the job database.
///
/// An existing config file is kept unless `force` is set; the database
/// schema is always (re)applied, which is idempotent.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitReport> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    let config_written = if config.paths.config_file.exists() && !force {
        info!(
            "Keeping existing config at {:?}",
            config.paths.config_file
        );
        // Fail early on a config that would not load later
        Config::load(&config.paths.config_file)?;
        false
    } else {
        config.validate()?;
        config.save()?;
        true
    };

    let db = JobDb::connect(&config).await?;
    db.init_schema().await?;
    if !db.is_initialized().await? {
        return Err(Error::Internal(format!(
            "schema missing after init in {}",
            config.paths.db_file.display()
        )));
    }
    info!("Created database at {:?}", config.paths.db_file);

    Ok(InitReport {
        config_path: config.paths.config_file,
        db_path: config.paths.db_file,
        config_written,
    })
}

/// Open the job database, requiring a prior `init`
pub async fn open_db(config: &Config) -> Result<JobDb> {
    if !config.paths.db_file.exists() {
        return Err(Error::NotInitialized);
    }
    let db = JobDb::connect(config).await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }
    Ok(db)
}
