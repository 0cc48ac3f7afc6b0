use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Environment variable that points the CLI at a specific database file.
pub const DB_PATH_ENV: &str = "BAKEPLAN_DB";

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::resolve(std::env::var_os(DB_PATH_ENV).map(PathBuf::from))
    }

    fn resolve(db_override: Option<PathBuf>) -> Result<Self> {
        if let Some(db_path) = db_override.filter(|p| !p.as_os_str().is_empty()) {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
            tracing::debug!(path = %db_path.display(), "using database path override");
            return Ok(Config { db_path });
        }

        let proj_dirs =
            ProjectDirs::from("", "", "bakeplan").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("bakeplan.db"),
        })
    }
}
