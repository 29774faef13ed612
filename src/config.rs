use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Contents of `plantkeeper.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PlantkeeperConfig {
    pub database: Option<String>,
    /// `tracing` filter directive, e.g. `info` or `plantkeeper=debug`
    pub log_level: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("plantkeeper.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".plantkeeper").join("plantkeeper.db")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<PlantkeeperConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    let config: PlantkeeperConfig =
        toml::from_str(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &PlantkeeperConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(path, contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// Command line beats config file beats the default location
pub fn resolve_database_path(cli: Option<&Path>, config: Option<&PlantkeeperConfig>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Some(path) = config.and_then(|c| c.database.as_deref()) {
        return PathBuf::from(path);
    }
    default_database_path_in(Path::new("."))
}

/// Log filter directive: `--verbose`, then `RUST_LOG`, then the config file, then `info`
pub fn resolve_log_filter(
    verbose: bool,
    rust_log: Option<&str>,
    config: Option<&PlantkeeperConfig>,
) -> String {
    if verbose {
        return "debug".to_string();
    }
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or_else(|| config.and_then(|c| c.log_level.as_deref()))
        .unwrap_or("info")
        .to_string()
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StorageUnavailable(format!("{}: {}", parent.display(), e)))?;
        }
    }
    Ok(())
}
