//! Common paths for Perch TV data storage
//!
//! All data is stored under ~/.config/perch-tv/ on all platforms:
//! - config.toml - User configuration
//! - perch-tv.sqlite - Persisted state (seen sets)

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the data directory (~/.config/perch-tv/)
///
/// This is consistent across all platforms for simplicity.
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".config").join("perch-tv");
    fs::create_dir_all(&dir).context("Failed to create perch-tv directory")?;
    Ok(dir)
}

/// Get the config file path (~/.config/perch-tv/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.toml"))
}

/// Get the database file path (~/.config/perch-tv/perch-tv.sqlite)
pub fn database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("perch-tv.sqlite"))
}
