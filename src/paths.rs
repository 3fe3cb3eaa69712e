//! Common paths for photoflow data storage
//!
//! All photoflow data is stored under ~/.config/photoflow/ on all platforms:
//! - config.toml - User configuration
//! - network_cache/ - Persisted network payloads, one file per content key

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the photoflow data directory (~/.config/photoflow/)
///
/// This is consistent across all platforms for simplicity.
pub fn photoflow_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".config").join("photoflow");
    fs::create_dir_all(&dir).context("Failed to create photoflow directory")?;
    Ok(dir)
}

/// Get the config file path (~/.config/photoflow/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(photoflow_dir()?.join("config.toml"))
}

/// Get the network cache directory (~/.config/photoflow/network_cache)
pub fn network_cache_dir() -> Result<PathBuf> {
    Ok(photoflow_dir()?.join("network_cache"))
}
