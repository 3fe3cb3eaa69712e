//! Configuration module for photoflow

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::images::DEFAULT_CAPACITY_BYTES;
use crate::paths;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Memory cache capacity in payload bytes
    #[serde(default = "default_memory_cache_bytes")]
    pub memory_cache_bytes: usize,

    /// Number of download worker threads
    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    /// Jobs that may wait in the download queue before submitters block
    #[serde(default = "default_download_queue")]
    pub download_queue: usize,

    /// Number of decode worker threads (0 = one per available core)
    #[serde(default)]
    pub decode_workers: usize,

    /// Jobs that may wait in the decode queue before submitters block
    #[serde(default = "default_decode_queue")]
    pub decode_queue: usize,

    /// Task objects allocated up front
    #[serde(default = "default_task_pool_size")]
    pub task_pool_size: usize,

    /// Network timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Largest payload accepted from any origin
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Where network payloads are persisted (default: ~/.config/photoflow/network_cache)
    #[serde(default)]
    pub disk_cache_dir: Option<PathBuf>,

    /// Directory embedded assets are resolved against
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,

    /// User agent sent with network requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_memory_cache_bytes() -> usize {
    DEFAULT_CAPACITY_BYTES
}

const fn default_download_workers() -> usize {
    8
}

const fn default_download_queue() -> usize {
    128
}

const fn default_decode_queue() -> usize {
    64
}

const fn default_task_pool_size() -> usize {
    16
}

const fn default_http_timeout() -> u64 {
    30
}

const fn default_max_payload_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_asset_root() -> PathBuf {
    PathBuf::from("assets")
}

fn default_user_agent() -> String {
    format!("photoflow/{}", crate::VERSION)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_cache_bytes: default_memory_cache_bytes(),
            download_workers: default_download_workers(),
            download_queue: default_download_queue(),
            decode_workers: 0,
            decode_queue: default_decode_queue(),
            task_pool_size: default_task_pool_size(),
            http_timeout_secs: default_http_timeout(),
            max_payload_bytes: default_max_payload_bytes(),
            disk_cache_dir: None,
            asset_root: default_asset_root(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Decode pool width, resolving 0 to the number of available cores
    pub fn decode_parallelism(&self) -> usize {
        if self.decode_workers > 0 {
            self.decode_workers
        } else {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        }
    }

    /// Network timeout
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Effective disk cache directory
    pub fn resolved_disk_cache_dir(&self) -> Result<PathBuf> {
        match &self.disk_cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::network_cache_dir(),
        }
    }
}
