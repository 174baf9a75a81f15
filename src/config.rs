//! Application configuration management.
//!
//! This module handles loading and saving the engine configuration: the
//! upstream base URLs and the freshness windows driving the cache policy.
//!
//! Configuration is stored at `~/.config/runcache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "runcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Consider plain cache entries stale after 1 hour.
const DEFAULT_CACHE_LENGTH_MINUTES: i64 = 60;

/// Time-scoped entries become permanently fresh once their scheduled time
/// is this far in the past.
const DEFAULT_CACHE_CUTOFF_DAYS: i64 = 30;

/// Community VOD lists are assumed to stabilize about a week post-event.
const DEFAULT_VOD_FINALIZE_DAYS: i64 = 7;

/// Minimum gap between auxiliary metadata lookups.
const DEFAULT_LOOKUP_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker_base_url: String,
    pub schedule_base_url: String,
    pub vod_list_base_url: String,
    /// Override for the durable store location; defaults to the platform
    /// data directory.
    pub store_dir: Option<PathBuf>,
    pub cache_length_minutes: i64,
    pub cache_cutoff_days: i64,
    pub vod_finalize_days: i64,
    pub lookup_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_base_url: "https://tracker.example.org".to_string(),
            schedule_base_url: "https://horaro.org/-/api/v1/events".to_string(),
            vod_list_base_url: "https://vods.example.org/events".to_string(),
            store_dir: None,
            cache_length_minutes: DEFAULT_CACHE_LENGTH_MINUTES,
            cache_cutoff_days: DEFAULT_CACHE_CUTOFF_DAYS,
            vod_finalize_days: DEFAULT_VOD_FINALIZE_DAYS,
            lookup_delay_ms: DEFAULT_LOOKUP_DELAY_MS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Durable store location for the object store partitions.
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.store_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn cache_length(&self) -> Duration {
        Duration::minutes(self.cache_length_minutes)
    }

    pub fn cache_cutoff(&self) -> Duration {
        Duration::days(self.cache_cutoff_days)
    }

    pub fn vod_finalize_window(&self) -> Duration {
        Duration::days(self.vod_finalize_days)
    }

    pub fn lookup_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lookup_delay_ms)
    }
}
