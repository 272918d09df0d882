//! Global configuration loaded from `~/.config/mdm/config.toml`.

use crate::retry::RetryPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per part transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs_f64(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration for the MDM manager and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Directory holding downloaded region files. Defaults to the XDG data
    /// dir (`~/.local/share/mdm/regions`).
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Path to the region catalog TOML. Defaults to `regions.toml` next to
    /// the config file.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Mirror base URL serving `<version>/<file>` part files.
    #[serde(default)]
    pub mirror_url: Option<String>,
    /// Optional retry tuning; built-in defaults are used when missing.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl MdmConfig {
    /// The storage root, created on demand when defaulted.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
        Ok(xdg_dirs.create_data_directory("regions")?)
    }

    /// The region catalog path.
    pub fn catalog_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.catalog {
            return Ok(path.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
        Ok(xdg_dirs.get_config_home().join("regions.toml"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().policy()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
