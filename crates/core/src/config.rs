//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then the optional
//! `config.toml`, then `OWNBOSS_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ledger::snapshot::LEDGER_FILE, money::Money};

/// Directory under the platform config/data dirs.
pub const APP_DIR: &str = "ownboss";
/// Config file name.
pub const CONFIG_FILE: &str = "config.toml";
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "OWNBOSS";
/// Starting balance of a new company: 50,000.000.
pub const DEFAULT_INITIAL_MONEY: Money = Money::from_thousandths(50_000_000);
/// How long a success indicator stays up.
pub const DEFAULT_SUCCESS_DISPLAY_MS: u64 = 1_500;

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ledger snapshot and log directory.
    pub data_dir: PathBuf,
    /// JSON resource seed file.
    pub catalog_path: PathBuf,
    /// Balance given to newly opened companies, in thousandths.
    pub initial_money: Money,
    /// Success indicator duration in milliseconds.
    pub success_display_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self {
            catalog_path: data_dir.join("resources.json"),
            data_dir,
            initial_money: DEFAULT_INITIAL_MONEY,
            success_display_ms: DEFAULT_SUCCESS_DISPLAY_MS,
        }
    }
}

impl AppConfig {
    /// Load from the default config file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (which may be missing) and the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let defaults = Self::default();

        let settings = Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?
            .set_default(
                "catalog_path",
                defaults.catalog_path.to_string_lossy().to_string(),
            )?
            .set_default("initial_money", defaults.initial_money.thousandths())?
            .set_default("success_display_ms", defaults.success_display_ms as i64)?
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let config: Self = settings
            .try_deserialize()
            .context("invalid configuration")?;
        if config.initial_money.is_negative() {
            anyhow::bail!("initial_money cannot be negative");
        }
        Ok(config)
    }

    /// Ledger snapshot location.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    /// Log file directory.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Success indicator duration.
    pub fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }

    fn to_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        Ok(format!(
            "# ownboss configuration\n# initial_money is in thousandths: 50000000 is 50,000.000\n{body}"
        ))
    }
}

/// `<config_dir>/ownboss/config.toml`.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Write a default config file when none exists. Returns its path.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    ensure_default_config_at(&path)?;
    Ok(path)
}

/// Write defaults to `path` unless it exists. Returns whether a file was written.
pub fn ensure_default_config_at(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, AppConfig::default().to_toml()?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(true)
}
