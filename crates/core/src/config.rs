//! Application configuration: defaults, then `config.toml`, then
//! `GAMESLIST_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::store::{DEFAULT_STORE_DIR, StoreManager};

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "GAMESLIST";
const DEFAULT_TICK_RATE_MS: u64 = 250;

const DEFAULT_CONFIG: &str = r#"# GamesList configuration.
# Every key can also be set through a GAMESLIST_<KEY> environment variable.

# Location of the library document. Defaults to games.json next to this file.
# store_path = "/path/to/games.json"

# Directory receiving gameslist.log.
# log_dir = "/path/to/logs"

# Redraw interval of the terminal UI in milliseconds.
tick_rate_ms = 250

# Discord application id used for Rich Presence. Presence stays off when unset.
# discord_client_id = "000000000000000000"

# Look for a newer release on startup when update_repo is set.
check_updates = true
# update_repo = "owner/gameslist"
"#;

/// Runtime settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Overrides [`StoreManager::default_path`].
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Directory receiving `gameslist.log`.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Redraw interval of the UI, clamped to 16..=5000 ms.
    #[serde(default = "default_tick_rate_ms")]
    pub tick_rate_ms: u64,
    /// Discord application id. Presence stays off without one.
    #[serde(default)]
    pub discord_client_id: Option<String>,
    /// Look for a newer release on startup.
    #[serde(default = "default_check_updates")]
    pub check_updates: bool,
    /// `owner/name` of the GitHub repository publishing releases.
    #[serde(default)]
    pub update_repo: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            log_dir: default_log_dir(),
            tick_rate_ms: DEFAULT_TICK_RATE_MS,
            discord_client_id: None,
            check_updates: default_check_updates(),
            update_repo: None,
        }
    }
}

impl AppConfig {
    /// Load from the default location and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path` (optional) and the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        let config: Self = settings
            .try_deserialize()
            .context("invalid configuration values")?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.tick_rate_ms = self.tick_rate_ms.clamp(16, 5_000);
        self.discord_client_id = self
            .discord_client_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self
    }

    /// Store location from configuration or the per-user default.
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(StoreManager::default_path)
    }
}

/// Directory holding `config.toml` and, by default, the store.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STORE_DIR)
}

/// Location of `config.toml`.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Write a commented default `config.toml` if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(&config_path())
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STORE_DIR)
        .join("logs")
}

fn default_tick_rate_ms() -> u64 {
    DEFAULT_TICK_RATE_MS
}

fn default_check_updates() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_round_trips_to_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE);
        write_default_config(&path)?;
        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.tick_rate_ms, DEFAULT_TICK_RATE_MS);
        assert!(config.check_updates);
        assert!(config.store_path.is_none());
        assert!(config.discord_client_id.is_none());
        Ok(())
    }

    #[test]
    fn existing_file_is_not_overwritten() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "store_path = \"/tmp/library.json\"\ntick_rate_ms = 1\ndiscord_client_id = \"  \"\n",
        )?;
        write_default_config(&path)?;
        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.resolved_store_path(), PathBuf::from("/tmp/library.json"));
        assert_eq!(config.tick_rate_ms, 16);
        assert!(config.discord_client_id.is_none());
        Ok(())
    }

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = AppConfig::load_from(&dir.path().join("absent.toml"))?;
        assert_eq!(config.tick_rate_ms, DEFAULT_TICK_RATE_MS);
        Ok(())
    }
}
