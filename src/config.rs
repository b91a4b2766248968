// File: src/config.rs
use crate::paths::AppPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Account used by the config-backed identity provider.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AccountConfig {
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    /// Database secret or ID token appended as `?auth=`. Optional for open rules.
    #[serde(default)]
    pub token: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Base URL of the realtime database, e.g. `https://<project>.firebaseio.com`.
    /// Empty runs against an in-memory tree (offline demo).
    #[serde(default)]
    pub database_url: String,

    #[serde(default)]
    pub account: Option<AccountConfig>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            account: None,
            log_level: default_log_level(),
            notifications: true,
        }
    }
}

impl Config {
    /// `Ok(None)` when there is no config file yet.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&AppPaths::get_config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(Some(config))
    }

    /// Load the config, writing the defaults only when no file exists.
    /// An unreadable file is an error and is never overwritten.
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_at(&AppPaths::get_config_file_path()?)
    }

    pub fn load_or_init_at(path: &Path) -> Result<Self> {
        if let Some(config) = Self::load_from(path)? {
            return Ok(config);
        }
        let config = Self::default();
        if let Err(e) = config.save_to(path) {
            // Logging is not up yet at this point.
            eprintln!("Could not write a default config: {}", e);
        }
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::get_config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn get_path_string() -> Result<String> {
        let path = AppPaths::get_config_file_path()?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn is_offline(&self) -> bool {
        self.database_url.trim().is_empty()
    }
}
