use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::provider::ServiceId;

pub const DEFAULT_CITY: &str = "New York";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 5000;

/// Credentials and endpoint overrides for one external service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    pub api_key: String,

    /// Override of the service's base URL (tests, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model name, only meaningful for text generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// City used when `/weather` is called without `city`.
    pub default_city: String,

    /// SQLite file holding the weather history.
    pub database_path: PathBuf,

    /// Upper bound on the length of a generated summary, in characters.
    pub summary_max_chars: usize,

    pub request_timeout_secs: u64,

    /// Timeout for a single summary generation call.
    pub summary_timeout_secs: u64,

    /// Address the HTTP server listens on.
    pub bind: String,

    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,

    /// Example TOML:
    /// [services.openweather]
    /// api_key = "..."
    pub services: HashMap<String, ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_city: DEFAULT_CITY.to_string(),
            database_path: PathBuf::from("weather.sqlite3"),
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            request_timeout_secs: 10,
            summary_timeout_secs: 60,
            bind: DEFAULT_BIND.to_string(),
            cors_allowed_origins: Vec::new(),
            services: HashMap::new(),
        }
    }
}

impl Config {
    pub fn service_config(&self, id: ServiceId) -> Option<&ServiceConfig> {
        self.services.get(id.as_str())
    }

    /// Returns API key for a service, if present and non-empty.
    pub fn service_api_key(&self, id: ServiceId) -> Option<&str> {
        self.service_config(id)
            .map(|cfg| cfg.api_key.as_str())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn is_service_configured(&self, id: ServiceId) -> bool {
        self.service_api_key(id).is_some()
    }

    /// Set or replace a service API key, keeping any endpoint overrides.
    pub fn upsert_service_api_key(&mut self, id: ServiceId, api_key: String) {
        self.services.entry(id.as_str().to_string()).or_default().api_key = api_key;
    }

    /// Load the config file and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file()?;
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Load config from disk only, or return an empty default if it doesn't exist yet.
    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-service", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    ///
    /// Recognised keys: `OPENWEATHERMAP_API_KEY`, `GEMINI_API_KEY`,
    /// `DATABASE_PATH`, `WEATHER_BIND`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for id in ServiceId::all() {
            if let Some(key) = non_empty(id.api_key_env()) {
                self.upsert_service_api_key(*id, key);
            }
        }
        if let Some(path) = non_empty("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(bind) = non_empty("WEATHER_BIND") {
            self.bind = bind;
        }
    }
}
