// Configuration module for episode-refresher
// Settings come from the environment (and .env), an optional TOML file, then defaults

use chrono_tz::Tz;
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_NAME: &str = "episode-refresher";
const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_DAYS: u32 = 7;
/// Every 2 hours, at second 0 (sec min hour day-of-month month day-of-week)
pub const DEFAULT_CRON: &str = "0 0 */2 * * *";
/// IANA zone the cron schedule is evaluated in
pub const DEFAULT_TIMEZONE: &str = "Europe/Helsinki";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("SERVER_URL is not set (set it in the environment or [server] url in config.toml)")]
    MissingServerUrl,

    #[error("SERVER_URL '{url}' is invalid: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("API_KEY is not set (set it in the environment or [server] api_key in config.toml)")]
    MissingApiKey,

    #[error("CRON '{expr}' must have six fields: sec min hour day-of-month month day-of-week")]
    InvalidCron { expr: String },

    #[error("TZ '{name}' is not a known IANA time zone")]
    InvalidTimezone { name: String },
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Jellyfin server connection
    pub server: ServerConfig,

    /// Scan schedule and lookback
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the Jellyfin server, e.g. http://jellyfin:8096
    pub url: Option<String>,

    /// API key created under Dashboard > API Keys
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Only episodes premiered within this many days are scanned (default: 7)
    pub days: u32,

    /// Six-field cron expression for the scan schedule (default: every 2 hours)
    pub cron: String,

    /// Run a scan right after startup instead of waiting for the first tick
    pub run_on_startup: bool,

    /// Time zone for the cron schedule (default: Europe/Helsinki)
    pub timezone: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            cron: DEFAULT_CRON.to_string(),
            run_on_startup: false,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub days: u32,
    pub cron: String,
    pub run_on_startup: bool,
    pub timezone: String,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        Self::build(config_file, |key| std::env::var(key).ok())
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("EPISODE_REFRESHER_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using environment and defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with overrides from `env`
    fn build(config_file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| blank_to_none(env(key));

        let server_url = non_empty("SERVER_URL").or(blank_to_none(config_file.server.url));
        let api_key = non_empty("API_KEY").or(blank_to_none(config_file.server.api_key));

        // DAYS: env > config > default; unusable values fall back to the default
        let days = match non_empty("DAYS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(d) if d > 0 => d,
                _ => {
                    tracing::warn!("Ignoring invalid DAYS '{}', using {}", raw, DEFAULT_DAYS);
                    DEFAULT_DAYS
                }
            },
            None if config_file.refresh.days > 0 => config_file.refresh.days,
            None => DEFAULT_DAYS,
        };

        let cron = non_empty("CRON")
            .map(|c| c.trim().to_string())
            .unwrap_or(config_file.refresh.cron);

        let run_on_startup = match non_empty("RUN_ON_STARTUP") {
            Some(v) => v.trim().eq_ignore_ascii_case("true") || v.trim() == "1",
            None => config_file.refresh.run_on_startup,
        };

        let timezone = non_empty("TZ")
            .or(blank_to_none(Some(config_file.refresh.timezone)))
            .map(|tz| tz.trim().to_string())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        Self {
            server_url,
            api_key,
            days,
            cron,
            run_on_startup,
            timezone,
        }
    }

    /// Check that everything needed to talk to the server is present.
    /// Returns the normalized server URL.
    pub fn validate(&self) -> Result<String, ConfigError> {
        let raw = self
            .server_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingServerUrl)?;

        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidServerUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidServerUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ConfigError::MissingApiKey);
        }

        if self.cron.split_whitespace().count() != 6 {
            return Err(ConfigError::InvalidCron {
                expr: self.cron.clone(),
            });
        }

        self.timezone()?;

        Ok(raw.trim_end_matches('/').to_string())
    }

    /// The configured schedule time zone
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone {
                name: self.timezone.clone(),
            })
    }

    /// Log configuration status
    pub fn log_config(&self) {
        if let Some(ref url) = self.server_url {
            tracing::info!("Jellyfin server: {}", url);
        }
        tracing::info!("Lookback window: {} days", self.days);
        tracing::debug!("Schedule: {} ({})", self.cron, self.timezone);

        if self.run_on_startup {
            tracing::info!("Startup scan: ENABLED");
        } else {
            tracing::debug!("Startup scan: disabled");
        }
    }
}
