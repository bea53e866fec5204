//! Client configuration, from a TOML file or the environment.
//!
//! ```toml
//! database_url = "https://relief-default-rtdb.firebaseio.com"
//! poll_interval_ms = 5000
//! notifications = true
//!
//! [location]
//! lat = 40.7128
//! lng = -74.0060
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use relief_map_feed::rtdb::{DEFAULT_POLL_INTERVAL, RtdbConfig};
use relief_map_report_models::LatLng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote database URL. Without it the client runs against an in-memory
/// store.
pub const ENV_DATABASE_URL: &str = "RELIEF_MAP_DATABASE_URL";
/// Database auth token.
pub const ENV_AUTH_TOKEN: &str = "RELIEF_MAP_AUTH_TOKEN";
/// Snapshot poll interval in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "RELIEF_MAP_POLL_INTERVAL_MS";
/// Fixed device latitude.
pub const ENV_LAT: &str = "RELIEF_MAP_LAT";
/// Fixed device longitude.
pub const ENV_LNG: &str = "RELIEF_MAP_LNG";
/// `true`/`false`: whether notification permission is granted.
pub const ENV_NOTIFICATIONS: &str = "RELIEF_MAP_NOTIFICATIONS";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable has an unusable value.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// Only one of latitude and longitude was given.
    #[error("Both {ENV_LAT} and {ENV_LNG} must be set")]
    PartialLocation,
}

fn default_poll_interval_ms() -> u64 {
    u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(u64::MAX)
}

const fn default_notifications() -> bool {
    true
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Remote database URL; `None` selects the in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Database auth token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Snapshot poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fixed device position; `None` means no positioning.
    #[serde(default)]
    pub location: Option<LatLng>,
    /// Whether notification permission is granted.
    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            auth_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            location: None,
            notifications: default_notifications(),
        }
    }
}

impl AppConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document is malformed or has
    /// unknown keys.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(toml_str)?)
    }

    /// Reads a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reads settings from `RELIEF_MAP_*` environment variables, using
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Overrides settings with any `RELIEF_MAP_*` variables that are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable cannot be parsed.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::default().apply_vars(var)
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = var(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
        if let Some(token) = var(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(value) = var(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_var(ENV_POLL_INTERVAL_MS, &value)?;
        }
        match (var(ENV_LAT), var(ENV_LNG)) {
            (Some(lat), Some(lng)) => {
                self.location = Some(LatLng::new(
                    parse_var(ENV_LAT, &lat)?,
                    parse_var(ENV_LNG, &lng)?,
                ));
            }
            (None, None) => {}
            _ => return Err(ConfigError::PartialLocation),
        }
        if let Some(value) = var(ENV_NOTIFICATIONS) {
            self.notifications = parse_var(ENV_NOTIFICATIONS, &value)?;
        }

        Ok(self)
    }

    /// Snapshot poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Settings for the realtime-database feed, if a URL is configured.
    #[must_use]
    pub fn rtdb(&self) -> Option<RtdbConfig> {
        self.database_url.as_ref().map(|url| RtdbConfig {
            database_url: url.clone(),
            auth_token: self.auth_token.clone(),
            poll_interval: self.poll_interval(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}
