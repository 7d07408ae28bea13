//! TOML-based application configuration.
//!
//! Stored at `~/.config/lunara/config.toml`. Holds the transport token and
//! scheduler tuning knobs; per-user notification preferences live in the
//! database, not here.

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the firing loop checks for due jobs.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// How late a job may fire and still be executed (coalesced).
    /// Beyond this a missed fire is dropped, not retried.
    #[serde(default = "default_misfire_grace_secs")]
    pub misfire_grace_secs: u64,
    /// Retry cap shared by the rate-limit and network retry paths.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            misfire_grace_secs: default_misfire_grace_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/lunara/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram bot token; absent means delivery is disabled.
    #[serde(default)]
    pub telegram_token: Option<String>,
    /// Fallback timezone for users without a stored one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_misfire_grace_secs() -> u64 {
    90
}
fn default_max_retries() -> u32 {
    3
}
fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

impl Config {
    /// Load the configuration, creating a default file if absent.
    pub fn load() -> Result<Self, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: "~/.config/lunara".into(),
            message: e.to_string(),
        })?;
        let path = dir.join("config.toml");

        if !path.exists() {
            let config = Config {
                default_timezone: default_timezone(),
                ..Default::default()
            };
            config.save()?;
            return Ok(config);
        }

        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Save the configuration to `~/.config/lunara/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::SaveFailed {
            path: "~/.config/lunara".into(),
            message: e.to_string(),
        })?;
        let path = dir.join("config.toml");
        let text =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.telegram_token, None);
        assert_eq!(config.default_timezone, "Europe/Moscow");
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.scheduler.misfire_grace_secs, 90);
        assert_eq!(config.scheduler.max_retries, 3);
    }

    #[test]
    fn partial_config_parses() {
        let config: Config = toml::from_str(
            "telegram_token = \"123:abc\"\n[scheduler]\nmax_retries = 5\n",
        )
        .unwrap();
        assert_eq!(config.telegram_token.as_deref(), Some("123:abc"));
        assert_eq!(config.scheduler.max_retries, 5);
        assert_eq!(config.scheduler.poll_interval_secs, 30);
    }
}
