//! Application configuration

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::FlightLoggerError;
use crate::settings::{MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};

/// Flat environment names understood for compatibility with existing
/// deployments, mapped to their configuration keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("ULTRAFEEDER_HOST", "feed.host"),
    ("ULTRAFEEDER_PORT", "feed.port"),
    ("LOG_INTERVAL", "settings.interval"),
    ("LOG_RETENTION_DAYS", "settings.retention_days"),
    ("DB_PATH", "database.path"),
    ("CONFIG_PATH", "settings.path"),
    ("USER_CONFIG_PATH", "settings.user_config_path"),
];

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub settings: SettingsConfig,
    pub server: ServerConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub host: String,
    pub port: u16,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Locations of the persisted documents and the defaults used when the
/// settings document does not exist yet.
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    pub path: PathBuf,
    pub user_config_path: PathBuf,
    pub interval: u64,
    pub retention_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("feed.host", "ultrafeeder")?
            .set_default("feed.port", 8080)?
            .set_default("feed.timeout", 5)?
            .set_default("database.path", "/data/flights.db")?
            .set_default("settings.path", "/data/config.json")?
            .set_default("settings.user_config_path", "/data/user-config.json")?
            .set_default("settings.interval", 10)?
            .set_default("settings.retention_days", 14)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("FLIGHTLOGGER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (name, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, env::var(name).ok())?;
        }

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.settings.clamp_interval();
        Ok(config)
    }
}

impl FeedConfig {
    /// URL of the decoded aircraft list
    pub fn url(&self) -> String {
        format!("http://{}:{}/data/aircraft.json", self.host, self.port)
    }
}

impl SettingsConfig {
    fn clamp_interval(&mut self) {
        let clamped = self.interval.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
        if clamped != self.interval {
            warn!(
                "Configured interval {}s outside {}-{}s, using {}s",
                self.interval, MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, clamped
            );
            self.interval = clamped;
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), FlightLoggerError> {
        self.validate_path()?;
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ensure_directory_exists(dir)?;
        }
        Ok(())
    }

    fn validate_path(&self) -> Result<(), FlightLoggerError> {
        if self.path.as_os_str().is_empty() {
            return Err(FlightLoggerError::ConfigurationError {
                message: "Database path cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), FlightLoggerError> {
        if !dir.exists() {
            warn!("Database directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| FlightLoggerError::ConfigurationError {
                message: format!("Could not create database directory: {}", e),
            })?;
        }
        Ok(())
    }
}
