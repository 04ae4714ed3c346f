//! Persisted runtime settings and user dashboard configuration.
//!
//! Both documents are small JSON files. Reading never fails: a missing file
//! yields the defaults (or an empty object), a malformed one is logged and
//! ignored. Writes report their failure to the caller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::FlightLoggerError;
use crate::state::RuntimeState;

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 60;

/// Free-form dashboard preferences
pub type UserConfig = Map<String, Value>;

/// Operational settings as stored in the settings document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeSettings {
    /// Poll interval in seconds
    pub interval: u64,
    /// Days of history kept, 0 keeps everything
    pub retention_days: u32,
    pub paused: bool,
}

/// Settings document as read from disk; absent or unusable keys keep their
/// defaults
#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    interval: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    retention_days: Option<i64>,
    paused: Option<bool>,
}

/// Requested settings change
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub interval: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub retention_days: Option<i64>,
}

impl SettingsUpdate {
    /// Apply the in-range values to `state`. Out-of-range values are ignored
    /// and the current value is kept.
    pub fn apply(&self, state: &RuntimeState) {
        if let Some(interval) = self.interval {
            match u64::try_from(interval) {
                Ok(secs) if (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) => {
                    state.set_interval(secs);
                    info!("Interval updated to {}s", secs);
                }
                _ => warn!(
                    "Ignoring interval {}s, must be between {} and {}",
                    interval, MIN_INTERVAL_SECS, MAX_INTERVAL_SECS
                ),
            }
        }

        if let Some(days) = self.retention_days {
            match u32::try_from(days) {
                Ok(days) => {
                    state.set_retention_days(days);
                    info!("Retention updated to {} days", days);
                }
                Err(_) => warn!("Ignoring retention of {} days", days),
            }
        }
    }
}

/// Accept integers, integral floats and numeric strings
fn deserialize_lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid integer: {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid integer: {:?}", s))),
        Some(other) => Err(D::Error::custom(format!("invalid integer: {}", other))),
    }
}

/// Reads and writes the two persisted documents
pub struct SettingsStore {
    settings_path: PathBuf,
    user_config_path: PathBuf,
    settings_lock: Mutex<()>,
    user_config_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(settings_path: impl Into<PathBuf>, user_config_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
            user_config_path: user_config_path.into(),
            settings_lock: Mutex::new(()),
            user_config_lock: Mutex::new(()),
        }
    }

    /// Load the settings document on top of `defaults`
    pub async fn load_settings(&self, defaults: RuntimeSettings) -> RuntimeSettings {
        let document: SettingsDocument = match read_json(&self.settings_path).await {
            Ok(Some(document)) => document,
            Ok(None) => return defaults,
            Err(e) => {
                warn!("Could not load config: {}", e);
                return defaults;
            }
        };

        let settings = RuntimeSettings {
            interval: document
                .interval
                .and_then(|secs| u64::try_from(secs).ok())
                .unwrap_or(defaults.interval)
                .clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS),
            retention_days: document
                .retention_days
                .and_then(|days| u32::try_from(days).ok())
                .unwrap_or(defaults.retention_days),
            paused: document.paused.unwrap_or(false),
        };
        info!(
            "Loaded config: interval={}s, retention={}d, paused={}",
            settings.interval, settings.retention_days, settings.paused
        );
        settings
    }

    /// Persist the current runtime settings
    pub async fn save_settings(&self, state: &RuntimeState) -> Result<(), FlightLoggerError> {
        let _guard = self.settings_lock.lock().await;
        let contents = serde_json::to_vec(&state.settings())?;
        write_atomically(&self.settings_path, &contents)
            .await
            .inspect_err(|e| warn!("Could not save config: {}", e))
    }

    pub async fn load_user_config(&self) -> UserConfig {
        match read_json::<Value>(&self.user_config_path).await {
            Ok(Some(Value::Object(config))) => config,
            Ok(Some(_)) => {
                warn!("Could not load user config: document is not an object");
                UserConfig::new()
            }
            Ok(None) => UserConfig::new(),
            Err(e) => {
                warn!("Could not load user config: {}", e);
                UserConfig::new()
            }
        }
    }

    /// Merge `patch` into the stored user config and return the result
    pub async fn save_user_config(&self, patch: UserConfig) -> Result<UserConfig, FlightLoggerError> {
        let _guard = self.user_config_lock.lock().await;
        let mut config = self.load_user_config().await;
        config.extend(patch);

        let contents = serde_json::to_vec_pretty(&config)?;
        write_atomically(&self.user_config_path, &contents)
            .await
            .inspect_err(|e| warn!("Could not save user config: {}", e))?;
        Ok(config)
    }
}

/// `Ok(None)` when the file does not exist
async fn read_json<T>(path: &Path) -> Result<Option<T>, FlightLoggerError>
where
    T: for<'de> Deserialize<'de>,
{
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), FlightLoggerError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
