use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::capabilities::{KeyNamespace, KvKey};
use crate::{
    DEFAULT_CONTACTS_KEY, DEFAULT_HOLD_DURATION_MS, DEFAULT_PROFILE_KEY,
    DEFAULT_TICK_INTERVAL_MS,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("malformed configuration: {0}")]
    Parse(String),
}

/// Timing of the press-and-hold confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub hold_duration_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            hold_duration_ms: DEFAULT_HOLD_DURATION_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl TriggerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_duration_ms == 0 {
            return Err(ConfigError::Validation("hold_duration_ms must be > 0".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Validation("tick_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// Keys used in the phone's local key-value store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub profile_key: String,
    pub contacts_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            profile_key: DEFAULT_PROFILE_KEY.to_string(),
            contacts_key: DEFAULT_CONTACTS_KEY.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in [&self.profile_key, &self.contacts_key] {
            KvKey::new(KeyNamespace::UserData, key.as_str())
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        if self.profile_key == self.contacts_key {
            return Err(ConfigError::Validation(
                "profile_key and contacts_key must differ".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub trigger: TriggerConfig,
    pub cache: CacheConfig,
    /// File for the SQLite-backed local store; `None` keeps data in memory.
    pub database_path: Option<PathBuf>,
}

impl CompanionConfig {
    /// Parses the JSON the shell ships with the app bundle. Missing fields take
    /// their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trigger.validate()?;
        self.cache.validate()
    }
}
