use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 6 * 1024 * 1024;
pub const MAX_PREFIX_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// Key as written to the backing store.
    #[must_use]
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    #[must_use]
    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        let invalid = |reason: &str| KvError::InvalidKey {
            key: key.chars().take(50).collect(),
            reason: reason.to_string(),
        };

        if key.trim().is_empty() {
            return Err(invalid("key cannot be empty"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(invalid("key exceeds maximum length"));
        }
        if key.contains("..") {
            return Err(invalid("key cannot contain path traversal sequences"));
        }
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(invalid("key cannot start with path separator"));
        }
        if key.chars().any(|c| c.is_control() && c != '\t') {
            return Err(invalid("key contains control characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    UserData,
    Cache,
    Settings,
    Custom(String),
}

impl KeyNamespace {
    #[must_use]
    pub fn prefix(&self) -> &str {
        match self {
            KeyNamespace::UserData => "userdata",
            KeyNamespace::Cache => "cache",
            KeyNamespace::Settings => "settings",
            KeyNamespace::Custom(s) => s.as_str(),
        }
    }

    pub fn custom(prefix: impl Into<String>) -> Result<Self, KvError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LENGTH {
            return Err(KvError::InvalidKey {
                key: prefix,
                reason: format!("custom namespace must be 1..={MAX_PREFIX_LENGTH} bytes"),
            });
        }
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(KvError::InvalidKey {
                key: prefix,
                reason: "custom namespace contains invalid characters".to_string(),
            });
        }
        Ok(KeyNamespace::Custom(prefix))
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?}, retryable: {retryable})")]
    Storage {
        code: StorageErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

impl KvError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            KvError::Storage { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Unavailable,
    Corrupted,
    DiskFull,
    Busy,
    Locked,
    IoError,
}

impl StorageErrorCode {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageErrorCode::Unavailable | StorageErrorCode::Busy | StorageErrorCode::Locked
        )
    }
}

/// The phone's persistent string key-value store.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError>;
    fn set(&self, key: &KvKey, value: &str) -> Result<(), KvError>;
    fn remove(&self, key: &KvKey) -> Result<(), KvError>;
}

impl<S: LocalStore + ?Sized> LocalStore for Arc<S> {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        (**self).get(key)
    }

    fn set(&self, key: &KvKey, value: &str) -> Result<(), KvError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &KvKey) -> Result<(), KvError> {
        (**self).remove(key)
    }
}

/// Process-local store. Used on platforms without SQLite and when no
/// database path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&key.raw()).cloned())
    }

    fn set(&self, key: &KvKey, value: &str) -> Result<(), KvError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.raw(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &KvKey) -> Result<(), KvError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key.raw());
        Ok(())
    }
}

/// JSON-encoded value of type `T` stored under one key.
pub struct TypedKvStore<T> {
    store: Arc<dyn LocalStore>,
    key: KvKey,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvStore<T> {
    pub fn new(store: Arc<dyn LocalStore>, key: KvKey) -> Self {
        Self {
            store,
            key,
            _phantom: PhantomData,
        }
    }

    #[must_use]
    pub fn key(&self) -> &KvKey {
        &self.key
    }

    pub fn load(&self) -> Result<Option<T>, KvError> {
        match self.store.get(&self.key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| KvError::Serialization {
                    message: e.to_string(),
                    key: Some(self.key.raw()),
                }),
            None => Ok(None),
        }
    }

    pub fn save(&self, value: &T) -> Result<(), KvError> {
        let raw = serde_json::to_string(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(self.key.raw()),
        })?;
        self.store.set(&self.key, &raw)
    }

    pub fn clear(&self) -> Result<(), KvError> {
        self.store.remove(&self.key)
    }
}
