mod kv;
mod remote;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite;

pub use self::kv::{
    KeyNamespace, KvError, KvKey, LocalStore, MemoryStore, StorageErrorCode, TypedKvStore,
    MAX_KEY_LENGTH, MAX_VALUE_SIZE,
};
pub use self::remote::{RemoteError, RemoteProfiles, Snapshot, SnapshotSink, Subscription};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteStore;

use std::sync::Arc;
use tracing::info;

use crate::config::CompanionConfig;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Storage error: {0}")]
    Kv(#[from] KvError),
}

impl From<&KvError> for crate::AppError {
    fn from(e: &KvError) -> Self {
        let kind = match e {
            KvError::Serialization { .. } => crate::ErrorKind::Serialization,
            _ => crate::ErrorKind::Storage,
        };
        Self::new(kind, "Could not save on this phone").with_internal(e.to_string())
    }
}

impl From<&RemoteError> for crate::AppError {
    fn from(e: &RemoteError) -> Self {
        let kind = match e {
            RemoteError::Unavailable(_) => crate::ErrorKind::Network,
            RemoteError::PermissionDenied => crate::ErrorKind::Authentication,
            RemoteError::NotFound => crate::ErrorKind::NotFound,
            RemoteError::Malformed(_) => crate::ErrorKind::Serialization,
        };
        Self::new(kind, "Could not reach the server").with_internal(e.to_string())
    }
}

/// Picks the local store for `config`: SQLite when a database path is set and
/// the platform has it, memory otherwise.
pub fn open_local_store(config: &CompanionConfig) -> Result<Arc<dyn LocalStore>, CapabilityError> {
    #[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
    if let Some(path) = &config.database_path {
        info!("opening sqlite local store");
        return Ok(Arc::new(SqliteStore::open(path)?));
    }

    info!(
        requested_path = config.database_path.is_some(),
        "using in-memory local store"
    );
    Ok(Arc::new(MemoryStore::new()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_without_database_path() {
        let store = open_local_store(&CompanionConfig::default()).unwrap();
        let key = KvKey::new(KeyNamespace::UserData, "probe").unwrap();
        store.set(&key, "1").unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("1"));
    }

    #[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
    #[test]
    fn sqlite_store_with_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompanionConfig {
            database_path: Some(dir.path().join("local.db")),
            ..CompanionConfig::default()
        };
        let store = open_local_store(&config).unwrap();
        let key = KvKey::new(KeyNamespace::UserData, "probe").unwrap();
        store.set(&key, "1").unwrap();
        assert!(dir.path().join("local.db").exists());
    }

    #[test]
    fn remote_errors_map_to_app_error_kinds() {
        let err = crate::AppError::from(&RemoteError::Unavailable("dns".into()));
        assert_eq!(err.kind, crate::ErrorKind::Network);
        let err = crate::AppError::from(&KvError::storage(StorageErrorCode::DiskFull, "full"));
        assert_eq!(err.kind, crate::ErrorKind::Storage);
    }
}
