use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::event::UserId;
use crate::model::{Profile, ProfileUpdate};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Unavailable(String),

    #[error("permission denied for this profile")]
    PermissionDenied,

    #[error("profile document not found")]
    NotFound,

    #[error("malformed profile document: {0}")]
    Malformed(String),
}

impl RemoteError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// What a live subscription reports. `Ok(None)` means the document does not
/// exist (yet).
pub type Snapshot = Result<Option<Profile>, RemoteError>;

/// Callback handed to [`RemoteProfiles::subscribe`]. Cheap to clone; the
/// remote side may keep it for as long as the subscription lives and call
/// [`SnapshotSink::deliver`] from any thread.
#[derive(Clone)]
pub struct SnapshotSink {
    deliver: Arc<dyn Fn(Snapshot) + Send + Sync>,
}

impl SnapshotSink {
    pub fn new(deliver: impl Fn(Snapshot) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn deliver(&self, snapshot: Snapshot) {
        (self.deliver)(snapshot);
    }
}

impl fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SnapshotSink")
    }
}

/// Handle to an open live-update channel.
pub trait Subscription: Send {
    /// Stops delivery. Must be idempotent.
    fn unsubscribe(&mut self);
}

/// The hosted document database, keyed by identity.
#[async_trait::async_trait]
pub trait RemoteProfiles: Send + Sync {
    /// Opens a live subscription to `user`'s profile document. Every snapshot
    /// goes to `sink` until the returned handle is unsubscribed.
    fn subscribe(
        &self,
        user: &UserId,
        sink: SnapshotSink,
    ) -> Result<Box<dyn Subscription>, RemoteError>;

    /// Point read of the current document.
    async fn fetch(&self, user: &UserId) -> Result<Option<Profile>, RemoteError>;

    /// Field-merge update: only fields present in `update` are written.
    async fn merge_fields(&self, user: &UserId, update: &ProfileUpdate)
        -> Result<(), RemoteError>;
}
