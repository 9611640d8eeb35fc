//! Local-first mirror of the signed-in user's profile document.
//!
//! Reads are served from memory and never block. On sign-in the persisted copy
//! is exposed immediately (stale, `loading = true`) while one live remote
//! subscription reconciles it. Local saves merge optimistically; the next
//! remote snapshot always wins.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{
    KeyNamespace, KvError, KvKey, LocalStore, RemoteError, RemoteProfiles, Snapshot,
    SnapshotSink, Subscription, TypedKvStore,
};
use crate::config::CacheConfig;
use crate::event::UserId;
use crate::identity_fingerprint;
use crate::model::{Profile, ProfileUpdate};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no user is signed in")]
    NotSignedIn,

    #[error("invalid cache key: {0}")]
    InvalidKey(#[source] KvError),

    #[error("remote update failed: {0}")]
    Remote(#[from] RemoteError),
}

impl From<&CacheError> for crate::AppError {
    fn from(e: &CacheError) -> Self {
        match e {
            CacheError::NotSignedIn => {
                Self::new(crate::ErrorKind::Authentication, "No authenticated user found.")
            }
            CacheError::InvalidKey(kv) => Self::from(kv),
            CacheError::Remote(remote) => Self::from(remote),
        }
    }
}

/// Whether a save reached the phone's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Durability {
    Persisted,
    /// Write failed; the merged value lives in memory for this session only.
    MemoryOnly(KvError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub profile: Profile,
    pub durability: Durability,
}

/// What screens render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub user: Option<UserId>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

/// Persisted form: the profile tagged with its owner so one user's copy is
/// never shown to another.
#[derive(Serialize, Deserialize)]
struct CachedProfile {
    owner: String,
    profile: Profile,
}

struct CacheState {
    user: Option<UserId>,
    cached: Option<Profile>,
    loading: bool,
    /// Bumped on every identity change; snapshots carry the generation of the
    /// subscription that produced them.
    generation: u64,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

struct ActiveSubscription {
    generation: u64,
    handle: Box<dyn Subscription>,
}

pub struct ProfileCache<R: RemoteProfiles> {
    state: Arc<Mutex<CacheState>>,
    persisted: Arc<TypedKvStore<CachedProfile>>,
    remote: R,
    subscription: Option<ActiveSubscription>,
}

impl<R: RemoteProfiles> ProfileCache<R> {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: R,
        config: &CacheConfig,
    ) -> Result<Self, CacheError> {
        let key = KvKey::new(KeyNamespace::UserData, config.profile_key.as_str())
            .map_err(CacheError::InvalidKey)?;
        Ok(Self {
            state: Arc::new(Mutex::new(CacheState {
                user: None,
                cached: None,
                // Nothing is known until the identity provider reports in.
                loading: true,
                generation: 0,
            })),
            persisted: Arc::new(TypedKvStore::new(local, key)),
            remote,
            subscription: None,
        })
    }

    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    #[must_use]
    pub fn read(&self) -> CacheSnapshot {
        let state = lock(&self.state);
        CacheSnapshot {
            user: state.user.clone(),
            profile: state.cached.clone(),
            loading: state.loading,
        }
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        lock(&self.state).user.clone()
    }

    #[must_use]
    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    /// Reacts to the identity provider. The previous subscription, if any, is
    /// closed before anything else happens.
    #[instrument(skip_all, fields(user = user.as_ref().map(identity_fingerprint)))]
    pub fn on_identity_change(&mut self, user: Option<UserId>) {
        {
            let state = lock(&self.state);
            if user.is_some() && state.user == user && self.subscription.is_some() {
                debug!("identity unchanged, keeping subscription");
                return;
            }
        }

        self.teardown_subscription();

        let Some(user) = user else {
            self.clear();
            return;
        };

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.user = Some(user.clone());
            state.cached = self.load_persisted(&user);
            state.loading = true;
            state.generation
        };

        let sink = self.sink(generation);
        match self.remote.subscribe(&user, sink) {
            Ok(handle) => {
                info!(generation, "profile subscription opened");
                self.subscription = Some(ActiveSubscription { generation, handle });
            }
            Err(e) => {
                // Offline start: the persisted copy is all we have.
                warn!(error = %e, "profile subscription failed, serving cached copy");
                lock(&self.state).loading = false;
            }
        }
    }

    pub fn sign_out(&mut self) {
        self.on_identity_change(None);
    }

    /// Optimistic local write: shallow-merges `update` over the cached copy
    /// and persists the result. The remote document is not touched; see
    /// [`ProfileCache::push_remote`].
    #[instrument(skip_all)]
    pub fn save(&self, update: &ProfileUpdate) -> Result<SaveReport, CacheError> {
        let mut state = lock(&self.state);
        let Some(user) = state.user.clone() else {
            return Err(CacheError::NotSignedIn);
        };

        let merged = state.cached.take().unwrap_or_default().merged(update);
        state.cached = Some(merged.clone());

        let durability = match self.persist(&user, &merged) {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                warn!(error = %e, "profile saved in memory only");
                Durability::MemoryOnly(e)
            }
        };
        Ok(SaveReport {
            profile: merged,
            durability,
        })
    }

    /// Sends `update` to the remote document as a field merge. The cache is
    /// reconciled by the subscription, not by this call.
    pub async fn push_remote(&self, update: &ProfileUpdate) -> Result<(), CacheError> {
        let user = self.current_user().ok_or(CacheError::NotSignedIn)?;
        self.remote.merge_fields(&user, update).await?;
        Ok(())
    }

    fn sink(&self, generation: u64) -> SnapshotSink {
        let state = Arc::downgrade(&self.state);
        let persisted = Arc::clone(&self.persisted);
        SnapshotSink::new(move |snapshot| {
            let Some(state) = state.upgrade() else {
                return;
            };
            apply_snapshot(&state, &persisted, generation, snapshot);
        })
    }

    fn load_persisted(&self, user: &UserId) -> Option<Profile> {
        match self.persisted.load() {
            Ok(Some(entry)) if entry.owner == identity_fingerprint(user) => Some(entry.profile),
            Ok(Some(_)) => {
                debug!("persisted profile belongs to another user, discarding");
                if let Err(e) = self.persisted.clear() {
                    warn!(error = %e, "failed to discard foreign profile");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "persisted profile unreadable, treating as miss");
                None
            }
        }
    }

    fn persist(&self, user: &UserId, profile: &Profile) -> Result<(), KvError> {
        persist(&self.persisted, user, profile)
    }

    fn clear(&mut self) {
        {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.user = None;
            state.cached = None;
            state.loading = false;
        }
        if let Err(e) = self.persisted.clear() {
            warn!(error = %e, "failed to remove persisted profile");
        }
        info!("profile cache cleared");
    }

    fn teardown_subscription(&mut self) {
        if let Some(mut active) = self.subscription.take() {
            active.handle.unsubscribe();
            debug!(generation = active.generation, "profile subscription closed");
        }
    }
}

impl<R: RemoteProfiles> Drop for ProfileCache<R> {
    fn drop(&mut self) {
        self.teardown_subscription();
    }
}

fn persist(
    store: &TypedKvStore<CachedProfile>,
    user: &UserId,
    profile: &Profile,
) -> Result<(), KvError> {
    store.save(&CachedProfile {
        owner: identity_fingerprint(user),
        profile: profile.clone(),
    })
}

fn apply_snapshot(
    state: &Mutex<CacheState>,
    persisted: &TypedKvStore<CachedProfile>,
    generation: u64,
    snapshot: Snapshot,
) {
    let mut state = lock(state);
    if state.generation != generation {
        debug!(generation, current = state.generation, "stale snapshot dropped");
        return;
    }
    let Some(user) = state.user.clone() else {
        return;
    };

    match snapshot {
        Ok(Some(profile)) => {
            if let Err(e) = persist(persisted, &user, &profile) {
                warn!(error = %e, "failed to persist remote snapshot");
            }
            state.cached = Some(profile);
            debug!("remote snapshot applied");
        }
        Ok(None) => debug!("profile document missing, keeping cached copy"),
        Err(e) => warn!(error = %e, "profile subscription error, keeping cached copy"),
    }
    state.loading = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{FailableStore, FakeRemote};
    use crate::capabilities::MemoryStore;
    use crate::model::EmergencyContact;

    fn alice() -> UserId {
        UserId::new("uid-alice")
    }

    fn bob() -> UserId {
        UserId::new("uid-bob")
    }

    fn profile(name: &str) -> Profile {
        Profile {
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            ..Profile::default()
        }
    }

    fn cache_with(store: Arc<dyn LocalStore>) -> ProfileCache<FakeRemote> {
        ProfileCache::new(store, FakeRemote::default(), &CacheConfig::default()).unwrap()
    }

    fn cache() -> (ProfileCache<FakeRemote>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (cache_with(store.clone()), store)
    }

    #[test]
    fn starts_loading_without_profile() {
        let (cache, _) = cache();
        let snapshot = cache.read();
        assert!(snapshot.loading);
        assert_eq!(snapshot.profile, None);
    }

    #[test]
    fn snapshot_after_sign_in_is_served() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        assert!(cache.read().loading);

        cache.remote().push(&alice(), profile("Alice"));

        let snapshot = cache.read();
        assert_eq!(snapshot.profile, Some(profile("Alice")));
        assert!(!snapshot.loading);
    }

    #[test]
    fn persisted_copy_is_served_before_first_snapshot() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut first = cache_with(store.clone());
            first.on_identity_change(Some(alice()));
            first.remote().push(&alice(), profile("Alice"));
        }

        let mut restarted = cache_with(store);
        restarted.on_identity_change(Some(alice()));
        let snapshot = restarted.read();
        assert_eq!(snapshot.profile, Some(profile("Alice")));
        assert!(snapshot.loading);
    }

    #[test]
    fn save_merges_over_cached_fields() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        cache.remote().push(&alice(), profile("Alice"));

        let contact = EmergencyContact::new("Ben", "555-0101").unwrap();
        let report = cache
            .save(&ProfileUpdate::emergency_contact(contact.clone()))
            .unwrap();
        assert_eq!(report.durability, Durability::Persisted);

        let read = cache.read().profile.unwrap();
        assert_eq!(read.name, "Alice");
        assert_eq!(read.emergency_contact, Some(contact));
    }

    #[test]
    fn remote_snapshot_overrides_optimistic_save() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        cache.save(&ProfileUpdate::name("Local Name").unwrap()).unwrap();

        cache.remote().push(&alice(), profile("Remote"));

        assert_eq!(cache.read().profile.unwrap().name, "Remote");
    }

    #[test]
    fn save_without_identity_is_rejected() {
        let (cache, store) = cache();
        let err = cache.save(&ProfileUpdate::name("x").unwrap()).unwrap_err();
        assert!(matches!(err, CacheError::NotSignedIn));
        assert!(store.is_empty());
    }

    #[test]
    fn sign_out_clears_memory_and_storage() {
        let (mut cache, store) = cache();
        cache.on_identity_change(Some(alice()));
        cache.remote().push(&alice(), profile("Alice"));
        assert!(!store.is_empty());

        cache.sign_out();

        let snapshot = cache.read();
        assert_eq!(snapshot.profile, None);
        assert_eq!(snapshot.user, None);
        assert!(!snapshot.loading);
        assert!(store.is_empty());
        assert_eq!(cache.remote().active_subscriptions(), 0);
    }

    #[test]
    fn identity_switch_keeps_one_subscription_and_drops_late_snapshots() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        let alice_sink = cache.remote().sink_for(&alice());

        cache.on_identity_change(Some(bob()));
        assert_eq!(cache.remote().active_subscriptions(), 1);

        alice_sink.deliver(Ok(Some(profile("Alice"))));
        assert_eq!(cache.read().profile, None);

        cache.remote().push(&bob(), profile("Bob"));
        assert_eq!(cache.read().profile, Some(profile("Bob")));
    }

    #[test]
    fn same_identity_twice_does_not_resubscribe() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        cache.on_identity_change(Some(alice()));
        assert_eq!(cache.remote().subscribe_calls(), 1);
        assert_eq!(cache.remote().active_subscriptions(), 1);
    }

    #[test]
    fn other_users_persisted_copy_is_not_shown() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut first = cache_with(store.clone());
            first.on_identity_change(Some(alice()));
            first.remote().push(&alice(), profile("Alice"));
        }

        let mut second = cache_with(store.clone());
        second.on_identity_change(Some(bob()));
        assert_eq!(second.read().profile, None);
        assert!(store.is_empty());
    }

    #[test]
    fn subscription_error_keeps_last_known_value() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        cache.remote().push(&alice(), profile("Alice"));

        cache
            .remote()
            .sink_for(&alice())
            .deliver(Err(RemoteError::Unavailable("offline".into())));

        assert_eq!(cache.read().profile, Some(profile("Alice")));
    }

    #[test]
    fn missing_document_stops_loading_without_clearing() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        cache.save(&ProfileUpdate::name("Alice").unwrap()).unwrap();

        cache.remote().sink_for(&alice()).deliver(Ok(None));

        let snapshot = cache.read();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.profile.unwrap().name, "Alice");
    }

    #[test]
    fn failed_subscribe_serves_cache_offline() {
        let (mut cache, _) = cache();
        cache
            .remote()
            .fail_subscribe
            .store(true, std::sync::atomic::Ordering::SeqCst);
        cache.on_identity_change(Some(alice()));

        assert!(!cache.read().loading);
        assert!(!cache.has_subscription());
        assert!(cache.save(&ProfileUpdate::name("Alice").unwrap()).is_ok());
    }

    #[test]
    fn unreadable_storage_is_a_cache_miss() {
        let store = Arc::new(FailableStore::default());
        store.set_fail_reads(true);
        let mut cache = cache_with(store);

        cache.on_identity_change(Some(alice()));
        assert_eq!(cache.read().profile, None);
        assert!(cache.read().loading);
    }

    #[test]
    fn failed_write_is_reported_but_kept_in_memory() {
        let store = Arc::new(FailableStore::default());
        let mut cache = cache_with(store.clone());
        cache.on_identity_change(Some(alice()));

        store.set_fail_writes(true);
        let report = cache.save(&ProfileUpdate::name("Alice").unwrap()).unwrap();

        assert!(matches!(report.durability, Durability::MemoryOnly(_)));
        assert_eq!(cache.read().profile.unwrap().name, "Alice");
    }

    #[test]
    fn dropping_the_cache_unsubscribes() {
        let remote_active;
        {
            let (mut cache, _) = cache();
            cache.on_identity_change(Some(alice()));
            remote_active = cache.remote().active_subscriptions();
            let sink = cache.remote().sink_for(&alice());
            drop(cache);
            // Late delivery after teardown is a no-op.
            sink.deliver(Ok(Some(profile("Alice"))));
        }
        assert_eq!(remote_active, 1);
    }

    #[tokio::test]
    async fn push_remote_forwards_field_merge() {
        let (mut cache, _) = cache();
        cache.on_identity_change(Some(alice()));
        let update = ProfileUpdate::name("Alice").unwrap();

        cache.push_remote(&update).await.unwrap();

        let merged = cache.remote().merged.lock().unwrap().clone();
        assert_eq!(merged, vec![(alice(), update)]);
    }
}
