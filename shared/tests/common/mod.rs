//! Shell-side doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use kalinga_shared::capabilities::{RemoteError, RemoteProfiles, SnapshotSink, Subscription};
use kalinga_shared::{Effect, EmergencyContact, Profile, ProfileUpdate, UserId};

#[derive(Default)]
struct Documents {
    profiles: HashMap<UserId, Profile>,
    listeners: Vec<(u64, UserId, SnapshotSink)>,
    next_listener: u64,
}

/// A document store that behaves like a live-query backend: every write is
/// echoed to the document's open listeners.
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    docs: Arc<Mutex<Documents>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRemote {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn document(&self, user: &UserId) -> Option<Profile> {
        self.docs.lock().unwrap().profiles.get(user).cloned()
    }

    pub fn listeners(&self) -> usize {
        self.docs.lock().unwrap().listeners.len()
    }

    /// Writes from another device.
    pub fn put(&self, user: &UserId, profile: Profile) {
        let sinks = {
            let mut docs = self.docs.lock().unwrap();
            docs.profiles.insert(user.clone(), profile);
            Self::sinks_for(&docs, user)
        };
        let snapshot = self.document(user);
        for sink in sinks {
            sink.deliver(Ok(snapshot.clone()));
        }
    }

    fn sinks_for(docs: &Documents, user: &UserId) -> Vec<SnapshotSink> {
        docs.listeners
            .iter()
            .filter(|(_, u, _)| u == user)
            .map(|(_, _, sink)| sink.clone())
            .collect()
    }
}

struct Listener {
    id: u64,
    docs: Arc<Mutex<Documents>>,
}

impl Subscription for Listener {
    fn unsubscribe(&mut self) {
        self.docs
            .lock()
            .unwrap()
            .listeners
            .retain(|(id, _, _)| *id != self.id);
    }
}

#[async_trait]
impl RemoteProfiles for InMemoryRemote {
    fn subscribe(
        &self,
        user: &UserId,
        sink: SnapshotSink,
    ) -> Result<Box<dyn Subscription>, RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("offline".into()));
        }
        let (id, current) = {
            let mut docs = self.docs.lock().unwrap();
            let id = docs.next_listener;
            docs.next_listener += 1;
            docs.listeners.push((id, user.clone(), sink.clone()));
            (id, docs.profiles.get(user).cloned())
        };
        sink.deliver(Ok(current));
        Ok(Box::new(Listener {
            id,
            docs: Arc::clone(&self.docs),
        }))
    }

    async fn fetch(&self, user: &UserId) -> Result<Option<Profile>, RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("offline".into()));
        }
        Ok(self.document(user))
    }

    async fn merge_fields(&self, user: &UserId, update: &ProfileUpdate) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("offline".into()));
        }
        let merged = self.document(user).unwrap_or_default().merged(update);
        self.put(user, merged);
        Ok(())
    }
}

pub fn complete_profile(name: &str) -> Profile {
    Profile {
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        emergency_contact: Some(EmergencyContact::new("Ana", "555-0100").unwrap()),
        reminders: None,
    }
}

pub fn pushed_updates(effects: &[Effect]) -> Vec<ProfileUpdate> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::PushProfile { update } => Some(update.clone()),
            _ => None,
        })
        .collect()
}
