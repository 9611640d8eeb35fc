//! Address book kept only on the phone, one per signed-in identity.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::capabilities::{KeyNamespace, KvError, KvKey, LocalStore, TypedKvStore};
use crate::config::CacheConfig;
use crate::event::{required_text, ContactId, UserId, ValidationError};
use crate::identity_fingerprint;
use crate::model::{Contact, DeviceContact};

/// Outcome of the best-effort write that follows every mutation.
pub type WriteResult = Result<(), KvError>;

pub struct ContactBook {
    contacts: Vec<Contact>,
    store: TypedKvStore<Vec<Contact>>,
}

impl ContactBook {
    /// Loads `owner`'s saved list. Each identity gets its own key, so one
    /// user's contacts are never shown to, or alerted for, another. An
    /// unreadable list opens as an empty book.
    pub fn open(
        local: Arc<dyn LocalStore>,
        config: &CacheConfig,
        owner: &UserId,
    ) -> Result<Self, KvError> {
        let key = KvKey::new(
            KeyNamespace::UserData,
            format!("{}_{}", config.contacts_key, identity_fingerprint(owner)),
        )?;
        let store = TypedKvStore::new(local, key);
        let contacts = match store.load() {
            Ok(saved) => saved.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "saved contacts unreadable, starting empty");
                Vec::new()
            }
        };
        debug!(count = contacts.len(), "contact book opened");
        Ok(Self { contacts, store })
    }

    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    #[must_use]
    pub fn emergency(&self) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.is_emergency)
    }

    /// Adds a hand-typed contact. Returns the new contact's id; a failed
    /// write leaves the contact in memory and shows up in the `WriteResult`.
    pub fn add_manual(
        &mut self,
        name: &str,
        phone: &str,
    ) -> Result<(ContactId, WriteResult), ValidationError> {
        let contact = Contact {
            id: ContactId::generate(),
            name: required_text("contact name", name)?,
            phone: required_text("phone number", phone)?,
            is_emergency: false,
        };
        let id = contact.id.clone();
        self.contacts.push(contact);
        Ok((id, self.persist()))
    }

    /// Appends device contacts that have at least one phone number; the first
    /// number is used. Contacts already in the book (same device id) are
    /// skipped, so importing again never duplicates. Returns how many were
    /// added.
    pub fn import(&mut self, device: Vec<DeviceContact>) -> (usize, WriteResult) {
        let before = self.contacts.len();
        for c in device {
            let id = ContactId::new(c.id);
            if self.contacts.iter().any(|existing| existing.id == id) {
                continue;
            }
            let Some(phone) = c.phone_numbers.into_iter().find(|p| !p.trim().is_empty()) else {
                continue;
            };
            self.contacts.push(Contact {
                id,
                name: c.name.unwrap_or_default(),
                phone,
                is_emergency: false,
            });
        }
        let added = self.contacts.len() - before;
        debug!(added, "device contacts imported");
        (added, self.persist())
    }

    /// Makes `id` the one emergency contact.
    pub fn set_emergency(&mut self, id: &ContactId) -> Result<WriteResult, ValidationError> {
        if !self.contacts.iter().any(|c| &c.id == id) {
            return Err(ValidationError::UnknownContact(id.clone()));
        }
        for contact in &mut self.contacts {
            contact.is_emergency = &contact.id == id;
        }
        Ok(self.persist())
    }

    pub fn remove(&mut self, id: &ContactId) -> Result<WriteResult, ValidationError> {
        let before = self.contacts.len();
        self.contacts.retain(|c| &c.id != id);
        if self.contacts.len() == before {
            return Err(ValidationError::UnknownContact(id.clone()));
        }
        Ok(self.persist())
    }

    fn persist(&self) -> WriteResult {
        self.store.save(&self.contacts).map_err(|e| {
            warn!(error = %e, "contacts saved in memory only");
            e
        })
    }
}
