//! The core the shells drive: events in, effects and a view model out.
//!
//! `update` never blocks and never awaits. Anything slow (the SOS timer,
//! remote writes, notifying the emergency contact) leaves as an [`Effect`]
//! the shell performs, reporting back with another [`Event`] when it matters.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capabilities::{LocalStore, RemoteProfiles};
use crate::config::{CacheConfig, CompanionConfig};
use crate::contacts::{ContactBook, WriteResult};
use crate::event::{ContactId, Event, UserId, ValidationError};
use crate::model::{
    Contact, EmergencyContact, HealthRecord, MedicineReminder, Profile, ProfileUpdate,
};
use crate::onboarding::{Onboarding, OnboardingStep};
use crate::profile_cache::{Durability, ProfileCache};
use crate::records::{HealthLog, MedicineSchedule};
use crate::trigger::{HeldConfirmationTrigger, PressOutcome, ReleaseOutcome, TickOutcome};
use crate::{AppError, AppResult, ErrorKind, UnixTimeMs, UserFacingError, FALLBACK_DISPLAY_NAME};

const SOS_SENT_TOAST: &str = "Your emergency contact is being notified.";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Effect {
    Render,
    /// Call back with [`Event::SosTick`] every `interval_ms` until stopped.
    StartTicker {
        interval_ms: u64,
    },
    StopTicker,
    NotifyEmergencyContact {
        contact: EmergencyContact,
    },
    /// Merge `update` into the remote document; report failure with
    /// [`Event::ProfilePushFailed`].
    PushProfile {
        update: ProfileUpdate,
    },
    UploadHealthRecord(HealthRecord),
    UploadMedicineReminder(MedicineReminder),
    /// End the session with the identity provider.
    SignOut,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SosView {
    /// "Hold for Ns" while a hold is running.
    pub countdown: Option<String>,
    pub remaining_secs: Option<u64>,
    /// Play the confirmation pulse.
    pub pulse: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub step: OnboardingStep,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub greeting_name: String,
    pub emergency_contact: Option<EmergencyContact>,
    pub sos: SosView,
    pub contacts: Vec<Contact>,
    pub health_records: Vec<HealthRecord>,
    pub upcoming_medicine: Vec<MedicineReminder>,
    pub next_medicine: Option<MedicineReminder>,
    pub error: Option<UserFacingError>,
    pub toast: Option<String>,
}

pub struct Companion<R: RemoteProfiles> {
    trigger: HeldConfirmationTrigger,
    profiles: ProfileCache<R>,
    /// The signed-in user's address book; `None` while signed out.
    contacts: Option<ContactBook>,
    local: Arc<dyn LocalStore>,
    cache_config: CacheConfig,
    onboarding: Onboarding,
    health: HealthLog,
    medicine: MedicineSchedule,
    error: Option<AppError>,
    toast: Option<String>,
    clock: fn() -> UnixTimeMs,
}

impl<R: RemoteProfiles> Companion<R> {
    pub fn new(config: &CompanionConfig, local: Arc<dyn LocalStore>, remote: R) -> AppResult<Self> {
        config.validate().map_err(|e| {
            AppError::new(ErrorKind::InvalidState, "Invalid app configuration")
                .with_internal(e.to_string())
        })?;
        let trigger = HeldConfirmationTrigger::new(config.trigger).map_err(|e| {
            AppError::new(ErrorKind::InvalidState, "Invalid SOS timing")
                .with_internal(e.to_string())
        })?;
        let profiles = ProfileCache::new(Arc::clone(&local), remote, &config.cache)
            .map_err(|e| AppError::from(&e))?;

        info!("companion core ready");
        Ok(Self {
            trigger,
            profiles,
            contacts: None,
            local,
            cache_config: config.cache.clone(),
            onboarding: Onboarding::new(),
            health: HealthLog::new(),
            medicine: MedicineSchedule::new(),
            error: None,
            toast: None,
            clock: UnixTimeMs::now,
        })
    }

    /// Replaces the wall clock used to stamp records and pick upcoming
    /// reminders.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> UnixTimeMs) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn profiles(&self) -> &ProfileCache<R> {
        &self.profiles
    }

    #[must_use]
    pub fn contacts(&self) -> Option<&ContactBook> {
        self.contacts.as_ref()
    }

    #[must_use]
    pub fn onboarding_step(&self) -> OnboardingStep {
        self.onboarding.step()
    }

    #[must_use]
    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    /// Who SOS alerts: the profile's contact, else the one pinned in the
    /// address book.
    #[must_use]
    pub fn emergency_contact(&self) -> Option<EmergencyContact> {
        self.profiles
            .read()
            .profile
            .and_then(|p| p.emergency_contact)
            .or_else(|| {
                self.contacts
                    .as_ref()?
                    .emergency()
                    .map(Contact::as_emergency_contact)
            })
    }

    pub fn update(&mut self, event: Event) -> Vec<Effect> {
        if event.is_user_initiated() {
            debug!(event = event.name(), "user action");
        }

        let mut effects = Vec::new();
        match event {
            Event::IdentityChanged {
                user,
                email_verified,
            } => self.identity_changed(user, email_verified, &mut effects),

            Event::SignOutRequested => {
                self.identity_changed(None, false, &mut effects);
                effects.push(Effect::SignOut);
            }

            Event::GetStartedTapped => self.onboarding.get_started(),

            Event::EmailVerificationChanged { verified } => {
                self.onboarding.set_email_verified(verified);
            }

            Event::ContinueAfterVerificationTapped => {
                if let Err(e) = self.onboarding.continue_after_verification() {
                    self.invalid(&e);
                }
            }

            Event::NameSubmitted { name } => match ProfileUpdate::name(&name) {
                Ok(update) => {
                    if self.save_profile(update, &mut effects) {
                        self.onboarding.name_saved();
                    }
                }
                Err(e) => self.invalid(&e),
            },

            Event::EmergencyContactSubmitted { name, number } => {
                match EmergencyContact::new(&name, &number) {
                    Ok(contact) => {
                        let update = ProfileUpdate::emergency_contact(contact);
                        if self.save_profile(update, &mut effects) {
                            self.onboarding.emergency_contact_saved();
                        }
                    }
                    Err(e) => self.invalid(&e),
                }
            }

            Event::PermissionsFinished => {
                if let Err(e) = self.onboarding.permissions_finished() {
                    self.invalid(&e);
                }
            }

            Event::ProfileSaveRequested(update) => {
                if !update.is_empty() {
                    self.save_profile(*update, &mut effects);
                }
            }

            Event::ProfilePushFailed { message } => {
                warn!(%message, "remote profile write failed, local copy kept");
                self.raise(
                    AppError::new(ErrorKind::Network, "Profile not synced").with_internal(message),
                );
            }

            Event::ProfileSnapshotDelivered => {
                if let Some(profile) = self.profiles.read().profile {
                    self.onboarding.profile_refreshed(&profile);
                }
            }

            Event::SosPressStarted => match self.trigger.press_start() {
                PressOutcome::Started { .. } => {
                    self.toast = None;
                    effects.push(Effect::StartTicker {
                        interval_ms: self.trigger.config().tick_interval_ms,
                    });
                }
                PressOutcome::Ignored => return effects,
            },

            Event::SosPressEnded => match self.trigger.press_end() {
                ReleaseOutcome::Cancelled { .. } => effects.push(Effect::StopTicker),
                ReleaseOutcome::AlreadyIdle => return effects,
            },

            Event::SosTick => match self.trigger.tick() {
                TickOutcome::Counting { .. } => {}
                TickOutcome::Confirmed => {
                    effects.push(Effect::StopTicker);
                    self.sos_confirmed(&mut effects);
                }
                TickOutcome::Ignored => {
                    // A tick raced the release; make sure the shell's timer is gone.
                    return vec![Effect::StopTicker];
                }
            },

            Event::ContactAdded { name, phone } => {
                let Some(book) = self.contacts.as_mut() else {
                    self.raise(not_signed_in());
                    return vec![Effect::Render];
                };
                match book.add_manual(&name, &phone) {
                    Ok((_, written)) => {
                        self.check_written(written);
                        self.toast = Some("Contact added.".into());
                    }
                    Err(e) => self.invalid(&e),
                }
            }

            Event::ContactsImported(device) => {
                let Some(book) = self.contacts.as_mut() else {
                    self.raise(not_signed_in());
                    return vec![Effect::Render];
                };
                let (added, written) = book.import(device);
                self.check_written(written);
                self.toast = Some(format!("Imported {added} contacts."));
            }

            Event::ContactPinnedAsEmergency { id } => self.pin_emergency(&id, &mut effects),

            Event::ContactRemoved { id } => {
                let Some(book) = self.contacts.as_mut() else {
                    self.raise(not_signed_in());
                    return vec![Effect::Render];
                };
                match book.remove(&id) {
                    Ok(written) => self.check_written(written),
                    Err(e) => self.invalid(&e),
                }
            }

            Event::HealthRecordSubmitted {
                blood_pressure,
                blood_sugar,
            } => match self
                .health
                .record(&blood_pressure, &blood_sugar, (self.clock)())
            {
                Ok(record) => {
                    effects.push(Effect::UploadHealthRecord(record));
                    self.toast = Some("Health record added.".into());
                }
                Err(e) => self.invalid(&e),
            },

            Event::MedicineReminderSubmitted {
                medicine_name,
                scheduled_at_ms,
            } => match self
                .medicine
                .add(&medicine_name, UnixTimeMs(scheduled_at_ms))
            {
                Ok(reminder) => {
                    effects.push(Effect::UploadMedicineReminder(reminder));
                    self.toast = Some("Reminder set.".into());
                }
                Err(e) => self.invalid(&e),
            },

            Event::HealthRecordsLoaded(records) => self.health.replace_all(records),

            Event::MedicineRemindersLoaded(reminders) => self.medicine.replace_all(reminders),

            Event::ErrorDismissed => self.error = None,

            Event::ToastDismissed => self.toast = None,
        }

        effects.push(Effect::Render);
        effects
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        let snapshot = self.profiles.read();
        let greeting_name = snapshot
            .profile
            .as_ref()
            .map(|p| p.name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME)
            .to_string();
        let remaining_secs = self.trigger.remaining_secs();
        let now = (self.clock)();

        ViewModel {
            step: self.onboarding.step(),
            is_authenticated: snapshot.user.is_some(),
            is_loading: snapshot.loading,
            greeting_name,
            emergency_contact: self.emergency_contact(),
            sos: SosView {
                countdown: remaining_secs.map(|s| format!("Hold for {s}s")),
                remaining_secs,
                pulse: self.trigger.acknowledged(),
            },
            contacts: self
                .contacts
                .as_ref()
                .map_or_else(Vec::new, |book| book.contacts().to_vec()),
            health_records: self.health.records().to_vec(),
            upcoming_medicine: self.medicine.upcoming(now).to_vec(),
            next_medicine: self.medicine.next_due(now).cloned(),
            error: self.error.as_ref().map(UserFacingError::from),
            toast: self.toast.clone(),
        }
    }

    fn identity_changed(
        &mut self,
        user: Option<UserId>,
        email_verified: bool,
        effects: &mut Vec<Effect>,
    ) {
        let same_user = user.is_some() && user == self.profiles.current_user();
        if same_user {
            self.onboarding.set_email_verified(email_verified);
            if !self.profiles.has_subscription() {
                // Earlier subscribe failed; the cache retries and keeps its copy.
                self.profiles.on_identity_change(user);
            }
            return;
        }

        if self.trigger.is_holding() {
            effects.push(Effect::StopTicker);
        }
        self.trigger.reset();
        self.health.replace_all(Vec::new());
        self.medicine.replace_all(Vec::new());
        self.error = None;
        self.toast = None;

        self.contacts = match &user {
            Some(owner) => self.open_contacts(owner),
            None => None,
        };
        let signed_in = user.is_some();
        self.profiles.on_identity_change(user);
        if signed_in {
            let cached: Option<Profile> = self.profiles.read().profile;
            self.onboarding.signed_in(email_verified, cached.as_ref());
        } else {
            self.onboarding.signed_out();
        }
    }

    fn sos_confirmed(&mut self, effects: &mut Vec<Effect>) {
        match self.emergency_contact() {
            Some(contact) => {
                info!(
                    confirmations = self.trigger.confirmations(),
                    "sos confirmed, notifying emergency contact"
                );
                effects.push(Effect::NotifyEmergencyContact { contact });
                self.toast = Some(SOS_SENT_TOAST.into());
            }
            None => {
                warn!("sos confirmed without an emergency contact");
                self.raise(AppError::new(
                    ErrorKind::NoEmergencyContact,
                    "SOS confirmed but no emergency contact is set",
                ));
            }
        }
    }

    fn open_contacts(&mut self, owner: &UserId) -> Option<ContactBook> {
        match ContactBook::open(Arc::clone(&self.local), &self.cache_config, owner) {
            Ok(book) => Some(book),
            Err(e) => {
                warn!(error = %e, "contact book unavailable");
                self.raise(AppError::from(&e));
                None
            }
        }
    }

    /// Pinning a contact also makes it the profile's emergency contact, so SOS
    /// and the profile agree on who is alerted.
    fn pin_emergency(&mut self, id: &ContactId, effects: &mut Vec<Effect>) {
        let Some(book) = self.contacts.as_mut() else {
            self.raise(not_signed_in());
            return;
        };
        match book.set_emergency(id) {
            Ok(written) => {
                let pinned = book.emergency().map(Contact::as_emergency_contact);
                self.check_written(written);
                if let Some(contact) = pinned {
                    self.save_profile(ProfileUpdate::emergency_contact(contact), effects);
                }
            }
            Err(e) => self.invalid(&e),
        }
    }

    /// Merges locally and asks the shell to push. Returns whether the change
    /// is now visible to reads.
    fn save_profile(&mut self, update: ProfileUpdate, effects: &mut Vec<Effect>) -> bool {
        match self.profiles.save(&update) {
            Ok(report) => {
                if let Durability::MemoryOnly(e) = &report.durability {
                    self.raise(AppError::from(e));
                }
                effects.push(Effect::PushProfile { update });
                true
            }
            Err(e) => {
                self.raise(AppError::from(&e));
                false
            }
        }
    }

    fn check_written(&mut self, written: WriteResult) {
        if let Err(e) = written {
            self.raise(AppError::from(&e));
        }
    }

    fn invalid(&mut self, e: &ValidationError) {
        debug!(error = %e, "input rejected");
        self.raise(AppError::new(ErrorKind::Validation, e.prompt()));
    }

    fn raise(&mut self, error: AppError) {
        debug!(code = error.code(), "error raised");
        self.error = Some(error);
    }
}

fn not_signed_in() -> AppError {
    AppError::new(ErrorKind::Authentication, "No authenticated user found.")
}
