use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{DeviceContact, HealthRecord, MedicineReminder, ProfileUpdate};
use crate::MAX_TEXT_LEN;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(UserId);
typed_id!(ContactId);
typed_id!(RecordId);

impl ContactId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl RecordId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// --- Validation ---

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} is too long ({len} > {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("enter at least one measurement")]
    NoMeasurement,
    #[error("unknown contact: {0}")]
    UnknownContact(ContactId),
    #[error("email address is not verified yet")]
    EmailNotVerified,
    #[error("cannot {action} during the {step} step")]
    OutOfOrder {
        action: &'static str,
        step: &'static str,
    },
}

impl ValidationError {
    /// Prompt shown to the user, worded the way the screens ask for input.
    #[must_use]
    pub fn prompt(&self) -> String {
        match self {
            Self::Required { field: "name" } => "Please enter your name.".into(),
            Self::Required {
                field: "contact name" | "phone number",
            } => "Please fill in both fields.".into(),
            Self::Required { field: "medicine name" } => "Please enter the medicine name.".into(),
            Self::NoMeasurement => "Please enter at least one measurement.".into(),
            Self::EmailNotVerified => "Please verify your email before continuing.".into(),
            other => other.to_string(),
        }
    }
}

/// Trims `raw` and rejects empty or oversized input.
pub fn required_text(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    if trimmed.len() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field,
            len: trimmed.len(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Like [`required_text`] but an empty field is allowed and maps to `None`.
pub fn optional_text(field: &'static str, raw: &str) -> Result<Option<String>, ValidationError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    required_text(field, raw).map(Some)
}

// --- Event enum: everything the shells can tell the core ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Identity provider
    IdentityChanged {
        user: Option<UserId>,
        email_verified: bool,
    },
    SignOutRequested,

    // Onboarding
    GetStartedTapped,
    EmailVerificationChanged {
        verified: bool,
    },
    ContinueAfterVerificationTapped,
    NameSubmitted {
        name: String,
    },
    EmergencyContactSubmitted {
        name: String,
        number: String,
    },
    PermissionsFinished,

    // Profile
    ProfileSaveRequested(Box<ProfileUpdate>),
    ProfilePushFailed {
        message: String,
    },
    /// The remote adapter delivered a snapshot into the cache.
    ProfileSnapshotDelivered,

    // SOS
    SosPressStarted,
    SosPressEnded,
    SosTick,

    // Contacts
    ContactAdded {
        name: String,
        phone: String,
    },
    ContactsImported(Vec<DeviceContact>),
    ContactPinnedAsEmergency {
        id: ContactId,
    },
    ContactRemoved {
        id: ContactId,
    },

    // Health & medicine
    HealthRecordSubmitted {
        blood_pressure: String,
        blood_sugar: String,
    },
    MedicineReminderSubmitted {
        medicine_name: String,
        scheduled_at_ms: u64,
    },
    HealthRecordsLoaded(Vec<HealthRecord>),
    MedicineRemindersLoaded(Vec<MedicineReminder>),

    ErrorDismissed,
    ToastDismissed,
}

impl Event {
    /// Stable name for logs; carries no payload.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::IdentityChanged { .. } => "identity_changed",
            Self::SignOutRequested => "sign_out_requested",
            Self::GetStartedTapped => "get_started_tapped",
            Self::EmailVerificationChanged { .. } => "email_verification_changed",
            Self::ContinueAfterVerificationTapped => "continue_after_verification",
            Self::NameSubmitted { .. } => "name_submitted",
            Self::EmergencyContactSubmitted { .. } => "emergency_contact_submitted",
            Self::PermissionsFinished => "permissions_finished",
            Self::ProfileSaveRequested(_) => "profile_save_requested",
            Self::ProfilePushFailed { .. } => "profile_push_failed",
            Self::ProfileSnapshotDelivered => "profile_snapshot_delivered",
            Self::SosPressStarted => "sos_press_started",
            Self::SosPressEnded => "sos_press_ended",
            Self::SosTick => "sos_tick",
            Self::ContactAdded { .. } => "contact_added",
            Self::ContactsImported(_) => "contacts_imported",
            Self::ContactPinnedAsEmergency { .. } => "contact_pinned_as_emergency",
            Self::ContactRemoved { .. } => "contact_removed",
            Self::HealthRecordSubmitted { .. } => "health_record_submitted",
            Self::MedicineReminderSubmitted { .. } => "medicine_reminder_submitted",
            Self::HealthRecordsLoaded(_) => "health_records_loaded",
            Self::MedicineRemindersLoaded(_) => "medicine_reminders_loaded",
            Self::ErrorDismissed => "error_dismissed",
            Self::ToastDismissed => "toast_dismissed",
        }
    }

    /// Ticks and deliveries come from timers and adapters, not a person.
    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::IdentityChanged { .. }
                | Self::SosTick
                | Self::ProfilePushFailed { .. }
                | Self::ProfileSnapshotDelivered
                | Self::HealthRecordsLoaded(_)
                | Self::MedicineRemindersLoaded(_)
        )
    }
}
