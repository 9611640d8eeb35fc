// lib.rs - shared core for the Kalinga companion app

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod contacts;
pub mod event;
pub mod model;
pub mod onboarding;
pub mod profile_cache;
pub mod records;
pub mod sos;
pub mod trigger;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use app::{Companion, Effect, ViewModel};
pub use config::{CacheConfig, CompanionConfig, ConfigError, TriggerConfig};
pub use event::{ContactId, Event, RecordId, UserId, ValidationError};
pub use model::{Contact, EmergencyContact, HealthRecord, MedicineReminder, Profile, ProfileUpdate};
pub use profile_cache::{CacheError, CacheSnapshot, Durability, ProfileCache, SaveReport};
pub use sos::SosButton;
pub use trigger::{HeldConfirmationTrigger, Pulse, TickOutcome, TriggerState};

pub const DEFAULT_HOLD_DURATION_MS: u64 = 3_000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_PROFILE_KEY: &str = "userProfile";
pub const DEFAULT_CONTACTS_KEY: &str = "contacts";
pub const MAX_TEXT_LEN: usize = 256;
pub const FALLBACK_DISPLAY_NAME: &str = "User";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Authentication,
    Validation,
    NotFound,
    Storage,
    Serialization,
    NoEmergencyContact,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Authentication => "AUTH_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::NoEmergencyContact => "NO_EMERGENCY_CONTACT",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Storage => ErrorSeverity::Transient,
            _ => ErrorSeverity::Permanent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.severity == ErrorSeverity::Transient
            && matches!(self.kind, ErrorKind::Network | ErrorKind::Storage)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to reach the server. Your changes are saved on this phone.".into()
            }
            ErrorKind::Authentication => "Please sign in again.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NoEmergencyContact => {
                "No emergency contact is set. Add one in Contacts.".into()
            }
            ErrorKind::Storage => "Could not save on this phone. Please try again.".into(),
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

/// What a screen shows for an [`AppError`]; internal detail stays behind.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Short, stable, non-reversible tag for an identity. Safe to log and to
/// store next to cached data.
#[must_use]
pub fn identity_fingerprint(user_id: &UserId) -> String {
    let hash = blake3::hash(user_id.as_str().as_bytes());
    hash.to_hex()[..16].to_string()
}
