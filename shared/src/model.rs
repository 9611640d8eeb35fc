use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{optional_text, required_text, ContactId, RecordId, ValidationError};
use crate::UnixTimeMs;

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct EmergencyContact {
    pub name: String,
    // The onboarding screen historically wrote this field as `phone`.
    #[serde(alias = "phone")]
    pub number: String,
}

impl EmergencyContact {
    pub fn new(name: &str, number: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text("contact name", name)?,
            number: required_text("phone number", number)?,
        })
    }
}

impl fmt::Debug for EmergencyContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmergencyContact")
            .field("name_present", &!self.name.is_empty())
            .field("number_present", &!self.number.is_empty())
            .finish()
    }
}

/// The signed-in user's profile document.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<EmergencyContact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Vec<String>>,
}

impl Profile {
    /// Shallow field-wise merge: fields present in `update` overwrite, the rest
    /// are retained.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name.clone_from(name);
        }
        if let Some(email) = &update.email {
            self.email.clone_from(email);
        }
        if let Some(contact) = &update.emergency_contact {
            self.emergency_contact = Some(contact.clone());
        }
        if let Some(reminders) = &update.reminders {
            self.reminders = Some(reminders.clone());
        }
    }

    #[must_use]
    pub fn merged(mut self, update: &ProfileUpdate) -> Self {
        self.apply(update);
        self
    }
}

// Redact debug output: names, emails and phone numbers must not reach logs.
impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name_present", &!self.name.is_empty())
            .field("email_present", &!self.email.is_empty())
            .field("emergency_contact_present", &self.emergency_contact.is_some())
            .field("reminder_count", &self.reminders.as_ref().map(Vec::len))
            .finish()
    }
}

/// Partial profile write. Absent fields leave the stored value untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<EmergencyContact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Vec<String>>,
}

impl ProfileUpdate {
    /// Name entry from onboarding or settings.
    pub fn name(raw: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            name: Some(required_text("name", raw)?),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn emergency_contact(contact: EmergencyContact) -> Self {
        Self {
            emergency_contact: Some(contact),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.emergency_contact.is_none()
            && self.reminders.is_none()
    }
}

/// Entry in the local address book.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub is_emergency: bool,
}

impl Contact {
    #[must_use]
    pub fn as_emergency_contact(&self) -> EmergencyContact {
        EmergencyContact {
            name: self.name.clone(),
            number: self.phone.clone(),
        }
    }
}

impl fmt::Debug for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contact")
            .field("id", &self.id)
            .field("is_emergency", &self.is_emergency)
            .finish_non_exhaustive()
    }
}

/// Contact as handed over by the phone's address book.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeviceContact {
    pub id: String,
    pub name: Option<String>,
    pub phone_numbers: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub id: RecordId,
    pub blood_pressure: Option<String>,
    pub blood_sugar: Option<String>,
    pub recorded_at: UnixTimeMs,
}

impl HealthRecord {
    /// At least one of the two measurements must be filled in.
    pub fn new(
        blood_pressure: &str,
        blood_sugar: &str,
        recorded_at: UnixTimeMs,
    ) -> Result<Self, ValidationError> {
        let blood_pressure = optional_text("blood pressure", blood_pressure)?;
        let blood_sugar = optional_text("blood sugar", blood_sugar)?;
        if blood_pressure.is_none() && blood_sugar.is_none() {
            return Err(ValidationError::NoMeasurement);
        }
        Ok(Self {
            id: RecordId::generate(),
            blood_pressure,
            blood_sugar,
            recorded_at,
        })
    }
}

impl fmt::Debug for HealthRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRecord")
            .field("id", &self.id)
            .field("blood_pressure_present", &self.blood_pressure.is_some())
            .field("blood_sugar_present", &self.blood_sugar.is_some())
            .field("recorded_at", &self.recorded_at)
            .finish()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MedicineReminder {
    pub id: RecordId,
    pub medicine_name: String,
    pub scheduled_at: UnixTimeMs,
}

impl MedicineReminder {
    pub fn new(medicine_name: &str, scheduled_at: UnixTimeMs) -> Result<Self, ValidationError> {
        Ok(Self {
            id: RecordId::generate(),
            medicine_name: required_text("medicine name", medicine_name)?,
            scheduled_at,
        })
    }
}
