//! Health measurements and medicine reminders as the home screens list them.

use crate::event::{RecordId, ValidationError};
use crate::model::{HealthRecord, MedicineReminder};
use crate::UnixTimeMs;

/// Blood pressure / blood sugar history, newest first.
#[derive(Debug, Default, Clone)]
pub struct HealthLog {
    records: Vec<HealthRecord>,
}

impl HealthLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        blood_pressure: &str,
        blood_sugar: &str,
        now: UnixTimeMs,
    ) -> Result<HealthRecord, ValidationError> {
        let record = HealthRecord::new(blood_pressure, blood_sugar, now)?;
        self.insert(record.clone());
        Ok(record)
    }

    /// Replaces the list with what the remote collection reported.
    pub fn replace_all(&mut self, mut records: Vec<HealthRecord>) {
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        self.records = records;
    }

    #[must_use]
    pub fn records(&self) -> &[HealthRecord] {
        &self.records
    }

    fn insert(&mut self, record: HealthRecord) {
        let at = self
            .records
            .partition_point(|r| r.recorded_at >= record.recorded_at);
        self.records.insert(at, record);
    }
}

/// Medicine reminders in the order they come due.
#[derive(Debug, Default, Clone)]
pub struct MedicineSchedule {
    reminders: Vec<MedicineReminder>,
}

impl MedicineSchedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        medicine_name: &str,
        scheduled_at: UnixTimeMs,
    ) -> Result<MedicineReminder, ValidationError> {
        let reminder = MedicineReminder::new(medicine_name, scheduled_at)?;
        let at = self
            .reminders
            .partition_point(|r| r.scheduled_at <= reminder.scheduled_at);
        self.reminders.insert(at, reminder.clone());
        Ok(reminder)
    }

    pub fn replace_all(&mut self, mut reminders: Vec<MedicineReminder>) {
        reminders.sort_by_key(|r| r.scheduled_at);
        self.reminders = reminders;
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<MedicineReminder> {
        let index = self.reminders.iter().position(|r| &r.id == id)?;
        Some(self.reminders.remove(index))
    }

    #[must_use]
    pub fn reminders(&self) -> &[MedicineReminder] {
        &self.reminders
    }

    /// First reminder at or after `now`.
    #[must_use]
    pub fn next_due(&self, now: UnixTimeMs) -> Option<&MedicineReminder> {
        self.reminders.iter().find(|r| !r.scheduled_at.is_before(now))
    }

    #[must_use]
    pub fn upcoming(&self, now: UnixTimeMs) -> &[MedicineReminder] {
        let start = self.reminders.partition_point(|r| r.scheduled_at.is_before(now));
        &self.reminders[start..]
    }
}
