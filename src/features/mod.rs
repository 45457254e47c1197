//! # Features
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

pub mod medications;
pub mod reminders;

pub use medications::{HttpMedicationProvider, Medication, MedicationProvider};
pub use reminders::{
    ActionOutcome, LogNotificationSurface, NotificationSurface, ReminderAction, ReminderHandle,
    ReminderService, ScheduleReport,
};
