// Core layer - shared types and configuration
pub mod core;

// Features layer - medications and reminders
pub mod features;

// Infrastructure
pub mod database;

pub use crate::core::{Config, ReminderError, ReminderSettings, Result};
pub use crate::database::{Database, KeyValueStore, MemoryStore};
pub use crate::features::{
    ActionOutcome, HttpMedicationProvider, LogNotificationSurface, Medication, MedicationProvider,
    NotificationSurface, ReminderAction, ReminderHandle, ReminderService, ScheduleReport,
};
