//! # Feature: Reminders
//!
//! Daily medication reminders backed by a persistent polling queue, with a
//! per-notification snooze budget and taken/snooze/missed actions.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Command channel for platform action callbacks
//! - 1.1.0: Acknowledgment pruning and queue save retry
//! - 1.0.0: Initial scheduler, queue and action handling

pub mod acknowledgment;
pub mod actions;
pub mod dispatcher;
pub mod entry;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod state;

pub use acknowledgment::{AckStatus, AcknowledgmentRecord, AcknowledgmentStore};
pub use actions::{ActionOutcome, ReminderAction, ReminderActionHandler};
pub use dispatcher::{
    LogNotificationSurface, NotificationDispatcher, NotificationRequest, NotificationSurface,
    ReminderPayload,
};
pub use entry::{ReminderEntry, TimeOfDay};
pub use processor::{QueueProcessor, TickOutcome};
pub use queue::ReminderQueueStore;
pub use scheduler::{next_occurrence, ReminderScheduler, ScheduleReport};
pub use service::{ReminderCommand, ReminderHandle, ReminderService};
