//! # Reminder Actions
//!
//! State machine behind the three notification buttons. A delivered reminder
//! is either taken, missed (both terminal) or snoozed, which queues a short
//! deferral and spends one unit of the snooze budget.
//!
//! - **Version**: 1.3.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.3.0: Taken/Missed re-read the record before closing it
//! - 1.2.0: Repeat actions on a resolved reminder report NotFound
//! - 1.1.0: Snooze budget checked before the medication lookup
//! - 1.0.0: Initial taken/snooze/missed handling

use super::acknowledgment::AckStatus;
use super::scheduler::{next_occurrence, ReminderScheduler};
use super::state::SharedState;
use crate::core::error::{with_timeout, ReminderError, Result};
use crate::features::medications::{Medication, MedicationProvider};
use chrono::{DateTime, Local, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A user response to a delivered reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReminderAction {
    Taken,
    Snooze,
    Missed,
}

impl ReminderAction {
    pub const ALL: [ReminderAction; 3] = [
        ReminderAction::Taken,
        ReminderAction::Snooze,
        ReminderAction::Missed,
    ];

    /// Action identifier reported by the notification surface
    pub fn identifier(&self) -> &'static str {
        match self {
            ReminderAction::Taken => "mark-taken",
            ReminderAction::Snooze => "snooze",
            ReminderAction::Missed => "mark-missed",
        }
    }

    pub fn button_title(&self) -> &'static str {
        match self {
            ReminderAction::Taken => "Mark as Taken",
            ReminderAction::Snooze => "Snooze",
            ReminderAction::Missed => "Mark as Not Taken",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, ReminderAction::Missed)
    }
}

impl std::fmt::Display for ReminderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl std::str::FromStr for ReminderAction {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mark-taken" | "taken" => Ok(ReminderAction::Taken),
            "snooze" => Ok(ReminderAction::Snooze),
            "mark-missed" | "missed" => Ok(ReminderAction::Missed),
            _ => Err(ReminderError::validation(s, "unknown reminder action")),
        }
    }
}

/// What the user is told after an action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_reminder_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snoozes_remaining: Option<u32>,
}

impl ActionOutcome {
    pub fn failure(error: &ReminderError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            medication_name: None,
            next_reminder_at: None,
            snoozes_remaining: None,
        }
    }
}

/// Format a duration in seconds into a human-readable string
pub fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{} second{}", seconds, if seconds == 1 { "" } else { "s" })
    } else if seconds < 3600 {
        let mins = seconds / 60;
        format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
    } else {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!(
                "{} hour{} {} minute{}",
                hours,
                if hours == 1 { "" } else { "s" },
                mins,
                if mins == 1 { "" } else { "s" }
            )
        } else {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        }
    }
}

pub struct ReminderActionHandler {
    state: SharedState,
    provider: Arc<dyn MedicationProvider>,
    scheduler: ReminderScheduler,
    timeout: Duration,
    max_snoozes: u32,
}

impl ReminderActionHandler {
    pub fn new(
        state: SharedState,
        provider: Arc<dyn MedicationProvider>,
        scheduler: ReminderScheduler,
        timeout: Duration,
        max_snoozes: u32,
    ) -> Self {
        Self {
            state,
            provider,
            scheduler,
            timeout,
            max_snoozes,
        }
    }

    /// Handler boundary: every error becomes an unsuccessful outcome
    pub async fn handle_action(&self, notification_id: &str, action: ReminderAction) -> ActionOutcome {
        match self.take_action(notification_id, action, Utc::now()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Action {action} on notification {notification_id} failed: {e}");
                ActionOutcome::failure(&e)
            }
        }
    }

    pub async fn take_action(
        &self,
        notification_id: &str,
        action: ReminderAction,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome> {
        debug!("Handling {action} for notification {notification_id}");
        match action {
            ReminderAction::Taken => self.resolve(notification_id, AckStatus::Taken, now).await,
            ReminderAction::Missed => self.resolve(notification_id, AckStatus::Missed, now).await,
            ReminderAction::Snooze => self.snooze(notification_id, now).await,
        }
    }

    async fn fetch_medication(&self, user_id: &str, medication_id: &str) -> Result<Medication> {
        with_timeout(
            "Medication API",
            self.timeout,
            self.provider.find_medication(user_id, medication_id),
        )
        .await
    }

    /// Taken or Missed: write the timestamp back, retire the slot, close the record
    async fn resolve(
        &self,
        notification_id: &str,
        status: AckStatus,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome> {
        let record = self.state.lock().await.acks.lookup_active(notification_id).await?;

        let medication = self
            .fetch_medication(&record.user_id, &record.medication_id)
            .await?;

        let mut patch = medication.clone();
        match status {
            AckStatus::Missed => patch.last_missed = Some(now),
            _ => patch.last_taken = Some(now),
        }
        with_timeout(
            "Medication API",
            self.timeout,
            self.provider
                .update_medication(&record.medication_id, &patch, &record.user_id),
        )
        .await?;

        {
            let mut state = self.state.lock().await;
            // Re-read under the lock; another action may have resolved or snoozed it meanwhile
            let mut current = state.acks.lookup_active(notification_id).await?;
            let removed = state
                .queue
                .remove_for_time_of_day(&current.medication_id, current.time_of_day)
                .await;
            state.acks.mark_terminal(&mut current, status, now).await?;
            debug!("Retired {removed} queued reminder(s) for {}", medication.name);
        }

        let next = next_occurrence(record.time_of_day, &now.with_timezone(&Local));
        let day = if next.with_timezone(&Local).date_naive() == now.with_timezone(&Local).date_naive() {
            "today"
        } else {
            "tomorrow"
        };
        let verb = if status == AckStatus::Missed { "missed" } else { "taken" };

        info!("{} marked as {verb} (notification {notification_id})", medication.name);
        Ok(ActionOutcome {
            success: true,
            message: format!(
                "{} marked as {verb}. Next reminder will be at {} {day}.",
                medication.name, record.time_of_day
            ),
            medication_name: Some(medication.name),
            next_reminder_at: Some(next),
            snoozes_remaining: None,
        })
    }

    async fn snooze(&self, notification_id: &str, now: DateTime<Utc>) -> Result<ActionOutcome> {
        let record = self.state.lock().await.acks.lookup_active(notification_id).await?;
        if record.snoozes_remaining == 0 {
            info!("Snooze refused for notification {notification_id}: budget exhausted");
            return Err(ReminderError::LimitExceeded);
        }

        let medication = self
            .fetch_medication(&record.user_id, &record.medication_id)
            .await?;

        let (remaining, next) = {
            let mut state = self.state.lock().await;
            // Re-read under the lock so the budget reflects any action handled meanwhile
            let mut current = state.acks.lookup_active(notification_id).await?;
            let ordinal = self.max_snoozes.saturating_sub(current.snoozes_remaining) + 1;
            let entry = self
                .scheduler
                .snooze_entry(&medication, current.time_of_day, ordinal, now)?;
            let remaining = state.acks.consume_snooze(&mut current, now).await?;

            let next = entry.scheduled_at;
            state.queue.enqueue(entry).await;
            (remaining, next)
        };

        let snoozed_for = format_duration(self.scheduler.snooze_duration().num_seconds());
        info!("Snoozed {} for {snoozed_for}, {remaining} snoozes remaining", medication.name);
        Ok(ActionOutcome {
            success: true,
            message: format!("Medication snoozed for {snoozed_for}. {remaining} snoozes remaining."),
            medication_name: Some(medication.name),
            next_reminder_at: Some(next),
            snoozes_remaining: Some(remaining),
        })
    }
}
