//! # Notification Dispatcher
//!
//! Hands due reminders to the platform notification surface and records the
//! delivered notification's snooze budget.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use super::acknowledgment::AcknowledgmentStore;
use super::actions::ReminderAction;
use super::entry::{ReminderEntry, TimeOfDay};
use crate::core::error::{with_timeout, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Category the surface uses to attach the reminder action buttons
pub const REMINDER_CATEGORY: &str = "medication-reminder";

/// Opaque data carried with the notification and echoed back on user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub medication_id: String,
    pub user_id: String,
    pub time_of_day: TimeOfDay,
    pub medication_name: String,
    pub is_snooze_instance: bool,
}

/// A button shown on the delivered notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationButton {
    pub identifier: &'static str,
    pub title: &'static str,
    pub destructive: bool,
}

/// Everything the surface needs to show one reminder right now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub category: &'static str,
    pub buttons: Vec<NotificationButton>,
    pub payload: ReminderPayload,
}

/// Platform notification surface (OS notification center, push gateway, ...)
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Deliver immediately and return the platform's notification id
    async fn schedule_immediate(&self, request: NotificationRequest) -> Result<String>;
}

/// Surface that only logs, for headless runs
pub struct LogNotificationSurface;

#[async_trait]
impl NotificationSurface for LogNotificationSurface {
    async fn schedule_immediate(&self, request: NotificationRequest) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        info!(
            "🔔 [{id}] {}: {} (actions: {})",
            request.title,
            request.body,
            request
                .buttons
                .iter()
                .map(|b| b.identifier)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(id)
    }
}

pub struct NotificationDispatcher {
    surface: Arc<dyn NotificationSurface>,
    timeout: Duration,
    max_snoozes: u32,
}

impl NotificationDispatcher {
    pub fn new(surface: Arc<dyn NotificationSurface>, timeout: Duration, max_snoozes: u32) -> Self {
        Self {
            surface,
            timeout,
            max_snoozes,
        }
    }

    pub fn build_request(&self, entry: &ReminderEntry) -> NotificationRequest {
        let (title, body) = if entry.is_snooze_instance {
            (
                "🔔 Snoozed Reminder".to_string(),
                format!(
                    "Time to take {} (snoozed reminder {} of {})",
                    entry.medication_name, entry.snooze_ordinal, self.max_snoozes
                ),
            )
        } else {
            (
                "🔔 Medication Reminder".to_string(),
                format!("Time to take {}", entry.medication_name),
            )
        };

        NotificationRequest {
            title,
            body,
            category: REMINDER_CATEGORY,
            buttons: ReminderAction::ALL
                .iter()
                .map(|a| NotificationButton {
                    identifier: a.identifier(),
                    title: a.button_title(),
                    destructive: a.is_destructive(),
                })
                .collect(),
            payload: ReminderPayload {
                kind: REMINDER_CATEGORY.to_string(),
                medication_id: entry.medication_id.clone(),
                user_id: entry.user_id.clone(),
                time_of_day: entry.time_of_day,
                medication_name: entry.medication_name.clone(),
                is_snooze_instance: entry.is_snooze_instance,
            },
        }
    }

    /// Show `entry` now and record its acknowledgment state. Returns the
    /// platform notification id.
    pub async fn dispatch(
        &self,
        entry: &ReminderEntry,
        acks: &AcknowledgmentStore,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let request = self.build_request(entry);
        let notification_id = with_timeout(
            "Notification surface",
            self.timeout,
            self.surface.schedule_immediate(request),
        )
        .await?;

        let snoozes_remaining = self.max_snoozes.saturating_sub(entry.snooze_ordinal);
        if let Err(e) = acks
            .record(
                &notification_id,
                &entry.medication_id,
                &entry.user_id,
                entry.time_of_day,
                snoozes_remaining,
                now,
            )
            .await
        {
            // The notification is already visible; actions on it will report NotFound
            warn!("Delivered {notification_id} but failed to record it: {e}");
            return Err(e);
        }

        info!(
            "Dispatched reminder {notification_id} for {} at {}",
            entry.medication_name, entry.time_of_day
        );
        Ok(notification_id)
    }
}
