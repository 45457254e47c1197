//! # Acknowledgment Store
//!
//! Per-notification delivery state: which medication slot a delivered
//! notification belongs to, how many snoozes it has left, and whether the user
//! has resolved it. Records are retained for a fixed window and then pruned.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Status tracking and retention-based pruning
//! - 1.0.0: Initial release

use super::entry::TimeOfDay;
use crate::core::error::{ReminderError, Result};
use crate::database::KeyValueStore;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Key prefix for acknowledgment records
pub const ACK_KEY_PREFIX: &str = "ack_";

/// Where a delivered reminder is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Delivered,
    Snoozed,
    Taken,
    Missed,
}

impl AckStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AckStatus::Taken | AckStatus::Missed)
    }
}

impl std::fmt::Display for AckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckStatus::Delivered => write!(f, "delivered"),
            AckStatus::Snoozed => write!(f, "snoozed"),
            AckStatus::Taken => write!(f, "taken"),
            AckStatus::Missed => write!(f, "missed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgmentRecord {
    pub notification_id: String,
    pub medication_id: String,
    pub user_id: String,
    pub time_of_day: TimeOfDay,
    pub snoozes_remaining: u32,
    pub status: AckStatus,
    pub last_updated_at: DateTime<Utc>,
}

pub struct AcknowledgmentStore {
    store: Arc<dyn KeyValueStore>,
    retention: chrono::Duration,
}

impl AcknowledgmentStore {
    pub fn new(store: Arc<dyn KeyValueStore>, retention: chrono::Duration) -> Self {
        Self { store, retention }
    }

    fn key(notification_id: &str) -> String {
        format!("{ACK_KEY_PREFIX}{notification_id}")
    }

    /// Create or overwrite the record for a freshly delivered notification
    pub async fn record(
        &self,
        notification_id: &str,
        medication_id: &str,
        user_id: &str,
        time_of_day: TimeOfDay,
        snoozes_remaining: u32,
        now: DateTime<Utc>,
    ) -> Result<AcknowledgmentRecord> {
        let record = AcknowledgmentRecord {
            notification_id: notification_id.to_string(),
            medication_id: medication_id.to_string(),
            user_id: user_id.to_string(),
            time_of_day,
            snoozes_remaining,
            status: AckStatus::Delivered,
            last_updated_at: now,
        };
        self.save(&record).await?;
        debug!(
            "Recorded notification {notification_id} for {medication_id} at {time_of_day} ({snoozes_remaining} snoozes left)"
        );
        Ok(record)
    }

    pub async fn save(&self, record: &AcknowledgmentRecord) -> Result<()> {
        let blob = serde_json::to_string(record)?;
        self.store
            .set(&Self::key(&record.notification_id), &blob)
            .await
    }

    pub async fn lookup(&self, notification_id: &str) -> Result<AcknowledgmentRecord> {
        let raw = self
            .store
            .get(&Self::key(notification_id))
            .await?
            .ok_or_else(|| ReminderError::NotFound("Notification data".to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Lookup that treats an already-resolved reminder as unknown
    pub async fn lookup_active(&self, notification_id: &str) -> Result<AcknowledgmentRecord> {
        let record = self.lookup(notification_id).await?;
        if record.status.is_terminal() {
            debug!(
                "Notification {notification_id} already resolved as {}",
                record.status
            );
            return Err(ReminderError::NotFound("Pending reminder".to_string()));
        }
        Ok(record)
    }

    /// Record one granted snooze. The budget only ever goes down.
    pub async fn consume_snooze(
        &self,
        record: &mut AcknowledgmentRecord,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        if record.snoozes_remaining == 0 {
            return Err(ReminderError::LimitExceeded);
        }
        record.snoozes_remaining -= 1;
        record.status = AckStatus::Snoozed;
        record.last_updated_at = now;
        self.save(record).await?;
        Ok(record.snoozes_remaining)
    }

    pub async fn mark_terminal(
        &self,
        record: &mut AcknowledgmentRecord,
        status: AckStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        record.status = status;
        record.last_updated_at = now;
        self.save(record).await
    }

    /// Delete records not touched within the retention window. Unreadable
    /// records are deleted too. Returns how many were removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            debug!("Retention window reaches past the earliest date, nothing to prune");
            return Ok(0);
        };
        let mut removed = 0;

        for key in self.store.keys_with_prefix(ACK_KEY_PREFIX).await? {
            let expired = match self.store.get(&key).await? {
                Some(raw) => match serde_json::from_str::<AcknowledgmentRecord>(&raw) {
                    Ok(record) => record.last_updated_at < cutoff,
                    Err(e) => {
                        warn!("Removing unreadable acknowledgment record {key}: {e}");
                        true
                    }
                },
                None => false,
            };

            if expired {
                self.store.delete(&key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Pruned {removed} acknowledgment record(s) older than {cutoff}");
        }
        Ok(removed)
    }
}
