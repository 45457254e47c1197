//! Mutable reminder state guarded by a single lock

use super::acknowledgment::AcknowledgmentStore;
use super::queue::ReminderQueueStore;
use crate::database::KeyValueStore;
use chrono::{DateTime, Utc};
use log::error;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How often acknowledgment records are swept for expiry
pub const ACK_PRUNE_INTERVAL_SECS: i64 = 3600;

/// Queue and acknowledgment records. Every mutation from the timer loop or
/// from a user action goes through the one `SharedState` lock.
pub struct ReminderState {
    pub queue: ReminderQueueStore,
    pub acks: AcknowledgmentStore,
    last_pruned: Option<DateTime<Utc>>,
}

pub type SharedState = Arc<Mutex<ReminderState>>;

impl ReminderState {
    pub fn new(store: Arc<dyn KeyValueStore>, ack_retention: chrono::Duration) -> Self {
        Self {
            queue: ReminderQueueStore::new(store.clone()),
            acks: AcknowledgmentStore::new(store, ack_retention),
            last_pruned: None,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Run the acknowledgment pruner unless it ran within the last hour
    pub async fn prune_acks_if_due(&mut self, now: DateTime<Utc>) -> usize {
        if self
            .last_pruned
            .is_some_and(|last| (now - last).num_seconds() < ACK_PRUNE_INTERVAL_SECS)
        {
            return 0;
        }

        self.last_pruned = Some(now);
        match self.acks.prune(now).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to prune acknowledgment records: {e}");
                0
            }
        }
    }
}
