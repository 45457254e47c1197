//! # Reminder Queue Store
//!
//! Durable set of pending reminder entries. The whole set is written as one
//! JSON blob after every mutation, so a later load never sees a partial write.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Dirty flag so a failed save is retried on the next mutation or tick
//! - 1.0.0: Initial release with load-time discard of past entries

use super::entry::{ReminderEntry, TimeOfDay};
use crate::core::error::Result;
use crate::database::KeyValueStore;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Key the queue blob is stored under
pub const QUEUE_KEY: &str = "notification_queue";

pub struct ReminderQueueStore {
    store: Arc<dyn KeyValueStore>,
    entries: Vec<ReminderEntry>,
    /// Set when the last save failed and the durable copy is stale
    dirty: bool,
}

impl ReminderQueueStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            entries: Vec::new(),
            dirty: false,
        }
    }

    /// Replace the in-memory set with the persisted one, dropping anything
    /// already due. Returns the number of entries kept.
    pub async fn load(&mut self, now: DateTime<Utc>) -> usize {
        let persisted = match self.store.get(QUEUE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ReminderEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    error!("Discarding unreadable reminder queue: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                error!("Failed to load reminder queue: {e}");
                Vec::new()
            }
        };

        let total = persisted.len();
        self.entries = persisted.into_iter().filter(|e| e.scheduled_at > now).collect();
        self.dirty = false;

        let dropped = total - self.entries.len();
        if dropped > 0 {
            warn!("Dropped {dropped} reminder(s) that came due while the process was down");
            self.persist().await;
        }
        info!("Loaded {} pending reminder(s)", self.entries.len());

        self.entries.len()
    }

    pub fn entries(&self) -> &[ReminderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clone out the entries due at `now` and the count still pending
    pub fn partition_due(&self, now: DateTime<Utc>) -> (Vec<ReminderEntry>, usize) {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.entries.iter().cloned().partition(|e| e.is_due(now));
        (due, pending.len())
    }

    /// Add one entry. Returns false if an identical entry is already queued.
    pub async fn enqueue(&mut self, entry: ReminderEntry) -> bool {
        let added = self.insert(entry);
        if added || self.dirty {
            self.persist().await;
        }
        added
    }

    /// Add several entries with a single rewrite. Returns how many were new.
    pub async fn enqueue_all(&mut self, entries: Vec<ReminderEntry>) -> usize {
        let added = entries.into_iter().filter(|e| self.insert(e.clone())).count();
        if added > 0 || self.dirty {
            self.persist().await;
        }
        added
    }

    fn insert(&mut self, entry: ReminderEntry) -> bool {
        if self.entries.contains(&entry) {
            debug!(
                "Reminder for {} at {} already queued",
                entry.medication_id, entry.time_of_day
            );
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove every entry matching `predicate`, returning the removed entries
    pub async fn remove_where<F>(&mut self, predicate: F) -> Vec<ReminderEntry>
    where
        F: Fn(&ReminderEntry) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|e| predicate(e));
        self.entries = kept;

        if !removed.is_empty() || self.dirty {
            self.persist().await;
        }
        removed
    }

    /// Remove entries that have just been handed to the notification surface
    pub async fn dequeue(&mut self, dispatched: &[ReminderEntry]) -> usize {
        self.remove_where(|e| dispatched.contains(e)).await.len()
    }

    /// Drop all entries for a deleted medication
    pub async fn cancel_for_medication(&mut self, medication_id: &str, user_id: &str) -> usize {
        let removed = self
            .remove_where(|e| e.belongs_to(medication_id, user_id))
            .await
            .len();
        info!("Cancelled {removed} reminder(s) for medication {medication_id}");
        removed
    }

    /// Drop every entry (daily or snoozed) for one medication's time slot
    pub async fn remove_for_time_of_day(
        &mut self,
        medication_id: &str,
        time_of_day: TimeOfDay,
    ) -> usize {
        self.remove_where(|e| e.matches_slot(medication_id, time_of_day))
            .await
            .len()
    }

    /// Retry a previously failed save
    pub async fn flush_if_dirty(&mut self) {
        if self.dirty {
            debug!("Retrying reminder queue save");
            self.persist().await;
        }
    }

    /// Write the full set. Failures are logged and leave the queue dirty.
    async fn persist(&mut self) {
        match self.save().await {
            Ok(()) => self.dirty = false,
            Err(e) => {
                error!("Error saving reminder queue: {e}");
                self.dirty = true;
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.entries)?;
        self.store.set(QUEUE_KEY, &blob).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::error::ReminderError;
    use crate::database::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub(crate) fn entry(med: &str, user: &str, time: &str, at: DateTime<Utc>) -> ReminderEntry {
        ReminderEntry {
            medication_id: med.to_string(),
            user_id: user.to_string(),
            medication_name: format!("{med}-name"),
            time_of_day: time.parse().unwrap(),
            scheduled_at: at,
            is_snooze_instance: false,
            snooze_ordinal: 0,
        }
    }

    /// Store whose writes fail until `healthy` is flipped
    struct FlakyStore {
        inner: MemoryStore,
        healthy: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(ReminderError::Persistence("disk full".into()));
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn test_load_discards_past_entries() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let persisted = vec![
            entry("m1", "u1", "08:00", now - chrono::Duration::minutes(5)),
            entry("m2", "u1", "09:00", now + chrono::Duration::hours(1)),
        ];
        store
            .set(QUEUE_KEY, &serde_json::to_string(&persisted).unwrap())
            .await
            .unwrap();

        let mut queue = ReminderQueueStore::new(store.clone());
        assert_eq!(queue.load(now).await, 1);
        assert_eq!(queue.entries()[0].medication_id, "m2");

        // The pruned set was written back
        let raw = store.get(QUEUE_KEY).await.unwrap().unwrap();
        let reloaded: Vec<ReminderEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_load_twice_does_not_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut queue = ReminderQueueStore::new(store.clone());
        queue
            .enqueue(entry("m1", "u1", "08:00", now + chrono::Duration::hours(2)))
            .await;

        assert_eq!(queue.load(now).await, 1);
        assert_eq!(queue.load(now).await, 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        {
            let mut queue = ReminderQueueStore::new(store.clone());
            queue
                .enqueue(entry("m1", "u1", "08:00", now + chrono::Duration::hours(2)))
                .await;
        }

        let mut restarted = ReminderQueueStore::new(store);
        assert_eq!(restarted.load(now).await, 1);
    }

    #[tokio::test]
    async fn test_unreadable_blob_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(QUEUE_KEY, "{not json").await.unwrap();

        let mut queue = ReminderQueueStore::new(store);
        assert_eq!(queue.load(Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn test_enqueue_ignores_identical_entry() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = ReminderQueueStore::new(store);
        let e = entry("m1", "u1", "08:00", Utc::now() + chrono::Duration::hours(1));

        assert!(queue.enqueue(e.clone()).await);
        assert!(!queue.enqueue(e).await);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_only_matching_entries() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = ReminderQueueStore::new(store);
        let later = Utc::now() + chrono::Duration::hours(1);
        queue
            .enqueue_all(vec![
                entry("m1", "u1", "08:00", later),
                entry("m1", "u1", "20:00", later),
                entry("m1", "u2", "08:00", later),
                entry("m2", "u1", "08:00", later),
            ])
            .await;

        assert_eq!(queue.cancel_for_medication("m1", "u1").await, 2);
        assert_eq!(queue.len(), 2);
        assert!(queue.entries().iter().all(|e| !e.belongs_to("m1", "u1")));
    }

    #[tokio::test]
    async fn test_remove_for_time_of_day_includes_snoozes() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = ReminderQueueStore::new(store);
        let later = Utc::now() + chrono::Duration::hours(1);
        let mut snoozed = entry("m1", "u1", "08:00", later + chrono::Duration::minutes(10));
        snoozed.is_snooze_instance = true;
        snoozed.snooze_ordinal = 1;

        queue
            .enqueue_all(vec![
                entry("m1", "u1", "08:00", later),
                snoozed,
                entry("m1", "u1", "20:00", later),
            ])
            .await;

        let removed = queue
            .remove_for_time_of_day("m1", "08:00".parse().unwrap())
            .await;
        assert_eq!(removed, 2);
        assert_eq!(queue.entries()[0].time_of_day.to_string(), "20:00");
    }

    #[tokio::test]
    async fn test_failed_save_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            healthy: AtomicBool::new(false),
        });
        let mut queue = ReminderQueueStore::new(store.clone());
        let later = Utc::now() + chrono::Duration::hours(1);

        queue.enqueue(entry("m1", "u1", "08:00", later)).await;
        assert!(queue.is_dirty());
        assert_eq!(store.get(QUEUE_KEY).await.unwrap(), None);

        store.healthy.store(true, Ordering::SeqCst);
        queue.flush_if_dirty().await;
        assert!(!queue.is_dirty());
        assert!(store.get(QUEUE_KEY).await.unwrap().is_some());
    }
}
