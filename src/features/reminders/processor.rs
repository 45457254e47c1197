//! # Queue Processor
//!
//! Timer-driven loop that fires due reminders. Each timer tick spawns one
//! pass; a pass that finds another still running skips itself entirely, so a
//! given entry is dispatched at most once per tick cycle.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Periodic acknowledgment pruning and retry of failed queue saves
//! - 1.0.0: Initial single-flight polling loop

use super::dispatcher::NotificationDispatcher;
use super::state::SharedState;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What one pass over the queue did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another pass was still running
    Skipped,
    Completed {
        dispatched: usize,
        failed: usize,
        pending: usize,
    },
}

/// Clears the in-flight flag when a pass ends, including on panic
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The parts of the processor a spawned pass needs
#[derive(Clone)]
struct TickRunner {
    state: SharedState,
    dispatcher: Arc<NotificationDispatcher>,
    in_flight: Arc<AtomicBool>,
}

impl TickRunner {
    async fn run(&self, now: DateTime<Utc>) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous queue pass still running, skipping this tick");
            return TickOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let mut state = self.state.lock().await;
        state.queue.flush_if_dirty().await;

        let (due, pending) = state.queue.partition_due(now);
        debug!("Queue pass at {now}: {} due, {pending} pending", due.len());

        let mut dispatched = 0;
        let mut failed = 0;
        for entry in &due {
            match self.dispatcher.dispatch(entry, &state.acks, now).await {
                Ok(_) => dispatched += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        "Error showing reminder for {} at {}: {e}",
                        entry.medication_name, entry.time_of_day
                    );
                }
            }
        }

        // At-most-once: due entries leave the queue whether or not delivery worked
        if !due.is_empty() {
            state.queue.dequeue(&due).await;
        }
        state.prune_acks_if_due(now).await;

        TickOutcome::Completed {
            dispatched,
            failed,
            pending,
        }
    }
}

pub struct QueueProcessor {
    runner: TickRunner,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl QueueProcessor {
    pub fn new(
        state: SharedState,
        dispatcher: Arc<NotificationDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            runner: TickRunner {
                state,
                dispatcher,
                in_flight: Arc::new(AtomicBool::new(false)),
            },
            interval,
            timer: Mutex::new(None),
        }
    }

    /// Arm the timer. The first pass runs immediately. No-op if already running.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Queue processor already running");
            return;
        }

        let runner = self.runner.clone();
        let period = self.interval;
        *timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let pass = runner.clone();
                tokio::spawn(async move {
                    pass.run(Utc::now()).await;
                });
            }
        }));

        info!(
            "Queue processor started (every {}s)",
            self.interval.as_secs_f32()
        );
    }

    /// Disarm the timer. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
            info!("Queue processor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one pass now
    pub async fn tick(&self) -> TickOutcome {
        self.runner.run(Utc::now()).await
    }

    /// Run one pass treating `now` as the current time
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        self.runner.run(now).await
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Result;
    use crate::database::MemoryStore;
    use crate::features::reminders::dispatcher::tests::RecordingSurface;
    use crate::features::reminders::dispatcher::{NotificationRequest, NotificationSurface};
    use crate::features::reminders::queue::tests::entry;
    use crate::features::reminders::state::ReminderState;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn setup(surface: Arc<dyn NotificationSurface>) -> (SharedState, QueueProcessor) {
        let state = ReminderState::new(Arc::new(MemoryStore::new()), chrono::Duration::hours(48))
            .shared();
        let dispatcher = Arc::new(NotificationDispatcher::new(surface, Duration::from_secs(1), 3));
        let processor = QueueProcessor::new(state.clone(), dispatcher, Duration::from_secs(30));
        (state, processor)
    }

    #[tokio::test]
    async fn test_tick_dispatches_only_due_entries() {
        let surface = Arc::new(RecordingSurface::default());
        let (state, processor) = setup(surface.clone());
        let now = Utc::now();
        state
            .lock()
            .await
            .queue
            .enqueue_all(vec![
                entry("m1", "u1", "08:00", now - chrono::Duration::seconds(1)),
                entry("m2", "u1", "08:00", now),
                entry("m3", "u1", "09:00", now + chrono::Duration::hours(1)),
            ])
            .await;

        let outcome = processor.tick_at(now).await;

        assert_eq!(
            outcome,
            TickOutcome::Completed {
                dispatched: 2,
                failed: 0,
                pending: 1
            }
        );
        assert_eq!(surface.count(), 2);
        let state = state.lock().await;
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.queue.entries()[0].medication_id, "m3");
    }

    #[tokio::test]
    async fn test_second_tick_does_not_redispatch() {
        let surface = Arc::new(RecordingSurface::default());
        let (state, processor) = setup(surface.clone());
        let now = Utc::now();
        state
            .lock()
            .await
            .queue
            .enqueue(entry("m1", "u1", "08:00", now))
            .await;

        processor.tick_at(now).await;
        processor.tick_at(now).await;

        assert_eq!(surface.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_isolated_and_still_removed() {
        let surface = Arc::new(RecordingSurface::default());
        surface.fail.store(true, Ordering::SeqCst);
        let (state, processor) = setup(surface);
        let now = Utc::now();
        state
            .lock()
            .await
            .queue
            .enqueue_all(vec![
                entry("m1", "u1", "08:00", now),
                entry("m2", "u1", "08:00", now),
            ])
            .await;

        let outcome = processor.tick_at(now).await;

        assert_eq!(
            outcome,
            TickOutcome::Completed {
                dispatched: 0,
                failed: 2,
                pending: 0
            }
        );
        assert!(state.lock().await.queue.is_empty());
    }

    /// Surface that parks every delivery until released
    struct GatedSurface {
        entered: Notify,
        release: Notify,
        inner: RecordingSurface,
    }

    #[async_trait]
    impl NotificationSurface for GatedSurface {
        async fn schedule_immediate(&self, request: NotificationRequest) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.schedule_immediate(request).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let surface = Arc::new(GatedSurface {
            entered: Notify::new(),
            release: Notify::new(),
            inner: RecordingSurface::default(),
        });
        let (state, processor) = setup(surface.clone());
        let processor = Arc::new(processor);
        let now = Utc::now();
        state
            .lock()
            .await
            .queue
            .enqueue(entry("m1", "u1", "08:00", now))
            .await;

        let first = {
            let processor = processor.clone();
            tokio::spawn(async move { processor.tick_at(now).await })
        };
        surface.entered.notified().await;

        assert_eq!(processor.tick_at(now).await, TickOutcome::Skipped);

        surface.release.notify_one();
        let outcome = first.await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Completed {
                dispatched: 1,
                failed: 0,
                pending: 0
            }
        );
        assert_eq!(surface.inner.count(), 1);
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_stop_is_idempotent() {
        let surface = Arc::new(RecordingSurface::default());
        let (state, processor) = setup(surface.clone());
        state
            .lock()
            .await
            .queue
            .enqueue(entry("m1", "u1", "08:00", Utc::now() - chrono::Duration::seconds(1)))
            .await;

        processor.start();
        processor.start();
        assert!(processor.is_running());

        for _ in 0..50 {
            if surface.count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(surface.count(), 1);

        processor.stop();
        processor.stop();
        assert!(!processor.is_running());
    }
}
