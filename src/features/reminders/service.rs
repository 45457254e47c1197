//! # Reminder Service
//!
//! Public entry point wiring the stores, processor and action handler around
//! injected collaborators. Platform callbacks reach it as `ReminderCommand`
//! messages through a `ReminderHandle`, handled one at a time by the command
//! loop.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Command channel for platform action callbacks
//! - 1.0.0: Initial service object replacing the global queue

use super::actions::{ActionOutcome, ReminderAction, ReminderActionHandler};
use super::dispatcher::{NotificationDispatcher, NotificationSurface};
use super::entry::ReminderEntry;
use super::processor::QueueProcessor;
use super::scheduler::{ReminderScheduler, ScheduleReport};
use super::state::{ReminderState, SharedState};
use crate::core::config::ReminderSettings;
use crate::core::error::{ReminderError, Result};
use crate::database::KeyValueStore;
use crate::features::medications::{Medication, MedicationProvider};
use chrono::{Local, Utc};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Command channel capacity
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Requests routed into the service from platform event wiring
#[derive(Debug)]
pub enum ReminderCommand {
    Schedule {
        medication: Medication,
        reply: oneshot::Sender<ScheduleReport>,
    },
    Cancel {
        medication_id: String,
        user_id: String,
        reply: oneshot::Sender<usize>,
    },
    Action {
        notification_id: String,
        action: ReminderAction,
        reply: oneshot::Sender<ActionOutcome>,
    },
}

pub struct ReminderService {
    state: SharedState,
    scheduler: ReminderScheduler,
    processor: QueueProcessor,
    actions: ReminderActionHandler,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        surface: Arc<dyn NotificationSurface>,
        provider: Arc<dyn MedicationProvider>,
        settings: &ReminderSettings,
    ) -> Result<Self> {
        let state = ReminderState::new(store, settings.ack_retention()).shared();
        let scheduler = ReminderScheduler::new(settings.snooze_duration())?;
        let dispatcher = Arc::new(NotificationDispatcher::new(
            surface,
            settings.external_timeout(),
            settings.max_snoozes,
        ));

        Ok(Self {
            processor: QueueProcessor::new(
                state.clone(),
                dispatcher,
                settings.queue_check_interval(),
            ),
            actions: ReminderActionHandler::new(
                state.clone(),
                provider,
                scheduler.clone(),
                settings.external_timeout(),
                settings.max_snoozes,
            ),
            scheduler,
            state,
        })
    }

    /// Load the persisted queue, prune stale acknowledgments and start polling.
    /// Calling it again reloads rather than appends.
    pub async fn initialize(&self) -> usize {
        let now = Utc::now();
        let pending = {
            let mut state = self.state.lock().await;
            let pending = state.queue.load(now).await;
            state.prune_acks_if_due(now).await;
            pending
        };
        self.processor.start();
        info!("Reminder service initialized with {pending} pending reminder(s)");
        pending
    }

    pub async fn schedule_medication_reminder(&self, medication: &Medication) -> ScheduleReport {
        let mut state = self.state.lock().await;
        self.scheduler
            .schedule(&mut state.queue, medication, &medication.times, &Local::now())
            .await
    }

    /// Drop queued reminders for a deleted medication. Already delivered
    /// notifications stay on screen.
    pub async fn cancel_medication_notifications(&self, medication_id: &str, user_id: &str) -> usize {
        self.state
            .lock()
            .await
            .queue
            .cancel_for_medication(medication_id, user_id)
            .await
    }

    pub async fn handle_action(&self, notification_id: &str, action: ReminderAction) -> ActionOutcome {
        self.actions.handle_action(notification_id, action).await
    }

    pub async fn pending_entries(&self) -> Vec<ReminderEntry> {
        self.state.lock().await.queue.entries().to_vec()
    }

    pub fn processor(&self) -> &QueueProcessor {
        &self.processor
    }

    pub fn shutdown(&self) {
        self.processor.stop();
    }

    /// Start the command loop and return the handle that feeds it
    pub fn spawn_command_loop(self: Arc<Self>) -> ReminderHandle {
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            info!("Reminder command loop started");
            while let Some(command) = command_rx.recv().await {
                self.process_command(command).await;
            }
            info!("Reminder command loop stopped");
        });

        ReminderHandle { command_tx }
    }

    async fn process_command(&self, command: ReminderCommand) {
        debug!("Processing reminder command: {command:?}");
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            ReminderCommand::Schedule { medication, reply } => {
                let _ = reply.send(self.schedule_medication_reminder(&medication).await);
            }
            ReminderCommand::Cancel {
                medication_id,
                user_id,
                reply,
            } => {
                let _ = reply.send(
                    self.cancel_medication_notifications(&medication_id, &user_id)
                        .await,
                );
            }
            ReminderCommand::Action {
                notification_id,
                action,
                reply,
            } => {
                let _ = reply.send(self.handle_action(&notification_id, action).await);
            }
        }
    }
}

/// Cloneable sender side of the command loop
#[derive(Clone)]
pub struct ReminderHandle {
    command_tx: mpsc::Sender<ReminderCommand>,
}

impl ReminderHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ReminderCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ReminderError::ServiceStopped)?;
        reply_rx.await.map_err(|_| ReminderError::ServiceStopped)
    }

    pub async fn schedule_medication_reminder(&self, medication: Medication) -> Result<ScheduleReport> {
        self.request(|reply| ReminderCommand::Schedule { medication, reply })
            .await
    }

    pub async fn cancel_medication_notifications(
        &self,
        medication_id: &str,
        user_id: &str,
    ) -> Result<usize> {
        self.request(|reply| ReminderCommand::Cancel {
            medication_id: medication_id.to_string(),
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    /// Route a notification button press; never fails, errors become outcomes
    pub async fn handle_action(&self, notification_id: &str, action: ReminderAction) -> ActionOutcome {
        self.request(|reply| ReminderCommand::Action {
            notification_id: notification_id.to_string(),
            action,
            reply,
        })
        .await
        .unwrap_or_else(|e| ActionOutcome::failure(&e))
    }
}
