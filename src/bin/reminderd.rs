use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use medreminder::core::Config;
use medreminder::database::Database;
use medreminder::features::medications::{HttpMedicationProvider, MedicationProvider};
use medreminder::features::reminders::{
    LogNotificationSurface, ReminderAction, ReminderHandle, ReminderService,
};

/// Schedule every medication the configured user has
async fn schedule_user_medications(
    provider: &HttpMedicationProvider,
    handle: &ReminderHandle,
    user_id: &str,
) {
    let medications = match provider.get_medications(user_id).await {
        Ok(medications) => medications,
        Err(e) => {
            error!("Failed to load medications for {user_id}: {e}");
            return;
        }
    };

    for medication in medications {
        let name = medication.name.clone();
        match handle.schedule_medication_reminder(medication).await {
            Ok(report) if report.is_complete() => {
                info!("⏰ Scheduled {} reminder(s) for {name}", report.scheduled.len())
            }
            Ok(report) => warn!(
                "Scheduled {} reminder(s) for {name}, rejected {:?}",
                report.scheduled.len(),
                report.rejected.iter().map(|(t, _)| t).collect::<Vec<_>>()
            ),
            Err(e) => error!("Failed to schedule {name}: {e}"),
        }
    }
}

/// Handle one console line: `taken|snooze|missed <notification_id>` or
/// `cancel <medication_id> <user_id>`
async fn handle_line(handle: &ReminderHandle, line: &str) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        ["cancel", medication_id, user_id] => {
            match handle
                .cancel_medication_notifications(medication_id, user_id)
                .await
            {
                Ok(removed) => info!("Cancelled {removed} pending reminder(s) for {medication_id}"),
                Err(e) => error!("Cancel failed: {e}"),
            }
        }
        [action, notification_id] => match action.parse::<ReminderAction>() {
            Ok(action) => {
                let outcome = handle.handle_action(notification_id, action).await;
                if outcome.success {
                    info!("✅ {}", outcome.message);
                } else {
                    warn!("❌ {}", outcome.message);
                }
            }
            Err(e) => warn!("{e}"),
        },
        _ => warn!("Unrecognized command: {line}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting medication reminder daemon...");

    let database = Database::new(&config.database_path).await?;
    let provider = Arc::new(HttpMedicationProvider::new(
        &config.medication_api_url,
        config.reminders.external_timeout(),
    )?);

    let service = Arc::new(ReminderService::new(
        Arc::new(database),
        Arc::new(LogNotificationSurface),
        provider.clone(),
        &config.reminders,
    )?);
    let pending = service.initialize().await;
    info!("📋 {pending} reminder(s) restored from the queue");

    let handle = service.clone().spawn_command_loop();

    match config.user_id.as_deref() {
        Some(user_id) => schedule_user_medications(&provider, &handle, user_id).await,
        None => info!("REMINDER_USER_ID not set, only restored reminders will fire"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&handle, line.trim()).await,
                Ok(None) => {
                    info!("Console closed, waiting for ctrl-c");
                    tokio::signal::ctrl_c().await?;
                    break;
                }
                Err(e) => {
                    error!("Failed to read console input: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down reminder daemon");
    service.shutdown();
    Ok(())
}
