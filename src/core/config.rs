//! # Configuration
//!
//! Environment-driven process config plus YAML reminder settings.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.2.0: Env overrides for snooze duration and queue interval
//! - 1.1.0: Optional reminders.yaml with validation
//! - 1.0.0: Initial env-based config

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of snoozes granted per reminder instance
pub const MAX_SNOOZES: u32 = 3;

/// Default delay before a snoozed reminder fires again (10 minutes)
pub const DEFAULT_SNOOZE_DURATION_SECS: u64 = 600;

/// Default queue polling interval
pub const DEFAULT_QUEUE_CHECK_INTERVAL_SECS: u64 = 30;

/// Upper bounds accepted by `ReminderSettings::validate`
pub const MAX_SNOOZE_DURATION_SECS: u64 = 24 * 3600;
pub const MAX_QUEUE_CHECK_INTERVAL_SECS: u64 = 3600;
pub const MAX_EXTERNAL_TIMEOUT_SECS: u64 = 300;
pub const MAX_ACK_RETENTION_HOURS: u64 = 24 * 365;

/// Process-level configuration read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    pub medication_api_url: String,
    pub user_id: Option<String>,
    pub reminders: ReminderSettings,
}

impl Config {
    /// Build config from environment variables (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self> {
        let medication_api_url = std::env::var("MEDICATION_API_URL")
            .map_err(|_| anyhow!("MEDICATION_API_URL must be set"))?;

        let settings_path = std::env::var("REMINDER_SETTINGS_PATH").ok();
        let mut reminders = match settings_path.as_deref() {
            Some(path) => ReminderSettings::load(path)?,
            None if std::path::Path::new("reminders.yaml").exists() => {
                ReminderSettings::load("reminders.yaml")?
            }
            None => ReminderSettings::default(),
        };

        if let Some(secs) = env_u64("SNOOZE_DURATION_SECS")? {
            reminders.snooze_duration_secs = secs;
        }
        if let Some(secs) = env_u64("QUEUE_CHECK_INTERVAL_SECS")? {
            reminders.queue_check_interval_secs = secs;
        }
        reminders.validate()?;

        Ok(Config {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "reminders.db".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            medication_api_url,
            user_id: std::env::var("REMINDER_USER_ID").ok().filter(|s| !s.is_empty()),
            reminders,
        })
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{name} must be a whole number of seconds")),
        Err(_) => Ok(None),
    }
}

/// Tunables for the reminder queue
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReminderSettings {
    #[serde(default = "default_snooze_duration")]
    pub snooze_duration_secs: u64,

    #[serde(default = "default_max_snoozes")]
    pub max_snoozes: u32,

    #[serde(default = "default_queue_check_interval")]
    pub queue_check_interval_secs: u64,

    /// Deadline for provider and notification surface calls
    #[serde(default = "default_external_timeout")]
    pub external_timeout_secs: u64,

    /// Acknowledgment records untouched for longer than this are pruned
    #[serde(default = "default_ack_retention")]
    pub ack_retention_hours: u64,
}

fn default_snooze_duration() -> u64 {
    DEFAULT_SNOOZE_DURATION_SECS
}

fn default_max_snoozes() -> u32 {
    MAX_SNOOZES
}

fn default_queue_check_interval() -> u64 {
    DEFAULT_QUEUE_CHECK_INTERVAL_SECS
}

fn default_external_timeout() -> u64 {
    10
}

fn default_ack_retention() -> u64 {
    48
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            snooze_duration_secs: default_snooze_duration(),
            max_snoozes: default_max_snoozes(),
            queue_check_interval_secs: default_queue_check_interval(),
            external_timeout_secs: default_external_timeout(),
            ack_retention_hours: default_ack_retention(),
        }
    }
}

impl ReminderSettings {
    /// Load settings from a YAML file
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reminder settings from {path}"))?;
        let settings = Self::from_yaml(&contents)?;
        info!("Loaded reminder settings from {path}");
        Ok(settings)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let settings: ReminderSettings = serde_yaml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        check_range(
            "snooze_duration_secs",
            self.snooze_duration_secs,
            1..=MAX_SNOOZE_DURATION_SECS,
        )?;
        check_range("max_snoozes", u64::from(self.max_snoozes), 1..=10)?;
        check_range(
            "queue_check_interval_secs",
            self.queue_check_interval_secs,
            1..=MAX_QUEUE_CHECK_INTERVAL_SECS,
        )?;
        check_range(
            "external_timeout_secs",
            self.external_timeout_secs,
            1..=MAX_EXTERNAL_TIMEOUT_SECS,
        )?;
        // Shorter than the prune interval would drop records for unanswered notifications
        check_range(
            "ack_retention_hours",
            self.ack_retention_hours,
            1..=MAX_ACK_RETENTION_HOURS,
        )?;
        Ok(())
    }

    pub fn snooze_duration(&self) -> Duration {
        Duration::from_secs(self.snooze_duration_secs)
    }

    pub fn queue_check_interval(&self) -> Duration {
        Duration::from_secs(self.queue_check_interval_secs)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn ack_retention(&self) -> chrono::Duration {
        i64::try_from(self.ack_retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }
}

fn check_range(name: &str, value: u64, allowed: std::ops::RangeInclusive<u64>) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(anyhow!(
            "{name} must be between {} and {}, got {value}",
            allowed.start(),
            allowed.end()
        ))
    }
}
