//! Reminder entries and the validated time-of-day they fire at

use crate::core::error::{ReminderError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid time regex"))
}

/// A wall-clock time of day in 24-hour "HH:MM" form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 {
            return Err(ReminderError::validation(
                format!("{hour}:{minute:02}"),
                "hour must be between 0 and 23",
            ));
        }
        if minute > 59 {
            return Err(ReminderError::validation(
                format!("{hour}:{minute:02}"),
                "minute must be between 0 and 59",
            ));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let caps = time_pattern()
            .captures(trimmed)
            .ok_or_else(|| ReminderError::validation(s, "expected HH:MM"))?;

        let hour: u32 = caps[1]
            .parse()
            .map_err(|_| ReminderError::validation(s, "hour is not a number"))?;
        let minute: u32 = caps[2]
            .parse()
            .map_err(|_| ReminderError::validation(s, "minute is not a number"))?;

        TimeOfDay::new(hour, minute).map_err(|e| match e {
            ReminderError::Validation { reason, .. } => ReminderError::validation(s, reason),
            other => other,
        })
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A scheduled, undelivered notification for one medication and time of day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEntry {
    pub medication_id: String,
    pub user_id: String,
    pub medication_name: String,
    pub time_of_day: TimeOfDay,
    pub scheduled_at: DateTime<Utc>,
    pub is_snooze_instance: bool,
    /// 0 for the daily reminder, n for the n-th snooze of it
    pub snooze_ordinal: u32,
}

impl ReminderEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    pub fn matches_slot(&self, medication_id: &str, time_of_day: TimeOfDay) -> bool {
        self.medication_id == medication_id && self.time_of_day == time_of_day
    }

    pub fn belongs_to(&self, medication_id: &str, user_id: &str) -> bool {
        self.medication_id == medication_id && self.user_id == user_id
    }
}
