//! # Feature: Medications
//!
//! Medication records as served by the health-tracking API, and the provider
//! seam the reminder pipeline uses to read and update them.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod client;

pub use client::HttpMedicationProvider;

use crate::core::error::{ReminderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A medication record. Fields the reminder pipeline does not use are kept in
/// `extra` so a write-back does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    pub name: String,

    /// Daily reminder times as "HH:MM"
    #[serde(default)]
    pub times: Vec<String>,

    #[serde(default)]
    pub user_id: String,

    #[serde(rename = "lastTaken", default, skip_serializing_if = "Option::is_none")]
    pub last_taken: Option<DateTime<Utc>>,

    #[serde(rename = "lastMissed", default, skip_serializing_if = "Option::is_none")]
    pub last_missed: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Medication {
    pub fn new(id: &str, user_id: &str, name: &str, times: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            times: times.iter().map(|t| t.to_string()).collect(),
            user_id: user_id.to_string(),
            last_taken: None,
            last_missed: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Read/write access to a user's medications
#[async_trait]
pub trait MedicationProvider: Send + Sync {
    async fn get_medications(&self, user_id: &str) -> Result<Vec<Medication>>;

    /// Replace the stored record with `patch` and return what the server kept
    async fn update_medication(
        &self,
        medication_id: &str,
        patch: &Medication,
        user_id: &str,
    ) -> Result<Medication>;

    /// Fetch one medication by id, `NotFound` if the user no longer has it
    async fn find_medication(&self, user_id: &str, medication_id: &str) -> Result<Medication> {
        self.get_medications(user_id)
            .await?
            .into_iter()
            .find(|m| m.id == medication_id)
            .ok_or_else(|| ReminderError::NotFound("Medication".to_string()))
    }
}
