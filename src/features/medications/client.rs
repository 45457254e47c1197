//! HTTP client for the medication endpoints of the health-tracking API

use super::{Medication, MedicationProvider};
use crate::core::error::{ReminderError, Result};
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

pub struct HttpMedicationProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMedicationProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("medreminder/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn medications_url(&self, user_id: &str) -> String {
        format!("{}/api/medications/{}", self.base_url, user_id)
    }

    fn medication_url(&self, medication_id: &str) -> String {
        format!("{}/api/medications/{}", self.base_url, medication_id)
    }

    /// Turn a non-2xx response into an error carrying the server's message
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let detail = body
            .get("message")
            .or_else(|| body.get("detail"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));

        Err(ReminderError::ExternalService(detail))
    }
}

fn request_error(e: reqwest::Error) -> ReminderError {
    if e.is_timeout() {
        ReminderError::ExternalService("Medication API request timed out".to_string())
    } else if e.is_connect() {
        ReminderError::ExternalService("Could not connect to the medication API".to_string())
    } else {
        ReminderError::ExternalService(format!("HTTP request failed: {e}"))
    }
}

#[async_trait]
impl MedicationProvider for HttpMedicationProvider {
    async fn get_medications(&self, user_id: &str) -> Result<Vec<Medication>> {
        let url = self.medications_url(user_id);
        debug!("GET {url}");

        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<Vec<Medication>>().await?)
    }

    async fn update_medication(
        &self,
        medication_id: &str,
        patch: &Medication,
        user_id: &str,
    ) -> Result<Medication> {
        let url = self.medication_url(medication_id);
        debug!("PUT {url} for user {user_id}");

        let response = self
            .client
            .put(&url)
            .query(&[("user_id", user_id)])
            .json(patch)
            .send()
            .await
            .map_err(request_error)?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<Medication>().await?)
    }
}
