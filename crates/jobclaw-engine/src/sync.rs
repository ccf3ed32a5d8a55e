//! Status-sync webhook — best-effort notification of contact status
//! changes to an external system (e.g. the dashboard's sheet sync).
//!
//! Callers ignore the result beyond logging it; a sync failure must never
//! roll back a committed transition.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use jobclaw_core::config::SyncConfig;
use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::traits::StatusSync;
use jobclaw_core::types::{ContactStatus, ReferenceDates};

/// POSTs status changes to a configured webhook. An empty URL disables the
/// hook entirely.
pub struct WebhookStatusSync {
    url: String,
    client: reqwest::Client,
}

impl WebhookStatusSync {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            url: config.webhook_url.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StatusSync for WebhookStatusSync {
    async fn notify(
        &self,
        user_id: &str,
        contact_id: &str,
        status: ContactStatus,
        reference_dates: &ReferenceDates,
    ) -> Result<()> {
        if self.url.is_empty() {
            return Ok(());
        }

        let payload = json!({
            "user_id": user_id,
            "contact_id": contact_id,
            "status": status.as_str(),
            "reference_dates": reference_dates,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| JobClawError::Sync(format!("Webhook POST: {e}")))?;

        if !resp.status().is_success() {
            return Err(JobClawError::Sync(format!(
                "Webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
