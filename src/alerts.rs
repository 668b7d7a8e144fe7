// =============================================================================
// Outbound Alerts — fire-and-forget webhook for high-confidence setups
// =============================================================================
//
// Entities whose final score clears the configured threshold (with
// authoritative provenance) are POSTed to the alert webhook from a
// spawned task.  Failures are swallowed and debug-logged only: the alert
// path must never surface an error into the analysis pipeline.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::analysis::Entity;
use crate::runtime_config::RuntimeConfig;
use crate::types::Provenance;

/// Payload posted to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub id: String,
    pub symbol: String,
    pub score: f64,
    pub signal: String,
    pub price: f64,
    pub at: String,
}

/// Dispatches qualifying setups to the configured webhook.
pub struct AlertDispatcher {
    client: reqwest::Client,
    config: Arc<RwLock<RuntimeConfig>>,
}

impl AlertDispatcher {
    pub fn new(config: Arc<RwLock<RuntimeConfig>>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build reqwest client");
        Self { client, config }
    }

    /// Post an alert for `entity` if it qualifies.  Returns immediately;
    /// the POST runs in a spawned task and every failure is swallowed.
    pub fn maybe_alert(&self, entity: &Entity) {
        let (enabled, threshold, url) = {
            let config = self.config.read();
            (
                config.alerts_enabled,
                config.alert_score_threshold,
                config.alert_webhook_url.clone(),
            )
        };

        let url = match url {
            Some(u) if enabled => u,
            _ => return,
        };

        let score = match entity.score {
            Some(s) => s,
            None => return,
        };

        if !qualifies(score, threshold, entity.provenance) {
            return;
        }

        let payload = AlertPayload {
            id: Uuid::new_v4().to_string(),
            symbol: entity.symbol.clone(),
            score,
            signal: entity.signal.to_string(),
            price: entity.price,
            at: chrono::Utc::now().to_rfc3339(),
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) => {
                    debug!(symbol = %payload.symbol, status = %resp.status(), "alert posted");
                }
                Err(e) => {
                    // Swallowed on purpose: alerting must never become a
                    // user-visible error.
                    debug!(symbol = %payload.symbol, error = %e, "alert post failed");
                }
            }
        });
    }
}

/// Pure qualification rule: authoritative data and a score at or above
/// the threshold.
pub fn qualifies(score: f64, threshold: f64, provenance: Provenance) -> bool {
    provenance == Provenance::Authoritative && score >= threshold
}
