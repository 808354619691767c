use crate::config::NotificationConfig;
use crate::error::{EngineError, Result};
use bigdecimal::BigDecimal;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// 通知事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    QuoteReceived {
        organization_id: i64,
        supplier_request_id: i64,
        session_id: i64,
        quote_id: i64,
    },
    MatchNeedsReview {
        organization_id: i64,
        session_id: i64,
        partial: usize,
        extra: usize,
        missing: usize,
    },
    OrderCreated {
        organization_id: i64,
        order_id: i64,
        order_number: String,
        supplier_id: i64,
        total: BigDecimal,
    },
}

/// Fire-and-forget webhook fan-out. Delivery failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    webhooks: Arc<Vec<String>>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Upstream(format!("cannot build webhook client: {}", e)))?;
        Ok(Self {
            http,
            webhooks: Arc::new(config.webhook_urls.clone()),
        })
    }

    pub fn emit(&self, event: EngineEvent) {
        if self.webhooks.is_empty() {
            tracing::debug!("No webhooks configured, dropping event {:?}", event);
            return;
        }
        let http = self.http.clone();
        let webhooks = Arc::clone(&self.webhooks);
        tokio::spawn(async move {
            let sends = webhooks.iter().map(|url| http.post(url).json(&event).send());
            let outcomes = join_all(sends).await;
            for (url, outcome) in webhooks.iter().zip(outcomes) {
                match outcome {
                    Ok(resp) if resp.status().is_success() => {}
                    Ok(resp) => tracing::warn!("Webhook {} rejected event: HTTP {}", url, resp.status()),
                    Err(e) => tracing::warn!("Webhook {} unreachable: {}", url, e.without_url()),
                }
            }
        });
    }
}
