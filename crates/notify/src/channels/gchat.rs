//! Google Chat webhook channel.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Environment variable holding the webhook URL.
const ENV_WEBHOOK_URL: &str = "GCHAT_WEBHOOK_URL";

/// Sends card messages to a Google Chat incoming webhook.
pub struct GChatChannel {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl GChatChannel {
    #[must_use]
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.filter(|url| !url.is_empty()),
        }
    }

    /// Create a channel from `GCHAT_WEBHOOK_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::var(ENV_WEBHOOK_URL).ok())
    }

    fn card_payload(event: &NotifyEvent) -> serde_json::Value {
        let widgets = match event {
            NotifyEvent::ExceptionCluster {
                cluster_id,
                service_name,
                exception_message,
                occurrences,
                severity,
                ..
            } => vec![
                kv("Service", service_name),
                kv("Cluster", cluster_id),
                kv("Severity", severity.as_str()),
                kv("Occurrences", &occurrences.to_string()),
                kv("Message", exception_message),
            ],
            NotifyEvent::RcaGenerated {
                cluster_id,
                service_name,
                root_cause_file,
                root_cause_symbol,
                confidence,
                ..
            } => vec![
                kv("Service", service_name),
                kv("Cluster", cluster_id),
                kv("Root cause", &format!("{root_cause_file}:{root_cause_symbol}")),
                kv("Confidence", &format!("{confidence:.2}")),
            ],
        };

        json!({
            "cardsV2": [{
                "card": {
                    "header": { "title": event.title() },
                    "sections": [{ "widgets": widgets }]
                }
            }]
        })
    }
}

fn kv(label: &str, value: &str) -> serde_json::Value {
    json!({ "decoratedText": { "topLabel": label, "text": value } })
}

#[async_trait]
impl NotifyChannel for GChatChannel {
    fn name(&self) -> &'static str {
        "gchat"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let Some(url) = &self.webhook_url else {
            return Err(ChannelError::NotConfigured("gchat webhook URL".into()));
        };

        let response = self
            .client
            .post(url)
            .json(&Self::card_payload(event))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(ChannelError::Other(format!(
                "webhook answered {status}"
            )));
        }
        debug!(title = %event.title(), "gchat card sent");
        Ok(())
    }
}
