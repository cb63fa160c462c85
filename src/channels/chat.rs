//! Chat channel.
//!
//! Posts provider-style JSON (`{"text": ...}` plus attachment fields the
//! common chat webhooks accept) to the endpoint URL. Success is any 2xx.

use async_trait::async_trait;
use serde_json::json;

use super::{classify_status, classify_transport, ChannelSender, NotificationPayload, SendError};

/// Chat-webhook sender; one instance serves every chat endpoint.
pub struct ChatSender {
    client: reqwest::Client,
}

impl ChatSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Formats the provider JSON body.
    fn format_message(payload: &NotificationPayload) -> serde_json::Value {
        let severity_emoji = match payload.severity.to_ascii_lowercase().as_str() {
            "critical" | "fatal" => ":rotating_light:",
            "high" | "error" => ":x:",
            "medium" | "warning" => ":warning:",
            "low" | "info" => ":information_source:",
            _ => ":bell:",
        };

        json!({
            "text": format!("{} {}", severity_emoji, payload.headline()),
            "attachments": [
                {
                    "fields": [
                        { "title": "Alert", "value": payload.alert_id, "short": true },
                        { "title": "Tenant", "value": payload.tenant_id, "short": true },
                        { "title": "Rules", "value": payload.rule_ids.join(", "), "short": false }
                    ],
                    "ts": payload.created_at.timestamp()
                }
            ]
        })
    }
}

#[async_trait]
impl ChannelSender for ChatSender {
    async fn send(
        &self,
        endpoint_value: &str,
        payload: &NotificationPayload,
    ) -> Result<(), SendError> {
        let parsed = url::Url::parse(endpoint_value)
            .map_err(|_| SendError::Permanent(format!("invalid chat webhook URL '{}'", endpoint_value)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SendError::Permanent(format!(
                "chat webhook URL '{}' must use HTTP or HTTPS",
                endpoint_value
            )));
        }

        let body = Self::format_message(payload);

        let response = self
            .client
            .post(endpoint_value)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        classify_status(status, &text)?;

        log::debug!("Chat message delivered to {}", endpoint_value);
        Ok(())
    }
}
