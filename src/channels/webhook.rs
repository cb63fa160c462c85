//! Webhook channel.
//!
//! POSTs the notification as JSON to the endpoint URL and treats any 2xx as
//! delivered. When a signing secret is configured, each request carries a
//! hex HMAC-SHA256 signature header computed from the timestamp and the
//! exact request body.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{classify_status, classify_transport, ChannelSender, NotificationPayload, SendError};

/// HTTP POST sender; one instance serves every webhook endpoint.
pub struct WebhookSender {
    client: reqwest::Client,
    secret: Option<String>,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client, secret: Option<String>) -> Self {
        Self { client, secret }
    }

    /// Hex HMAC-SHA256 over the timestamp and raw body, joined by a dot.
    /// Receivers recompute it to verify origin and freshness. `None` when
    /// no signing secret is configured.
    fn sign(&self, timestamp: &str, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        // new_from_slice accepts keys of any length; ok() keeps the
        // request unsigned rather than failing the delivery.
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    fn validate_url(endpoint_value: &str) -> Result<(), SendError> {
        let parsed = url::Url::parse(endpoint_value)
            .map_err(|_| SendError::Permanent(format!("invalid webhook URL '{}'", endpoint_value)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SendError::Permanent(format!(
                "webhook URL '{}' must use HTTP or HTTPS",
                endpoint_value
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    async fn send(
        &self,
        endpoint_value: &str,
        payload: &NotificationPayload,
    ) -> Result<(), SendError> {
        Self::validate_url(endpoint_value)?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| SendError::Permanent(format!("failed to serialize payload: {}", e)))?;
        let timestamp = Utc::now().timestamp().to_string();

        let mut request = self
            .client
            .post(endpoint_value)
            .header("Content-Type", "application/json")
            .header("X-Alertpipe-Timestamp", &timestamp)
            .header(
                "X-Alertpipe-Notification-ID",
                payload.notification_id.to_string(),
            );

        if let Some(signature) = self.sign(&timestamp, &body) {
            request = request.header("X-Alertpipe-Signature", format!("sha256={}", signature));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body)?;

        log::debug!("Webhook delivered to {}", endpoint_value);
        Ok(())
    }
}
