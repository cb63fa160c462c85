//! Delivery channel senders.
//!
//! Each channel implements [`ChannelSender`] and classifies its own failures
//! as transient (worth retrying) or permanent (not). Senders are pure I/O
//! adapters: they never touch the database, and the registry built at startup
//! is the only place a channel type maps to code; adding a channel is a
//! registration, not a code-path edit.

pub mod chat;
pub mod email;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ChannelConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{EndpointType, Notification};

pub use chat::ChatSender;
pub use email::EmailSender;
pub use webhook::WebhookSender;

// =============================================================================
// Send errors
// =============================================================================

/// Outcome classification for a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Timeouts, 5xx, throttling, connection resets. Retryable.
    #[error("transient send failure: {0}")]
    Transient(String),

    /// Validation failures, malformed addresses, rejected recipients.
    /// Retrying cannot help.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }
}

/// Shared HTTP status classification for the webhook-shaped channels.
/// 2xx is success; throttling and server-side errors are transient.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> Result<(), SendError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    };

    if status.is_server_error()
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
    {
        Err(SendError::Transient(detail))
    } else {
        Err(SendError::Permanent(detail))
    }
}

/// Shared transport-level classification for reqwest failures.
pub(crate) fn classify_transport(e: &reqwest::Error) -> SendError {
    if e.is_builder() {
        SendError::Permanent(format!("request build failed: {}", e))
    } else if e.is_timeout() {
        SendError::Transient("request timed out".to_string())
    } else if e.is_connect() {
        SendError::Transient("connection failed".to_string())
    } else {
        SendError::Transient(format!("request failed: {}", e))
    }
}

// =============================================================================
// Delivery payload
// =============================================================================

/// What a sender formats and delivers: the notification row minus its
/// dispatch bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub notification_id: Uuid,
    pub tenant_id: String,
    pub alert_id: String,
    pub severity: String,
    pub source: String,
    pub name: String,
    pub context: serde_json::Value,
    pub rule_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationPayload {
    fn from(notification: &Notification) -> Self {
        Self {
            notification_id: notification.notification_id,
            tenant_id: notification.tenant_id.clone(),
            alert_id: notification.alert_id.clone(),
            severity: notification.severity.clone(),
            source: notification.source.clone(),
            name: notification.name.clone(),
            context: notification.context.clone(),
            rule_ids: notification.rule_ids.clone(),
            created_at: notification.created_at,
        }
    }
}

impl NotificationPayload {
    /// One-line summary used in subjects and chat headlines.
    pub fn headline(&self) -> String {
        format!("[{}] {}/{}", self.severity, self.source, self.name)
    }
}

// =============================================================================
// Channel sender trait and registry
// =============================================================================

/// One delivery protocol (Strategy pattern).
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Delivers `payload` to a single endpoint value (an address or URL).
    async fn send(&self, endpoint_value: &str, payload: &NotificationPayload)
        -> Result<(), SendError>;
}

/// Mapping from endpoint type to its sender, built once at startup.
pub struct ChannelRegistry {
    senders: HashMap<EndpointType, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    /// Registry with no channels; destinations of any type are undeliverable.
    pub fn empty() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    /// The standard production registry: email, webhook and chat.
    pub fn standard(config: &ChannelConfig) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self::empty()
            .with_sender(
                EndpointType::Email,
                Arc::new(EmailSender::new(config.smtp.clone())),
            )
            .with_sender(
                EndpointType::Webhook,
                Arc::new(WebhookSender::new(
                    http.clone(),
                    config.webhook_secret.clone(),
                )),
            )
            .with_sender(EndpointType::Chat, Arc::new(ChatSender::new(http))))
    }

    /// Registers (or replaces) the sender for one endpoint type.
    pub fn with_sender(mut self, endpoint_type: EndpointType, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(endpoint_type, sender);
        self
    }

    /// Looks up the sender for an endpoint type.
    pub fn get(&self, endpoint_type: EndpointType) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&endpoint_type).cloned()
    }
}
