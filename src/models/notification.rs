use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Notification Status Enum
// =============================================================================

/// Lifecycle of a notification row.
///
/// Born as `Received` by the idempotent insert; moves to `Sent` or `Failed`
/// exactly once, written by the dispatcher. Rows are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Received,
    Sent,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Received => write!(f, "received"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Notification Model
// =============================================================================

/// Durable, deduplicated per-`(tenant, alert)` delivery artifact.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub notification_id: Uuid,
    pub tenant_id: String,
    pub alert_id: String,
    pub severity: String,
    pub source: String,
    pub name: String,
    pub context: serde_json::Value,
    pub rule_ids: Vec<String>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the idempotent create path.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub tenant_id: String,
    pub alert_id: String,
    pub severity: String,
    pub source: String,
    pub name: String,
    pub context: serde_json::Value,
    pub rule_ids: Vec<String>,
}
