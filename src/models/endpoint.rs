use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// Endpoint Type Enum
// =============================================================================

/// Delivery channel of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    Email,
    Webhook,
    Chat,
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointType::Email => write!(f, "email"),
            EndpointType::Webhook => write!(f, "webhook"),
            EndpointType::Chat => write!(f, "chat"),
        }
    }
}

// =============================================================================
// Endpoint Model
// =============================================================================

/// Concrete destination attached to a rule (email address, webhook URL).
/// Written by the CRUD surface; read-only here.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Endpoint {
    pub endpoint_id: i64,
    pub rule_id: String,
    pub endpoint_type: EndpointType,
    pub value: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
