//! Wire schema for the pipeline topics.
//!
//! Every payload carries a `schema_version` field; decoding rejects versions
//! this build does not understand so a half-upgraded fleet fails loudly
//! instead of misreading records. Payloads are parsed into typed records at
//! the consumer edge; untyped maps never travel further inward.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// Wire schema version stamped on every published payload.
pub const SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Rule change actions
// =============================================================================

/// Action carried by a rule-changed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    Created,
    Updated,
    Deleted,
    Disabled,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Created => write!(f, "CREATED"),
            RuleAction::Updated => write!(f, "UPDATED"),
            RuleAction::Deleted => write!(f, "DELETED"),
            RuleAction::Disabled => write!(f, "DISABLED"),
        }
    }
}

// =============================================================================
// Topic payloads
// =============================================================================

/// Incoming alert, published by producers to the alerts topic.
/// Keyed by `alert_id`; immutable after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,
    pub event_ts: DateTime<Utc>,
    pub severity: String,
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
    pub schema_version: u32,
}

/// One record per `(alert, tenant)` pair with at least one matching rule.
/// Keyed by `tenant_id` so a tenant's notifications stay ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEvent {
    pub alert_id: String,
    pub tenant_id: String,
    pub rule_ids: Vec<String>,
    pub severity: String,
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
    pub event_ts: DateTime<Utc>,
    pub schema_version: u32,
}

/// Signal that a freshly created notification is eligible for dispatch.
/// Keyed by `notification_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyEvent {
    pub notification_id: Uuid,
    pub tenant_id: String,
    pub alert_id: String,
    pub schema_version: u32,
}

/// Rule CRUD change observed by the snapshot builder and the matcher's
/// hot-reload subscription. Keyed by `rule_id` so per-rule order holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChangedEvent {
    pub rule_id: String,
    pub tenant_id: String,
    pub action: RuleAction,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u32,
}

// =============================================================================
// Encode / decode
// =============================================================================

fn check_schema(version: u32) -> PipelineResult<()> {
    if version == SCHEMA_VERSION {
        Ok(())
    } else {
        Err(PipelineError::UnknownSchema(version))
    }
}

impl AlertEvent {
    /// Serializes for publication.
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a consumed payload, rejecting unknown schema versions.
    pub fn decode(payload: &[u8]) -> PipelineResult<Self> {
        let event: Self = serde_json::from_slice(payload)?;
        check_schema(event.schema_version)?;
        Ok(event)
    }
}

impl MatchedEvent {
    /// Serializes for publication.
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a consumed payload, rejecting unknown schema versions.
    pub fn decode(payload: &[u8]) -> PipelineResult<Self> {
        let event: Self = serde_json::from_slice(payload)?;
        check_schema(event.schema_version)?;
        Ok(event)
    }
}

impl ReadyEvent {
    /// Serializes for publication.
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a consumed payload, rejecting unknown schema versions.
    pub fn decode(payload: &[u8]) -> PipelineResult<Self> {
        let event: Self = serde_json::from_slice(payload)?;
        check_schema(event.schema_version)?;
        Ok(event)
    }
}

impl RuleChangedEvent {
    /// Serializes for publication.
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a consumed payload, rejecting unknown schema versions.
    pub fn decode(payload: &[u8]) -> PipelineResult<Self> {
        let event: Self = serde_json::from_slice(payload)?;
        check_schema(event.schema_version)?;
        Ok(event)
    }
}
