use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sentinel value matching any value of a categorical field.
pub const WILDCARD: &str = "*";

/// Per-tenant predicate over the three categorical alert fields.
///
/// Uniqueness: `(tenant_id, severity, source, name)`. `version` is the
/// optimistic-lock counter bumped by the CRUD surface on every write; it is
/// carried in rule-changed events so stale applies are detectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Rule {
    pub rule_id: String,
    pub tenant_id: String,
    pub severity: String,
    pub source: String,
    pub name: String,
    pub is_enabled: bool,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// True when every field is the wildcard sentinel.
    pub fn is_catch_all(&self) -> bool {
        self.severity == WILDCARD && self.source == WILDCARD && self.name == WILDCARD
    }
}
