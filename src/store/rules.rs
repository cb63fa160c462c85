//! Read-only projection of the rule table.

use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::models::Rule;

pub struct RuleStore;

impl RuleStore {
    /// Reads every enabled rule inside one REPEATABLE READ transaction so a
    /// full rebuild sees a consistent state of the relational store.
    pub async fn all_enabled(pool: &PgPool) -> PipelineResult<Vec<Rule>> {
        let mut tx = pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let rules = sqlx::query_as::<_, Rule>(
            r#"
            SELECT rule_id, tenant_id, severity, source, name, is_enabled,
                   version, updated_at
            FROM rules
            WHERE is_enabled = TRUE
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(rules)
    }

    /// Fetches one rule by id for an incremental apply. Returns `None` when
    /// the rule was deleted underneath the event stream.
    pub async fn get_by_id(pool: &PgPool, rule_id: &str) -> PipelineResult<Option<Rule>> {
        let rule = sqlx::query_as::<_, Rule>(
            r#"
            SELECT rule_id, tenant_id, severity, source, name, is_enabled,
                   version, updated_at
            FROM rules
            WHERE rule_id = $1
            "#,
        )
        .bind(rule_id)
        .fetch_optional(pool)
        .await?;

        Ok(rule)
    }
}
