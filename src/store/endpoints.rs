//! Read-only projection of the endpoint table.

use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::models::Endpoint;

pub struct EndpointStore;

impl EndpointStore {
    /// All enabled endpoints attached to any of the given rules.
    ///
    /// The caller deduplicates on `(type, value)`; the same address often
    /// backs several rules matched by one alert.
    pub async fn enabled_for_rules(
        pool: &PgPool,
        rule_ids: &[String],
    ) -> PipelineResult<Vec<Endpoint>> {
        if rule_ids.is_empty() {
            return Ok(Vec::new());
        }

        let endpoints = sqlx::query_as::<_, Endpoint>(
            r#"
            SELECT endpoint_id, rule_id, endpoint_type, value, is_enabled,
                   created_at, updated_at
            FROM endpoints
            WHERE rule_id = ANY($1) AND is_enabled = TRUE
            "#,
        )
        .bind(rule_ids)
        .fetch_all(pool)
        .await?;

        Ok(endpoints)
    }
}
