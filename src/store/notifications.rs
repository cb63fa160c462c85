//! Notification rows: the idempotency boundary and the dispatch ledger.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{NewNotification, Notification, NotificationStatus};

pub struct NotificationStore;

impl NotificationStore {
    /// Inserts a notification unless one already exists for the same
    /// `(tenant_id, alert_id)`.
    ///
    /// Exactly one of two outcomes: `Some(id)` when a new row was created,
    /// `None` when the uniqueness constraint matched a pre-existing row.
    /// This is what turns at-least-once delivery of matched events into
    /// exactly-once notification creation.
    pub async fn insert_if_absent(
        pool: &PgPool,
        input: &NewNotification,
    ) -> PipelineResult<Option<Uuid>> {
        let notification_id = Uuid::new_v4();

        let created: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO notifications (
                notification_id, tenant_id, alert_id,
                severity, source, name, context, rule_ids, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'received')
            ON CONFLICT (tenant_id, alert_id) DO NOTHING
            RETURNING notification_id
            "#,
        )
        .bind(notification_id)
        .bind(&input.tenant_id)
        .bind(&input.alert_id)
        .bind(&input.severity)
        .bind(&input.source)
        .bind(&input.name)
        .bind(&input.context)
        .bind(&input.rule_ids)
        .fetch_optional(pool)
        .await?;

        Ok(created.map(|(id,)| id))
    }

    /// Fetches a notification by id.
    pub async fn get_by_id(
        pool: &PgPool,
        notification_id: Uuid,
    ) -> PipelineResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            SELECT notification_id, tenant_id, alert_id, severity, source, name,
                   context, rule_ids, status, created_at, updated_at
            FROM notifications
            WHERE notification_id = $1
            "#,
        )
        .bind(notification_id)
        .fetch_optional(pool)
        .await?;

        Ok(notification)
    }

    /// Records the terminal dispatch outcome.
    pub async fn set_status(
        pool: &PgPool,
        notification_id: Uuid,
        status: NotificationStatus,
    ) -> PipelineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2, updated_at = NOW()
            WHERE notification_id = $1
            "#,
        )
        .bind(notification_id)
        .bind(status)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Internal(format!(
                "notification {} vanished before status update",
                notification_id
            )));
        }

        Ok(())
    }
}
