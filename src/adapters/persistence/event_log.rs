use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::event_log::{EventLogEntry, EventLogRepoTrait},
};

fn row_to_entry(row: &sqlx::postgres::PgRow) -> EventLogEntry {
    EventLogEntry {
        id: row.get("id"),
        event_id: row.get("event_id"),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        signature_valid: row.get("signature_valid"),
        processed: row.get("processed"),
        created_at: row.get("created_at"),
        processed_at: row.get("processed_at"),
    }
}

const SELECT_COLS: &str =
    "id, event_id, event_type, payload, signature_valid, processed, created_at, processed_at";

#[async_trait]
impl EventLogRepoTrait for PostgresPersistence {
    async fn insert_if_absent(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &JsonValue,
        signature_valid: bool,
    ) -> AppResult<(EventLogEntry, bool)> {
        // The unique index on event_id settles concurrent deliveries.
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO stripe_event_logs (id, event_id, event_type, payload, signature_valid)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .bind(signature_valid)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        if let Some(row) = inserted {
            return Ok((row_to_entry(&row), true));
        }

        let existing = self
            .get_by_event_id(event_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Event log row {} vanished", event_id)))?;
        Ok((existing, false))
    }

    async fn mark_processed(&self, event_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stripe_event_logs
            SET processed = TRUE, processed_at = CURRENT_TIMESTAMP
            WHERE event_id = $1 AND processed = FALSE
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_event_id(&self, event_id: &str) -> AppResult<Option<EventLogEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM stripe_event_logs WHERE event_id = $1",
            SELECT_COLS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_entry))
    }
}
