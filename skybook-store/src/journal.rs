use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use skybook_core::error::StoreError;
use skybook_core::journal::{BookingEvent, Checkpoint, Journal, JournalEntry};
use skybook_core::models::OrderStatus;

/// Relational orchestration journal. Appends take a per-order advisory
/// lock so sequence numbers are allocated without gaps even when the
/// orchestrator task and the façade write concurrently.
pub struct PgJournal {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    seq: i64,
    payload: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

impl EventRow {
    fn into_entry(self) -> Result<JournalEntry, StoreError> {
        let event: BookingEvent =
            serde_json::from_value(self.payload).map_err(StoreError::backend)?;
        Ok(JournalEntry {
            seq: self.seq,
            event,
            recorded_at: self.recorded_at,
        })
    }
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Journal for PgJournal {
    async fn append(
        &self,
        order_id: &str,
        event: &BookingEvent,
    ) -> Result<JournalEntry, StoreError> {
        let payload = serde_json::to_value(event).map_err(StoreError::backend)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(order_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        let row: EventRow = sqlx::query_as(
            r#"
            INSERT INTO booking_events (order_id, seq, kind, payload)
            VALUES (
                $1,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM booking_events WHERE order_id = $1),
                $2,
                $3
            )
            RETURNING seq, payload, recorded_at
            "#,
        )
        .bind(order_id)
        .bind(event.kind())
        .bind(&payload)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;

        row.into_entry()
    }

    async fn events_after(
        &self,
        order_id: &str,
        after: i64,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT seq, payload, recorded_at
            FROM booking_events
            WHERE order_id = $1 AND seq > $2
            ORDER BY seq
            "#,
        )
        .bind(order_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(EventRow::into_entry).collect()
    }

    async fn save_checkpoint(
        &self,
        order_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let state = serde_json::to_value(&checkpoint.state).map_err(StoreError::backend)?;

        sqlx::query(
            r#"
            INSERT INTO booking_checkpoints (order_id, state, seq, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (order_id) DO UPDATE SET
                state = EXCLUDED.state,
                seq = EXCLUDED.seq,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order_id)
        .bind(&state)
        .bind(checkpoint.seq)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }

    async fn load_checkpoint(&self, order_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let row: Option<(serde_json::Value, i64)> =
            sqlx::query_as("SELECT state, seq FROM booking_checkpoints WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::backend)?;

        match row {
            Some((state, seq)) => {
                let state = serde_json::from_value(state).map_err(StoreError::backend)?;
                Ok(Some(Checkpoint { state, seq }))
            }
            None => Ok(None),
        }
    }

    async fn running_orders(&self) -> Result<Vec<String>, StoreError> {
        let terminal: Vec<String> = [
            OrderStatus::Confirmed,
            OrderStatus::Failed,
            OrderStatus::Expired,
            OrderStatus::Cancelled,
        ]
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT order_id
            FROM booking_checkpoints
            WHERE NOT (state ->> 'status' = ANY($1))
            ORDER BY updated_at
            "#,
        )
        .bind(&terminal)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(ids)
    }
}
