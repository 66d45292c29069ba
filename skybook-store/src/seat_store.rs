use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use skybook_core::error::StoreError;
use skybook_core::models::{Seat, SeatStatus};
use skybook_core::repository::SeatInventory;

/// Relational seat inventory. Every mutating operation locks the target
/// rows with `SELECT ... FOR UPDATE` before any check or write, so
/// concurrent callers serialise on the exact seats they touch. Rows are
/// always locked in seat-number order to bound lock waits.
pub struct PgSeatStore {
    pool: PgPool,
    hold_window: Duration,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    seat_id: uuid::Uuid,
    flight_id: String,
    seat_number: String,
    status: String,
    reserved_by: Option<String>,
    user_id: Option<String>,
    reserved_at: Option<DateTime<Utc>>,
}

impl SeatRow {
    fn into_seat(self) -> Result<Seat, StoreError> {
        let status = self
            .status
            .parse::<SeatStatus>()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))?;
        Ok(Seat {
            seat_id: self.seat_id,
            flight_id: self.flight_id,
            seat_number: self.seat_number,
            status,
            reserved_by: self.reserved_by,
            user_id: self.user_id,
            reserved_at: self.reserved_at,
        })
    }
}

impl PgSeatStore {
    /// `hold_window` is the reservation timeout; holds older than it are
    /// treated as expired and may be taken over.
    pub fn new(pool: PgPool, hold_window: std::time::Duration) -> Self {
        let hold_window =
            Duration::from_std(hold_window).unwrap_or_else(|_| Duration::minutes(15));
        Self { pool, hold_window }
    }

    /// Lock-check-reserve sequence shared by `reserve_seats` and
    /// `update_seats`. Must run inside the caller's transaction.
    async fn lock_and_reserve(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        flight_id: &str,
        seats: &[String],
        order_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            r#"
            SELECT seat_id, flight_id, seat_number, status, reserved_by, user_id, reserved_at
            FROM seats
            WHERE flight_id = $1 AND seat_number = ANY($2)
            ORDER BY seat_number
            FOR UPDATE
            "#,
        )
        .bind(flight_id)
        .bind(seats)
        .fetch_all(&mut **tx)
        .await
        .map_err(StoreError::backend)?;

        let found: HashSet<&str> = rows.iter().map(|r| r.seat_number.as_str()).collect();
        for seat in seats {
            if !found.contains(seat.as_str()) {
                return Err(StoreError::SeatNotExist { seat: seat.clone() });
            }
        }

        let cutoff = Utc::now() - self.hold_window;
        for row in &rows {
            if !takeable(row, order_id, cutoff) {
                return Err(StoreError::SeatNotAvailable {
                    seat: row.seat_number.clone(),
                });
            }
        }

        sqlx::query(
            r#"
            UPDATE seats
            SET status = $1, reserved_by = $2, user_id = $3, reserved_at = NOW()
            WHERE flight_id = $4 AND seat_number = ANY($5)
            "#,
        )
        .bind(SeatStatus::Reserved.as_str())
        .bind(order_id)
        .bind(user_id)
        .bind(flight_id)
        .bind(seats)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }
}

fn takeable(row: &SeatRow, order_id: &str, cutoff: DateTime<Utc>) -> bool {
    match row.status.as_str() {
        "AVAILABLE" => true,
        "RESERVED" => {
            // A stale hold is reclaimable without a background sweep; an
            // order may also re-acquire its own live hold, which keeps
            // activity retries idempotent.
            row.reserved_by.as_deref() == Some(order_id)
                || row.reserved_at.map(|at| at < cutoff).unwrap_or(false)
        }
        _ => false,
    }
}

#[async_trait]
impl SeatInventory for PgSeatStore {
    async fn reserve_seats(
        &self,
        flight_id: &str,
        seats: &[String],
        order_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        self.lock_and_reserve(&mut tx, flight_id, seats, order_id, user_id)
            .await?;
        tx.commit().await.map_err(StoreError::backend)?;

        tracing::info!(order_id, flight_id, ?seats, "seats reserved");
        Ok(())
    }

    async fn update_seats(&self, order_id: &str, new_seats: &[String]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let owner: Option<(String, String)> =
            sqlx::query_as("SELECT flight_id, user_id FROM orders WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
        let (flight_id, user_id) = owner.ok_or(StoreError::OrderNotFound)?;

        // Releasing first lets the new selection overlap the old one;
        // the surrounding transaction makes the swap all-or-nothing.
        sqlx::query(
            r#"
            UPDATE seats
            SET status = $1, reserved_by = NULL, user_id = NULL, reserved_at = NULL
            WHERE reserved_by = $2
            "#,
        )
        .bind(SeatStatus::Available.as_str())
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        self.lock_and_reserve(&mut tx, &flight_id, new_seats, order_id, &user_id)
            .await?;
        tx.commit().await.map_err(StoreError::backend)?;

        tracing::info!(order_id, ?new_seats, "seat selection updated");
        Ok(())
    }

    async fn release_seats(&self, order_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE seats
            SET status = $1, reserved_by = NULL, user_id = NULL, reserved_at = NULL
            WHERE reserved_by = $2
            "#,
        )
        .bind(SeatStatus::Available.as_str())
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        tracing::info!(order_id, "seats released");
        Ok(())
    }

    async fn confirm_seats(&self, order_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE seats SET status = $1 WHERE reserved_by = $2")
            .bind(SeatStatus::Booked.as_str())
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        tracing::info!(order_id, "seats confirmed");
        Ok(())
    }

    async fn get_seats(&self, flight_id: &str) -> Result<Vec<Seat>, StoreError> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            r#"
            SELECT seat_id, flight_id, seat_number, status, reserved_by, user_id, reserved_at
            FROM seats
            WHERE flight_id = $1
            ORDER BY seat_number
            "#,
        )
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(SeatRow::into_seat).collect()
    }

    async fn get_order_seats(&self, order_id: &str) -> Result<Vec<String>, StoreError> {
        let seats: Vec<String> = sqlx::query_scalar(
            "SELECT seat_number FROM seats WHERE reserved_by = $1 ORDER BY seat_number",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(seats)
    }

    async fn reset_flight_seats(&self, flight_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE seats
            SET status = $1, reserved_by = NULL, user_id = NULL, reserved_at = NULL
            WHERE flight_id = $2
            "#,
        )
        .bind(SeatStatus::Available.as_str())
        .bind(flight_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        tracing::info!(flight_id, "flight seats reset");
        Ok(())
    }
}
