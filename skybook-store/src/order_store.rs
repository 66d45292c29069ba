use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use skybook_core::error::StoreError;
use skybook_core::models::{Order, OrderStatus, Payment, PaymentStatus};
use skybook_core::repository::OrderRecords;

/// Relational order rows and payment attempt log.
pub struct PgOrderStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    flight_id: String,
    user_id: String,
    status: String,
    workflow_id: String,
    run_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, StoreError> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))?;
        Ok(Order {
            order_id: self.order_id,
            flight_id: self.flight_id,
            user_id: self.user_id,
            status,
            workflow_id: self.workflow_id,
            run_id: self.run_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRecords for PgOrderStore {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, flight_id, user_id, status, workflow_id, run_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.flight_id)
        .bind(&order.user_id)
        .bind(order.status.as_str())
        .bind(&order.workflow_id)
        .bind(&order.run_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT order_id, flight_id, user_id, status, workflow_id, run_id, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(OrderRow::into_order).transpose()
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE order_id = $2",
        )
        .bind(status.as_str())
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound);
        }

        Ok(())
    }

    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, order_id, payment_code, transaction_id, status, error_message, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&payment.payment_id)
        .bind(&payment.order_id)
        .bind(&payment.payment_code)
        .bind(&payment.transaction_id)
        .bind(payment.status.as_str())
        .bind(&payment.error_message)
        .bind(payment.attempts)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }

    async fn update_payment_record(
        &self,
        order_id: &str,
        payment_code: &str,
        status: PaymentStatus,
        transaction_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        // Upsert-latest: refresh the newest payment row for the order,
        // inserting one when no attempt was recorded yet. The history of
        // older attempts is untouched.
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, transaction_id = $3, error_message = $4,
                attempts = attempts + 1, updated_at = NOW()
            WHERE payment_id = (
                SELECT payment_id FROM payments
                WHERE order_id = $1
                ORDER BY created_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(transaction_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO payments (payment_id, order_id, payment_code, transaction_id, status, error_message)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(order_id)
            .bind(payment_code)
            .bind(transaction_id)
            .bind(status.as_str())
            .bind(error_message)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        }

        Ok(())
    }

    async fn delete_orders_by_flight(&self, flight_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM orders WHERE flight_id = $1")
            .bind(flight_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        Ok(())
    }
}
