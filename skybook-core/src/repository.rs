use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus, Seat};

/// Transactional seat inventory access.
///
/// Implementations must serialise concurrent callers on the exact set of
/// seats they touch (row-level locking in the relational implementation)
/// and apply the expiry-aware takeability rule: a `RESERVED` seat whose
/// hold is older than the reservation window is reclaimable without any
/// background sweep.
#[async_trait]
pub trait SeatInventory: Send + Sync {
    /// Places a fresh hold on `seats` for `order_id`. Fails with
    /// `SeatNotExist` or `SeatNotAvailable` naming the offending seat;
    /// on failure no seat is touched.
    async fn reserve_seats(
        &self,
        flight_id: &str,
        seats: &[String],
        order_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;

    /// Atomically swaps the order's held seats for `new_seats`. The old
    /// seats are released before the new ones are acquired inside one
    /// transaction, so the new selection may overlap the old one.
    async fn update_seats(&self, order_id: &str, new_seats: &[String]) -> Result<(), StoreError>;

    /// Releases every seat held by `order_id` back to `AVAILABLE`.
    /// Idempotent.
    async fn release_seats(&self, order_id: &str) -> Result<(), StoreError>;

    /// Marks every seat held by `order_id` as `BOOKED`, retaining the
    /// ownership fields for audit. Idempotent.
    async fn confirm_seats(&self, order_id: &str) -> Result<(), StoreError>;

    /// All seats of a flight, ordered by seat number.
    async fn get_seats(&self, flight_id: &str) -> Result<Vec<Seat>, StoreError>;

    /// Seat numbers currently held by an order, ordered by seat number.
    async fn get_order_seats(&self, order_id: &str) -> Result<Vec<String>, StoreError>;

    /// Administrative: returns every seat of the flight to `AVAILABLE`.
    async fn reset_flight_seats(&self, flight_id: &str) -> Result<(), StoreError>;
}

/// Durable order rows and payment attempt log.
#[async_trait]
pub trait OrderRecords: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StoreError>;

    /// Advances the denormalised status column. `OrderNotFound` when no
    /// row matches, which callers treat as non-retryable: the order was
    /// administratively removed.
    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Updates the most recent payment row for `order_id`, or inserts a
    /// new one when none exists, preserving the attempt history while
    /// keeping the newest record addressable.
    async fn update_payment_record(
        &self,
        order_id: &str,
        payment_code: &str,
        status: PaymentStatus,
        transaction_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Administrative: deletes every order of a flight.
    async fn delete_orders_by_flight(&self, flight_id: &str) -> Result<(), StoreError>;
}
