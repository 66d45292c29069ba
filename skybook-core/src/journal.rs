use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{BookingState, OrderStatus};

/// An asynchronous input delivered into an orchestrator's mailbox.
/// Signals are journaled before delivery, so they survive restarts and
/// are redelivered at least once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "signal", content = "payload", rename_all = "camelCase")]
pub enum Signal {
    UpdateSeats(Vec<String>),
    SubmitPayment(String),
    CancelOrder,
}

/// One externally observable orchestration step. The journal of these
/// events is the durable source of truth for an order's orchestration;
/// `BookingState` is reconstructed by folding them in sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingEvent {
    Started {
        run_id: String,
        flight_id: String,
        user_id: String,
        seats: Vec<String>,
    },
    SeatsReserved,
    SeatsUpdated {
        seats: Vec<String>,
    },
    SignalReceived {
        signal: Signal,
    },
    PaymentStarted {
        payment_code: String,
    },
    PaymentSucceeded {
        transaction_id: String,
    },
    PaymentFailed {
        error: String,
    },
    Confirmed,
    Cancelled,
    Expired,
    Failed {
        reason: String,
    },
    /// A compensating release failed; the orchestration ends in error so
    /// operators can see the undischarged hold.
    ReleaseFailed {
        error: String,
    },
}

impl BookingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BookingEvent::Started { .. } => "started",
            BookingEvent::SeatsReserved => "seats_reserved",
            BookingEvent::SeatsUpdated { .. } => "seats_updated",
            BookingEvent::SignalReceived { .. } => "signal_received",
            BookingEvent::PaymentStarted { .. } => "payment_started",
            BookingEvent::PaymentSucceeded { .. } => "payment_succeeded",
            BookingEvent::PaymentFailed { .. } => "payment_failed",
            BookingEvent::Confirmed => "confirmed",
            BookingEvent::Cancelled => "cancelled",
            BookingEvent::Expired => "expired",
            BookingEvent::Failed { .. } => "failed",
            BookingEvent::ReleaseFailed { .. } => "release_failed",
        }
    }

}

impl BookingState {
    /// Starts a fresh state from the `Started` event's payload.
    pub fn from_start(
        order_id: &str,
        run_id: &str,
        flight_id: &str,
        user_id: &str,
        seats: &[String],
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.to_string(),
            run_id: run_id.to_string(),
            flight_id: flight_id.to_string(),
            user_id: user_id.to_string(),
            seats: seats.to_vec(),
            status: OrderStatus::Created,
            reservation_start_at: at,
        }
    }

    /// Folds one journaled event into the state. `at` is the journal's
    /// record timestamp, which serves as the orchestration's logical
    /// clock.
    pub fn apply(&mut self, event: &BookingEvent, at: DateTime<Utc>) {
        match event {
            BookingEvent::Started {
                run_id,
                flight_id,
                user_id,
                seats,
            } => {
                self.run_id = run_id.clone();
                self.flight_id = flight_id.clone();
                self.user_id = user_id.clone();
                self.seats = seats.clone();
                self.status = OrderStatus::Created;
                self.reservation_start_at = at;
            }
            BookingEvent::SeatsReserved => {
                self.status = OrderStatus::SeatsReserved;
                self.reservation_start_at = at;
            }
            BookingEvent::SeatsUpdated { seats } => {
                self.seats = seats.clone();
                self.reservation_start_at = at;
            }
            BookingEvent::PaymentStarted { .. } => {
                self.status = OrderStatus::PaymentPending;
            }
            BookingEvent::Confirmed => {
                self.status = OrderStatus::Confirmed;
            }
            BookingEvent::Cancelled => {
                self.status = OrderStatus::Cancelled;
            }
            BookingEvent::Expired => {
                self.status = OrderStatus::Expired;
            }
            BookingEvent::Failed { .. } => {
                self.status = OrderStatus::Failed;
            }
            BookingEvent::SignalReceived { .. }
            | BookingEvent::PaymentSucceeded { .. }
            | BookingEvent::PaymentFailed { .. }
            | BookingEvent::ReleaseFailed { .. } => {}
        }
    }
}

/// A journal row: the event plus its per-order sequence number and
/// record timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: i64,
    pub event: BookingEvent,
    pub recorded_at: DateTime<Utc>,
}

/// Durable snapshot of the folded state, written after every loop turn
/// so recovery folds only the tail of the journal. Events with
/// `seq > checkpoint.seq` were not yet observed by a completed turn:
/// state events are re-folded and signals are redelivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: BookingState,
    pub seq: i64,
}

/// Append-only orchestration log with per-order sequencing plus the
/// checkpoint table. Backed by the relational store in production and by
/// memory in tests.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Appends an event, allocating the next sequence number for the
    /// order, and returns the stored entry.
    async fn append(&self, order_id: &str, event: &BookingEvent)
        -> Result<JournalEntry, StoreError>;

    /// All entries with `seq > after`, in sequence order.
    async fn events_after(
        &self,
        order_id: &str,
        after: i64,
    ) -> Result<Vec<JournalEntry>, StoreError>;

    async fn save_checkpoint(
        &self,
        order_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError>;

    async fn load_checkpoint(&self, order_id: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Order ids whose checkpointed status is not terminal; these are
    /// resumed at process start.
    async fn running_orders(&self) -> Result<Vec<String>, StoreError>;
}
