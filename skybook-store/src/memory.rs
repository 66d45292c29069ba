//! In-memory store variants. They mirror the relational semantics,
//! including the expiry-aware takeability rule, and serve the engine and
//! façade tests without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use skybook_core::error::StoreError;
use skybook_core::journal::{BookingEvent, Checkpoint, Journal, JournalEntry};
use skybook_core::models::{Order, OrderStatus, Payment, PaymentStatus, Seat, SeatStatus};
use skybook_core::repository::{OrderRecords, SeatInventory};

#[derive(Debug, Default)]
struct SeatState {
    // Keyed by (flight_id, seat_number); the BTreeMap keeps per-flight
    // iteration in seat-number order.
    seats: BTreeMap<(String, String), Seat>,
    fail_on_release: bool,
}

/// In-memory seat inventory.
#[derive(Debug, Clone)]
pub struct InMemorySeatStore {
    state: Arc<RwLock<SeatState>>,
    hold_window: Duration,
}

impl InMemorySeatStore {
    pub fn new(hold_window: std::time::Duration) -> Self {
        let hold_window =
            Duration::from_std(hold_window).unwrap_or_else(|_| Duration::minutes(15));
        Self {
            state: Arc::new(RwLock::new(SeatState::default())),
            hold_window,
        }
    }

    /// Seeds a flight with the given seat numbers, all `AVAILABLE`.
    pub fn add_flight(&self, flight_id: &str, seat_numbers: &[&str]) {
        let mut state = self.state.write().unwrap();
        for number in seat_numbers {
            let key = (flight_id.to_string(), number.to_string());
            state.seats.insert(
                key,
                Seat {
                    seat_id: Uuid::new_v4(),
                    flight_id: flight_id.to_string(),
                    seat_number: number.to_string(),
                    status: SeatStatus::Available,
                    reserved_by: None,
                    user_id: None,
                    reserved_at: None,
                },
            );
        }
    }

    /// Makes the next `release_seats` calls fail with a backend error.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    /// Backdates an order's holds so they look expired.
    pub fn age_holds(&self, order_id: &str, by: std::time::Duration) {
        let by = Duration::from_std(by).unwrap_or_else(|_| Duration::minutes(15));
        let mut state = self.state.write().unwrap();
        for seat in state.seats.values_mut() {
            if seat.reserved_by.as_deref() == Some(order_id) {
                seat.reserved_at = seat.reserved_at.map(|at| at - by);
            }
        }
    }

    fn check_and_reserve(
        state: &mut SeatState,
        hold_window: Duration,
        flight_id: &str,
        seats: &[String],
        order_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let cutoff = Utc::now() - hold_window;

        // Check everything before writing anything, so a rejection
        // leaves the inventory untouched.
        for number in seats {
            let key = (flight_id.to_string(), number.clone());
            let seat = state
                .seats
                .get(&key)
                .ok_or_else(|| StoreError::SeatNotExist {
                    seat: number.clone(),
                })?;

            let takeable = match seat.status {
                SeatStatus::Available => true,
                SeatStatus::Reserved => {
                    seat.reserved_by.as_deref() == Some(order_id)
                        || seat.reserved_at.map(|at| at < cutoff).unwrap_or(false)
                }
                SeatStatus::Booked => false,
            };
            if !takeable {
                return Err(StoreError::SeatNotAvailable {
                    seat: number.clone(),
                });
            }
        }

        let now = Utc::now();
        for number in seats {
            let key = (flight_id.to_string(), number.clone());
            if let Some(seat) = state.seats.get_mut(&key) {
                seat.status = SeatStatus::Reserved;
                seat.reserved_by = Some(order_id.to_string());
                seat.user_id = Some(user_id.to_string());
                seat.reserved_at = Some(now);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SeatInventory for InMemorySeatStore {
    async fn reserve_seats(
        &self,
        flight_id: &str,
        seats: &[String],
        order_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        Self::check_and_reserve(&mut state, self.hold_window, flight_id, seats, order_id, user_id)
    }

    async fn update_seats(&self, order_id: &str, new_seats: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();

        let owner = state
            .seats
            .values()
            .find(|s| s.reserved_by.as_deref() == Some(order_id))
            .map(|s| (s.flight_id.clone(), s.user_id.clone().unwrap_or_default()));
        let (flight_id, user_id) = owner.ok_or(StoreError::OrderNotFound)?;

        // The own-hold exemption in the takeability check makes it safe
        // to validate before releasing, so a rejection is a clean no-op.
        let cutoff = Utc::now() - self.hold_window;
        for number in new_seats {
            let key = (flight_id.clone(), number.clone());
            let seat = state
                .seats
                .get(&key)
                .ok_or_else(|| StoreError::SeatNotExist {
                    seat: number.clone(),
                })?;
            let takeable = match seat.status {
                SeatStatus::Available => true,
                SeatStatus::Reserved => {
                    seat.reserved_by.as_deref() == Some(order_id)
                        || seat.reserved_at.map(|at| at < cutoff).unwrap_or(false)
                }
                SeatStatus::Booked => false,
            };
            if !takeable {
                return Err(StoreError::SeatNotAvailable {
                    seat: number.clone(),
                });
            }
        }

        for seat in state.seats.values_mut() {
            if seat.reserved_by.as_deref() == Some(order_id) {
                seat.status = SeatStatus::Available;
                seat.reserved_by = None;
                seat.user_id = None;
                seat.reserved_at = None;
            }
        }

        Self::check_and_reserve(
            &mut state,
            self.hold_window,
            &flight_id,
            new_seats,
            order_id,
            &user_id,
        )
    }

    async fn release_seats(&self, order_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_release {
            return Err(StoreError::backend(anyhow::anyhow!(
                "injected release failure"
            )));
        }

        for seat in state.seats.values_mut() {
            if seat.reserved_by.as_deref() == Some(order_id) {
                seat.status = SeatStatus::Available;
                seat.reserved_by = None;
                seat.user_id = None;
                seat.reserved_at = None;
            }
        }
        Ok(())
    }

    async fn confirm_seats(&self, order_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        for seat in state.seats.values_mut() {
            if seat.reserved_by.as_deref() == Some(order_id) {
                seat.status = SeatStatus::Booked;
            }
        }
        Ok(())
    }

    async fn get_seats(&self, flight_id: &str) -> Result<Vec<Seat>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .seats
            .values()
            .filter(|s| s.flight_id == flight_id)
            .cloned()
            .collect())
    }

    async fn get_order_seats(&self, order_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .seats
            .values()
            .filter(|s| s.reserved_by.as_deref() == Some(order_id))
            .map(|s| s.seat_number.clone())
            .collect())
    }

    async fn reset_flight_seats(&self, flight_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        for seat in state.seats.values_mut() {
            if seat.flight_id == flight_id {
                seat.status = SeatStatus::Available;
                seat.reserved_by = None;
                seat.user_id = None;
                seat.reserved_at = None;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<String, Order>,
    payments: Vec<Payment>,
}

/// In-memory order rows and payment log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payment_records(&self, order_id: &str) -> Vec<Payment> {
        self.state
            .read()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderRecords for InMemoryOrderStore {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state.orders.get(order_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or(StoreError::OrderNotFound)?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.payments.push(payment.clone());
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
        let mut state = self.state.write().unwrap();

        let latest = state
            .payments
            .iter_mut()
            .filter(|p| p.order_id == order_id)
            .max_by_key(|p| p.created_at);

        match latest {
            Some(payment) => {
                payment.status = status;
                payment.transaction_id = transaction_id.map(str::to_string);
                payment.error_message = error_message.map(str::to_string);
                payment.attempts += 1;
                payment.updated_at = Utc::now();
            }
            None => {
                let now = Utc::now();
                state.payments.push(Payment {
                    payment_id: Uuid::new_v4().to_string(),
                    order_id: order_id.to_string(),
                    payment_code: payment_code.to_string(),
                    transaction_id: transaction_id.map(str::to_string),
                    status,
                    error_message: error_message.map(str::to_string),
                    attempts: 1,
                    created_at: now,
                    updated_at: now,
                });
            }
        }

        Ok(())
    }

    async fn delete_orders_by_flight(&self, flight_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.orders.retain(|_, o| o.flight_id != flight_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct JournalState {
    events: HashMap<String, Vec<JournalEntry>>,
    checkpoints: HashMap<String, Checkpoint>,
}

/// In-memory orchestration journal.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJournal {
    state: Arc<RwLock<JournalState>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event kinds recorded for an order, in sequence order.
    pub fn kinds(&self, order_id: &str) -> Vec<&'static str> {
        self.state
            .read()
            .unwrap()
            .events
            .get(order_id)
            .map(|entries| entries.iter().map(|e| e.event.kind()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn append(
        &self,
        order_id: &str,
        event: &BookingEvent,
    ) -> Result<JournalEntry, StoreError> {
        let mut state = self.state.write().unwrap();
        let entries = state.events.entry(order_id.to_string()).or_default();
        let entry = JournalEntry {
            seq: entries.len() as i64 + 1,
            event: event.clone(),
            recorded_at: Utc::now(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn events_after(
        &self,
        order_id: &str,
        after: i64,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .events
            .get(order_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.seq > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_checkpoint(
        &self,
        order_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state
            .checkpoints
            .insert(order_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, order_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state.checkpoints.get(order_id).cloned())
    }

    async fn running_orders(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .checkpoints
            .iter()
            .filter(|(_, c)| !c.state.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    const WINDOW: StdDuration = StdDuration::from_secs(900);

    fn seeded_store() -> InMemorySeatStore {
        let store = InMemorySeatStore::new(WINDOW);
        store.add_flight("FL123", &["A1", "A2", "A5", "B5", "C1"]);
        store
    }

    fn seats(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_no_double_hold() {
        let store = seeded_store();

        store
            .reserve_seats("FL123", &seats(&["C1"]), "order-1", "alice")
            .await
            .unwrap();

        let err = store
            .reserve_seats("FL123", &seats(&["C1"]), "order-2", "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SeatNotAvailable { seat } if seat == "C1"));
    }

    #[tokio::test]
    async fn test_unknown_seat_is_rejected_and_nothing_is_held() {
        let store = seeded_store();

        let err = store
            .reserve_seats("FL123", &seats(&["A1", "Z9"]), "order-1", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SeatNotExist { seat } if seat == "Z9"));

        // The rejection must not leave A1 held.
        store
            .reserve_seats("FL123", &seats(&["A1"]), "order-2", "bob")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_hold_is_reclaimable() {
        let store = seeded_store();

        store
            .reserve_seats("FL123", &seats(&["A5"]), "order-1", "alice")
            .await
            .unwrap();
        store.age_holds("order-1", WINDOW + StdDuration::from_secs(1));

        store
            .reserve_seats("FL123", &seats(&["A5"]), "order-2", "bob")
            .await
            .unwrap();

        let held = store.get_order_seats("order-2").await.unwrap();
        assert_eq!(held, vec!["A5".to_string()]);
        assert!(store.get_order_seats("order-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserve_then_release_round_trip() {
        let store = seeded_store();

        store
            .reserve_seats("FL123", &seats(&["A1", "A2"]), "order-1", "alice")
            .await
            .unwrap();
        store.release_seats("order-1").await.unwrap();

        for seat in store.get_seats("FL123").await.unwrap() {
            assert_eq!(seat.status, SeatStatus::Available);
            assert!(seat.reserved_by.is_none());
            assert!(seat.reserved_at.is_none());
        }

        // Releasing again is a no-op.
        store.release_seats("order-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_reserve_then_confirm_keeps_ownership() {
        let store = seeded_store();

        store
            .reserve_seats("FL123", &seats(&["A1", "A2"]), "order-1", "alice")
            .await
            .unwrap();
        store.confirm_seats("order-1").await.unwrap();

        let booked: Vec<Seat> = store
            .get_seats("FL123")
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.status == SeatStatus::Booked)
            .collect();
        assert_eq!(booked.len(), 2);
        for seat in booked {
            assert_eq!(seat.reserved_by.as_deref(), Some("order-1"));
            assert_eq!(seat.user_id.as_deref(), Some("alice"));
        }
    }

    #[tokio::test]
    async fn test_update_seats_swaps_ownership_exactly() {
        let store = seeded_store();

        store
            .reserve_seats("FL123", &seats(&["A1", "A2"]), "order-1", "alice")
            .await
            .unwrap();
        store
            .update_seats("order-1", &seats(&["A2", "B5"]))
            .await
            .unwrap();

        let held = store.get_order_seats("order-1").await.unwrap();
        assert_eq!(held, seats(&["A2", "B5"]));

        // A1 was a straggler and must now be free.
        store
            .reserve_seats("FL123", &seats(&["A1"]), "order-2", "bob")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_update_leaves_prior_ownership_intact() {
        let store = seeded_store();

        store
            .reserve_seats("FL123", &seats(&["A1"]), "order-1", "alice")
            .await
            .unwrap();
        store
            .reserve_seats("FL123", &seats(&["C1"]), "order-2", "bob")
            .await
            .unwrap();

        let err = store
            .update_seats("order-1", &seats(&["C1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SeatNotAvailable { .. }));

        assert_eq!(
            store.get_order_seats("order-1").await.unwrap(),
            seats(&["A1"])
        );
        assert_eq!(
            store.get_order_seats("order-2").await.unwrap(),
            seats(&["C1"])
        );
    }

    #[tokio::test]
    async fn test_update_seats_for_unknown_order() {
        let store = seeded_store();
        let err = store
            .update_seats("ghost", &seats(&["A1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound));
    }

    #[tokio::test]
    async fn test_payment_upsert_latest() {
        let store = InMemoryOrderStore::new();

        // No record yet: the upsert inserts one.
        store
            .update_payment_record("order-1", "12345", PaymentStatus::Failed, None, Some("boom"))
            .await
            .unwrap();
        let records = store.payment_records("order-1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PaymentStatus::Failed);

        // A second upsert refreshes the same record.
        store
            .update_payment_record("order-1", "12345", PaymentStatus::Success, Some("txn-9"), None)
            .await
            .unwrap();
        let records = store.payment_records("order-1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PaymentStatus::Success);
        assert_eq!(records[0].transaction_id.as_deref(), Some("txn-9"));
        assert_eq!(records[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_update_status_of_missing_order() {
        let store = InMemoryOrderStore::new();
        let err = store
            .update_order_status("ghost", OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound));
    }

    #[tokio::test]
    async fn test_journal_sequencing_and_checkpoints() {
        let journal = InMemoryJournal::new();

        let first = journal
            .append(
                "order-1",
                &BookingEvent::Started {
                    run_id: "run-1".to_string(),
                    flight_id: "FL123".to_string(),
                    user_id: "alice".to_string(),
                    seats: vec!["A1".to_string()],
                },
            )
            .await
            .unwrap();
        let second = journal
            .append("order-1", &BookingEvent::SeatsReserved)
            .await
            .unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);

        let tail = journal.events_after("order-1", 1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event.kind(), "seats_reserved");

        let mut state = skybook_core::BookingState::from_start(
            "order-1",
            "run-1",
            "FL123",
            "alice",
            &["A1".to_string()],
            first.recorded_at,
        );
        state.apply(&second.event, second.recorded_at);
        journal
            .save_checkpoint("order-1", &Checkpoint { state, seq: 2 })
            .await
            .unwrap();

        assert_eq!(journal.running_orders().await.unwrap(), vec!["order-1"]);

        let mut checkpoint = journal.load_checkpoint("order-1").await.unwrap().unwrap();
        checkpoint.state.status = OrderStatus::Confirmed;
        journal
            .save_checkpoint("order-1", &checkpoint)
            .await
            .unwrap();
        assert!(journal.running_orders().await.unwrap().is_empty());
    }
}
