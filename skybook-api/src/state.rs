use std::sync::Arc;
use std::time::Duration;

use skybook_core::repository::{OrderRecords, SeatInventory};
use skybook_engine::BookingEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub seats: Arc<dyn SeatInventory>,
    pub orders: Arc<dyn OrderRecords>,
    /// Same value the orchestrator's hold timer uses; the façade needs
    /// it to turn `reservationStartAt` into a countdown.
    pub reservation_timeout: Duration,
}
