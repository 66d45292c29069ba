pub mod error;
pub mod journal;
pub mod models;
pub mod payment;
pub mod repository;

pub use error::StoreError;
pub use models::{BookingState, Order, OrderStatus, Payment, PaymentStatus, Seat, SeatStatus};
