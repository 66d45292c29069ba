use async_trait::async_trait;

/// Booking confirmation delivery. A real deployment would send an email
/// or SMS here.
#[async_trait]
pub trait ConfirmationNotifier: Send + Sync {
    async fn booking_confirmed(&self, order_id: &str) -> anyhow::Result<()>;
}

/// Notifier stub that only logs.
pub struct LogNotifier;

#[async_trait]
impl ConfirmationNotifier for LogNotifier {
    async fn booking_confirmed(&self, order_id: &str) -> anyhow::Result<()> {
        tracing::info!(order_id = %order_id, "sending booking confirmation");
        Ok(())
    }
}
