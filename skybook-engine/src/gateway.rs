use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use skybook_core::payment::{GatewayError, PaymentGateway, PaymentOutcome};

fn is_five_digits(code: &str) -> bool {
    code.len() == 5 && code.chars().all(|c| c.is_ascii_digit())
}

/// Stand-in payment processor: validates the code format, sleeps a
/// uniform random 0-5 s to simulate gateway latency, and fails a
/// configurable fraction of calls with a retryable gateway error.
pub struct SimulatedGateway {
    failure_rate: f32,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self { failure_rate: 0.15 }
    }

    pub fn with_failure_rate(failure_rate: f32) -> Self {
        Self { failure_rate }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn validate(
        &self,
        payment_code: &str,
        order_id: &str,
    ) -> Result<PaymentOutcome, GatewayError> {
        if !is_five_digits(payment_code) {
            return Ok(PaymentOutcome::rejected(
                "invalid payment code format (must be 5 digits)",
            ));
        }

        let delay_ms = rand::thread_rng().gen_range(0..5000u64);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if rand::thread_rng().gen::<f32>() < self.failure_rate {
            tracing::warn!(order_id = %order_id, "simulated payment gateway failure");
            return Err(GatewayError::Gateway(
                "payment gateway error (simulated)".to_string(),
            ));
        }

        Ok(PaymentOutcome::approved(Uuid::new_v4().to_string()))
    }
}

/// Deterministic gateway for tests: plays back enqueued results in
/// order, approving with a fresh transaction id once the script runs
/// dry. Format rejections still apply, as they would at a real gateway.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<VecDeque<Result<PaymentOutcome, GatewayError>>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, result: Result<PaymentOutcome, GatewayError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn enqueue_gateway_errors(&self, count: usize) {
        for _ in 0..count {
            self.enqueue(Err(GatewayError::Gateway(
                "payment gateway error (scripted)".to_string(),
            )));
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn validate(
        &self,
        payment_code: &str,
        _order_id: &str,
    ) -> Result<PaymentOutcome, GatewayError> {
        if !is_five_digits(payment_code) {
            return Ok(PaymentOutcome::rejected(
                "invalid payment code format (must be 5 digits)",
            ));
        }

        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(PaymentOutcome::approved(Uuid::new_v4().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_format_rejection_is_not_an_error() {
        let gateway = SimulatedGateway::with_failure_rate(0.0);

        for code in ["1234", "123456", "12a45", ""] {
            let outcome = gateway.validate(code, "order-1").await.unwrap();
            assert!(!outcome.success);
            assert!(outcome.error_message.is_some());
            assert!(outcome.transaction_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_scripted_playback_then_approval() {
        let gateway = ScriptedGateway::new();
        gateway.enqueue_gateway_errors(1);

        let err = gateway.validate("12345", "order-1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Gateway(_)));

        let outcome = gateway.validate("12345", "order-1").await.unwrap();
        assert!(outcome.success);
        assert!(outcome.transaction_id.is_some());
    }
}
