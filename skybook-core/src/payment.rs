use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a payment validation attempt.
///
/// A format rejection comes back as `success = false` with an error
/// message and is never retried; gateway failures are reported through
/// `GatewayError` instead so the activity layer can retry them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PaymentOutcome {
    pub fn approved(transaction_id: String) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id),
            error_message: None,
        }
    }

    pub fn rejected(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Transient gateway failure; retryable by activity policy.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("payment gateway error: {0}")]
    Gateway(String),
}

/// External payment validator contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn validate(
        &self,
        payment_code: &str,
        order_id: &str,
    ) -> Result<PaymentOutcome, GatewayError>;
}
