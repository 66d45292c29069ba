//! Child payment validation flow. Keyed by the parent's run id so a
//! retried parent run never collides with an earlier child. The gateway
//! is invoked under the payment retry policy; after each resolution the
//! latest payment record for the order is upserted with the outcome.

use skybook_core::models::{Payment, PaymentStatus};
use skybook_core::payment::PaymentOutcome;

use crate::engine::WorkflowDeps;
use crate::runtime::activity::{self, ActivityError};

pub(crate) async fn run(
    deps: &WorkflowDeps,
    order_id: &str,
    run_id: &str,
    payment_code: &str,
) -> Result<PaymentOutcome, ActivityError> {
    let child_id = format!("{order_id}-payment-{run_id}");
    tracing::info!(child_id = %child_id, order_id = %order_id, "payment validation started");

    let attempt = Payment::new(order_id.to_string(), payment_code.to_string());
    let created = activity::execute("create_payment", &deps.config.payment, || {
        deps.orders.create_payment(&attempt)
    })
    .await;
    if let Err(err) = created {
        tracing::warn!(order_id = %order_id, error = %err, "failed to record pending payment attempt");
    }

    let validated = activity::execute("validate_payment", &deps.config.payment, || {
        deps.gateway.validate(payment_code, order_id)
    })
    .await;

    match validated {
        Ok(outcome) if outcome.success => {
            record(
                deps,
                order_id,
                payment_code,
                PaymentStatus::Success,
                outcome.transaction_id.as_deref(),
                None,
            )
            .await;
            tracing::info!(child_id = %child_id, "payment validation successful");
            Ok(outcome)
        }
        Ok(outcome) => {
            // Format rejection: a definitive answer, never retried.
            let message = outcome
                .error_message
                .clone()
                .unwrap_or_else(|| "payment validation failed".to_string());
            tracing::error!(child_id = %child_id, error = %message, "payment validation unsuccessful");
            record(
                deps,
                order_id,
                payment_code,
                PaymentStatus::Failed,
                None,
                Some(&message),
            )
            .await;
            Ok(outcome)
        }
        Err(err) => {
            let message = err.to_string();
            tracing::error!(child_id = %child_id, error = %message, "payment validation failed after retries");
            record(
                deps,
                order_id,
                payment_code,
                PaymentStatus::Failed,
                None,
                Some(&message),
            )
            .await;
            Err(err)
        }
    }
}

async fn record(
    deps: &WorkflowDeps,
    order_id: &str,
    payment_code: &str,
    status: PaymentStatus,
    transaction_id: Option<&str>,
    error_message: Option<&str>,
) {
    let result = activity::execute("update_payment_record", &deps.config.payment, || {
        deps.orders.update_payment_record(
            order_id,
            payment_code,
            status,
            transaction_id,
            error_message,
        )
    })
    .await;

    if let Err(err) = result {
        tracing::warn!(order_id = %order_id, error = %err, "failed to record payment outcome");
    }
}
