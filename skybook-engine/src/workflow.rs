//! The per-order booking orchestration: initial hold, cancellable hold
//! timer, signal dispatch, child payment flow, and compensating release
//! on cancellation, expiry or payment failure. Exactly one input source
//! is serviced per loop turn, so signals and the timer never interleave.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use skybook_core::error::StoreError;
use skybook_core::journal::{BookingEvent, Checkpoint, Signal};
use skybook_core::models::{BookingState, OrderStatus};

use crate::engine::{SignalEnvelope, WorkflowDeps};
use crate::payment;
use crate::runtime::activity::{self, ActivityError};

#[derive(Debug, Error)]
pub(crate) enum WorkflowError {
    #[error("initial seat hold failed: {0}")]
    InitialHold(#[source] ActivityError),

    /// A compensating release failed. The in-memory status holds the
    /// intended terminal value, but the orchestration ends in error so
    /// the journal surfaces the undischarged hold to operators.
    #[error("failed to release seats: {0}")]
    Release(#[source] ActivityError),

    #[error("journal unavailable: {0}")]
    Journal(#[source] StoreError),
}

struct OrderFlow {
    deps: Arc<WorkflowDeps>,
    state: BookingState,
    shared: Arc<std::sync::RwLock<BookingState>>,
    last_seq: i64,
}

impl OrderFlow {
    /// Journals an event, folds it into the state, and publishes the
    /// snapshot read by queries. The journal's record timestamp is the
    /// orchestration's logical clock.
    async fn record(&mut self, event: BookingEvent) -> Result<DateTime<Utc>, WorkflowError> {
        let entry = self
            .deps
            .journal
            .append(&self.state.order_id, &event)
            .await
            .map_err(WorkflowError::Journal)?;
        self.state.apply(&entry.event, entry.recorded_at);
        self.last_seq = self.last_seq.max(entry.seq);
        *self.shared.write().unwrap() = self.state.clone();
        Ok(entry.recorded_at)
    }

    async fn checkpoint(&self) {
        let checkpoint = Checkpoint {
            state: self.state.clone(),
            seq: self.last_seq,
        };
        if let Err(err) = self
            .deps
            .journal
            .save_checkpoint(&self.state.order_id, &checkpoint)
            .await
        {
            tracing::warn!(
                order_id = %self.state.order_id,
                error = %err,
                "failed to save checkpoint"
            );
        }
    }

    /// Pushes the current status to the order store. Best effort: a
    /// non-retryable `OrderNotFound` means the order was removed
    /// administratively and the projection can no longer be updated.
    async fn push_status(&self) {
        let status = self.state.status;
        let result = activity::execute("update_order_status", &self.deps.config.seat_ops, || {
            self.deps
                .orders
                .update_order_status(&self.state.order_id, status)
        })
        .await;
        if let Err(err) = result {
            tracing::warn!(
                order_id = %self.state.order_id,
                status = %status,
                error = %err,
                "failed to push order status"
            );
        }
    }

    /// Compensating release. Failure is fatal: the event is journaled
    /// and the orchestration ends in error rather than silently exiting
    /// with seats still held.
    async fn release_or_fail(&mut self) -> Result<(), WorkflowError> {
        let order_id = self.state.order_id.clone();
        let result = activity::execute("release_seats", &self.deps.config.seat_ops, || {
            self.deps.seats.release_seats(&order_id)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(
                    order_id = %order_id,
                    error = %err,
                    "failed to release seats; surfacing for operator recovery"
                );
                let _ = self
                    .record(BookingEvent::ReleaseFailed {
                        error: err.to_string(),
                    })
                    .await;
                self.checkpoint().await;
                Err(WorkflowError::Release(err))
            }
        }
    }
}

fn remaining(deadline: DateTime<Utc>) -> std::time::Duration {
    (deadline - Utc::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

pub(crate) async fn run(
    deps: Arc<WorkflowDeps>,
    state: BookingState,
    shared: Arc<std::sync::RwLock<BookingState>>,
    mut mailbox: mpsc::Receiver<SignalEnvelope>,
    mut pending: VecDeque<SignalEnvelope>,
    last_seq: i64,
) -> Result<OrderStatus, WorkflowError> {
    let order_id = state.order_id.clone();
    let hold_window = ChronoDuration::from_std(deps.config.reservation_timeout)
        .unwrap_or_else(|_| ChronoDuration::minutes(15));
    let mut flow = OrderFlow {
        deps: deps.clone(),
        state,
        shared,
        last_seq,
    };

    // Initial hold; skipped when resuming an order that already passed
    // it. Terminal failure of the hold ends the orchestration in FAILED.
    if flow.state.status == OrderStatus::Created {
        let reserve = activity::execute("reserve_seats", &deps.config.seat_ops, || {
            deps.seats.reserve_seats(
                &flow.state.flight_id,
                &flow.state.seats,
                &order_id,
                &flow.state.user_id,
            )
        })
        .await;

        match reserve {
            Ok(()) => {
                flow.record(BookingEvent::SeatsReserved).await?;
                flow.push_status().await;
                flow.checkpoint().await;
            }
            Err(err) => {
                tracing::error!(order_id = %order_id, error = %err, "failed to reserve initial seats");
                flow.record(BookingEvent::Failed {
                    reason: err.to_string(),
                })
                .await?;
                flow.push_status().await;
                flow.checkpoint().await;
                return Err(WorkflowError::InitialHold(err));
            }
        }
    }

    // The hold deadline is derived state, so after a restart the timer
    // re-arms with whatever remains; a lapsed deadline fires at once.
    let mut deadline = flow.state.reservation_start_at + hold_window;
    let timer = tokio::time::sleep(remaining(deadline));
    tokio::pin!(timer);

    loop {
        // Redelivered signals drain before the live mailbox; otherwise
        // exactly one source is serviced per turn.
        let turn = if let Some(envelope) = pending.pop_front() {
            Some(envelope)
        } else {
            tokio::select! {
                received = mailbox.recv() => match received {
                    Some(envelope) => Some(envelope),
                    None => break,
                },
                _ = &mut timer => None,
            }
        };

        match turn {
            Some(envelope) => {
                flow.last_seq = flow.last_seq.max(envelope.seq);
                match envelope.signal {
                    Signal::UpdateSeats(new_seats) => {
                        tracing::info!(order_id = %order_id, seats = ?new_seats, "received seat update signal");
                        let update =
                            activity::execute("update_seats", &deps.config.seat_ops, || {
                                deps.seats.update_seats(&order_id, &new_seats)
                            })
                            .await;

                        match update {
                            Ok(()) => {
                                let at = flow
                                    .record(BookingEvent::SeatsUpdated { seats: new_seats })
                                    .await?;
                                deadline = at + hold_window;
                                timer.as_mut().reset(Instant::now() + remaining(deadline));
                                tracing::info!(order_id = %order_id, "seat update complete, hold timer reset");
                            }
                            Err(err) => {
                                // Old selection and running timer stay in place.
                                tracing::error!(order_id = %order_id, error = %err, "failed to update seats");
                            }
                        }
                    }
                    Signal::SubmitPayment(payment_code) => {
                        tracing::info!(order_id = %order_id, "received payment signal");
                        flow.record(BookingEvent::PaymentStarted {
                            payment_code: payment_code.clone(),
                        })
                        .await?;
                        flow.push_status().await;

                        let outcome =
                            payment::run(&deps, &order_id, &flow.state.run_id, &payment_code)
                                .await;

                        match outcome {
                            Ok(outcome) if outcome.success => {
                                let transaction_id =
                                    outcome.transaction_id.unwrap_or_default();
                                tracing::info!(
                                    order_id = %order_id,
                                    transaction_id = %transaction_id,
                                    "payment successful"
                                );
                                flow.record(BookingEvent::PaymentSucceeded { transaction_id })
                                    .await?;
                                flow.record(BookingEvent::Confirmed).await?;

                                let confirm = activity::execute(
                                    "confirm_seats",
                                    &deps.config.seat_ops,
                                    || deps.seats.confirm_seats(&order_id),
                                )
                                .await;
                                if let Err(err) = confirm {
                                    tracing::error!(order_id = %order_id, error = %err, "failed to confirm seats");
                                }

                                flow.push_status().await;
                                if let Err(err) =
                                    deps.notifier.booking_confirmed(&order_id).await
                                {
                                    tracing::warn!(order_id = %order_id, error = %err, "failed to send confirmation");
                                }
                                tracing::info!(order_id = %order_id, "booking confirmed");
                            }
                            other => {
                                let reason = match other {
                                    Ok(outcome) => outcome
                                        .error_message
                                        .unwrap_or_else(|| "payment validation failed".to_string()),
                                    Err(err) => err.to_string(),
                                };
                                tracing::error!(order_id = %order_id, reason = %reason, "payment failed");
                                flow.record(BookingEvent::PaymentFailed {
                                    error: reason.clone(),
                                })
                                .await?;
                                flow.record(BookingEvent::Failed { reason }).await?;
                                flow.release_or_fail().await?;
                                flow.push_status().await;
                            }
                        }
                    }
                    Signal::CancelOrder => {
                        tracing::info!(order_id = %order_id, "received cancel signal");
                        flow.record(BookingEvent::Cancelled).await?;
                        flow.release_or_fail().await?;
                        flow.push_status().await;
                    }
                }
            }
            None => {
                tracing::info!(order_id = %order_id, "reservation hold expired");
                flow.record(BookingEvent::Expired).await?;
                flow.release_or_fail().await?;
                flow.push_status().await;
            }
        }

        flow.checkpoint().await;
        if flow.state.status.is_terminal() {
            break;
        }
    }

    Ok(flow.state.status)
}
