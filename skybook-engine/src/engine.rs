use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use skybook_core::error::StoreError;
use skybook_core::journal::{BookingEvent, Checkpoint, Journal, Signal};
use skybook_core::models::BookingState;
use skybook_core::payment::PaymentGateway;
use skybook_core::repository::{OrderRecords, SeatInventory};

use crate::notifier::ConfirmationNotifier;
use crate::runtime::activity::{ActivityOptions, RetryPolicy};
use crate::workflow;

/// Timeouts and retry bounds for the orchestration and its activities.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reservation_timeout: Duration,
    pub seat_ops: ActivityOptions,
    pub payment: ActivityOptions,
}

impl EngineConfig {
    pub fn from_settings(
        reservation_timeout: Duration,
        payment_timeout: Duration,
        max_payment_retries: u32,
    ) -> Self {
        Self {
            reservation_timeout,
            seat_ops: ActivityOptions {
                start_to_close: Duration::from_secs(30),
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(1),
                    backoff_coefficient: 2.0,
                    maximum_interval: Duration::from_secs(30),
                    maximum_attempts: 5,
                },
            },
            payment: ActivityOptions {
                start_to_close: payment_timeout,
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(1),
                    backoff_coefficient: 2.0,
                    maximum_interval: Duration::from_secs(10),
                    maximum_attempts: max_payment_retries,
                },
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(Duration::from_secs(15 * 60), Duration::from_secs(10), 3)
    }
}

/// Input for a fresh booking orchestration.
#[derive(Debug, Clone)]
pub struct BookingInput {
    pub order_id: String,
    pub run_id: String,
    pub flight_id: String,
    pub user_id: String,
    pub seats: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no running orchestration for order {0}")]
    NotRunning(String),

    #[error("orchestration for order {0} is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) struct WorkflowDeps {
    pub journal: Arc<dyn Journal>,
    pub seats: Arc<dyn SeatInventory>,
    pub orders: Arc<dyn OrderRecords>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn ConfirmationNotifier>,
    pub config: EngineConfig,
}

/// A journaled signal on its way to the orchestration loop.
#[derive(Debug)]
pub(crate) struct SignalEnvelope {
    pub seq: i64,
    pub signal: Signal,
}

struct OrderHandle {
    signal_tx: mpsc::Sender<SignalEnvelope>,
    state: Arc<std::sync::RwLock<BookingState>>,
}

/// Registry and entry point for booking orchestrations. One logical
/// task per order; signals are journaled before delivery, queries read
/// the live task's snapshot, and `recover_running` resumes non-terminal
/// orders after a process restart.
pub struct BookingEngine {
    deps: Arc<WorkflowDeps>,
    running: Arc<RwLock<HashMap<String, OrderHandle>>>,
}

impl BookingEngine {
    pub fn new(
        journal: Arc<dyn Journal>,
        seats: Arc<dyn SeatInventory>,
        orders: Arc<dyn OrderRecords>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn ConfirmationNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            deps: Arc::new(WorkflowDeps {
                journal,
                seats,
                orders,
                gateway,
                notifier,
                config,
            }),
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Arms a new orchestration: journals the start, checkpoints the
    /// initial state, and spawns the order's task. The task immediately
    /// drives the initial seat hold.
    pub async fn start_order(&self, input: BookingInput) -> Result<(), EngineError> {
        if self.running.read().await.contains_key(&input.order_id) {
            return Err(EngineError::AlreadyRunning(input.order_id));
        }

        let started = BookingEvent::Started {
            run_id: input.run_id.clone(),
            flight_id: input.flight_id.clone(),
            user_id: input.user_id.clone(),
            seats: input.seats.clone(),
        };
        let entry = self.deps.journal.append(&input.order_id, &started).await?;

        let state = BookingState::from_start(
            &input.order_id,
            &input.run_id,
            &input.flight_id,
            &input.user_id,
            &input.seats,
            entry.recorded_at,
        );
        self.deps
            .journal
            .save_checkpoint(
                &input.order_id,
                &Checkpoint {
                    state: state.clone(),
                    seq: entry.seq,
                },
            )
            .await?;

        tracing::info!(
            order_id = %input.order_id,
            flight_id = %input.flight_id,
            seats = ?input.seats,
            "booking orchestration started"
        );
        self.spawn_workflow(state, entry.seq, VecDeque::new()).await;
        Ok(())
    }

    /// Journals a signal and delivers it to the order's mailbox.
    /// Signals to finished orchestrations are refused; terminal states
    /// absorb all inputs.
    pub async fn signal(&self, order_id: &str, signal: Signal) -> Result<(), EngineError> {
        let signal_tx = {
            let running = self.running.read().await;
            running
                .get(order_id)
                .map(|handle| handle.signal_tx.clone())
                .ok_or_else(|| EngineError::NotRunning(order_id.to_string()))?
        };

        let entry = self
            .deps
            .journal
            .append(
                order_id,
                &BookingEvent::SignalReceived {
                    signal: signal.clone(),
                },
            )
            .await?;

        signal_tx
            .send(SignalEnvelope {
                seq: entry.seq,
                signal,
            })
            .await
            .map_err(|_| EngineError::NotRunning(order_id.to_string()))
    }

    /// Snapshot of a live orchestration's state; `None` once the order
    /// has finished (callers fall back to the order store).
    pub async fn query(&self, order_id: &str) -> Option<BookingState> {
        let running = self.running.read().await;
        running
            .get(order_id)
            .map(|handle| handle.state.read().unwrap().clone())
    }

    /// Resumes every order whose checkpoint is not terminal: folds the
    /// journal tail onto the checkpointed state and redelivers signals
    /// past the checkpoint watermark. Returns the number of resumed
    /// orchestrations.
    pub async fn recover_running(&self) -> Result<usize, EngineError> {
        let order_ids = self.deps.journal.running_orders().await?;
        let mut resumed = 0;

        for order_id in order_ids {
            if self.running.read().await.contains_key(&order_id) {
                continue;
            }
            let Some(checkpoint) = self.deps.journal.load_checkpoint(&order_id).await? else {
                continue;
            };

            let mut state = checkpoint.state;
            let mut last_seq = checkpoint.seq;
            let mut pending = VecDeque::new();
            for entry in self
                .deps
                .journal
                .events_after(&order_id, checkpoint.seq)
                .await?
            {
                match &entry.event {
                    BookingEvent::SignalReceived { signal } => {
                        pending.push_back(SignalEnvelope {
                            seq: entry.seq,
                            signal: signal.clone(),
                        });
                    }
                    event => {
                        state.apply(event, entry.recorded_at);
                        last_seq = entry.seq;
                    }
                }
            }

            if state.status.is_terminal() {
                // The tail already reached a terminal state; persist it
                // so the next recovery pass skips this order.
                self.deps
                    .journal
                    .save_checkpoint(
                        &order_id,
                        &Checkpoint {
                            state: state.clone(),
                            seq: last_seq,
                        },
                    )
                    .await?;
                continue;
            }

            tracing::info!(
                order_id = %order_id,
                status = %state.status,
                redelivered = pending.len(),
                "resuming booking orchestration"
            );
            self.spawn_workflow(state, last_seq, pending).await;
            resumed += 1;
        }

        Ok(resumed)
    }

    async fn spawn_workflow(
        &self,
        state: BookingState,
        last_seq: i64,
        pending: VecDeque<SignalEnvelope>,
    ) {
        let (signal_tx, mailbox) = mpsc::channel(16);
        let shared = Arc::new(std::sync::RwLock::new(state.clone()));
        let order_id = state.order_id.clone();

        {
            let mut running = self.running.write().await;
            running.insert(
                order_id.clone(),
                OrderHandle {
                    signal_tx,
                    state: shared.clone(),
                },
            );
        }

        let deps = self.deps.clone();
        let registry = self.running.clone();
        tokio::spawn(async move {
            match workflow::run(deps, state, shared, mailbox, pending, last_seq).await {
                Ok(status) => {
                    tracing::info!(order_id = %order_id, status = %status, "booking orchestration completed");
                }
                Err(err) => {
                    tracing::error!(order_id = %order_id, error = %err, "booking orchestration ended in error");
                }
            }
            registry.write().await.remove(&order_id);
        });
    }
}
