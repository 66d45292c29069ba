//! Supervised activity execution: per-invocation start-to-close timeout
//! and bounded retry with exponential backoff. Retries happen here, as
//! close to the I/O as possible; the orchestration loop never retries on
//! its own.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};

use skybook_core::error::StoreError;
use skybook_core::payment::GatewayError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub start_to_close: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("{activity} failed: {source}")]
    NonRetryable {
        activity: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{activity} failed after {attempts} attempts: {source}")]
    Exhausted {
        activity: &'static str,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

/// Classifies an activity failure. Non-retryable errors are definitive
/// answers (business rejections, administratively removed orders) and
/// short-circuit the retry loop.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Runs `op` under the given options. A timeout counts as a retryable
/// attempt failure.
pub async fn execute<T, E, Fut, F>(
    activity: &'static str,
    options: &ActivityOptions,
    mut op: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Into<anyhow::Error>,
{
    let retry = &options.retry;
    let attempts = retry.maximum_attempts.max(1);
    let mut interval = retry.initial_interval;
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 1..=attempts {
        match timeout(options.start_to_close, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if !err.is_retryable() => {
                return Err(ActivityError::NonRetryable {
                    activity,
                    source: err.into(),
                });
            }
            Ok(Err(err)) => {
                let err: anyhow::Error = err.into();
                tracing::warn!(activity, attempt, error = %err, "activity attempt failed");
                last_error = Some(err);
            }
            Err(_) => {
                tracing::warn!(activity, attempt, "activity attempt timed out");
                last_error = Some(anyhow::anyhow!(
                    "timed out after {:?}",
                    options.start_to_close
                ));
            }
        }

        if attempt < attempts {
            sleep(interval).await;
            interval = next_interval(interval, retry);
        }
    }

    Err(ActivityError::Exhausted {
        activity,
        attempts,
        source: last_error.unwrap_or_else(|| anyhow::anyhow!("no attempts were made")),
    })
}

fn next_interval(current: Duration, retry: &RetryPolicy) -> Duration {
    current
        .mul_f64(retry.backoff_coefficient)
        .min(retry.maximum_interval)
}
