use thiserror::Error;

/// Errors surfaced by the seat and order stores.
///
/// Business rejections name the offending seat and must not be retried;
/// `Backend` wraps transaction rollbacks, deadlocks and connectivity
/// failures, which the activity retry policy may retry with backoff.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("seat {seat} is not available")]
    SeatNotAvailable { seat: String },

    #[error("seat {seat} does not exist")]
    SeatNotExist { seat: String },

    #[error("order not found")]
    OrderNotFound,

    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend(err.into())
    }

    /// Only backend failures are transient; everything else is a
    /// definitive answer from the store.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_classification() {
        let unavailable = StoreError::SeatNotAvailable {
            seat: "A1".to_string(),
        };
        let missing = StoreError::SeatNotExist {
            seat: "Z9".to_string(),
        };
        let backend = StoreError::backend(anyhow::anyhow!("connection reset"));

        assert!(!unavailable.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!StoreError::OrderNotFound.is_retryable());
        assert!(backend.is_retryable());
    }

    #[test]
    fn test_rejection_carries_seat_number() {
        let err = StoreError::SeatNotAvailable {
            seat: "C1".to_string(),
        };
        assert!(err.to_string().contains("C1"));
    }
}
