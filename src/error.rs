use crate::services::providers::breaker::CircuitState;

/// Failure modes of the upstream metadata provider.
///
/// Kept separate from [`AppError`] and `Clone`-able so that coalesced
/// callers waiting on a single in-flight request can all receive the
/// same failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Provider answered with a non-success status code.
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Request exceeded the configured per-request timeout.
    #[error("provider request timed out")]
    Timeout,

    /// Connection-level failure (reset, DNS, TLS, ...).
    #[error("provider connection failed: {0}")]
    Transport(String),

    /// Circuit breaker rejected the call without touching the network.
    #[error("circuit breaker is {0:?}; provider temporarily unavailable")]
    CircuitOpen(CircuitState),
}

impl UpstreamError {
    /// Transient failures are retried; everything else surfaces directly.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Timeout | UpstreamError::Transport(_) => true,
            UpstreamError::CircuitOpen(_) => false,
        }
    }
}

/// Application-level errors
///
/// Every variant carries owned data, so the whole enum is `Clone`; the
/// cache layer relies on this to hand one producer failure to every
/// coalesced waiter.
#[derive(thiserror::Error, Debug, Clone)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(#[from] UpstreamError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let err = UpstreamError::Status {
            status: 429,
            message: "too many requests".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [500, 502, 503] {
            let err = UpstreamError::Status {
                status,
                message: String::new(),
            };
            assert!(err.is_transient());
        }
    }

    #[test]
    fn test_not_found_is_permanent() {
        let err = UpstreamError::Status {
            status: 404,
            message: "no such title".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_circuit_open_is_not_retried() {
        let err = UpstreamError::CircuitOpen(CircuitState::Open);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_upstream_error_converts_to_app_error() {
        let err: AppError = UpstreamError::Timeout.into();
        assert!(matches!(err, AppError::ExternalApi(UpstreamError::Timeout)));
    }
}
