use thiserror::Error;

/// Result type for resilience layer operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Resilience layer error types
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ResilienceError {
    fn from(err: serde_json::Error) -> Self {
        ResilienceError::Serialization(err.to_string())
    }
}

/// Failure of a call guarded by the retry executor
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The bound circuit breaker refused the attempt; the operation never ran
    #[error("Circuit breaker '{breaker}' is open. Service unavailable.")]
    CircuitOpen { breaker: String },

    /// The last error returned by the operation, unchanged
    #[error("{0}")]
    Operation(E),
}

impl<E> RetryError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RetryError::CircuitOpen { .. })
    }

    /// Underlying operation error, if the operation ran at all
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::CircuitOpen { .. } => None,
        }
    }
}
