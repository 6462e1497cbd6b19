pub mod breaker;
pub mod registry;
pub mod retry;
pub mod types;

pub use breaker::CircuitBreaker;
pub use registry::BreakerRegistry;
pub use retry::{with_retry, RetryExecutor};
pub use types::{
    BreakerStatus, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, RetryConfig,
};
