pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod status;

use crate::circuit_breaker::{BreakerRegistry, RetryConfig, RetryExecutor};
use crate::config::ResilienceConfig;
use crate::error::Result;
use crate::queue::TaskQueue;
use crate::status::StatusReport;
use tracing::info;

/// Queue, breaker registry and default retry policy built from one configuration
///
/// Cloning is cheap and every clone shares the same queue and breakers.
#[derive(Debug, Clone)]
pub struct Resilience {
    queue: TaskQueue,
    breakers: BreakerRegistry,
    retry: RetryConfig,
}

impl Resilience {
    pub fn new(config: ResilienceConfig) -> Result<Self> {
        config.validate()?;

        info!(
            max_queue_size = config.queue.max_queue_size,
            workers = config.queue.workers,
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_retries = config.retry.max_retries,
            "Initializing resilience layer"
        );

        Ok(Self {
            queue: TaskQueue::new(config.queue),
            breakers: BreakerRegistry::new(config.circuit_breaker),
            retry: config.retry,
        })
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Retry executor with the default policy, guarded by the named breaker if given
    pub fn retry_executor(&self, breaker: Option<&str>) -> RetryExecutor {
        let executor = RetryExecutor::new(self.retry.clone());
        match breaker {
            Some(name) => executor.with_breaker(self.breakers.get(name)),
            None => executor,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::collect(&self.queue, &self.breakers)
    }
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilience=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
