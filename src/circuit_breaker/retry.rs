use super::breaker::CircuitBreaker;
use super::types::RetryConfig;
use crate::error::RetryError;
use crate::metrics;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Retry executor with exponential backoff, optionally guarded by a circuit breaker
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            breaker: None,
        }
    }

    /// Consult and update `breaker` around every attempt
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Execute a function with retries
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with_predicate(f, |_| true).await
    }

    /// Execute with retries, but only if error matches predicate
    ///
    /// Errors rejected by `should_retry` are returned at once and are not
    /// counted against the breaker.
    pub async fn execute_with_predicate<F, Fut, T, E, P>(
        &self,
        mut f: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut backoff = self.create_backoff();
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(breaker) = &self.breaker {
                if !breaker.allow_request() {
                    warn!(
                        breaker = breaker.name(),
                        attempt, "Circuit open, not attempting call"
                    );
                    metrics::record_retry_attempt(breaker.name(), "circuit_open");
                    return Err(RetryError::CircuitOpen {
                        breaker: breaker.name().to_string(),
                    });
                }
            }

            debug!(attempt, max_attempts, "Executing call");

            match f().await {
                Ok(result) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    if attempt > 1 {
                        debug!(attempt, "Call succeeded after retries");
                    }
                    metrics::record_retry_attempt(self.label(), "success");
                    return Ok(result);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        debug!(attempt, error = %e, "Error not retryable");
                        metrics::record_retry_attempt(self.label(), "not_retryable");
                        return Err(RetryError::Operation(e));
                    }

                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    metrics::record_retry_attempt(self.label(), "failure");

                    if attempt >= max_attempts {
                        error!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "Call failed after max retries"
                        );
                        return Err(RetryError::Operation(e));
                    }

                    let wait = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.config.max_delay())
                        .min(self.config.max_delay());

                    warn!(
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying after backoff"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn label(&self) -> &str {
        self.breaker
            .as_ref()
            .map(|breaker| breaker.name())
            .unwrap_or("unguarded")
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.base_delay())
            .with_max_interval(self.config.max_delay())
            .with_multiplier(self.config.exponential_base)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // We handle max retries manually
            .build()
    }
}

/// Wrap `op` so that every invocation of the returned callable runs it under `executor`
pub fn with_retry<F, Fut, T, E>(
    op: F,
    executor: RetryExecutor,
) -> impl Fn() -> BoxFuture<'static, Result<T, RetryError<E>>> + Send + Sync + Clone
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let op = Arc::new(op);
    let executor = Arc::new(executor);

    move || {
        let op = op.clone();
        let executor = executor.clone();
        Box::pin(async move { executor.execute(|| op()).await })
    }
}
