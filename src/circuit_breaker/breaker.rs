use super::types::{BreakerStatus, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker for a single named dependency
///
/// The state is never stored: it is derived from the failure count and the
/// time of the last failure every time it is read, under the same lock that
/// guards mutation.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Dependency identifier
    name: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Mutable counters
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    /// Failures since the last success
    failure_count: u32,
    /// Successes over the breaker lifetime
    success_count: u64,
    /// Monotonic time of the last failure
    last_failure: Option<Instant>,
    /// Wall-clock time of the last failure, for status reporting
    last_failure_at: Option<DateTime<Utc>>,
    /// When the outstanding half-open probe was let through
    probe_started: Option<Instant>,
    /// Last state seen by a reader, used only to report transitions
    observed: CircuitState,
    /// Metrics
    metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout_secs,
            "Creating circuit breaker"
        );

        Self {
            config,
            state: Mutex::new(State {
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_failure_at: None,
                probe_started: None,
                observed: CircuitState::Closed,
                metrics: CircuitBreakerMetrics::default(),
            }),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if a request can proceed
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();

        match self.observe(&mut state, now) {
            CircuitState::Closed => {
                state.metrics.total_requests += 1;
                true
            }
            CircuitState::Open => {
                state.metrics.rejected_requests += 1;
                debug!(breaker = %self.name, "Circuit breaker open, rejecting request");
                false
            }
            CircuitState::HalfOpen => {
                let probe_outstanding = state.probe_started.is_some_and(|started| {
                    now.saturating_duration_since(started) < self.config.recovery_timeout()
                });

                if probe_outstanding {
                    state.metrics.rejected_requests += 1;
                    debug!(breaker = %self.name, "Probe already in flight, rejecting");
                    false
                } else {
                    state.probe_started = Some(now);
                    state.metrics.total_requests += 1;
                    debug!(breaker = %self.name, "Allowing half-open probe request");
                    true
                }
            }
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let before = self.observe(&mut state, now);

        state.failure_count = 0;
        state.success_count += 1;
        state.probe_started = None;
        state.metrics.successful_requests += 1;

        if before == CircuitState::HalfOpen {
            info!(breaker = %self.name, "Probe succeeded");
        }
        self.observe(&mut state, now);
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let before = self.observe(&mut state, now);

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(now);
        state.last_failure_at = Some(Utc::now());
        state.probe_started = None;
        state.metrics.failed_requests += 1;

        debug!(
            breaker = %self.name,
            failure_count = state.failure_count,
            threshold = self.config.failure_threshold,
            "Request failed"
        );

        if before == CircuitState::HalfOpen {
            warn!(breaker = %self.name, "Half-open probe failed, reopening circuit");
        }
        self.observe(&mut state, now);
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.observe(&mut state, Instant::now())
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.state.lock().metrics.clone()
    }

    /// Snapshot of counters, thresholds and the derived state
    pub fn status(&self) -> BreakerStatus {
        let mut state = self.state.lock();
        let current = self.observe(&mut state, Instant::now());

        BreakerStatus {
            name: self.name.clone(),
            state: current,
            failure_count: state.failure_count,
            success_count: state.success_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout_secs,
            last_failure_at: state.last_failure_at,
            metrics: state.metrics.clone(),
        }
    }

    fn derive(&self, state: &State, now: Instant) -> CircuitState {
        if state.failure_count < self.config.failure_threshold {
            return CircuitState::Closed;
        }

        match state.last_failure {
            Some(at) if now.saturating_duration_since(at) >= self.config.recovery_timeout() => {
                CircuitState::HalfOpen
            }
            _ => CircuitState::Open,
        }
    }

    /// Derive the current state and report it if it differs from the last one seen
    fn observe(&self, state: &mut State, now: Instant) -> CircuitState {
        let current = self.derive(state, now);
        if current == state.observed {
            return current;
        }

        let previous = state.observed;
        state.observed = current;

        match current {
            CircuitState::Open => {
                state.metrics.circuit_opened_count += 1;
                warn!(
                    breaker = %self.name,
                    failure_count = state.failure_count,
                    "Circuit breaker opening"
                );
            }
            CircuitState::HalfOpen => {
                state.metrics.circuit_half_opened_count += 1;
                info!(
                    breaker = %self.name,
                    recovery_timeout = ?self.config.recovery_timeout(),
                    "Circuit breaker transitioning to half-open"
                );
            }
            CircuitState::Closed => {
                state.metrics.circuit_closed_count += 1;
                info!(breaker = %self.name, "Circuit breaker closing");
            }
        }

        metrics::record_circuit_breaker_transition(
            &self.name,
            &previous.to_string(),
            &current.to_string(),
        );
        metrics::record_circuit_breaker_state(&self.name, current.as_gauge());

        current
    }
}
