use crate::error::{ResilienceError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ResilienceError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        // Register all metrics with descriptions
        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        // Task queue metrics
        describe_counter!(
            "resilience_tasks_enqueued_total",
            "Total number of tasks admitted to the queue"
        );
        describe_counter!(
            "resilience_tasks_rejected_total",
            "Total number of tasks rejected because the queue was full"
        );
        describe_counter!(
            "resilience_tasks_completed_total",
            "Total number of tasks that completed successfully"
        );
        describe_counter!(
            "resilience_tasks_failed_total",
            "Total number of tasks whose job failed"
        );
        describe_histogram!(
            "resilience_task_latency_seconds",
            "Time from enqueue to completion of successful tasks"
        );
        describe_counter!(
            "resilience_tasks_evicted_total",
            "Total number of terminal task records removed after their TTL"
        );
        describe_gauge!(
            "resilience_queue_depth",
            "Number of tasks waiting for a worker"
        );
        describe_gauge!("resilience_queue_workers", "Number of queue workers");
        describe_counter!(
            "resilience_queue_surge_total",
            "Total number of workers added by surge scaling"
        );

        // Circuit breaker metrics
        describe_gauge!(
            "resilience_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
        );
        describe_counter!(
            "resilience_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );

        // Retry metrics
        describe_counter!(
            "resilience_retry_attempts_total",
            "Total number of guarded call attempts by outcome"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Get the Prometheus metrics handle
    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

pub fn record_task_enqueued() {
    counter!("resilience_tasks_enqueued_total").increment(1);
}

pub fn record_task_rejected() {
    counter!("resilience_tasks_rejected_total").increment(1);
}

pub fn record_task_completed(latency_secs: f64) {
    counter!("resilience_tasks_completed_total").increment(1);
    histogram!("resilience_task_latency_seconds").record(latency_secs);
}

pub fn record_task_failed() {
    counter!("resilience_tasks_failed_total").increment(1);
}

pub fn record_tasks_evicted(count: usize) {
    counter!("resilience_tasks_evicted_total").increment(count as u64);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("resilience_queue_depth").set(depth as f64);
}

pub fn record_queue_workers(workers: usize) {
    gauge!("resilience_queue_workers").set(workers as f64);
}

pub fn record_queue_surge(added: usize) {
    counter!("resilience_queue_surge_total").increment(added as u64);
}

/// Record circuit breaker state
/// State: 0 = Closed, 1 = Open, 2 = HalfOpen
pub fn record_circuit_breaker_state(breaker: &str, state: u8) {
    let labels = [("breaker", breaker.to_string())];
    gauge!("resilience_circuit_breaker_state", &labels).set(state as f64);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(breaker: &str, from_state: &str, to_state: &str) {
    let labels = [
        ("breaker", breaker.to_string()),
        ("from", from_state.to_string()),
        ("to", to_state.to_string()),
    ];
    counter!("resilience_circuit_breaker_transitions_total", &labels).increment(1);
}

/// Record one guarded call attempt; `outcome` is success, failure, not_retryable or circuit_open
pub fn record_retry_attempt(breaker: &str, outcome: &str) {
    let labels = [
        ("breaker", breaker.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("resilience_retry_attempts_total", &labels).increment(1);
}
