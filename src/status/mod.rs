use crate::circuit_breaker::{BreakerRegistry, BreakerStatus};
use crate::error::Result;
use crate::queue::{QueueMetrics, TaskQueue};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Combined read-only view of the queue and every circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub queue: QueueMetrics,
    pub circuit_breakers: Vec<BreakerStatus>,
}

impl StatusReport {
    pub fn collect(queue: &TaskQueue, breakers: &BreakerRegistry) -> Self {
        Self {
            generated_at: Utc::now(),
            queue: queue.metrics(),
            circuit_breakers: breakers.statuses(),
        }
    }

    /// Breakers that currently refuse or limit traffic
    pub fn degraded_breakers(&self) -> Vec<&str> {
        self.circuit_breakers
            .iter()
            .filter(|status| status.state != crate::circuit_breaker::CircuitState::Closed)
            .map(|status| status.name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
