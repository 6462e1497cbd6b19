use crate::circuit_breaker::{CircuitBreakerConfig, RetryConfig};
use crate::error::{ResilienceError, Result};
use crate::queue::QueueConfig;
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "RESILIENCE";

/// Main resilience layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Task queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Defaults for breakers created through the registry
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Default retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ResilienceConfig {
    /// Load configuration from a YAML file, with `RESILIENCE_<SECTION>__<FIELD>` overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResilienceError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize::<Self>())
            .map_err(|e| ResilienceError::Config(format!("Failed to load config: {}", e)))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ResilienceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let queue = &self.queue;

        if queue.max_queue_size == 0 {
            return Err(ResilienceError::Config(
                "queue.max_queue_size must be > 0".to_string(),
            ));
        }
        if queue.workers == 0 {
            return Err(ResilienceError::Config(
                "queue.workers must be > 0".to_string(),
            ));
        }
        if queue.max_worker_cap < queue.workers {
            return Err(ResilienceError::Config(format!(
                "queue.max_worker_cap ({}) must be >= queue.workers ({})",
                queue.max_worker_cap, queue.workers
            )));
        }
        if !(queue.surge_threshold > 0.0 && queue.surge_threshold <= 1.0) {
            return Err(ResilienceError::Config(format!(
                "queue.surge_threshold must be in (0, 1], got {}",
                queue.surge_threshold
            )));
        }
        if queue.surge_batch_limit == 0 {
            return Err(ResilienceError::Config(
                "queue.surge_batch_limit must be > 0".to_string(),
            ));
        }
        if queue.cleanup_interval_secs == 0 {
            return Err(ResilienceError::Config(
                "queue.cleanup_interval_secs must be > 0".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ResilienceError::Config(
                "circuit_breaker.failure_threshold must be > 0".to_string(),
            ));
        }

        let retry = &self.retry;
        if !(retry.exponential_base >= 1.0) {
            return Err(ResilienceError::Config(format!(
                "retry.exponential_base must be >= 1, got {}",
                retry.exponential_base
            )));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ResilienceError::Config(format!(
                "retry.base_delay_ms ({}) must be <= retry.max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }

        Ok(())
    }
}
