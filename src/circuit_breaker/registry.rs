use super::breaker::CircuitBreaker;
use super::types::{BreakerStatus, CircuitBreakerConfig, CircuitState};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Circuit breakers shared by name
///
/// Clones share the same breakers, so every call site handed a clone of one
/// registry observes the same state for a given dependency name.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    /// Circuit breakers per dependency
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    /// Configuration for breakers created without an explicit one
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    /// Create a new registry
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Get or create the breaker for a dependency
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with(name, self.config.clone())
    }

    /// Get or create a breaker; `config` is only used if the breaker does not exist yet
    pub fn get_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Look up a breaker without creating it
    pub fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// State of a breaker; unknown dependencies are reported closed
    pub fn state(&self, name: &str) -> CircuitState {
        self.find(name)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Get all dependency names with circuit breakers
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Status of every registered breaker, ordered by name
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        // Collect handles first so no shard lock is held while breakers lock
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut statuses: Vec<BreakerStatus> = breakers.iter().map(|b| b.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
