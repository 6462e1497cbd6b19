use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Type-erased job as it travels through the channel
pub(crate) type BoxedJob = BoxFuture<'static, std::result::Result<Value, String>>;

/// Item handed from `enqueue` to a worker
pub(crate) struct QueuedJob {
    pub task_id: String,
    pub job: BoxedJob,
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping entry for one submitted job
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub status: TaskStatus,
    pub step: String,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Monotonic enqueue time, for latency
    #[serde(skip)]
    pub(crate) enqueued: Instant,
    /// Monotonic completion time, for TTL eviction
    #[serde(skip)]
    pub(crate) finished: Option<Instant>,
}

impl TaskRecord {
    pub(crate) fn queued(id: String) -> Self {
        Self {
            id,
            status: TaskStatus::Queued,
            step: TaskStatus::Queued.to_string(),
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            enqueued: Instant::now(),
            finished: None,
        }
    }

    pub(crate) fn rejected(id: String, error: impl Into<String>) -> Self {
        let mut record = Self::queued(id);
        record.set_status(TaskStatus::Rejected);
        record.error = Some(error.into());
        record.finish();
        record
    }

    pub(crate) fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.step = status.to_string();
    }

    pub(crate) fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
        self.finished = Some(Instant::now());
    }

    /// Time spent between enqueue and completion
    pub fn latency(&self) -> Option<Duration> {
        self.finished
            .map(|finished| finished.saturating_duration_since(self.enqueued))
    }

    /// Terminal and completed more than `ttl` before `now`
    pub(crate) fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.status.is_terminal()
            && self
                .finished
                .is_some_and(|finished| now.saturating_duration_since(finished) > ttl)
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            status: self.status,
            step: self.step.clone(),
        }
    }
}

/// Observability projection returned by `list_all`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub status: TaskStatus,
    pub step: String,
}

/// Snapshot of queue counters and live gauges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueMetrics {
    pub processed_count: u64,
    pub failed_count: u64,
    pub rejected_count: u64,
    pub avg_latency_secs: f64,
    pub active_workers: usize,
    pub queue_depth: usize,
    pub max_queue_size: usize,
}

/// Outcome of one cleanup and surge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Terminal records removed because they outlived the TTL
    pub evicted: usize,
    /// Workers spawned by surge scaling
    pub workers_added: usize,
}

/// Task queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Capacity of the admission channel
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Workers started on first enqueue, also the surge increment
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Hard ceiling on workers, surge included
    #[serde(default = "default_max_worker_cap")]
    pub max_worker_cap: usize,
    /// Queue utilization (depth / capacity) that triggers surge scaling
    #[serde(default = "default_surge_threshold")]
    pub surge_threshold: f64,
    /// Most workers added by a single surge
    #[serde(default = "default_surge_batch_limit")]
    pub surge_batch_limit: usize,
    /// How long terminal records are kept, in seconds
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,
    /// Period of the cleanup and surge loop, in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_workers() -> usize {
    5
}

fn default_max_worker_cap() -> usize {
    50
}

fn default_surge_threshold() -> f64 {
    0.8
}

fn default_surge_batch_limit() -> usize {
    10
}

fn default_task_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_cleanup_interval_secs() -> u64 {
    300 // 5 minutes
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            workers: default_workers(),
            max_worker_cap: default_max_worker_cap(),
            surge_threshold: default_surge_threshold(),
            surge_batch_limit: default_surge_batch_limit(),
            task_ttl_secs: default_task_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl QueueConfig {
    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.workers, 5);
        assert_eq!(config.max_worker_cap, 50);
        assert_eq!(config.surge_threshold, 0.8);
        assert_eq!(config.surge_batch_limit, 10);
        assert_eq!(config.task_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Rejected.is_terminal());
    }

    #[tokio::test]
    async fn test_rejected_record_is_terminal_immediately() {
        let record = TaskRecord::rejected("task-1".to_string(), "queue full");
        assert_eq!(record.status, TaskStatus::Rejected);
        assert_eq!(record.step, "rejected");
        assert_eq!(record.error.as_deref(), Some("queue full"));
        assert!(record.completed_at.is_some());
        assert!(record.completed_at.unwrap() >= record.created_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strictly_after_ttl() {
        let ttl = Duration::from_secs(60);
        let mut record = TaskRecord::queued("task-2".to_string());
        assert!(!record.is_expired(Instant::now() + ttl * 2, ttl));

        record.set_status(TaskStatus::Completed);
        record.finish();
        let finished = record.finished.unwrap();

        assert!(!record.is_expired(finished + ttl, ttl));
        assert!(record.is_expired(finished + ttl + Duration::from_millis(1), ttl));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
