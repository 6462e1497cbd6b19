use super::types::{
    BoxedJob, MaintenanceReport, QueueConfig, QueueMetrics, QueuedJob, TaskRecord, TaskStatus,
    TaskSummary,
};
use crate::metrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flume::{Receiver, Sender, TrySendError};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// In-process bounded task queue with a worker pool
///
/// Admission never blocks: when the channel is full the task is recorded as
/// `Rejected` and its id returned. Workers and the maintenance loop are started
/// on the first `enqueue` and stop once every handle to the queue is dropped.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    shared: Arc<Shared>,
    sender: Sender<QueuedJob>,
    receiver: Receiver<QueuedJob>,
    started: AtomicBool,
}

/// State shared between the queue handle and its workers
struct Shared {
    tasks: DashMap<String, TaskRecord>,
    processed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    latency_micros: AtomicU64,
    active_workers: AtomicUsize,
}

/// Why `enqueue` refused a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Full,
    Closed,
    Collision,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Rejection::Full => "queue full",
            Rejection::Closed => "queue closed",
            Rejection::Collision => "task id collision",
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.inner.config)
            .field("tasks", &self.inner.shared.tasks.len())
            .field("queue_depth", &self.inner.receiver.len())
            .finish()
    }
}

impl TaskQueue {
    /// Create a new task queue; nothing is spawned until the first `enqueue`
    ///
    /// A `max_queue_size` of 0 is raised to 1, since a zero-capacity channel
    /// would hand jobs straight to idle workers instead of rejecting them.
    pub fn new(mut config: QueueConfig) -> Self {
        if config.max_queue_size == 0 {
            warn!("max_queue_size of 0 is not a valid capacity, using 1");
            config.max_queue_size = 1;
        }
        let (sender, receiver) = flume::bounded(config.max_queue_size);

        Self {
            inner: Arc::new(Inner {
                config,
                shared: Arc::new(Shared {
                    tasks: DashMap::new(),
                    processed: AtomicU64::new(0),
                    failed: AtomicU64::new(0),
                    rejected: AtomicU64::new(0),
                    latency_micros: AtomicU64::new(0),
                    active_workers: AtomicUsize::new(0),
                }),
                sender,
                receiver,
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Submit a job and return its task id without waiting for it to run
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue<F, T, E>(&self, job: F) -> String
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        self.ensure_started();

        let task_id = format!("task-{}", Uuid::new_v4().simple());
        let job: BoxedJob = Box::pin(async move {
            match job.await {
                Ok(value) => serde_json::to_value(value)
                    .map_err(|e| format!("Failed to serialize job result: {}", e)),
                Err(e) => Err(e.to_string()),
            }
        });
        let record = TaskRecord::queued(task_id.clone());

        // Hold the shard lock across the send so a worker never claims a job before its record exists
        let admission = match self.inner.shared.tasks.entry(task_id.clone()) {
            Entry::Occupied(_) => Err(Rejection::Collision),
            Entry::Vacant(slot) => {
                let outcome = match self.inner.sender.try_send(QueuedJob {
                    task_id: task_id.clone(),
                    job,
                }) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => Err(Rejection::Full),
                    Err(TrySendError::Disconnected(_)) => Err(Rejection::Closed),
                };
                slot.insert(match outcome {
                    Ok(()) => record,
                    Err(rejection) => TaskRecord::rejected(task_id.clone(), rejection.as_str()),
                });
                outcome
            }
        };

        let depth = self.inner.receiver.len();
        metrics::record_queue_depth(depth);

        match admission {
            Ok(()) => {
                metrics::record_task_enqueued();
                info!(
                    task_id = %task_id,
                    pending = depth,
                    max_queue_size = self.inner.config.max_queue_size,
                    "Enqueued task"
                );
            }
            Err(rejection) => {
                self.inner.shared.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_task_rejected();
                warn!(
                    task_id = %task_id,
                    reason = rejection.as_str(),
                    max_queue_size = self.inner.config.max_queue_size,
                    "Rejected task"
                );
            }
        }

        task_id
    }

    /// Current record of a task, if it has not been evicted
    pub fn get_status(&self, task_id: &str) -> Option<TaskRecord> {
        self.inner
            .shared
            .tasks
            .get(task_id)
            .map(|record| record.value().clone())
    }

    /// Id, status and step of every known task, oldest first
    pub fn list_all(&self) -> Vec<TaskSummary> {
        let mut records: Vec<(chrono::DateTime<chrono::Utc>, TaskSummary)> = self
            .inner
            .shared
            .tasks
            .iter()
            .map(|entry| (entry.created_at, entry.summary()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        records.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Snapshot of counters and live gauges
    pub fn metrics(&self) -> QueueMetrics {
        let shared = &self.inner.shared;
        let processed = shared.processed.load(Ordering::Relaxed);
        let latency_micros = shared.latency_micros.load(Ordering::Relaxed);
        let avg_latency_secs = if processed > 0 {
            latency_micros as f64 / processed as f64 / 1_000_000.0
        } else {
            0.0
        };

        QueueMetrics {
            processed_count: processed,
            failed_count: shared.failed.load(Ordering::Relaxed),
            rejected_count: shared.rejected.load(Ordering::Relaxed),
            avg_latency_secs,
            active_workers: shared.active_workers.load(Ordering::Relaxed),
            queue_depth: self.inner.receiver.len(),
            max_queue_size: self.inner.config.max_queue_size,
        }
    }

    /// Jobs waiting in the channel
    pub fn pending_count(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.shared.active_workers.load(Ordering::Relaxed)
    }

    /// Run one cleanup and surge pass, as the background loop does every interval
    ///
    /// Must be called from within a Tokio runtime, since surge scaling spawns workers.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        self.inner.run_maintenance()
    }

    fn ensure_started(&self) {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let workers = self.inner.config.workers;
        let first_id = self
            .inner
            .shared
            .active_workers
            .fetch_add(workers, Ordering::AcqRel);
        self.inner.spawn_workers(first_id, workers);
        spawn_maintenance_loop(Arc::downgrade(&self.inner), &self.inner.config);

        info!(
            workers = self.inner.config.workers,
            max_queue_size = self.inner.config.max_queue_size,
            "Started task queue"
        );
    }
}

impl Inner {
    /// Spawn workers for slots already reserved in `active_workers`
    fn spawn_workers(&self, first_id: usize, count: usize) {
        for worker_id in first_id..first_id + count {
            tokio::spawn(worker_loop(
                worker_id,
                self.shared.clone(),
                self.receiver.clone(),
            ));
        }
        metrics::record_queue_workers(self.shared.active_workers.load(Ordering::Relaxed));
    }

    fn run_maintenance(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            evicted: self.evict_expired(),
            workers_added: self.check_surge(),
        };
        metrics::record_queue_depth(self.receiver.len());
        report
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.task_ttl();
        let mut evicted = 0;

        self.shared.tasks.retain(|_, record| {
            if record.is_expired(now, ttl) {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            metrics::record_tasks_evicted(evicted);
            info!(evicted, "Cleaned up expired tasks");
        }
        evicted
    }

    /// Scale up when the backlog is close to capacity; workers are never removed
    fn check_surge(&self) -> usize {
        if !self.started.load(Ordering::Acquire) {
            return 0;
        }

        let depth = self.receiver.len();
        let utilization = depth as f64 / self.config.max_queue_size.max(1) as f64;
        if utilization < self.config.surge_threshold {
            return 0;
        }

        let batch = self.config.workers.min(self.config.surge_batch_limit);
        let cap = self.config.max_worker_cap;
        if batch == 0 {
            return 0;
        }

        // Slots are reserved before spawning; overlapping passes must stay within the cap
        let Ok(active) = self.shared.active_workers.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |active| (active < cap).then(|| active + batch.min(cap - active)),
        ) else {
            return 0;
        };
        let additional = batch.min(cap - active);

        self.spawn_workers(active, additional);
        metrics::record_queue_surge(additional);
        warn!(
            utilization = %format!("{:.0}%", utilization * 100.0),
            added = additional,
            workers = active + additional,
            cap = self.config.max_worker_cap,
            "Queue surge, scaling up workers"
        );
        additional
    }
}

fn spawn_maintenance_loop(inner: Weak<Inner>, config: &QueueConfig) -> JoinHandle<()> {
    let period = config.cleanup_interval();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                debug!("Task queue dropped, stopping maintenance loop");
                break;
            };
            inner.run_maintenance();
        }
    })
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, receiver: Receiver<QueuedJob>) {
    debug!(worker_id, "Worker started");

    while let Ok(QueuedJob { task_id, job }) = receiver.recv_async().await {
        shared.run(worker_id, task_id, job).await;
    }

    debug!(worker_id, "Queue closed, worker exiting");
}

impl Shared {
    async fn run(&self, worker_id: usize, task_id: String, job: BoxedJob) {
        match self.tasks.get_mut(&task_id) {
            Some(mut record) => record.set_status(TaskStatus::Processing),
            None => {
                warn!(worker_id, task_id = %task_id, "No record for claimed task, skipping");
                return;
            }
        }

        let outcome = match AssertUnwindSafe(job).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(panic_message(panic)),
        };

        let Some(mut record) = self.tasks.get_mut(&task_id) else {
            return;
        };
        record.finish();

        match outcome {
            Ok(value) => {
                record.result = Some(value);
                record.set_status(TaskStatus::Completed);
                let latency = record.latency().unwrap_or_default();
                drop(record);

                self.processed.fetch_add(1, Ordering::Relaxed);
                self.latency_micros
                    .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
                metrics::record_task_completed(latency.as_secs_f64());
                info!(
                    worker_id,
                    task_id = %task_id,
                    latency_ms = latency.as_millis() as u64,
                    "Completed task"
                );
            }
            Err(e) => {
                record.error = Some(e.clone());
                record.set_status(TaskStatus::Failed);
                drop(record);

                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_task_failed();
                error!(worker_id, task_id = %task_id, error = %e, "Task failed");
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("job panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("job panicked: {}", msg)
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(max_queue_size: usize, workers: usize) -> QueueConfig {
        QueueConfig {
            max_queue_size,
            workers,
            ..Default::default()
        }
    }

    async fn wait_terminal(queue: &TaskQueue, task_id: &str) -> TaskRecord {
        for _ in 0..1000 {
            if let Some(record) = queue.get_status(task_id) {
                if record.status.is_terminal() {
                    return record;
                }
            }
            tokio::task::yield_now().await;
        }
        panic!("task {} did not finish", task_id);
    }

    #[tokio::test]
    async fn test_enqueue_completes_job() {
        let queue = TaskQueue::new(config(10, 2));
        let id = queue.enqueue(async { Ok::<_, String>(serde_json::json!({"verdict": "benign"})) });

        assert!(id.starts_with("task-"));
        let record = wait_terminal(&queue, &id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.step, "completed");
        assert_eq!(record.result, Some(serde_json::json!({"verdict": "benign"})));
        assert!(record.error.is_none());
        assert!(record.completed_at.unwrap() >= record.created_at);

        let metrics = queue.metrics();
        assert_eq!(metrics.processed_count, 1);
        assert_eq!(metrics.failed_count, 0);
        assert_eq!(metrics.active_workers, 2);
    }

    #[tokio::test]
    async fn test_failed_job_is_recorded() {
        let queue = TaskQueue::new(config(10, 1));
        let id = queue.enqueue(async { Err::<(), _>("upstream returned 502") });

        let record = wait_terminal(&queue, &id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("upstream returned 502"));
        assert!(record.completed_at.is_some());
        assert_eq!(queue.metrics().failed_count, 1);
        assert_eq!(queue.metrics().processed_count, 0);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let queue = TaskQueue::new(config(10, 1));
        let bad = queue.enqueue(async {
            if true {
                panic!("boom");
            }
            Ok::<(), String>(())
        });
        let good = queue.enqueue(async { Ok::<_, String>(7) });

        let record = wait_terminal(&queue, &bad).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("job panicked: boom"));

        let record = wait_terminal(&queue, &good).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(serde_json::json!(7)));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let queue = TaskQueue::new(config(2, 1));

        let first = queue.enqueue(async { Ok::<_, String>(1) });
        let second = queue.enqueue(async { Ok::<_, String>(2) });
        let third = queue.enqueue(async { Ok::<_, String>(3) });

        let rejected = queue.get_status(&third).unwrap();
        assert_eq!(rejected.status, TaskStatus::Rejected);
        assert_eq!(rejected.error.as_deref(), Some("queue full"));
        assert!(rejected.completed_at.is_some());

        let metrics = queue.metrics();
        assert_eq!(metrics.rejected_count, 1);
        assert!(metrics.queue_depth <= metrics.max_queue_size);

        assert_eq!(wait_terminal(&queue, &first).await.status, TaskStatus::Completed);
        assert_eq!(wait_terminal(&queue, &second).await.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let queue = TaskQueue::new(QueueConfig::default());
        assert!(queue.get_status("task-missing").is_none());
        assert!(queue.list_all().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_before_start() {
        let queue = TaskQueue::new(config(8, 3));
        let metrics = queue.metrics();

        assert_eq!(metrics.active_workers, 0);
        assert_eq!(metrics.queue_depth, 0);
        assert_eq!(metrics.max_queue_size, 8);
        assert_eq!(metrics.avg_latency_secs, 0.0);
        assert_eq!(queue.run_maintenance(), MaintenanceReport::default());
    }

    #[tokio::test]
    async fn test_list_all_projection() {
        let queue = TaskQueue::new(config(1, 1));
        let admitted = queue.enqueue(async { Ok::<_, String>(()) });
        let rejected = queue.enqueue(async { Ok::<_, String>(()) });

        let listed = queue.list_all();
        assert_eq!(listed.len(), 2);

        let admitted_summary = listed.iter().find(|s| s.id == admitted).unwrap();
        assert_eq!(admitted_summary.status, TaskStatus::Queued);
        assert_eq!(admitted_summary.step, "queued");

        let rejected_summary = listed.iter().find(|s| s.id == rejected).unwrap();
        assert_eq!(rejected_summary.status, TaskStatus::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_latency() {
        let queue = TaskQueue::new(config(10, 2));
        let a = queue.enqueue(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(())
        });
        let b = queue.enqueue(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, String>(())
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        wait_terminal(&queue, &a).await;
        wait_terminal(&queue, &b).await;

        let avg = queue.metrics().avg_latency_secs;
        assert!((avg - 0.2).abs() < 0.005, "avg latency was {}", avg);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_eviction() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 10,
            workers: 1,
            task_ttl_secs: 60,
            cleanup_interval_secs: 3600,
            ..Default::default()
        });
        let id = queue.enqueue(async { Ok::<_, String>(()) });
        wait_terminal(&queue, &id).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(queue.run_maintenance().evicted, 0);
        assert!(queue.get_status(&id).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(queue.run_maintenance().evicted, 1);
        assert!(queue.get_status(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tasks_are_never_evicted() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 10,
            workers: 1,
            task_ttl_secs: 1,
            cleanup_interval_secs: 3600,
            ..Default::default()
        });
        let id = queue.enqueue(std::future::pending::<Result<(), String>>());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(queue.run_maintenance().evicted, 0);
        assert_eq!(queue.get_status(&id).unwrap().status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn test_surge_scales_up_to_cap_and_never_down() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 5,
            workers: 1,
            max_worker_cap: 3,
            ..Default::default()
        });

        // No await between these, so the workers have not claimed anything yet
        for _ in 0..5 {
            queue.enqueue(async { Ok::<_, String>(()) });
        }
        assert_eq!(queue.worker_count(), 1);
        assert_eq!(queue.pending_count(), 5);

        assert_eq!(queue.run_maintenance().workers_added, 1);
        assert_eq!(queue.worker_count(), 2);
        assert_eq!(queue.run_maintenance().workers_added, 1);
        assert_eq!(queue.worker_count(), 3);
        assert_eq!(queue.run_maintenance().workers_added, 0);
        assert_eq!(queue.worker_count(), 3);
    }

    #[tokio::test]
    async fn test_surge_batch_is_bounded() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 10,
            workers: 20,
            max_worker_cap: 35,
            surge_batch_limit: 10,
            ..Default::default()
        });

        for _ in 0..10 {
            queue.enqueue(async { Ok::<_, String>(()) });
        }

        assert_eq!(queue.run_maintenance().workers_added, 10);
        assert_eq!(queue.run_maintenance().workers_added, 5);
        assert_eq!(queue.worker_count(), 35);
    }

    #[tokio::test]
    async fn test_no_surge_below_threshold() {
        let queue = TaskQueue::new(config(10, 1));
        for _ in 0..7 {
            queue.enqueue(async { Ok::<_, String>(()) });
        }

        assert_eq!(queue.run_maintenance().workers_added, 0);
        assert_eq!(queue.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_record_carries_reason() {
        let queue = TaskQueue::new(config(1, 1));
        queue.enqueue(async { Ok::<_, String>(()) });
        let rejected = queue.enqueue(async { Ok::<_, String>(()) });

        let record = queue.get_status(&rejected).unwrap();
        assert_eq!(record.error.as_deref(), Some(Rejection::Full.as_str()));
        assert_eq!(Rejection::Closed.as_str(), "queue closed");
        assert_eq!(Rejection::Collision.as_str(), "task id collision");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let queue = TaskQueue::new(config(0, 1));
        assert_eq!(queue.config().max_queue_size, 1);

        let admitted = queue.enqueue(async { Ok::<_, String>(()) });
        let rejected = queue.enqueue(async { Ok::<_, String>(()) });

        assert_eq!(queue.get_status(&rejected).unwrap().status, TaskStatus::Rejected);
        assert_eq!(wait_terminal(&queue, &admitted).await.status, TaskStatus::Completed);
        assert_eq!(queue.metrics().max_queue_size, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_maintenance_respects_worker_cap() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 100,
            workers: 1,
            max_worker_cap: 8,
            cleanup_interval_secs: 3600,
            ..Default::default()
        });
        for _ in 0..100 {
            queue.enqueue(std::future::pending::<Result<(), String>>());
        }

        let mut passes = Vec::new();
        for _ in 0..32 {
            let queue = queue.clone();
            passes.push(tokio::spawn(async move {
                let mut added = 0;
                for _ in 0..4 {
                    added += queue.run_maintenance().workers_added;
                    tokio::task::yield_now().await;
                }
                added
            }));
        }

        let mut added = 0;
        for pass in passes {
            added += pass.await.unwrap();
        }
        assert_eq!(added, 7);
        assert_eq!(queue.worker_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_loop_evicts_on_tick() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 10,
            workers: 1,
            task_ttl_secs: 1,
            cleanup_interval_secs: 5,
            ..Default::default()
        });
        let id = queue.enqueue(async { Ok::<_, String>(()) });
        wait_terminal(&queue, &id).await;

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(queue.get_status(&id).is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(queue.get_status(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_loop_scales_on_tick() {
        let queue = TaskQueue::new(QueueConfig {
            max_queue_size: 5,
            workers: 1,
            max_worker_cap: 3,
            cleanup_interval_secs: 5,
            ..Default::default()
        });
        for _ in 0..5 {
            queue.enqueue(std::future::pending::<Result<(), String>>());
        }
        assert_eq!(queue.worker_count(), 1);

        // The first worker holds one job, leaving the backlog at the threshold
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(queue.worker_count(), 2);

        // The new worker drains the backlog below the threshold
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(queue.worker_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_loop_stops_when_queue_dropped() {
        let queue = TaskQueue::new(QueueConfig {
            cleanup_interval_secs: 5,
            ..Default::default()
        });
        let config = queue.config().clone();
        let handle = spawn_maintenance_loop(Arc::downgrade(&queue.inner), &config);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!handle.is_finished());

        drop(queue);
        let stopped = tokio::time::timeout(Duration::from_secs(10), handle).await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }
}
