pub mod task_queue;
pub mod types;

pub use task_queue::TaskQueue;
pub use types::{
    MaintenanceReport, QueueConfig, QueueMetrics, TaskRecord, TaskStatus, TaskSummary,
};
