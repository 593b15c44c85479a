//! Worker configuration (`spec.md` §8 harness note). Grounded on
//! `worker::durable_worker::DurableWorkerConfig::from_env`: plain
//! environment-variable reads with sane defaults, no config-file format.

use std::time::Duration;

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique identifier for this worker process, surfaced in every
    /// `tracing` span so logs from concurrent workers can be told apart.
    pub worker_id: String,
    /// Temporal task queue this worker polls (ignored by the in-memory
    /// adapter).
    pub task_queue: String,
    /// Temporal server address; unused when `WORKFLOW_RUNTIME=inmemory`.
    pub temporal_address: String,
    pub max_concurrent_tasks: usize,
    pub poll_interval: Duration,
    /// `"temporal"` (default) or `"inmemory"` (`spec.md` §8's harness
    /// scenario runner).
    pub runtime: String,
    /// Above this history length, the `do` sequencer triggers
    /// continue-as-new even without the runtime's own suggestion.
    pub history_length_override: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("workflow-worker-{}", Uuid::now_v7()),
            task_queue: "workflow-tasks".to_string(),
            temporal_address: "http://127.0.0.1:7233".to_string(),
            max_concurrent_tasks: 10,
            poll_interval: Duration::from_secs(1),
            runtime: "temporal".to_string(),
            history_length_override: 10_000,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let worker_id = std::env::var("WORKER_ID").unwrap_or(defaults.worker_id);
        let task_queue = std::env::var("TASK_QUEUE").unwrap_or(defaults.task_queue);
        let temporal_address =
            std::env::var("TEMPORAL_ADDRESS").unwrap_or(defaults.temporal_address);
        let runtime = std::env::var("WORKFLOW_RUNTIME").unwrap_or(defaults.runtime);

        let max_concurrent_tasks = std::env::var("MAX_CONCURRENT_TASKS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_concurrent_tasks);

        let history_length_override = std::env::var("HISTORY_LENGTH_OVERRIDE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.history_length_override);

        Self {
            worker_id,
            task_queue,
            temporal_address,
            max_concurrent_tasks,
            runtime,
            history_length_override,
            ..defaults
        }
    }
}
