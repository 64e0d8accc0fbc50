//! Task lifecycle state and the seams the race engine reports through

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Mint a fresh task id
pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lifecycle of one generation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Finer-grained progress stage reported to watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Queued,
    Generating,
    SwitchingProvider,
    Completed,
}

/// Partial update applied to a task record; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub stage: Option<TaskStage>,
    pub progress: Option<f64>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: TaskStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>, code: Option<String>) -> Self {
        self.error = Some(error.into());
        self.error_code = code;
        self
    }

    pub fn completed_now(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn started_now(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }
}

/// Where task state is persisted and cancellation flags are read from
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<()>;
    /// Cooperative cancellation flag, checked between race rounds
    async fn is_cancelled(&self, task_id: &str) -> bool;
}

/// Refunds reserved generation quota when a task produces nothing
#[async_trait]
pub trait QuotaService: Send + Sync {
    async fn refund(&self, user_id: &str, count: u32) -> Result<()>;
}

/// Pushes progress events to whoever is watching the task
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn progress(&self, user_id: &str, task_id: &str, stage: TaskStage, progress: f64);
    async fn completed(&self, user_id: &str, task_id: &str, provider: &str, duration_ms: u64);
    async fn error(&self, user_id: &str, task_id: &str, error: &str, code: Option<&str>);
}

/// Materialized task record held by [`MemoryTaskStore`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskRecord {
    pub status: Option<TaskStatus>,
    pub stage: Option<TaskStage>,
    pub progress: f64,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
}

/// In-process task store; the default when no external store is wired in
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<String, TaskRecord>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id).map(|r| r.clone())
    }

    pub fn cancel(&self, task_id: &str) {
        self.tasks.entry(task_id.to_string()).or_default().cancelled = true;
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<()> {
        let mut record = self.tasks.entry(task_id.to_string()).or_default();
        if let Some(status) = update.status {
            record.status = Some(status);
        }
        if let Some(stage) = update.stage {
            record.stage = Some(stage);
        }
        if let Some(progress) = update.progress {
            record.progress = progress;
        }
        if update.provider.is_some() {
            record.provider = update.provider;
        }
        if update.model.is_some() {
            record.model = update.model;
        }
        if update.error.is_some() {
            record.error = update.error;
        }
        if update.error_code.is_some() {
            record.error_code = update.error_code;
        }
        if update.started_at.is_some() {
            record.started_at = update.started_at;
        }
        if update.completed_at.is_some() {
            record.completed_at = update.completed_at;
        }
        Ok(())
    }

    async fn is_cancelled(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).map(|r| r.cancelled).unwrap_or(false)
    }
}

/// Notifier that drops every event; for callers that do not stream progress
pub struct NoopNotifier;

#[async_trait]
impl ProgressNotifier for NoopNotifier {
    async fn progress(&self, _user_id: &str, _task_id: &str, _stage: TaskStage, _progress: f64) {}
    async fn completed(&self, _user_id: &str, _task_id: &str, _provider: &str, _duration_ms: u64) {}
    async fn error(&self, _user_id: &str, _task_id: &str, _error: &str, _code: Option<&str>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_partial_updates() {
        let store = MemoryTaskStore::new();
        store
            .update(
                "t1",
                TaskUpdate::status(TaskStatus::Generating)
                    .with_progress(0.2)
                    .started_now(),
            )
            .await
            .unwrap();
        store
            .update("t1", TaskUpdate::default().with_provider("alpha"))
            .await
            .unwrap();

        let record = store.get("t1").unwrap();
        assert_eq!(record.status, Some(TaskStatus::Generating));
        assert_eq!(record.provider.as_deref(), Some("alpha"));
        // Unset fields untouched
        assert!((record.progress - 0.2).abs() < 1e-9);
        assert!(record.started_at.is_some());
    }

    #[test]
    fn test_cancellation_flag() {
        tokio_test::block_on(async {
            let store = MemoryTaskStore::new();
            assert!(!store.is_cancelled("t1").await);
            store.cancel("t1");
            assert!(store.is_cancelled("t1").await);
        });
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(new_task_id(), new_task_id());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Generating.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
    }
}
