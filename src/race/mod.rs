//! Hedged-race task execution

pub mod engine;
pub mod state;

pub use engine::{RaceConfig, RaceEngine, RaceOutcome};
pub use state::{
    new_task_id, MemoryTaskStore, NoopNotifier, ProgressNotifier, QuotaService, TaskRecord,
    TaskStage, TaskStatus, TaskStore, TaskUpdate,
};
