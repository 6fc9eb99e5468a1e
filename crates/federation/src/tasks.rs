//! Background task contract.
//!
//! The pipeline never runs its own workers. It asks a [`TaskRunner`] to
//! schedule a [`Task`] and later asks whether the returned handle is still
//! alive; the runner calls back into a [`TaskExecutor`] to do the work.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use weft_common::AppResult;

use crate::fetch::FetchRequest;

/// Opaque handle of a scheduled task.
pub type TaskHandle = i64;

/// Scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Process one queued inbound entry.
    ProcessEntry { entry_id: i64 },
    /// Fetch a missing object and drain its ancestry.
    Fetch(FetchRequest),
    /// Deliver every pending target of one inbox.
    Deliver { inbox: String },
}

impl Task {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProcessEntry { .. } => "process_entry",
            Self::Fetch(_) => "fetch",
            Self::Deliver { .. } => "deliver",
        }
    }
}

/// Schedules tasks and reports their liveness.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Schedule a task, optionally after a delay.
    async fn schedule(
        &self,
        priority: Priority,
        task: Task,
        delay: Option<Duration>,
    ) -> AppResult<TaskHandle>;

    /// Whether a previously scheduled task is queued or running.
    async fn is_alive(&self, handle: TaskHandle) -> bool;
}

/// Runs tasks on behalf of a [`TaskRunner`].
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: Task, handle: TaskHandle) -> AppResult<()>;

    /// Called once a task has failed for good.
    async fn abandon(&self, task: &Task, handle: TaskHandle) -> AppResult<()>;
}
