mod memory;
mod redis;

use async_trait::async_trait;
use shared::{NewTask, Task, TaskId, TaskPatch};
use thiserror::Error;

pub use self::memory::MemoryTaskStore;
pub use self::redis::RedisTaskStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("corrupt task record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Authoritative task persistence. Missing tasks are reported as `Ok(None)`.
///
/// Every method is atomic with respect to the record it touches; concurrent
/// writes to the same task resolve as last-write-wins.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks in insertion order.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Persists a new task under a freshly generated id.
    async fn create(&self, new_task: NewTask) -> Result<Task, StoreError>;

    /// Applies `patch` and returns the full task afterwards.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Option<Task>, StoreError>;

    /// Removes the task and returns its last state.
    async fn delete(&self, id: TaskId) -> Result<Option<Task>, StoreError>;
}
