use async_trait::async_trait;
use shared::{NewTask, Task, TaskId, TaskPatch};
use tokio::sync::RwLock;

use super::{StoreError, TaskStore};

/// In-process store, used with `STORE=memory` and by the route tests.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.read().await.clone())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn create(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let task = new_task.into_task(TaskId::generate());
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.iter_mut().find(|t| t.id == id).map(|task| {
            task.apply(&patch);
            task.clone()
        }))
    }

    async fn delete(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .iter()
            .position(|t| t.id == id)
            .map(|index| tasks.remove(index)))
    }
}
