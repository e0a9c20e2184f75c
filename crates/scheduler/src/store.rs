use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::task::TaskRecord;

/// Persistence seam for task records. The in-memory implementation below
/// backs this repo's daemon; a file- or database-backed implementation
/// would persist the same `TaskRecord` JSON shape (see spec §6).
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: TaskRecord) -> Result<(), SchedulerError>;
    async fn get(&self, client_id: &str, task_id: Uuid) -> Result<Option<TaskRecord>, SchedulerError>;
    async fn remove(&self, client_id: &str, task_id: Uuid) -> Result<Option<TaskRecord>, SchedulerError>;
    async fn update(&self, task: TaskRecord) -> Result<(), SchedulerError>;
    async fn list_for_client(&self, client_id: &str) -> Result<Vec<TaskRecord>, SchedulerError>;
    async fn all(&self) -> Result<Vec<TaskRecord>, SchedulerError>;
    /// Drops every task with `persist == false`, standing in for the
    /// on-disk survival a file-backed store would give for free.
    async fn reload(&self) -> Result<(), SchedulerError>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<BTreeMap<(String, Uuid), TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: TaskRecord) -> Result<(), SchedulerError> {
        let key = (task.client_id.clone(), task.task_id);
        self.tasks.lock().await.insert(key, task);
        Ok(())
    }

    async fn get(&self, client_id: &str, task_id: Uuid) -> Result<Option<TaskRecord>, SchedulerError> {
        Ok(self
            .tasks
            .lock()
            .await
            .get(&(client_id.to_string(), task_id))
            .cloned())
    }

    async fn remove(&self, client_id: &str, task_id: Uuid) -> Result<Option<TaskRecord>, SchedulerError> {
        Ok(self.tasks.lock().await.remove(&(client_id.to_string(), task_id)))
    }

    async fn update(&self, task: TaskRecord) -> Result<(), SchedulerError> {
        let key = (task.client_id.clone(), task.task_id);
        let mut guard = self.tasks.lock().await;
        if !guard.contains_key(&key) {
            return Err(SchedulerError::TaskNotFound {
                client_id: task.client_id,
                task_id: task.task_id,
            });
        }
        guard.insert(key, task);
        Ok(())
    }

    async fn list_for_client(&self, client_id: &str) -> Result<Vec<TaskRecord>, SchedulerError> {
        Ok(self
            .tasks
            .lock()
            .await
            .values()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        Ok(self.tasks.lock().await.values().cloned().collect())
    }

    async fn reload(&self) -> Result<(), SchedulerError> {
        self.tasks.lock().await.retain(|_, t| t.persist);
        Ok(())
    }
}
