use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use uuid::Uuid;

use crate::error::SchedulerError;
use crate::store::TaskStore;
use crate::task::{TaskRecord, TimeSpec};

/// How often the timer task wakes to check for due tasks.
const TICK: Duration = Duration::from_secs(1);

/// Fires due tasks by handing their payload to the client's delivery FIFO.
/// One handler per client; delivery is serialized through a bounded
/// channel so a slow client can't starve others, mirroring the teacher's
/// `OutboxDispatcher` poll loop but keyed per client instead of per
/// projection job.
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    handlers: Mutex<HashMap<String, mpsc::Sender<serde_json::Value>>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Registers the single handler for `client_id`, replacing any prior
    /// registration for that client. Returns the receiving half of its
    /// delivery FIFO.
    pub async fn register_handler(
        &self,
        client_id: impl Into<String>,
        capacity: usize,
    ) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(capacity);
        self.handlers.lock().await.insert(client_id.into(), tx);
        rx
    }

    pub async fn unregister_handler(&self, client_id: &str) {
        self.handlers.lock().await.remove(client_id);
    }

    async fn deliver(&self, client_id: &str, payload: serde_json::Value) -> Result<(), SchedulerError> {
        let handlers = self.handlers.lock().await;
        let tx = handlers
            .get(client_id)
            .ok_or_else(|| SchedulerError::NoHandler(client_id.to_string()))?;
        tx.try_send(payload)
            .map_err(|_| SchedulerError::ChannelClosed(client_id.to_string()))
    }

    /// Adds a new task. Rejects a `Periodic` spec shorter than 1 second.
    pub async fn schedule(&self, task: TaskRecord) -> Result<Uuid, SchedulerError> {
        if let TimeSpec::Periodic { period_secs } = &task.time_spec {
            if *period_secs < 1 {
                return Err(SchedulerError::PeriodTooShort(*period_secs));
            }
        }
        let task_id = task.task_id;
        self.store.insert(task).await?;
        Ok(task_id)
    }

    /// Idempotent: editing a missing task is a no-op `Ok`, matching the
    /// original's tolerance for a client retrying a stale edit.
    pub async fn edit(
        &self,
        client_id: &str,
        task_id: Uuid,
        time_spec: Option<TimeSpec>,
        payload: Option<serde_json::Value>,
    ) -> Result<(), SchedulerError> {
        let Some(mut task) = self.store.get(client_id, task_id).await? else {
            return Ok(());
        };
        if let Some(spec) = time_spec {
            task.time_spec = spec;
            task.next_fire = None;
        }
        if let Some(payload) = payload {
            task.payload = payload;
        }
        self.store.update(task).await
    }

    /// Idempotent: removing a missing task is a no-op `Ok`.
    pub async fn remove(&self, client_id: &str, task_id: Uuid) -> Result<(), SchedulerError> {
        self.store.remove(client_id, task_id).await?;
        Ok(())
    }

    /// Idempotent enable/disable toggles, used for start/stop.
    async fn set_enabled(&self, client_id: &str, task_id: Uuid, enabled: bool) -> Result<(), SchedulerError> {
        let Some(mut task) = self.store.get(client_id, task_id).await? else {
            return Ok(());
        };
        task.enabled = enabled;
        self.store.update(task).await
    }

    pub async fn start(&self, client_id: &str, task_id: Uuid) -> Result<(), SchedulerError> {
        self.set_enabled(client_id, task_id, true).await
    }

    pub async fn stop(&self, client_id: &str, task_id: Uuid) -> Result<(), SchedulerError> {
        self.set_enabled(client_id, task_id, false).await
    }

    /// Drops every non-persisted task, as if the daemon had just restarted
    /// and reloaded its on-disk snapshot.
    pub async fn reload(&self) -> Result<(), SchedulerError> {
        self.store.reload().await
    }

    /// Runs the timer loop forever. Spawn via `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(tick = ?TICK, "scheduler timer started");
        loop {
            tokio::time::sleep(TICK).await;
            if let Err(e) = self.tick().await {
                tracing::error!("scheduler tick failed: {e}");
            }
        }
    }

    pub(crate) async fn tick(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let tasks = self.store.all().await?;
        for mut task in tasks {
            if !task.enabled {
                continue;
            }
            let due_at = match task.next_fire {
                Some(t) => t,
                None => {
                    // First evaluation: seed next_fire without delivering.
                    task.next_fire = task.time_spec.next_fire_after(now)?;
                    self.store.update(task).await?;
                    continue;
                }
            };
            if due_at > now {
                continue;
            }

            match self.deliver(&task.client_id, task.payload.clone()).await {
                Ok(()) => tracing::debug!(
                    client_id = %task.client_id,
                    task_id = %task.task_id,
                    "delivered scheduled task"
                ),
                Err(e) => tracing::warn!(
                    client_id = %task.client_id,
                    task_id = %task.task_id,
                    "task delivery failed: {e}"
                ),
            }

            if task.time_spec.is_one_shot() {
                task.enabled = false;
                task.next_fire = None;
            } else {
                task.next_fire = task.time_spec.next_fire_after(now)?;
            }
            self.store.update(task).await?;
        }
        Ok(())
    }
}
