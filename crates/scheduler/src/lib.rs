//! Wall-clock task scheduler. See [`Scheduler`] for the entry point;
//! [`TimeSpec`] for the three time modes a task can use.

mod dispatcher;
pub mod error;
mod store;
mod task;

pub use dispatcher::Scheduler;
pub use error::SchedulerError;
pub use store::{InMemoryTaskStore, TaskStore};
pub use task::{LegacyTaskId, TaskRecord, TimeSpec};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn legacy_id_migration_is_deterministic() {
        let a = LegacyTaskId(42).to_uuid();
        let b = LegacyTaskId(42).to_uuid();
        let c = LegacyTaskId(43).to_uuid();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn periodic_below_one_second_is_rejected() {
        let scheduler = Scheduler::new(Arc::new(InMemoryTaskStore::new()));
        let task = TaskRecord::new(
            "client-a",
            "too fast",
            TimeSpec::Periodic { period_secs: 0 },
            json!({}),
            false,
        );
        let err = scheduler.schedule(task).await.unwrap_err();
        assert!(matches!(err, SchedulerError::PeriodTooShort(0)));
    }

    #[tokio::test]
    async fn edit_and_remove_are_idempotent_on_missing_tasks() {
        let scheduler = Scheduler::new(Arc::new(InMemoryTaskStore::new()));
        let missing = uuid::Uuid::new_v4();
        scheduler.edit("client-a", missing, None, None).await.unwrap();
        scheduler.remove("client-a", missing).await.unwrap();
        scheduler.start("client-a", missing).await.unwrap();
        scheduler.stop("client-a", missing).await.unwrap();
    }

    #[tokio::test]
    async fn reload_drops_non_persisted_tasks_only() {
        let store = Arc::new(InMemoryTaskStore::new());
        let scheduler = Scheduler::new(store.clone());

        let kept = TaskRecord::new(
            "client-a",
            "survives restart",
            TimeSpec::Exact { at: chrono::Utc::now() },
            json!({}),
            true,
        );
        let dropped = TaskRecord::new(
            "client-a",
            "ephemeral",
            TimeSpec::Exact { at: chrono::Utc::now() },
            json!({}),
            false,
        );
        let kept_id = scheduler.schedule(kept).await.unwrap();
        let dropped_id = scheduler.schedule(dropped).await.unwrap();

        scheduler.reload().await.unwrap();

        assert!(store.get("client-a", kept_id).await.unwrap().is_some());
        assert!(store.get("client-a", dropped_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn registered_handler_receives_delivered_payload() {
        let store = Arc::new(InMemoryTaskStore::new());
        let scheduler = Arc::new(Scheduler::new(store.clone()));
        let mut rx = scheduler.register_handler("client-a", 4).await;

        let task = TaskRecord::new(
            "client-a",
            "fires immediately",
            TimeSpec::Exact { at: chrono::Utc::now() - chrono::Duration::seconds(1) },
            json!({"hello": "world"}),
            false,
        );
        scheduler.schedule(task).await.unwrap();

        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();

        let delivered = rx.try_recv().expect("payload should have been delivered");
        assert_eq!(delivered, json!({"hello": "world"}));
    }
}
