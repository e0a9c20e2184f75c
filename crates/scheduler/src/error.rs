use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {expr:?}: {source}")]
    InvalidCron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("periodic interval must be at least 1 second, got {0}s")]
    PeriodTooShort(u64),

    #[error("no handler registered for client {0:?}")]
    NoHandler(String),

    #[error("delivery channel for client {0:?} is closed")]
    ChannelClosed(String),

    #[error("task {task_id} not found for client {client_id:?}")]
    TaskNotFound { client_id: String, task_id: uuid::Uuid },
}
