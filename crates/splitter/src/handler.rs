use async_trait::async_trait;
use thiserror::Error;

/// A handler's own failure, carrying the status code and human string the
/// splitter copies verbatim into the response envelope (the way
/// `sem_os_server`'s `AppError` carries an HTTP status alongside its
/// message).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub status: i32,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// One registered `mType` handler. `handle` receives the envelope's `req`
/// payload and returns the typed response body to place under `rsp`.
#[async_trait]
pub trait Handler: Send + Sync {
    fn m_type(&self) -> &str;
    async fn handle(
        &self,
        req: serde_json::Value,
        return_verbose: bool,
    ) -> Result<serde_json::Value, HandlerError>;
}
