//! Decodes inbound `mType`-tagged JSON envelopes and dispatches them to a
//! registered [`Handler`], re-wrapping the result in a response envelope
//! with the original `msgId` and a status/statusStr pair.

mod envelope;
mod handler;

pub use envelope::{
    RequestData, RequestEnvelope, ResponseData, ResponseEnvelope, STATUS_EXCLUSIVE_ACCESS_BUSY,
    STATUS_OK, STATUS_PARSING_ERROR, STATUS_SERVICE_ERROR,
};
pub use handler::{Handler, HandlerError};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Default)]
pub struct Splitter {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl Splitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handler: Arc<dyn Handler>) {
        self.handlers
            .write()
            .await
            .insert(handler.m_type().to_string(), handler);
    }

    /// Parses `raw`, looks up the handler by `mType`, and runs it.
    /// Malformed JSON yields status 1001; an unregistered `mType` yields
    /// 1000; a handler's own failure carries the status it chose.
    pub async fn dispatch(&self, raw: &str) -> ResponseEnvelope {
        let envelope: RequestEnvelope = match serde_json::from_str(raw) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("failed to parse inbound envelope: {e}");
                return ResponseEnvelope::error(
                    "unknown",
                    "unknown",
                    STATUS_PARSING_ERROR,
                    format!("malformed request: {e}"),
                );
            }
        };

        let msg_id = envelope.data.msg_id.clone();
        let handlers = self.handlers.read().await;
        let Some(handler) = handlers.get(&envelope.m_type) else {
            tracing::warn!(m_type = %envelope.m_type, "no handler registered for mType");
            return ResponseEnvelope::error(
                envelope.m_type,
                msg_id,
                STATUS_SERVICE_ERROR,
                "no handler registered for this mType",
            );
        };

        let return_verbose = envelope.data.return_verbose.unwrap_or(false);
        match handler.handle(envelope.data.req, return_verbose).await {
            Ok(rsp) => ResponseEnvelope::ok(envelope.m_type, msg_id, rsp),
            Err(e) => {
                tracing::error!(m_type = %envelope.m_type, status = e.status, "handler failed: {}", e.message);
                ResponseEnvelope::error(envelope.m_type, msg_id, e.status, e.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        fn m_type(&self) -> &str {
            "echo"
        }

        async fn handle(
            &self,
            req: serde_json::Value,
            _return_verbose: bool,
        ) -> Result<serde_json::Value, HandlerError> {
            Ok(req)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Handler for AlwaysFails {
        fn m_type(&self) -> &str {
            "fails"
        }

        async fn handle(
            &self,
            _req: serde_json::Value,
            _return_verbose: bool,
        ) -> Result<serde_json::Value, HandlerError> {
            Err(HandlerError::new(STATUS_EXCLUSIVE_ACCESS_BUSY, "busy"))
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let splitter = Splitter::new();
        splitter.register(Arc::new(Echo)).await;

        let raw = json!({
            "mType": "echo",
            "data": {"msgId": "1", "req": {"hello": "world"}},
        })
        .to_string();

        let response = splitter.dispatch(&raw).await;
        assert_eq!(response.data.status, STATUS_OK);
        assert_eq!(response.data.rsp, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn unregistered_m_type_yields_service_error() {
        let splitter = Splitter::new();
        let raw = json!({
            "mType": "missing",
            "data": {"msgId": "1", "req": {}},
        })
        .to_string();

        let response = splitter.dispatch(&raw).await;
        assert_eq!(response.data.status, STATUS_SERVICE_ERROR);
    }

    #[tokio::test]
    async fn malformed_json_yields_parsing_error() {
        let splitter = Splitter::new();
        let response = splitter.dispatch("not json").await;
        assert_eq!(response.data.status, STATUS_PARSING_ERROR);
    }

    #[tokio::test]
    async fn handler_error_status_is_preserved() {
        let splitter = Splitter::new();
        splitter.register(Arc::new(AlwaysFails)).await;
        let raw = json!({
            "mType": "fails",
            "data": {"msgId": "1", "req": {}},
        })
        .to_string();

        let response = splitter.dispatch(&raw).await;
        assert_eq!(response.data.status, STATUS_EXCLUSIVE_ACCESS_BUSY);
    }
}
