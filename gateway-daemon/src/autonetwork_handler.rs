use std::sync::Arc;

use async_trait::async_trait;
use autonetwork::{InputParams, RunConfig};
use dpa_client::{DpaClient, ExclusiveLease};
use splitter::{Handler, HandlerError};

use crate::publisher_bridge::EnvelopePublisher;

/// Registers under `mType = "iqmeshNetwork_AutoNetwork"`. Parses the
/// envelope's `req` object into `InputParams`, runs one orchestrator
/// request to completion, and returns the final `RunOutcome` as the
/// response body (the per-wave progress/result stream goes out through the
/// splitter directly via `EnvelopePublisher`, not through this return
/// value).
pub struct AutonetworkHandler {
    client: Arc<dyn DpaClient>,
    lease: Arc<ExclusiveLease>,
    config: RunConfig,
}

impl AutonetworkHandler {
    pub fn new(client: Arc<dyn DpaClient>, lease: Arc<ExclusiveLease>, config: RunConfig) -> Self {
        Self {
            client,
            lease,
            config,
        }
    }
}

#[async_trait]
impl Handler for AutonetworkHandler {
    fn m_type(&self) -> &str {
        "iqmeshNetwork_AutoNetwork"
    }

    async fn handle(
        &self,
        req: serde_json::Value,
        return_verbose: bool,
    ) -> Result<serde_json::Value, HandlerError> {
        let params: InputParams = serde_json::from_value(req)
            .map_err(|e| HandlerError::new(splitter::STATUS_PARSING_ERROR, e.to_string()))?;

        let publisher = EnvelopePublisher::new(return_verbose);

        let outcome = autonetwork::run(
            self.client.as_ref(),
            &self.lease,
            &self.config,
            &params,
            &publisher,
        )
        .await
        .map_err(|e| HandlerError::new(e.status_code(), e.to_string()))?;

        serde_json::to_value(RunOutcomeBody::from(outcome))
            .map_err(|e| HandlerError::new(splitter::STATUS_SERVICE_ERROR, e.to_string()))
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutcomeBody {
    final_state: autonetwork::WaveStateCode,
    waves_run: u16,
    new_nodes_total: u16,
}

impl From<autonetwork::RunOutcome> for RunOutcomeBody {
    fn from(o: autonetwork::RunOutcome) -> Self {
        Self {
            final_state: o.final_state,
            waves_run: o.waves_run,
            new_nodes_total: o.new_nodes_total,
        }
    }
}
