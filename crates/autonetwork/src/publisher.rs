use async_trait::async_trait;
use dpa_codec::Address;
use serde::Serialize;

use crate::error::WaveStateCode;
use crate::node::NewNode;

/// One logged DPA transaction, included in the result message only when the
/// caller asked for a verbose response.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub request: String,
    pub request_ts: String,
    pub confirmation: Option<String>,
    pub confirmation_ts: Option<String>,
    pub response: String,
    pub response_ts: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveProgress {
    pub wave: u16,
    pub wave_state_code: WaveStateCode,
    pub progress: u8,
    pub wave_state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveResult {
    pub wave: u16,
    pub nodes_nr: u16,
    pub new_nodes_nr: u16,
    pub new_nodes: Vec<NewNode>,
    pub wave_state_code: WaveStateCode,
    pub progress: u8,
    pub last_wave: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<Transaction>>,
}

/// Sink for progress/result publication. The splitter implements this in
/// the daemon; tests use the in-memory `VecPublisher` below.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_progress(&self, progress: WaveProgress);
    async fn publish_result(&self, result: WaveResult);
}

#[derive(Default)]
pub struct VecPublisher {
    pub progress: tokio::sync::Mutex<Vec<WaveProgress>>,
    pub results: tokio::sync::Mutex<Vec<WaveResult>>,
}

#[async_trait]
impl Publisher for VecPublisher {
    async fn publish_progress(&self, progress: WaveProgress) {
        self.progress.lock().await.push(progress);
    }

    async fn publish_result(&self, result: WaveResult) {
        self.results.lock().await.push(result);
    }
}

pub fn new_node_address_of(nodes: &[NewNode], address: Address) -> Option<&NewNode> {
    nodes.iter().find(|n| n.address == address)
}
