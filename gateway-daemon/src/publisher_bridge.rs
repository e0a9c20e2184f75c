use async_trait::async_trait;
use autonetwork::{Publisher, WaveProgress, WaveResult};

/// Bridges the orchestrator's progress/result stream onto `tracing` events.
/// A production build would instead push each message back out through the
/// splitter's transport (the MQ/WS bus the original rides on); this repo's
/// harness has no such transport, so logging stands in for it.
pub struct EnvelopePublisher {
    verbose: bool,
}

impl EnvelopePublisher {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl Publisher for EnvelopePublisher {
    async fn publish_progress(&self, progress: WaveProgress) {
        tracing::info!(
            wave = progress.wave,
            wave_state_code = ?progress.wave_state_code,
            progress = progress.progress,
            "autonetwork progress"
        );
    }

    async fn publish_result(&self, result: WaveResult) {
        tracing::info!(
            wave = result.wave,
            nodes_nr = result.nodes_nr,
            new_nodes_nr = result.new_nodes_nr,
            wave_state_code = ?result.wave_state_code,
            last_wave = result.last_wave,
            "autonetwork wave result"
        );
        if self.verbose {
            if let Some(raw) = &result.raw {
                tracing::debug!(transactions = raw.len(), "verbose transaction log available");
            }
        }
    }
}
