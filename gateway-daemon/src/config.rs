use std::time::Duration;

/// Daemon-wide Autonetwork defaults, read once from the environment at
/// startup. Falls back to the original's hardcoded constants
/// (`TIMEOUT_STEP = 500`, `TIMEOUT_REPEAT = 2000`) when a variable is
/// unset or unparseable.
#[derive(Debug, Clone, Copy)]
pub struct AutonetworkConfig {
    pub dpa_timeout: Duration,
    pub retry_backoff: Duration,
    pub wave_pacing: Duration,
    pub action_retries_default: u8,
    /// Stand-in for the shared coordinator-info lookup (see
    /// `autonetwork::orchestrator::RunConfig`'s doc comment) — this repo has
    /// no real transport to read it from, so it is supplied as daemon
    /// config instead.
    pub coordinator_dpa_version: u16,
}

impl AutonetworkConfig {
    pub fn from_env() -> Self {
        let dpa_timeout_ms: u64 = std::env::var("AUTONETWORK_DPA_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        let retry_backoff_ms: u64 = std::env::var("AUTONETWORK_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2000);
        let wave_pacing_ms: u64 = std::env::var("AUTONETWORK_WAVE_PACING_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        let action_retries_default: u8 = std::env::var("AUTONETWORK_ACTION_RETRIES_DEFAULT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let coordinator_dpa_version: u16 = std::env::var("AUTONETWORK_COORDINATOR_DPA_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(dpa_codec::constants::DPA_VERSION_MULTI_AUTH);

        Self {
            dpa_timeout: Duration::from_millis(dpa_timeout_ms),
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            wave_pacing: Duration::from_millis(wave_pacing_ms),
            action_retries_default,
            coordinator_dpa_version,
        }
    }
}
