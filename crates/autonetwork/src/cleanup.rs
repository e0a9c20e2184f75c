use std::collections::BTreeSet;
use std::time::Duration;

use dpa_client::{execute_with_retry, DpaClient};
use dpa_codec::{constants, packets};
use tracing::error;

use crate::error::AutonetworkError;

/// FRC response-time byte, DPA-param byte, and hop params captured before
/// the run overwrites them for optimal time slots / maximum hops. Restored
/// on every exit path by [`restore`]. There is no stable `AsyncDrop` in
/// Rust, so unlike the exclusive-access lease (a synchronous resource, and
/// a true RAII guard in `dpa_client::LeaseGuard`), this restoration is an
/// explicit call the orchestrator makes from every return path rather than
/// a destructor — see `Orchestrator::run` for the call site.
#[derive(Debug, Clone, Copy)]
pub struct SavedParams {
    pub frc_response_time: u8,
    pub dpa_param: u8,
    pub hops: (u8, u8),
}

pub async fn stage_optimal_params(
    client: &dyn DpaClient,
    retries: u8,
    backoff: Duration,
) -> Result<SavedParams, AutonetworkError> {
    let frc_prev = execute_with_retry(client, packets::build_set_frc_params(0), retries, backoff)
        .await?;
    let frc_response_time = packets::parse_previous_byte(&frc_prev.response)?;

    let dpa_prev =
        execute_with_retry(client, packets::build_set_dpa_params(0), retries, backoff).await?;
    let dpa_param = packets::parse_previous_byte(&dpa_prev.response)?;

    let hops_prev =
        execute_with_retry(client, packets::build_set_hops(0xFF, 0xFF), retries, backoff).await?;
    let hops = packets::parse_set_hops(&hops_prev.response)?;

    Ok(SavedParams {
        frc_response_time,
        dpa_param,
        hops,
    })
}

/// Restores the three saved parameters, broadcasts a validate-bonds that
/// zeros the temporary address, and — for DPA < 4.17 with any bonded node —
/// issues a restart broadcast. Runs on every exit path: success, pre-flight
/// refusal, or mid-run error.
pub async fn restore(
    client: &dyn DpaClient,
    saved: SavedParams,
    coordinator_dpa_version: u16,
    any_bonded: bool,
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    let mut failures = Vec::new();

    if let Err(e) = execute_with_retry(
        client,
        packets::build_set_frc_params(saved.frc_response_time),
        retries,
        backoff,
    )
    .await
    {
        failures.push(format!("frc response time: {e}"));
    }
    if let Err(e) = execute_with_retry(
        client,
        packets::build_set_dpa_params(saved.dpa_param),
        retries,
        backoff,
    )
    .await
    {
        failures.push(format!("dpa param: {e}"));
    }
    if let Err(e) = execute_with_retry(
        client,
        packets::build_set_hops(saved.hops.0, saved.hops.1),
        retries,
        backoff,
    )
    .await
    {
        failures.push(format!("hops: {e}"));
    }

    let zero_temp = packets::AuthorizeRecord {
        address: dpa_codec::TEMPORARY_ADDR,
        mid: 0,
    };
    if let Ok(buf) = packets::build_validate_bonds(dpa_codec::BROADCAST_ADDR, &[zero_temp]) {
        let _ = execute_with_retry(client, buf, retries, backoff).await;
    }

    if any_bonded && coordinator_dpa_version < constants::DPA_VERSION_AUTO_RESTART {
        let selected: BTreeSet<_> = [dpa_codec::BROADCAST_ADDR].into_iter().collect();
        if let Ok(buf) =
            packets::build_restart_via_batch(&selected, &packets::os_remove_and_restart_batch())
        {
            if let Err(e) = execute_with_retry(client, buf, retries, backoff).await {
                failures.push(format!("restart broadcast: {e}"));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        let joined = failures.join("; ");
        error!(failures = %joined, "cleanup failed to restore all saved parameters");
        Err(AutonetworkError::CleanupFailed(joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpa_client::fake::FakeDpaClient;
    use dpa_client::Exchange;

    fn ok(bytes: Vec<u8>) -> Result<Exchange, dpa_client::DpaError> {
        Ok(Exchange {
            request: Vec::new(),
            confirmation: None,
            response: bytes,
        })
    }

    #[tokio::test]
    async fn restore_skips_restart_broadcast_when_dpa_is_modern() {
        let client = FakeDpaClient::new(vec![
            ok(vec![0]),
            ok(vec![0]),
            ok(vec![0xFF, 0xFF]),
            ok(vec![]),
        ]);
        let saved = SavedParams {
            frc_response_time: 0,
            dpa_param: 0,
            hops: (0, 0),
        };
        restore(&client, saved, 0x0420, true, 0, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(client.sent.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn restore_issues_restart_broadcast_for_legacy_dpa() {
        let client = FakeDpaClient::new(vec![
            ok(vec![0]),
            ok(vec![0]),
            ok(vec![0xFF, 0xFF]),
            ok(vec![]),
            ok(vec![]),
        ]);
        let saved = SavedParams {
            frc_response_time: 0,
            dpa_param: 0,
            hops: (0, 0),
        };
        restore(&client, saved, 0x0400, true, 0, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(client.sent.lock().unwrap().len(), 5);
    }
}
