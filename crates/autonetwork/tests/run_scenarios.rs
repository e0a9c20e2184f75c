//! End-to-end scenarios against `FakeDpaClient`, covering the happy path and
//! a pre-flight refusal. Exact response bytes are chosen to drive exactly
//! one pass through the wave loop (S1) or to hit the full-coordinator
//! refusal before any wave runs (S5).

use std::collections::BTreeSet;
use std::time::Duration;

use autonetwork::input::InputParams;
use autonetwork::orchestrator::{run, RunConfig};
use autonetwork::publisher::VecPublisher;
use autonetwork::{AutonetworkError, WaveStateCode};
use dpa_client::fake::FakeDpaClient;
use dpa_client::{DpaError, Exchange, ExclusiveLease};
use dpa_codec::encode_bitmap32;

fn ok(bytes: Vec<u8>) -> Result<Exchange, DpaError> {
    Ok(Exchange {
        request: Vec::new(),
        confirmation: None,
        response: bytes,
    })
}

fn config() -> RunConfig {
    RunConfig {
        coordinator_dpa_version: 0x0400,
        retry_backoff: Duration::from_millis(1),
        wave_pacing: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn happy_path_authorizes_one_node_and_stops_on_max_waves() {
    let responses = vec![
        ok(vec![0x05, 0, 0, 0]),              // enumerate peripherals
        ok(vec![0, 0]),                       // addr info
        ok(encode_bitmap32(&BTreeSet::new()).to_vec()), // bonded (preflight)
        ok(encode_bitmap32(&BTreeSet::new()).to_vec()), // discovered (preflight)
        ok(vec![0]),                          // save frc params
        ok(vec![0]),                          // save dpa param
        ok(vec![0, 0]),                       // save hops
        ok(vec![]),                           // smart connect
        ok(vec![1, 0x20]),                     // alive check: candidate at slot 5
        ok(vec![1, 0x35, 0x12, 0x00, 0x00]),   // mid read: mid 0x1234
        ok(vec![1, 1]),                       // authorize bond: assigned=1 total=1
        ok(encode_bitmap32(&BTreeSet::from([1])).to_vec()), // bonded (update)
        ok(encode_bitmap32(&BTreeSet::new()).to_vec()),     // discovered (update)
        ok(vec![0]),                          // restore frc params
        ok(vec![0]),                          // restore dpa param
        ok(vec![0, 0]),                       // restore hops
        ok(vec![]),                           // validate bonds broadcast
        ok(vec![]),                           // legacy restart broadcast
    ];
    let client = FakeDpaClient::new(responses);
    let lease = ExclusiveLease::new();
    let publisher = VecPublisher::default();

    let mut params = InputParams::default();
    params.total_waves = 1;
    params.skip_discovery_each_wave = true;
    params.action_retries = 0;

    let outcome = run(&client, &lease, &config(), &params, &publisher)
        .await
        .expect("run should succeed");

    assert_eq!(outcome.final_state, WaveStateCode::StopOnMaxNumWaves);
    assert_eq!(outcome.new_nodes_total, 1);

    let results = publisher.results.lock().await;
    let last = results.last().expect("a wave result was published");
    assert!(last.last_wave);
    assert_eq!(last.new_nodes.len(), 1);
    assert_eq!(last.new_nodes[0].address, 1);
    assert_eq!(last.new_nodes[0].mid, "00001234");
}

#[tokio::test]
async fn preflight_refuses_full_coordinator_without_running_a_wave() {
    let bonded: BTreeSet<u8> = (1..=239u8).collect();
    let mut responses = vec![
        ok(vec![0x05, 0, 0, 0]),
        ok(vec![0, 0]),
        ok(encode_bitmap32(&bonded).to_vec()),
        ok(encode_bitmap32(&BTreeSet::new()).to_vec()),
    ];
    for addr in 1..=239u32 {
        let mid = addr + 1;
        responses.push(ok(mid.to_le_bytes().to_vec()));
    }
    let client = FakeDpaClient::new(responses);
    let lease = ExclusiveLease::new();
    let publisher = VecPublisher::default();
    let params = InputParams::default();

    let err = run(&client, &lease, &config(), &params, &publisher)
        .await
        .expect_err("a full coordinator must refuse to start");

    match err {
        AutonetworkError::CannotStart(code) => {
            assert_eq!(code, WaveStateCode::CannotStartMaxAddress)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(publisher.progress.lock().await.is_empty());
    assert!(publisher.results.lock().await.is_empty());
}
