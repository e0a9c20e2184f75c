//! The wave loop: pre-flight once, then wave × N, then cleanup. Every
//! protocol decision lives here; the collaborating modules only supply
//! building blocks (codec, authorize_control, stop-condition evaluation).

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use dpa_client::{execute_with_retry, DpaClient, ExclusiveLease};
use dpa_codec::packets::{self, Compare2BParams, MemoryReadSelectiveParams, SmartConnectParams};
use dpa_codec::{constants, decode_bit_window, peripheral_bit_set, Address};
use tracing::{debug, info, warn};

use crate::cleanup;
use crate::error::{AuthorizeErr, AutonetworkError, WaveStateCode};
use crate::input::InputParams;
use crate::node::{DpaCapability, NewNode, NodeTable, PreBondedCandidate};
use crate::publisher::{Publisher, WaveProgress, WaveResult};
use crate::wave::{self, WaveState};

/// Values the orchestrator cannot learn from its own DPA exchanges: the
/// coordinator's firmware version is read once by whatever keeps the
/// daemon's long-lived coordinator info (outside Autonetwork's own scope,
/// per the component table) and handed in here.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub coordinator_dpa_version: u16,
    pub retry_backoff: Duration,
    pub wave_pacing: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub final_state: WaveStateCode,
    pub waves_run: u16,
    pub new_nodes_total: u16,
}

/// Runs one Autonetwork request to completion: pre-flight, N waves, cleanup.
/// Acquires `lease` for the duration of the run and releases it on return.
pub async fn run(
    client: &dyn DpaClient,
    lease: &ExclusiveLease,
    config: &RunConfig,
    params: &InputParams,
    publisher: &dyn Publisher,
) -> Result<RunOutcome, AutonetworkError> {
    let _guard = lease.try_acquire()?;
    let mut nodes = NodeTable::new();
    let mut mid_list: BTreeMap<u32, Address> = params.mid_list.clone().unwrap_or_default();
    let mid_list_present = params.mid_list.is_some();
    let retries = params.action_retries;
    let backoff = config.retry_backoff;

    preflight_enumerate(client, retries, backoff).await?;
    preflight_load_network(client, &mut nodes, retries, backoff).await?;

    if let Some(code) = wave::evaluate_preflight_refusal(params, &nodes, &mid_list) {
        info!(?code, "autonetwork refused to start");
        return Err(AutonetworkError::CannotStart(code));
    }

    let saved = cleanup::stage_optimal_params(client, retries, backoff).await?;

    let capability = DpaCapability::from_dpa_version(config.coordinator_dpa_version);
    let run_result = run_waves(
        client,
        &mut nodes,
        &mut mid_list,
        mid_list_present,
        capability,
        params,
        config,
        publisher,
    )
    .await;

    let any_bonded = nodes.bonded_count() > 0;
    let cleanup_result = cleanup::restore(
        client,
        saved,
        config.coordinator_dpa_version,
        any_bonded,
        retries,
        backoff,
    )
    .await;

    match (run_result, cleanup_result) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), _) => Err(e),
    }
}

async fn preflight_enumerate(
    client: &dyn DpaClient,
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    let resp = execute_with_retry(client, packets::build_enumerate_peripherals(), retries, backoff)
        .await?;
    let emb_pers = packets::parse_enumerate_peripherals(&resp.response)?;
    let has_coordinator = peripheral_bit_set(&emb_pers, constants::PNUM_COORDINATOR);
    let has_os = peripheral_bit_set(&emb_pers, constants::PNUM_OS);
    if !has_coordinator || !has_os {
        return Err(AutonetworkError::NoCoordOrCoordOs);
    }
    Ok(())
}

async fn preflight_load_network(
    client: &dyn DpaClient,
    nodes: &mut NodeTable,
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    execute_with_retry(client, packets::build_get_addr_info(), retries, backoff).await?;

    let bonded_resp = execute_with_retry(client, packets::build_get_bonded(), retries, backoff).await?;
    let bonded = packets::parse_bitmap(&bonded_resp.response);
    for addr in &bonded {
        nodes.get_or_insert(*addr).bonded = true;
    }

    let discovered_resp =
        execute_with_retry(client, packets::build_get_discovered(), retries, backoff).await?;
    let discovered = packets::parse_bitmap(&discovered_resp.response);
    for addr in &discovered {
        nodes.set_discovered(*addr, true);
    }

    for addr in bonded {
        if nodes.get(addr).map(|n| n.mid).unwrap_or(0) == 0 {
            let mid_resp = execute_with_retry(
                client,
                packets::build_eeeprom_xread(packets::mid_eeeprom_address(addr), 4),
                retries,
                backoff,
            )
            .await?;
            let mid = packets::parse_eeeprom_mid(&mid_resp.response)?;
            nodes.set_bonded(addr, mid);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_waves(
    client: &dyn DpaClient,
    nodes: &mut NodeTable,
    mid_list: &mut BTreeMap<u32, Address>,
    mid_list_present: bool,
    capability: DpaCapability,
    params: &InputParams,
    config: &RunConfig,
    publisher: &dyn Publisher,
) -> Result<RunOutcome, AutonetworkError> {
    let retries = params.action_retries;
    let backoff = config.retry_backoff;
    let steps = wave::progress_steps(params, capability == DpaCapability::MultiAuthBatched);
    let mut wave_state = WaveState::default();
    let mut previous_discovered_count: u8 = 0;

    loop {
        wave_state.begin_wave();
        let seed = wave_state.next_seed();

        if !params.skip_prebonding {
            let sc_params = SmartConnectParams {
                overlapping_networks: if params.overlapping_networks.is_enabled() {
                    Some((params.overlapping_networks.n, params.overlapping_networks.i))
                } else {
                    None
                },
            };
            execute_with_retry(client, packets::build_smart_connect(&sc_params), retries, backoff)
                .await?;
            publish_step(publisher, &mut wave_state, steps, WaveStateCode::SmartConnect).await;
        }

        let alive_resp =
            execute_with_retry(client, packets::build_frc_prebonded_alive(seed), retries, backoff)
                .await?;
        let split = packets::split_frc_response(&alive_resp.response)?;
        let responders = packets::decode_frc_alive_responders(split.data, None);
        publish_step(publisher, &mut wave_state, steps, WaveStateCode::CheckPrebondedAlive).await;

        if responders.is_empty() {
            wave_state.empty_wave_streak += 1;
            run_duplicate_mid_cleanup(client, nodes, retries, backoff).await?;
            let code = wave::evaluate_stop_conditions(params, &wave_state, nodes);
            publish_wave_result(publisher, &wave_state, nodes, code).await;
            if code.is_terminal() {
                return Ok(finish(&wave_state, code));
            }
            tokio::time::sleep(config.wave_pacing).await;
            continue;
        }
        wave_state.empty_wave_streak = 0;

        if params.abort_on_too_many_nodes_found {
            let would_total = nodes.bonded_count() + responders.len();
            let would_new = wave_state.new_nodes_total as usize + responders.len();
            let exceeds = (params.number_of_total_nodes != 0
                && would_total > params.number_of_total_nodes as usize)
                || (params.number_of_new_nodes != 0
                    && would_new > params.number_of_new_nodes as usize);
            if exceeds {
                publish_wave_result(
                    publisher,
                    &wave_state,
                    nodes,
                    WaveStateCode::AbortOnTooManyNodesFound,
                )
                .await;
                return Ok(finish(&wave_state, WaveStateCode::AbortOnTooManyNodesFound));
            }
        }

        let mut candidates: Vec<PreBondedCandidate> =
            responders.iter().map(|&a| PreBondedCandidate::new(a)).collect();

        if capability == DpaCapability::MultiAuthBatched && candidates.len() > 1 {
            probe_dpa_version(client, seed, &mut candidates, retries, backoff).await?;
            publish_step(publisher, &mut wave_state, steps, WaveStateCode::ReadingDpaVersion).await;
        }

        read_mids(client, seed, &mut candidates, retries, backoff).await?;
        flag_duplicate_mids(&mut candidates);
        for c in candidates.iter_mut().filter(|c| c.error == AuthorizeErr::No) {
            let (addr, err) =
                crate::authorize::authorize_control(c.mid, None, nodes, mid_list, mid_list_present, params);
            c.proposed_address = addr;
            c.error = err;
            c.authorize = err == AuthorizeErr::No && addr != 0;
        }
        publish_step(publisher, &mut wave_state, steps, WaveStateCode::ReadPrebondedMid).await;

        if params.hwpid_filtering_enabled() {
            read_hwpids(client, seed, &mut candidates, retries, backoff).await?;
            for c in candidates
                .iter_mut()
                .filter(|c| c.error == AuthorizeErr::No || c.error == AuthorizeErr::NodeBonded)
            {
                let (addr, err) = crate::authorize::authorize_control(
                    c.mid,
                    Some(c.hwpid),
                    nodes,
                    mid_list,
                    mid_list_present,
                    params,
                );
                c.proposed_address = addr;
                c.error = err;
                c.authorize = err == AuthorizeErr::No && addr != 0;
            }
            publish_step(publisher, &mut wave_state, steps, WaveStateCode::ReadPrebondedHwpid).await;
        }

        if !params.unbond_unresponding_nodes {
            for c in candidates.iter().filter(|c| c.error == AuthorizeErr::NodeBonded) {
                if let Some(existing) = nodes.find_by_mid(c.mid) {
                    let addr = existing.address;
                    execute_with_retry(client, packets::build_remove_bond(addr), retries, backoff)
                        .await?;
                    nodes.clear_bond(addr);
                }
            }
        }

        authorize_candidates(client, &mut candidates, nodes, &mut wave_state, capability, retries, backoff)
            .await?;
        publish_step(publisher, &mut wave_state, steps, WaveStateCode::Authorize).await;

        if params.unbond_unresponding_nodes {
            ping_and_prune(client, nodes, &mut wave_state, retries, backoff).await?;
            publish_step(publisher, &mut wave_state, steps, WaveStateCode::Ping).await;
        }

        if !params.skip_discovery_each_wave {
            let resp =
                execute_with_retry(client, packets::build_discovery(params.discovery_tx_power), retries, backoff)
                    .await?;
            let discovered_count = packets::parse_discovery(&resp.response)?;
            if discovered_count >= previous_discovered_count {
                previous_discovered_count = discovered_count;
            }
            publish_step(publisher, &mut wave_state, steps, WaveStateCode::Discovery).await;
        }

        let bonded_resp = execute_with_retry(client, packets::build_get_bonded(), retries, backoff).await?;
        let bonded_set = packets::parse_bitmap(&bonded_resp.response);
        let discovered_resp =
            execute_with_retry(client, packets::build_get_discovered(), retries, backoff).await?;
        let discovered_set = packets::parse_bitmap(&discovered_resp.response);
        for addr in &bonded_set {
            nodes.get_or_insert(*addr).bonded = true;
        }
        for addr in 1u8..=239 {
            nodes.set_discovered(addr, discovered_set.contains(&addr));
        }
        publish_step(publisher, &mut wave_state, steps, WaveStateCode::Enumeration).await;

        wave_state.new_nodes_total += wave_state.new_nodes_this_wave;
        let code = wave::evaluate_stop_conditions(params, &wave_state, nodes);
        publish_wave_result(publisher, &wave_state, nodes, code).await;
        if code.is_terminal() {
            return Ok(finish(&wave_state, code));
        }
        tokio::time::sleep(config.wave_pacing).await;
    }
}

fn finish(wave: &WaveState, code: WaveStateCode) -> RunOutcome {
    RunOutcome {
        final_state: code,
        waves_run: wave.wave_index,
        new_nodes_total: wave.new_nodes_total,
    }
}

async fn publish_step(
    publisher: &dyn Publisher,
    wave: &mut WaveState,
    steps: u8,
    code: WaveStateCode,
) {
    wave::advance_progress(wave, steps);
    publisher
        .publish_progress(WaveProgress {
            wave: wave.wave_index,
            wave_state_code: code,
            progress: wave.progress_percent,
            wave_state: None,
        })
        .await;
}

async fn publish_wave_result(
    publisher: &dyn Publisher,
    wave: &WaveState,
    nodes: &NodeTable,
    code: WaveStateCode,
) {
    // A wave's result is only ever published once every step for that wave
    // has run, so progress is forced to 100 here rather than trusting the
    // step-accumulated `progress_percent` (which can land a few points short
    // of 100 depending on how many steps the wave had).
    publisher
        .publish_result(WaveResult {
            wave: wave.wave_index,
            nodes_nr: nodes.bonded_count() as u16,
            new_nodes_nr: wave.new_nodes_this_wave,
            new_nodes: wave.responded_new.clone(),
            wave_state_code: code,
            progress: 100,
            last_wave: code.is_terminal(),
            raw: None,
        })
        .await;
}

async fn probe_dpa_version(
    client: &dyn DpaClient,
    seed: u8,
    candidates: &mut [PreBondedCandidate],
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    let resp = execute_with_retry(
        client,
        packets::build_frc_prebonded_compare_2b(&Compare2BParams {
            node_seed: seed,
            value: constants::DPA_VERSION_MULTI_AUTH,
            address: constants::FRC_MID_ADDRESS,
            pnum: constants::PNUM_OS,
            pcmd: constants::CMD_OS_READ,
        }),
        retries,
        backoff,
    )
    .await?;
    let split = packets::split_frc_response(&resp.response)?;
    let low = &split.data[..split.data.len().min(32)];
    let high = if split.data.len() > 32 { &split.data[32..] } else { &[] };
    let low_set = decode_bit_window(low);
    let high_set = decode_bit_window(high);
    for c in candidates.iter_mut() {
        if !low_set.contains(&c.source_address) && high_set.contains(&c.source_address) {
            c.supports_multi_auth = true;
        }
    }
    Ok(())
}

/// Reads MIDs in batches of up to [`constants::FRC_MEMORY_READ_BATCH_MAX`].
/// The base response covers 12 slots; the extra-result call only carries 9
/// bytes (2 more 4-byte slots), one short of the nominal 15-per-batch
/// ceiling — candidates beyond that are tagged `Frc` rather than silently
/// dropped or overread.
async fn read_mids(
    client: &dyn DpaClient,
    seed: u8,
    candidates: &mut [PreBondedCandidate],
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    for chunk in candidates.chunks_mut(constants::FRC_MEMORY_READ_BATCH_MAX) {
        read_memory_batch(
            client,
            seed,
            constants::FRC_MID_ADDRESS,
            constants::PNUM_OS,
            constants::CMD_OS_READ,
            chunk,
            retries,
            backoff,
            |c, raw| {
                match raw {
                    Some(value) => c.mid = value,
                    None => c.mark_error(AuthorizeErr::Frc),
                }
            },
        )
        .await?;
    }
    Ok(())
}

async fn read_hwpids(
    client: &dyn DpaClient,
    seed: u8,
    candidates: &mut [PreBondedCandidate],
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    for chunk in candidates.chunks_mut(constants::FRC_MEMORY_READ_BATCH_MAX) {
        read_memory_batch(
            client,
            seed,
            constants::FRC_HWPID_ADDRESS,
            constants::PNUM_EXPLORE,
            constants::CMD_GET_PER_INFO,
            chunk,
            retries,
            backoff,
            |c, raw| match raw {
                Some(value) => {
                    c.hwpid = (value & 0xFFFF) as u16;
                    c.hwpid_ver = (value >> 16) as u16;
                }
                None => c.mark_error(AuthorizeErr::Frc),
            },
        )
        .await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn read_memory_batch(
    client: &dyn DpaClient,
    seed: u8,
    address: u16,
    pnum: u8,
    pcmd: u8,
    chunk: &mut [PreBondedCandidate],
    retries: u8,
    backoff: Duration,
    mut apply: impl FnMut(&mut PreBondedCandidate, Option<u32>),
) -> Result<(), AutonetworkError> {
    let selected: BTreeSet<Address> = chunk.iter().map(|c| c.source_address).collect();
    let req = packets::build_frc_memory_read_selective(
        &selected,
        &MemoryReadSelectiveParams {
            node_seed: seed,
            offset: 0,
            address,
            pnum,
            pcmd,
        },
    )?;
    let resp = execute_with_retry(client, req, retries, backoff).await?;
    let split = packets::split_frc_response(&resp.response)?;

    let base_slots = split.data.len() / 4;
    let mut extra_words: Vec<u32> = Vec::new();
    if chunk.len() > constants::FRC_BASE_RESPONSE_MAX {
        let extra_resp =
            execute_with_retry(client, packets::build_frc_extra_result(), retries, backoff).await?;
        let extra = packets::parse_frc_extra_result(&extra_resp.response)?;
        for word in extra.chunks_exact(4) {
            extra_words.push(u32::from_le_bytes(word.try_into().unwrap()));
        }
    }

    for (i, c) in chunk.iter_mut().enumerate() {
        if i < base_slots {
            let start = i * 4;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&split.data[start..start + 4]);
            apply(c, packets::decode_memory_read_slot(buf));
        } else {
            let extra_index = i - base_slots;
            match extra_words.get(extra_index) {
                Some(word) => apply(c, word.checked_sub(1)),
                None => {
                    warn!(
                        address = c.source_address,
                        "no FRC memory-read slot available for candidate"
                    );
                    c.mark_error(AuthorizeErr::Frc);
                }
            }
        }
    }
    Ok(())
}

fn flag_duplicate_mids(candidates: &mut [PreBondedCandidate]) {
    let mut seen: BTreeMap<u32, usize> = BTreeMap::new();
    let mut dupes = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        if c.mid == 0 || c.error != AuthorizeErr::No {
            continue;
        }
        if let Some(&first) = seen.get(&c.mid) {
            dupes.push(first);
            dupes.push(i);
        } else {
            seen.insert(c.mid, i);
        }
    }
    for i in dupes {
        candidates[i].mark_error(AuthorizeErr::Frc);
    }
}

async fn authorize_candidates(
    client: &dyn DpaClient,
    candidates: &mut [PreBondedCandidate],
    nodes: &mut NodeTable,
    wave: &mut WaveState,
    capability: DpaCapability,
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    let mut eligible: Vec<usize> = (0..candidates.len())
        .filter(|&i| candidates[i].authorize)
        .collect();
    // Each authorized candidate adds exactly one to bonded_count; cap the
    // batch to what still fits under 239 before issuing anything, so a
    // request can never overshoot regardless of how batches succeed/fail.
    let capacity = 239usize.saturating_sub(nodes.bonded_count() + wave.new_nodes_this_wave as usize);
    eligible.truncate(capacity);

    let (batch_idx, single_idx): (Vec<usize>, Vec<usize>) = eligible
        .into_iter()
        .partition(|&i| capability == DpaCapability::MultiAuthBatched && candidates[i].supports_multi_auth);

    for batch in batch_idx.chunks(constants::AUTHORIZE_BATCH_MAX) {
        let records: Vec<packets::AuthorizeRecord> = batch
            .iter()
            .map(|&i| packets::AuthorizeRecord {
                address: candidates[i].proposed_address,
                mid: candidates[i].mid,
            })
            .collect();
        let req = packets::build_authorize_bond(&records)?;
        match execute_with_retry(client, req, retries, backoff).await {
            Ok(resp) => {
                packets::parse_authorize_bond(&resp.response)?;
                for &i in batch {
                    commit_authorized(nodes, wave, &candidates[i]);
                }
            }
            Err(e) => warn!(?e, "authorize batch failed after retries, skipping"),
        }
    }

    for &i in &single_idx {
        let record = packets::AuthorizeRecord {
            address: candidates[i].proposed_address,
            mid: candidates[i].mid,
        };
        let req = packets::build_authorize_bond(&[record])?;
        match execute_with_retry(client, req, retries, backoff).await {
            Ok(resp) => {
                packets::parse_authorize_bond(&resp.response)?;
                commit_authorized(nodes, wave, &candidates[i]);
            }
            Err(e) => warn!(?e, "single authorize failed after retries, skipping"),
        }
    }

    Ok(())
}

fn commit_authorized(nodes: &mut NodeTable, wave: &mut WaveState, candidate: &PreBondedCandidate) {
    nodes.set_bonded(candidate.proposed_address, candidate.mid);
    wave.new_nodes_this_wave += 1;
    wave.responded_new
        .push(NewNode::new(candidate.proposed_address, candidate.mid));
    debug!(address = candidate.proposed_address, mid = candidate.mid, "authorized");
}

async fn ping_and_prune(
    client: &dyn DpaClient,
    nodes: &mut NodeTable,
    wave: &mut WaveState,
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    let resp = execute_with_retry(client, packets::build_frc_ping(), retries, backoff).await?;
    let split = packets::split_frc_response(&resp.response)?;
    let alive = decode_bit_window(split.data);

    let pending: Vec<Address> = nodes
        .bonded_addresses()
        .filter(|a| !alive.contains(a))
        .collect();

    for addr in pending {
        let selected: BTreeSet<Address> = [addr].into_iter().collect();
        execute_with_retry(
            client,
            packets::build_restart_via_batch(&selected, &packets::os_remove_and_restart_batch())?,
            retries,
            backoff,
        )
        .await?;
        execute_with_retry(client, packets::build_remove_bond(addr), retries, backoff).await?;
        nodes.clear_bond(addr);
        if wave.responded_new.iter().any(|n| n.address == addr) {
            wave.new_nodes_this_wave = wave.new_nodes_this_wave.saturating_sub(1);
            wave.responded_new.retain(|n| n.address != addr);
        }
    }
    Ok(())
}

/// §4.4.4: broadcasts the coordinator's MID for each still-bonded node (and
/// zero for none currently queued for unbond, since pruning already removes
/// the coordinator-side record directly) so that `[N]`-side bond state never
/// drifts from `[C]`-side across an empty wave.
async fn run_duplicate_mid_cleanup(
    client: &dyn DpaClient,
    nodes: &NodeTable,
    retries: u8,
    backoff: Duration,
) -> Result<(), AutonetworkError> {
    let records: Vec<packets::AuthorizeRecord> = nodes
        .iter()
        .filter(|n| n.bonded)
        .map(|n| packets::AuthorizeRecord {
            address: n.address,
            mid: n.mid,
        })
        .collect();
    for batch in records.chunks(constants::AUTHORIZE_BATCH_MAX) {
        let req = packets::build_validate_bonds(dpa_codec::BROADCAST_ADDR, batch)?;
        execute_with_retry(client, req, retries, backoff).await?;
    }
    Ok(())
}
