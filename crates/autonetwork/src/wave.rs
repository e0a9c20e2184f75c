use std::collections::{BTreeMap, BTreeSet};

use dpa_codec::Address;

use crate::error::WaveStateCode;
use crate::input::InputParams;
use crate::node::{NewNode, NodeTable};

/// Mutable state carried across waves for one run.
#[derive(Debug, Default)]
pub struct WaveState {
    pub wave_index: u16,
    pub empty_wave_streak: u16,
    pub new_nodes_total: u16,
    pub new_nodes_this_wave: u16,
    pub progress_percent: u8,
    pub state_code: Option<WaveStateCode>,
    pub responded_new: Vec<NewNode>,
    pub seed: u8,
}

impl WaveState {
    pub fn next_seed(&mut self) -> u8 {
        self.seed = self.seed.wrapping_add(1);
        self.seed
    }

    pub fn begin_wave(&mut self) {
        self.wave_index += 1;
        self.new_nodes_this_wave = 0;
        self.progress_percent = 0;
        self.responded_new.clear();
    }
}

/// Evaluates the six pre-flight refusal conditions from the spec, in the
/// order the spec lists them. Returns `None` if the run may proceed.
pub fn evaluate_preflight_refusal(
    params: &InputParams,
    nodes: &NodeTable,
    mid_list: &BTreeMap<u32, Address>,
) -> Option<WaveStateCode> {
    let bonded_count = nodes.bonded_count();

    if bonded_count >= 239 {
        return Some(WaveStateCode::CannotStartMaxAddress);
    }

    if nodes.duplicate_bonded_mid().is_some() {
        return Some(WaveStateCode::CannotStartDuplicitMidInCoord);
    }

    if let Some(space) = &params.address_space {
        if !space.is_empty() && space.iter().all(|&a| nodes.get(a).map(|n| n.bonded).unwrap_or(false)) {
            return Some(WaveStateCode::CannotStartAddressSpaceNoFreeAddress);
        }
    }

    if params.mid_filtering {
        if let Some(list) = &params.mid_list {
            let all_bonded = !list.is_empty()
                && list.keys().all(|&mid| nodes.find_by_mid(mid).is_some());
            if all_bonded {
                return Some(WaveStateCode::CannotStartAllNodesMidListBonded);
            }
            let not_yet_bonded = list.keys().filter(|&&mid| nodes.find_by_mid(mid).is_none()).count();
            if params.number_of_total_nodes != 0
                && (bonded_count + not_yet_bonded) < params.number_of_total_nodes as usize
            {
                return Some(WaveStateCode::CannotStartTotalNodesNrMidList);
            }
            if params.number_of_new_nodes != 0 && not_yet_bonded < params.number_of_new_nodes as usize {
                return Some(WaveStateCode::CannotStartNewNodesNrMidList);
            }
        }
    } else if params.total_waves == 0 && params.empty_waves == 0 {
        if params.number_of_total_nodes != 0 && params.number_of_total_nodes as usize <= bonded_count {
            return Some(WaveStateCode::CannotStartTotalNodesNr);
        }
        if params.number_of_new_nodes != 0 && bonded_count + params.number_of_new_nodes as usize > 239 {
            return Some(WaveStateCode::CannotStartNewNodesNr);
        }
        if let Some(space) = &params.address_space {
            let free = space
                .iter()
                .filter(|&&a| !nodes.get(a).map(|n| n.bonded).unwrap_or(false))
                .count();
            if params.number_of_new_nodes != 0 && free < params.number_of_new_nodes as usize {
                return Some(WaveStateCode::CannotStartNewNodesNr);
            }
            if params.number_of_total_nodes != 0
                && (bonded_count + free) < params.number_of_total_nodes as usize
            {
                return Some(WaveStateCode::CannotStartTotalNodesNr);
            }
        }
    }

    let _ = mid_list;
    None
}

/// Evaluates the seven stop conditions in priority order. Returns
/// `WaveStateCode::WaveFinished` if none apply (the run continues).
#[allow(clippy::too_many_arguments)]
pub fn evaluate_stop_conditions(
    params: &InputParams,
    wave: &WaveState,
    nodes: &NodeTable,
) -> WaveStateCode {
    let bonded_count = nodes.bonded_count();

    if params.total_waves != 0 && wave.wave_index == params.total_waves {
        return WaveStateCode::StopOnMaxNumWaves;
    }
    if params.empty_waves != 0 && wave.empty_wave_streak >= params.empty_waves {
        return WaveStateCode::StopOnMaxEmptyWaves;
    }
    if params.number_of_new_nodes != 0 && wave.new_nodes_total >= params.number_of_new_nodes {
        return WaveStateCode::StopOnNumberOfNewNodes;
    }
    if params.number_of_total_nodes != 0 && bonded_count >= params.number_of_total_nodes as usize {
        return WaveStateCode::StopOnNumberOfTotalNodes;
    }
    if bonded_count == 239 {
        return WaveStateCode::AbortOnAllAddressesAllocated;
    }
    if let Some(space) = &params.address_space {
        if !space.is_empty() && space.iter().all(|&a| nodes.get(a).map(|n| n.bonded).unwrap_or(false)) {
            return WaveStateCode::AbortOnAllAddressesFromAddressSpaceAllocated;
        }
    }
    if params.mid_filtering {
        if let Some(list) = &params.mid_list {
            if !list.is_empty() && list.keys().all(|&mid| nodes.find_by_mid(mid).is_some()) {
                return WaveStateCode::AbortOnAllMidsFromMidListAllocated;
            }
        }
    }
    WaveStateCode::WaveFinished
}

/// Number of progress phases for the configured run, used to compute the
/// per-phase progress increment (`100 / progress_steps`).
pub fn progress_steps(params: &InputParams, capability_is_multi_auth: bool) -> u8 {
    let mut steps: u8 = 6; // prebond, alive, mid read, unbond-dupes, authorize, update&publish
    if params.hwpid_filtering_enabled() {
        steps += 1;
    }
    if capability_is_multi_auth {
        steps += 1;
    }
    if !params.skip_discovery_each_wave {
        steps += 1;
    }
    steps
}

pub fn advance_progress(wave: &mut WaveState, steps: u8) {
    let increment = 100 / steps.max(1);
    wave.progress_percent = wave.progress_percent.saturating_add(increment).min(100);
}

#[derive(Debug, Clone)]
pub struct Candidates(pub BTreeSet<Address>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotone_and_caps_at_100() {
        let mut wave = WaveState::default();
        for _ in 0..8 {
            advance_progress(&mut wave, 6);
        }
        assert!(wave.progress_percent <= 100);
        wave.progress_percent = 100;
        advance_progress(&mut wave, 6);
        assert_eq!(wave.progress_percent, 100);
    }

    #[test]
    fn stop_on_max_waves_takes_priority() {
        let mut params = InputParams::default();
        params.total_waves = 3;
        params.empty_waves = 1;
        let mut wave = WaveState::default();
        wave.wave_index = 3;
        wave.empty_wave_streak = 5;
        let nodes = NodeTable::new();
        assert_eq!(
            evaluate_stop_conditions(&params, &wave, &nodes),
            WaveStateCode::StopOnMaxNumWaves
        );
    }

    #[test]
    fn all_addresses_allocated_is_detected() {
        let params = InputParams::default();
        let wave = WaveState::default();
        let mut nodes = NodeTable::new();
        for addr in 1..=239u8 {
            nodes.set_bonded(addr, addr as u32 + 1);
        }
        assert_eq!(
            evaluate_stop_conditions(&params, &wave, &nodes),
            WaveStateCode::AbortOnAllAddressesAllocated
        );
    }

    #[test]
    fn preflight_refuses_full_coordinator() {
        let params = InputParams::default();
        let mut nodes = NodeTable::new();
        for addr in 1..=239u8 {
            nodes.set_bonded(addr, addr as u32 + 1);
        }
        assert_eq!(
            evaluate_preflight_refusal(&params, &nodes, &BTreeMap::new()),
            Some(WaveStateCode::CannotStartMaxAddress)
        );
    }

    #[test]
    fn preflight_refuses_duplicate_mid_in_coordinator() {
        let params = InputParams::default();
        let mut nodes = NodeTable::new();
        nodes.set_bonded(1, 0x1111_1111);
        // Force a duplicate MID directly (bypassing NodeTable's own
        // bookkeeping, since set_bonded alone can't construct an
        // inconsistent coordinator snapshot).
        nodes.get_or_insert(2).bonded = true;
        nodes.get_or_insert(2).mid = 0x1111_1111;
        assert_eq!(
            evaluate_preflight_refusal(&params, &nodes, &BTreeMap::new()),
            Some(WaveStateCode::CannotStartDuplicitMidInCoord)
        );
    }
}
