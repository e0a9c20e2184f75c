use std::collections::{BTreeMap, BTreeSet};

use dpa_codec::Address;
use serde::{Deserialize, Serialize};

fn default_action_retries() -> u8 {
    1
}

/// Overlapping-networks `{n, i}`; `n == 0` disables the feature.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct OverlappingNetworks {
    #[serde(default)]
    pub n: u8,
    #[serde(default)]
    pub i: u8,
}

impl OverlappingNetworks {
    pub fn is_enabled(&self) -> bool {
        self.n != 0
    }
}

/// Input parameters for one Autonetwork run, const for the run once parsed
/// from the inbound request envelope's `req` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParams {
    #[serde(default)]
    pub discovery_tx_power: u8,
    #[serde(default)]
    pub discovery_before_start: bool,
    #[serde(default)]
    pub skip_discovery_each_wave: bool,
    #[serde(default)]
    pub skip_prebonding: bool,
    #[serde(default)]
    pub unbond_unresponding_nodes: bool,
    #[serde(default)]
    pub abort_on_too_many_nodes_found: bool,
    #[serde(default = "default_action_retries")]
    pub action_retries: u8,

    #[serde(default)]
    pub address_space: Option<BTreeSet<Address>>,
    #[serde(default)]
    pub mid_list: Option<BTreeMap<u32, Address>>,
    #[serde(default)]
    pub mid_filtering: bool,
    #[serde(default)]
    pub overlapping_networks: OverlappingNetworks,
    #[serde(default)]
    pub hwpid_filtering: Vec<u16>,

    #[serde(default)]
    pub total_waves: u16,
    #[serde(default)]
    pub empty_waves: u16,
    #[serde(default)]
    pub number_of_total_nodes: u16,
    #[serde(default)]
    pub number_of_new_nodes: u16,
}

impl Default for InputParams {
    fn default() -> Self {
        Self {
            discovery_tx_power: 0,
            discovery_before_start: false,
            skip_discovery_each_wave: false,
            skip_prebonding: false,
            unbond_unresponding_nodes: false,
            abort_on_too_many_nodes_found: false,
            action_retries: default_action_retries(),
            address_space: None,
            mid_list: None,
            mid_filtering: false,
            overlapping_networks: OverlappingNetworks::default(),
            hwpid_filtering: Vec::new(),
            total_waves: 0,
            empty_waves: 0,
            number_of_total_nodes: 0,
            number_of_new_nodes: 0,
        }
    }
}

impl InputParams {
    pub fn hwpid_filtering_enabled(&self) -> bool {
        !self.hwpid_filtering.is_empty()
    }

    pub fn address_allowed(&self, address: Address) -> bool {
        match &self.address_space {
            Some(space) => space.contains(&address),
            None => true,
        }
    }

    pub fn any_stop_condition_set(&self) -> bool {
        self.total_waves != 0
            || self.empty_waves != 0
            || self.number_of_total_nodes != 0
            || self.number_of_new_nodes != 0
    }
}
