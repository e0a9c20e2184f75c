use std::collections::BTreeMap;

use dpa_codec::Address;
use serde::Serialize;

use crate::error::AuthorizeErr;

/// One node record per address 0..=239, owned by the orchestrator for the
/// duration of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub address: Address,
    pub mid: u32,
    pub hwpid: u16,
    pub hwpid_ver: u16,
    pub bonded: bool,
    pub discovered: bool,
    pub online: bool,
}

impl NodeRecord {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }
}

/// The coordinator's view of the network for the duration of one run. Not a
/// general-purpose graph: nodes are referenced only by address, never by
/// pointer, so there are no cycles to manage.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: BTreeMap<Address, NodeRecord>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: Address) -> Option<&NodeRecord> {
        self.nodes.get(&address)
    }

    pub fn get_or_insert(&mut self, address: Address) -> &mut NodeRecord {
        self.nodes
            .entry(address)
            .or_insert_with(|| NodeRecord::new(address))
    }

    pub fn set_bonded(&mut self, address: Address, mid: u32) {
        let node = self.get_or_insert(address);
        node.bonded = true;
        node.mid = mid;
    }

    pub fn clear_bond(&mut self, address: Address) {
        let node = self.get_or_insert(address);
        node.bonded = false;
        node.discovered = false;
        node.mid = 0;
        node.hwpid = 0;
        node.hwpid_ver = 0;
    }

    pub fn set_discovered(&mut self, address: Address, discovered: bool) {
        self.get_or_insert(address).discovered = discovered;
    }

    pub fn bonded_count(&self) -> usize {
        self.nodes.values().filter(|n| n.bonded).count()
    }

    pub fn bonded_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.nodes.values().filter(|n| n.bonded).map(|n| n.address)
    }

    pub fn find_by_mid(&self, mid: u32) -> Option<&NodeRecord> {
        if mid == 0 {
            return None;
        }
        self.nodes.values().find(|n| n.bonded && n.mid == mid)
    }

    /// No two node records may share the same non-zero MID. Returns the
    /// first offending pair, if any.
    pub fn duplicate_bonded_mid(&self) -> Option<(Address, Address)> {
        let mut seen: BTreeMap<u32, Address> = BTreeMap::new();
        for node in self.nodes.values().filter(|n| n.bonded && n.mid != 0) {
            if let Some(&other) = seen.get(&node.mid) {
                return Some((other, node.address));
            }
            seen.insert(node.mid, node.address);
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }
}

/// One node that answered the current wave's alive-check. Lives only inside
/// one wave; cleared at wave end.
#[derive(Debug, Clone)]
pub struct PreBondedCandidate {
    pub source_address: Address,
    pub mid: u32,
    pub hwpid: u16,
    pub hwpid_ver: u16,
    pub proposed_address: Address,
    pub supports_multi_auth: bool,
    pub authorize: bool,
    pub error: AuthorizeErr,
}

impl PreBondedCandidate {
    pub fn new(source_address: Address) -> Self {
        Self {
            source_address,
            mid: 0,
            hwpid: 0,
            hwpid_ver: 0,
            proposed_address: 0,
            supports_multi_auth: false,
            authorize: false,
            error: AuthorizeErr::No,
        }
    }

    pub fn mark_error(&mut self, error: AuthorizeErr) {
        self.authorize = false;
        self.error = error;
    }
}

/// Firmware-capability dispatch, computed once after `update_network_info`
/// instead of sprinkling `if dpa_version >= 0x0414` through every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpaCapability {
    MultiAuthBatched,
    SingleAuthOnly,
}

impl DpaCapability {
    pub fn from_dpa_version(version: u16) -> Self {
        if version >= dpa_codec::constants::DPA_VERSION_MULTI_AUTH {
            Self::MultiAuthBatched
        } else {
            Self::SingleAuthOnly
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewNode {
    pub address: Address,
    /// Hex string, matching the wire format of the result envelope.
    pub mid: String,
}

impl NewNode {
    pub fn new(address: Address, mid: u32) -> Self {
        Self {
            address,
            mid: format!("{mid:08X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_bonded_mid_detects_first_collision() {
        let mut table = NodeTable::new();
        table.set_bonded(1, 0x1111_1111);
        table.set_bonded(2, 0x2222_2222);
        assert_eq!(table.duplicate_bonded_mid(), None);
        table.set_bonded(3, 0x1111_1111);
        assert_eq!(table.duplicate_bonded_mid(), Some((1, 3)));
    }

    #[test]
    fn clearing_a_bond_resets_discovered_and_mid() {
        let mut table = NodeTable::new();
        table.set_bonded(5, 0xAAAA_AAAA);
        table.set_discovered(5, true);
        table.clear_bond(5);
        let node = table.get(5).unwrap();
        assert!(!node.bonded);
        assert!(!node.discovered);
        assert_eq!(node.mid, 0);
    }
}
