use std::collections::BTreeMap;

use dpa_codec::Address;

use crate::error::AuthorizeErr;
use crate::input::InputParams;
use crate::node::NodeTable;

/// Decides whether a candidate should be authorized and at what address.
/// `mid_list` is the run's working copy of the MID → address map (address 0
/// means "not yet assigned"); it is mutated in place so repeated calls for
/// the same MID are idempotent. `mid_list_present` distinguishes "the
/// request supplied an explicit list" from "we're building one implicitly
/// as we go" — only the former gates on `mid_filtering`.
pub fn authorize_control(
    mid: u32,
    hwpid: Option<u16>,
    nodes: &NodeTable,
    mid_list: &mut BTreeMap<u32, Address>,
    mid_list_present: bool,
    params: &InputParams,
) -> (Address, AuthorizeErr) {
    if let Some(existing) = nodes.find_by_mid(mid) {
        return (existing.address, AuthorizeErr::NodeBonded);
    }

    if params.overlapping_networks.is_enabled() {
        let n = params.overlapping_networks.n as u32;
        let i = params.overlapping_networks.i as u32;
        if mid % n != i.saturating_sub(1) {
            return (0, AuthorizeErr::NetworkNum);
        }
    }

    if mid_list_present && params.mid_filtering && !mid_list.contains_key(&mid) {
        return (0, AuthorizeErr::MidFiltering);
    }

    if let Some(hw) = hwpid {
        if params.hwpid_filtering_enabled() && !params.hwpid_filtering.contains(&hw) {
            return (0, AuthorizeErr::HwpidFiltering);
        }
    }

    if let Some(&existing_addr) = mid_list.get(&mid) {
        if existing_addr != 0 {
            return if params.address_allowed(existing_addr) {
                (existing_addr, AuthorizeErr::No)
            } else {
                (0, AuthorizeErr::Address)
            };
        }
    }

    let taken: std::collections::BTreeSet<Address> = mid_list.values().copied().collect();
    for addr in 1u8..=239 {
        let bonded = nodes.get(addr).map(|n| n.bonded).unwrap_or(false);
        if bonded || taken.contains(&addr) || !params.address_allowed(addr) {
            continue;
        }
        mid_list.insert(mid, addr);
        return (addr, AuthorizeErr::No);
    }

    (0, AuthorizeErr::Address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn params() -> InputParams {
        InputParams::default()
    }

    #[test]
    fn already_bonded_mid_returns_node_bonded() {
        let mut nodes = NodeTable::new();
        nodes.set_bonded(7, 0xAAAA_AAAA);
        let mut mid_list = BTreeMap::new();
        let (addr, err) =
            authorize_control(0xAAAA_AAAA, None, &nodes, &mut mid_list, false, &params());
        assert_eq!(addr, 7);
        assert_eq!(err, AuthorizeErr::NodeBonded);
    }

    #[test]
    fn overlapping_networks_rejects_wrong_remainder() {
        let nodes = NodeTable::new();
        let mut mid_list = BTreeMap::new();
        let mut p = params();
        p.overlapping_networks.n = 4;
        p.overlapping_networks.i = 1; // wants mid % 4 == 0
        let (addr, err) = authorize_control(5, None, &nodes, &mut mid_list, false, &p);
        assert_eq!(err, AuthorizeErr::NetworkNum);
        assert_eq!(addr, 0);

        let (addr, err) = authorize_control(8, None, &nodes, &mut mid_list, false, &p);
        assert_eq!(err, AuthorizeErr::No);
        assert_ne!(addr, 0);
    }

    #[test]
    fn mid_filtering_rejects_unknown_mid_when_list_present() {
        let nodes = NodeTable::new();
        let mut mid_list = BTreeMap::new();
        mid_list.insert(0x22222222, 17);
        let mut p = params();
        p.mid_filtering = true;
        let (_, err) = authorize_control(0x99999999, None, &nodes, &mut mid_list, true, &p);
        assert_eq!(err, AuthorizeErr::MidFiltering);
    }

    #[test]
    fn explicit_mid_list_address_is_honored() {
        let nodes = NodeTable::new();
        let mut mid_list = BTreeMap::new();
        mid_list.insert(0x22222222, 17);
        let p = params();
        let (addr, err) = authorize_control(0x22222222, None, &nodes, &mut mid_list, true, &p);
        assert_eq!(addr, 17);
        assert_eq!(err, AuthorizeErr::No);
    }

    #[test]
    fn hwpid_filtering_rejects_disallowed_hwpid() {
        let nodes = NodeTable::new();
        let mut mid_list = BTreeMap::new();
        mid_list.insert(0x22222222, 17);
        let mut p = params();
        p.hwpid_filtering = vec![0x0042];
        let (_, err) =
            authorize_control(0x22222222, Some(0x0100), &nodes, &mut mid_list, true, &p);
        assert_eq!(err, AuthorizeErr::HwpidFiltering);
    }

    #[test]
    fn picks_lowest_free_address_and_is_idempotent() {
        let mut nodes = NodeTable::new();
        nodes.set_bonded(1, 0x1);
        let mut mid_list = BTreeMap::new();
        let p = params();
        let (addr1, _) = authorize_control(0xBEEF, None, &nodes, &mut mid_list, false, &p);
        assert_eq!(addr1, 2);
        let (addr2, _) = authorize_control(0xBEEF, None, &nodes, &mut mid_list, false, &p);
        assert_eq!(addr2, addr1, "authorize_control must be idempotent for a fixed state");
    }

    #[test]
    fn address_space_restricts_candidates() {
        let nodes = NodeTable::new();
        let mut mid_list = BTreeMap::new();
        let mut p = params();
        p.address_space = Some(BTreeSet::from([5, 6]));
        let (addr, err) = authorize_control(0x1, None, &nodes, &mut mid_list, false, &p);
        assert_eq!(err, AuthorizeErr::No);
        assert_eq!(addr, 5);
    }
}
