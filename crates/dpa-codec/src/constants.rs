//! Peripheral/command bytes for the exchanges Autonetwork drives. Only the
//! subset the orchestrator actually issues is named here.

pub const PNUM_COORDINATOR: u8 = 0x00;
pub const PNUM_NODE: u8 = 0x01;
pub const PNUM_OS: u8 = 0x02;
pub const PNUM_EEEPROM: u8 = 0x03;
pub const PNUM_EXPLORE: u8 = 0x3F;
pub const PNUM_FRC: u8 = 0x0D;
pub const PNUM_ENUMERATION: u8 = 0xFF;

pub const CMD_GET_PER_INFO: u8 = 0x3F;

pub const CMD_COORDINATOR_ADDR_INFO: u8 = 0x00;
pub const CMD_COORDINATOR_DISCOVERED_DEVICES: u8 = 0x01;
pub const CMD_COORDINATOR_BONDED_DEVICES: u8 = 0x02;
pub const CMD_COORDINATOR_DISCOVERY: u8 = 0x07;
pub const CMD_COORDINATOR_SET_DPAPARAMS: u8 = 0x08;
pub const CMD_COORDINATOR_SET_HOPS: u8 = 0x09;
pub const CMD_COORDINATOR_AUTHORIZE_BOND: u8 = 0x0D;
pub const CMD_COORDINATOR_REMOVE_BOND: u8 = 0x0B;
pub const CMD_COORDINATOR_SMART_CONNECT: u8 = 0x12;

pub const CMD_NODE_VALIDATE_BONDS: u8 = 0x11;
pub const CMD_NODE_REMOVE_BOND: u8 = 0x0B;

pub const CMD_OS_READ: u8 = 0x00;

pub const CMD_FRC_SEND: u8 = 0x00;
pub const CMD_FRC_EXTRARESULT: u8 = 0x01;
pub const CMD_FRC_SEND_SELECTIVE: u8 = 0x02;
pub const CMD_FRC_SET_PARAMS: u8 = 0x03;

pub const CMD_EEEPROM_XREAD: u8 = 0x02;

/// FRC command codes (the byte carried as the first user byte of an
/// `FRC_SEND`/`FRC_SEND_SELECTIVE` request, not a DPA `PCMD`).
pub mod frc_cmd {
    pub const PREBONDED_ALIVE: u8 = 0x01;
    pub const PREBONDED_MEMORY_READ_4B_PLUS_1: u8 = 0x09;
    pub const PREBONDED_MEMORY_READ_COMPARE_2B: u8 = 0x0F;
    pub const ACKNOWLEDGED_BROADCAST_BITS: u8 = 0x80;
    pub const PING: u8 = 0x40;
}

/// DPA version at/above which firmware supports batched authorize and the
/// 4-byte-memory-read FRC variants used for MID/HWPID discovery.
pub const DPA_VERSION_MULTI_AUTH: u16 = 0x0414;
/// DPA version below which cleanup must restart nodes explicitly instead of
/// relying on firmware-side auto-restart after remove-bond.
pub const DPA_VERSION_AUTO_RESTART: u16 = 0x0417;
/// DPA version at/above which node-side remove-bond can be issued directly
/// instead of through an OS batch (remove-bond + restart).
pub const DPA_VERSION_NODE_REMOVE_BOND: u16 = 0x0400;

pub const EEEPROM_MID_BASE: u16 = 0x4000;
pub const EEEPROM_MID_STRIDE: u16 = 8;

pub const FRC_MID_ADDRESS: u16 = 0x04a0;
pub const FRC_HWPID_ADDRESS: u16 = 0x04a7;

pub const AUTHORIZE_BATCH_MAX: usize = 11;
pub const FRC_MEMORY_READ_BATCH_MAX: usize = 15;
pub const FRC_BASE_RESPONSE_MAX: usize = 12;
