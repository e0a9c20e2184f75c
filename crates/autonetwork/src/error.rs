use dpa_client::{DpaError, LeaseError};
use serde::Serialize;
use thiserror::Error;

/// Node authorization error, one per pre-bonded candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizeErr {
    No,
    MidFiltering,
    HwpidFiltering,
    Frc,
    Address,
    NetworkNum,
    NodeBonded,
}

impl Default for AuthorizeErr {
    fn default() -> Self {
        Self::No
    }
}

/// Every phase or terminal state the orchestrator can be in, emitted with
/// every progress update. Negative variants are pre-flight refusals and
/// never accompany a wave body; zero/positive variants are in-wave phases
/// or terminal wave outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WaveStateCode {
    CannotStartMaxAddress,
    CannotStartTotalNodesNr,
    CannotStartNewNodesNr,
    CannotStartTotalNodesNrMidList,
    CannotStartNewNodesNrMidList,
    CannotStartAllNodesMidListBonded,
    CannotStartDuplicitMidInCoord,
    CannotStartAddressSpaceNoFreeAddress,

    WaveFinished,
    DiscoveryBeforeStart,
    SmartConnect,
    CheckPrebondedAlive,
    ReadingDpaVersion,
    ReadPrebondedMid,
    ReadPrebondedHwpid,
    Enumeration,
    Authorize,
    Ping,
    RemoveNotResponded,
    Discovery,
    StopOnMaxNumWaves,
    StopOnNumberOfTotalNodes,
    StopOnMaxEmptyWaves,
    StopOnNumberOfNewNodes,
    AbortOnTooManyNodesFound,
    AbortOnAllAddressesAllocated,
    AbortOnAllAddressesFromAddressSpaceAllocated,
    AbortOnAllMidsFromMidListAllocated,
}

impl WaveStateCode {
    /// Pre-flight refusals terminate the whole request without a wave body.
    pub fn is_pre_flight_refusal(self) -> bool {
        matches!(
            self,
            Self::CannotStartMaxAddress
                | Self::CannotStartTotalNodesNr
                | Self::CannotStartNewNodesNr
                | Self::CannotStartTotalNodesNrMidList
                | Self::CannotStartNewNodesNrMidList
                | Self::CannotStartAllNodesMidListBonded
                | Self::CannotStartDuplicitMidInCoord
                | Self::CannotStartAddressSpaceNoFreeAddress
        )
    }

    /// Any state that ends the run (as opposed to `WaveFinished`, which
    /// continues into the next wave).
    pub fn is_terminal(self) -> bool {
        self.is_pre_flight_refusal()
            || matches!(
                self,
                Self::StopOnMaxNumWaves
                    | Self::StopOnNumberOfTotalNodes
                    | Self::StopOnMaxEmptyWaves
                    | Self::StopOnNumberOfNewNodes
                    | Self::AbortOnTooManyNodesFound
                    | Self::AbortOnAllAddressesAllocated
                    | Self::AbortOnAllAddressesFromAddressSpaceAllocated
                    | Self::AbortOnAllMidsFromMidListAllocated
            )
    }
}

/// Status codes for the outer response envelope (see `splitter`).
pub const STATUS_OK: i32 = 0;
pub const STATUS_SERVICE_ERROR: i32 = 1000;
pub const STATUS_PARSING_ERROR: i32 = 1001;
pub const STATUS_EXCLUSIVE_ACCESS_BUSY: i32 = 1002;

#[derive(Debug, Error)]
pub enum AutonetworkError {
    #[error("coordinator is missing the COORDINATOR or OS peripheral")]
    NoCoordOrCoordOs,

    #[error("exclusive access to the DPA client is busy")]
    Busy(#[from] LeaseError),

    #[error("DPA exchange failed: {0}")]
    Dpa(#[from] DpaError),

    #[error("codec error: {0}")]
    Codec(#[from] dpa_codec::CodecError),

    #[error("run refused before any wave ran: {0:?}")]
    CannotStart(WaveStateCode),

    #[error("failed to restore saved FRC/DPA/hop parameters during cleanup: {0}")]
    CleanupFailed(String),
}

impl AutonetworkError {
    pub fn status_code(&self) -> i32 {
        match self {
            AutonetworkError::Busy(_) => STATUS_EXCLUSIVE_ACCESS_BUSY,
            _ => STATUS_SERVICE_ERROR,
        }
    }
}
