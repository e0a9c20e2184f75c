use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    #[error("FRC status byte {0:#04x} indicates FRC-layer failure")]
    FrcFailed(u8),

    #[error("FRC status byte {0:#04x} indicates unsupported selected-node count")]
    FrcUnsupportedCount(u8),

    #[error("batch of {0} authorize records exceeds the 11-record DPA limit")]
    AuthorizeBatchTooLarge(usize),

    #[error("selected-node bitmap was not zeroed before encoding")]
    BitmapNotZeroed,
}
