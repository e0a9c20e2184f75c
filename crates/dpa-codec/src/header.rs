use crate::{Address, CodecError};

/// The 6-byte header every DPA request buffer begins with:
/// `{NADR_LE(2), PNUM, PCMD, HWPID_LE(2)}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpaHeader {
    pub nadr: u16,
    pub pnum: u8,
    pub pcmd: u8,
    pub hwpid: u16,
}

impl DpaHeader {
    pub fn new(nadr: Address, pnum: u8, pcmd: u8) -> Self {
        Self {
            nadr: nadr as u16,
            pnum,
            pcmd,
            hwpid: 0xFFFF,
        }
    }

    pub fn to_bytes(self) -> [u8; 6] {
        let nadr = self.nadr.to_le_bytes();
        let hwpid = self.hwpid.to_le_bytes();
        [nadr[0], nadr[1], self.pnum, self.pcmd, hwpid[0], hwpid[1]]
    }
}

/// The `{ResponseCode, DpaValue}` pair every response buffer adds before its
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub response_code: u8,
    pub dpa_value: u8,
}

pub fn parse_response_header(buf: &[u8]) -> Result<(ResponseHeader, &[u8]), CodecError> {
    if buf.len() < 2 {
        return Err(CodecError::TooShort {
            need: 2,
            got: buf.len(),
        });
    }
    let header = ResponseHeader {
        response_code: buf[0],
        dpa_value: buf[1],
    };
    Ok((header, &buf[2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_little_endian() {
        let h = DpaHeader {
            nadr: 0x0102,
            pnum: 0x0D,
            pcmd: 0x00,
            hwpid: 0x0304,
        };
        assert_eq!(h.to_bytes(), [0x02, 0x01, 0x0D, 0x00, 0x04, 0x03]);
    }
}
