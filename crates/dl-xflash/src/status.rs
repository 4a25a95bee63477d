//! Status words in XFlash/XML DA context; never compared against BROM
//! statuses.

use core::fmt;

use crate::{Result, err::Error};

/// "SYNC" as it appears on the wire, read as a little-endian word.
pub const SYNC_WORD: u32 = u32::from_le_bytes(*b"SYNC");

/// Numeric status carried in a flow frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XflashStatus(pub u32);

impl XflashStatus {
    /// Decode a status payload, tolerating the 2-byte, 4-byte and
    /// longer forms DAs emit.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        match payload {
            [a, b] => Ok(Self(u32::from(u16::from_le_bytes([*a, *b])))),
            [a, b, c, d, ..] => Ok(Self(u32::from_le_bytes([*a, *b, *c, *d]))),
            _ => Err(Error::UnexpectedReply {
                op: "status",
                detail: format!("{}-byte status payload", payload.len()),
            }),
        }
    }

    /// Zero and the ASCII `SYNC` marker both mean success.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self.0 == 0 || self.0 == SYNC_WORD
    }

    #[must_use]
    pub fn is_protocol_error(self) -> bool {
        self.0 >= 0x1000 && self.0 != SYNC_WORD
    }
}

impl fmt::Display for XflashStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)?;
        if self.is_protocol_error() {
            write!(f, " (protocol error)")?;
        }
        Ok(())
    }
}
