//! BROM/Preloader client: the 1-byte-opcode command protocol MediaTek
//! boot ROMs and preloaders speak over the shared serial transport.

use dl_port::{Endpoint, SimpleRead, SimpleWrite};

use crate::err::Error;

pub mod commands;
pub mod err;
pub mod handshake;
pub mod session;
pub mod sla;
pub mod status;

pub use session::{BromSession, SessionState};
pub use sla::SlaAuthenticator;

pub type Result<T> = core::result::Result<T, Error>;

/// Command opcodes.
pub mod opcode {
    pub const GET_HW_CODE: u8 = 0xFD;
    pub const GET_HW_SW_VER: u8 = 0xFC;
    pub const GET_VERSION: u8 = 0xFF;
    pub const GET_BL_VER: u8 = 0xFE;
    pub const GET_TARGET_CONFIG: u8 = 0xD8;
    pub const GET_ME_ID: u8 = 0xE1;
    pub const GET_SOC_ID: u8 = 0xE7;
    pub const READ32: u8 = 0xD1;
    pub const WRITE16: u8 = 0xD2;
    pub const WRITE32: u8 = 0xD4;
    pub const JUMP_DA: u8 = 0xD5;
    pub const SEND_DA: u8 = 0xD7;
    pub const SEND_CERT: u8 = 0xE0;
    pub const SLA_CHALLENGE: u8 = 0xB4;
    pub const SLA_RESPONSE: u8 = 0xB5;
    pub const HANDSHAKE_PING: u8 = 0xA0;
    pub const HANDSHAKE_PONG: u8 = 0x5F;
}

/// Write-then-verify helpers for the echoed side of the protocol.
///
/// Every parameter the device acknowledges by echoing goes through one of
/// these; a mismatch is fatal for the running operation.
pub(crate) trait EchoExt {
    fn echo_u8(&mut self, value: u8) -> Result<()>;
    fn echo_u16(&mut self, value: u16) -> Result<()>;
    fn echo_u32(&mut self, value: u32) -> Result<()>;
}

impl EchoExt for Endpoint {
    fn echo_u8(&mut self, value: u8) -> Result<()> {
        self.write_u8(value)?;
        let got = self.read_u8()?;
        if got != value {
            return Err(Error::EchoMismatch {
                expected: value.into(),
                got: got.into(),
            });
        }
        Ok(())
    }

    fn echo_u16(&mut self, value: u16) -> Result<()> {
        self.write_u16_be(value)?;
        let got = self.read_u16_be()?;
        if got != value {
            return Err(Error::EchoMismatch {
                expected: value.into(),
                got: got.into(),
            });
        }
        Ok(())
    }

    fn echo_u32(&mut self, value: u32) -> Result<()> {
        self.write_u32_be(value)?;
        let got = self.read_u32_be()?;
        if got != value {
            return Err(Error::EchoMismatch {
                expected: value,
                got,
            });
        }
        Ok(())
    }
}
