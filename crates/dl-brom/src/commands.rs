//! Command structs, one per opcode, each with a hand-written `run` in
//! wire order: command echo, parameter echoes, status words, payload.

use dl_port::{Endpoint, SimpleRead};

use crate::{Result, err::Error, status::BromStatus};

pub mod identify;
pub mod memory;
pub mod upload;

pub use identify::{
    GetBlVer, GetHwCode, GetHwSwVer, GetMeId, GetSocId, GetTargetConfig, GetVersion, TargetConfig,
};
pub use memory::{Read32, Write16, Write32};
pub use upload::{JumpDa, ProtocolVariant, SendCert, SendDa, SendDaOutcome, SendDaReport};

/// Read a big-endian status word and fail on anything non-zero.
pub(crate) fn expect_ok(ep: &mut Endpoint, op: &'static str) -> Result<()> {
    let status = BromStatus(ep.read_u16_be()?);
    if status.is_ok() {
        Ok(())
    } else {
        Err(Error::Status { op, status })
    }
}
