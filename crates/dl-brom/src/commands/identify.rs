//! Device identification commands run right after the handshake.

use dl_port::{Endpoint, SimpleRead, SimpleWrite};

use crate::{EchoExt, Result, err::Error, opcode, status::BromStatus};

/// Read the 16-bit hardware code and the hardware version word.
pub struct GetHwCode;

impl GetHwCode {
    pub fn run(&self, ep: &mut Endpoint) -> Result<(u16, u16)> {
        ep.echo_u8(opcode::GET_HW_CODE)?;
        let hw_code = ep.read_u16_be()?;
        let hw_ver = ep.read_u16_be()?;
        Ok((hw_code, hw_ver))
    }
}

/// Security configuration bits reported by GET_TARGET_CONFIG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetConfig {
    bits: u32,
}

impl TargetConfig {
    /// Secure Boot Chain enabled.
    #[must_use]
    pub fn sbc(&self) -> bool {
        self.bits & 0x1 != 0
    }

    /// Serial Link Authentication enforced.
    #[must_use]
    pub fn sla(&self) -> bool {
        self.bits & 0x2 != 0
    }

    /// Download Agent Authentication enforced.
    #[must_use]
    pub fn daa(&self) -> bool {
        self.bits & 0x4 != 0
    }
}

pub struct GetTargetConfig;

impl GetTargetConfig {
    pub fn run(&self, ep: &mut Endpoint) -> Result<TargetConfig> {
        ep.echo_u8(opcode::GET_TARGET_CONFIG)?;
        let bits = ep.read_u32_be()?;
        let status = BromStatus(ep.read_u16_be()?);
        if status.0 > 0xFF {
            return Err(Error::Status {
                op: "GET_TARGET_CONFIG",
                status,
            });
        }
        Ok(TargetConfig { bits })
    }
}

/// One-byte probe that distinguishes BROM (0xFE) from the preloader.
///
/// The command byte is not echoed; the reply byte *is* the value.
pub struct GetBlVer;

impl GetBlVer {
    pub fn run(&self, ep: &mut Endpoint) -> Result<u8> {
        ep.write_u8(opcode::GET_BL_VER)?;
        Ok(ep.read_u8()?)
    }
}

/// Read the ME ID byte string.
pub struct GetMeId;

impl GetMeId {
    pub fn run(&self, ep: &mut Endpoint) -> Result<Vec<u8>> {
        // Some ROMs only answer GET_ME_ID after a BL_VER poke
        ep.write_u8(opcode::GET_BL_VER)?;
        let _ = ep.read_u8()?;

        ep.echo_u8(opcode::GET_ME_ID)?;
        read_id_body(ep, "GET_ME_ID")
    }
}

/// Read the SoC ID byte string; absent on devices that answer the probe
/// with a non-matching byte, which is not an error.
pub struct GetSocId;

impl GetSocId {
    pub fn run(&self, ep: &mut Endpoint) -> Result<Vec<u8>> {
        ep.write_u8(opcode::GET_SOC_ID)?;
        let first = ep.read_u8()?;
        if first != opcode::GET_SOC_ID {
            ep.drain()?;
            return Ok(Vec::new());
        }
        read_id_body(ep, "GET_SOC_ID")
    }
}

/// Shared tail of the ME_ID/SOC_ID commands: 4-byte length, body,
/// then a status word that is little-endian, mirroring the device.
fn read_id_body(ep: &mut Endpoint, op: &'static str) -> Result<Vec<u8>> {
    let len = ep.read_u32_be()?;
    if len == 0 || len > 64 {
        return Err(Error::BadLength { op, len });
    }

    let mut id = vec![0u8; len as usize];
    {
        let timeout = ep.timeout();
        ep.read_exact(op, &mut id, timeout)?;
    }

    let status = ep.read_u16_le()?;
    if status != 0 {
        return Err(Error::Status {
            op,
            status: BromStatus(status),
        });
    }
    Ok(id)
}

/// BROM version byte.
pub struct GetVersion;

impl GetVersion {
    pub fn run(&self, ep: &mut Endpoint) -> Result<u8> {
        ep.write_u8(opcode::GET_VERSION)?;
        Ok(ep.read_u8()?)
    }
}

/// Hardware sub-code plus hardware/software version words.
#[derive(Debug, Clone, Copy, Default)]
pub struct HwSwVersions {
    pub hw_sub_code: u16,
    pub hw_ver: u16,
    pub sw_ver: u16,
}

pub struct GetHwSwVer;

impl GetHwSwVer {
    pub fn run(&self, ep: &mut Endpoint) -> Result<HwSwVersions> {
        ep.echo_u8(opcode::GET_HW_SW_VER)?;
        let versions = HwSwVersions {
            hw_sub_code: ep.read_u16_be()?,
            hw_ver: ep.read_u16_be()?,
            sw_ver: ep.read_u16_be()?,
        };
        crate::commands::expect_ok(ep, "GET_HW_SW_VER")?;
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_port::script::ScriptedIo;

    #[test]
    fn hw_code_readout() {
        let io = ScriptedIo::new();
        io.queue(&[0xFD, 0x07, 0x17, 0x00, 0x01]);
        let handle = io.handle();
        let mut ep = handle.lock();

        let (hw_code, hw_ver) = GetHwCode.run(&mut ep).unwrap();
        assert_eq!(hw_code, 0x0717);
        assert_eq!(hw_ver, 0x0001);
        assert_eq!(io.written(), [0xFD]);
    }

    #[test]
    fn target_config_bits() {
        let io = ScriptedIo::new();
        io.queue(&[0xD8, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00]);
        let handle = io.handle();
        let mut ep = handle.lock();

        let config = GetTargetConfig.run(&mut ep).unwrap();
        assert!(config.sbc());
        assert!(config.sla());
        assert!(config.daa());
    }

    #[test]
    fn target_config_aborts_on_bad_status() {
        let io = ScriptedIo::new();
        io.queue(&[0xD8, 0x00, 0x00, 0x00, 0x07, 0x1D, 0x0C]);
        let handle = io.handle();
        let mut ep = handle.lock();

        assert!(matches!(
            GetTargetConfig.run(&mut ep),
            Err(Error::Status { op: "GET_TARGET_CONFIG", .. })
        ));
    }

    #[test]
    fn me_id_uses_little_endian_status() {
        let io = ScriptedIo::new();
        let mut reply = vec![0xFE]; // BL_VER poke answer
        reply.push(0xE1); // echo
        reply.extend([0x00, 0x00, 0x00, 0x04]); // length 4
        reply.extend([0xAA, 0xBB, 0xCC, 0xDD]);
        reply.extend([0x00, 0x00]); // status, LE
        io.queue(&reply);
        let handle = io.handle();
        let mut ep = handle.lock();

        assert_eq!(GetMeId.run(&mut ep).unwrap(), [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn me_id_rejects_oversized_length() {
        let io = ScriptedIo::new();
        io.queue(&[0xFE, 0xE1, 0x00, 0x00, 0x00, 0x41]); // length 65
        let handle = io.handle();
        let mut ep = handle.lock();

        assert!(matches!(
            GetMeId.run(&mut ep),
            Err(Error::BadLength { op: "GET_ME_ID", len: 65 })
        ));
    }

    #[test]
    fn absent_soc_id_yields_empty() {
        let io = ScriptedIo::new();
        io.queue(&[0x00, 0x13, 0x37]); // non-matching first byte + residue
        let handle = io.handle();
        let mut ep = handle.lock();

        assert!(GetSocId.run(&mut ep).unwrap().is_empty());
        assert_eq!(io.unread(), 0, "residue must be drained");
    }

    #[test]
    fn bl_ver_distinguishes_brom() {
        let io = ScriptedIo::new();
        io.queue(&[0xFE]);
        let handle = io.handle();
        let mut ep = handle.lock();

        assert_eq!(GetBlVer.run(&mut ep).unwrap(), 0xFE);
    }
}
