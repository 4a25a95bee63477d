//! One BROM/Preloader conversation and its state machine.

use std::{thread::sleep, time::Duration};

use derive_more::IsVariant;
use dl_port::{DeviceHandle, Endpoint, SimpleWrite};
use dl_soc::ChipInfo;
use getset::Getters;

use crate::{
    Result,
    commands::{
        GetBlVer, GetHwCode, GetHwSwVer, GetMeId, GetSocId, GetTargetConfig, GetVersion, JumpDa,
        Read32, SendCert, SendDa, SendDaOutcome, TargetConfig, Write16, Write32,
    },
    err::Error,
    handshake::{HandshakeOpts, handshake},
    opcode,
    sla::SlaAuthenticator,
};

/// Where the conversation stands. Variants carry the data that is only
/// legal in that state.
#[derive(Debug, Clone, Copy, Default, IsVariant)]
pub enum SessionState {
    #[default]
    Disconnected,
    Handshaking,
    Brom {
        config: TargetConfig,
    },
    Preloader {
        config: TargetConfig,
    },
    Da1Loaded {
        da_addr: u32,
    },
    Da2Loaded,
    Error,
}

impl SessionState {
    /// Security bits, available once identified.
    #[must_use]
    pub fn target_config(&self) -> Option<TargetConfig> {
        match self {
            Self::Brom { config } | Self::Preloader { config } => Some(*config),
            _ => None,
        }
    }
}

/// Mutable state of one BROM/Preloader conversation.
#[derive(Getters)]
pub struct BromSession {
    handle: DeviceHandle,

    #[getset(get = "pub")]
    state: SessionState,

    #[getset(get = "pub")]
    hw_code: u16,
    #[getset(get = "pub")]
    hw_ver: u16,
    #[getset(get = "pub")]
    sw_ver: u16,
    #[getset(get = "pub")]
    bl_ver: u8,
    #[getset(get = "pub")]
    brom_ver: u8,
    #[getset(get = "pub")]
    me_id: Vec<u8>,
    #[getset(get = "pub")]
    soc_id: Vec<u8>,
    #[getset(get = "pub")]
    last_upload_status: Option<u16>,

    /// Security bits, kept past the identified states so later stages
    /// can still consult SLA/DAA enforcement.
    target_config: TargetConfig,

    chip: Option<&'static ChipInfo>,
}

impl BromSession {
    #[must_use]
    pub fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            state: SessionState::Disconnected,
            hw_code: 0,
            hw_ver: 0,
            sw_ver: 0,
            bl_ver: 0,
            brom_ver: 0,
            me_id: Vec::new(),
            soc_id: Vec::new(),
            last_upload_status: None,
            target_config: TargetConfig::default(),
            chip: None,
        }
    }

    #[must_use]
    pub fn target_config(&self) -> TargetConfig {
        self.target_config
    }

    #[must_use]
    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    #[must_use]
    pub fn chip(&self) -> Option<&'static ChipInfo> {
        self.chip
    }

    fn fail(&mut self, e: Error) -> Error {
        self.state = SessionState::Error;
        e
    }

    /// Run the startup handshake.
    pub fn connect(&mut self, opts: &HandshakeOpts) -> Result<()> {
        self.state = SessionState::Handshaking;
        let handle = self.handle.clone();
        let mut ep = handle.lock();
        handshake(&mut ep, opts).map_err(|e| self.fail(e))
    }

    /// Identify the device and populate the session readouts.
    ///
    /// The mandatory steps abort on failure; ME ID, SoC ID and the
    /// version readouts are best-effort and leave their fields empty.
    pub fn initialize(&mut self) -> Result<()> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();

        let (hw_code, hw_ver) = GetHwCode.run(&mut ep).map_err(|e| self.fail(e))?;
        self.hw_code = hw_code;
        self.hw_ver = hw_ver;
        self.chip = dl_soc::by_hw_code(hw_code);
        if self.chip.is_none() {
            log::warn!("hw_code {hw_code:#06x} not in the chip database");
        }

        // Some SoCs hide the target config until they have seen a run
        // of heartbeats
        heartbeat(&mut ep)?;

        let config = GetTargetConfig.run(&mut ep).map_err(|e| self.fail(e))?;
        self.target_config = config;

        let bl_ver = GetBlVer.run(&mut ep).map_err(|e| self.fail(e))?;
        self.bl_ver = bl_ver;
        self.state = if bl_ver == 0xFE {
            SessionState::Brom { config }
        } else {
            SessionState::Preloader { config }
        };

        match GetMeId.run(&mut ep) {
            Ok(id) => self.me_id = id,
            Err(e) => log::debug!("GET_ME_ID unavailable: {e}"),
        }
        match GetSocId.run(&mut ep) {
            Ok(id) => self.soc_id = id,
            Err(e) => log::debug!("GET_SOC_ID unavailable: {e}"),
        }
        match GetVersion.run(&mut ep) {
            Ok(version) => self.brom_ver = version,
            Err(e) => log::debug!("GET_VERSION unavailable: {e}"),
        }
        match GetHwSwVer.run(&mut ep) {
            Ok(versions) => self.sw_ver = versions.sw_ver,
            Err(e) => log::debug!("GET_HW_SW_VER unavailable: {e}"),
        }

        log::info!(
            "identified {} (hw_code {hw_code:#06x}, hw_ver {hw_ver:#06x}) in {} mode",
            self.chip.map_or("unknown chip", |c| c.chip_name),
            if self.state.is_brom() { "BROM" } else { "preloader" },
        );

        Ok(())
    }

    /// Stop the watchdog before it resets the device mid-upload.
    pub fn disable_watchdog(&mut self) -> Result<()> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();

        if dl_soc::is_legacy_watchdog(self.hw_code) {
            Write16::new(dl_soc::LEGACY_WATCHDOG_ADDR, &[dl_soc::LEGACY_WATCHDOG_VALUE])
                .run(&mut ep)
                .map_err(|e| self.fail(e))
        } else {
            let chip = self.chip.ok_or(Error::UnsupportedSoC(self.hw_code))?;
            Write32::new(chip.watchdog_addr, &[dl_soc::WATCHDOG_DISABLE])
                .run(&mut ep)
                .map_err(|e| self.fail(e))
        }
    }

    pub fn read32(&mut self, addr: u32, dwords: u32) -> Result<Vec<u32>> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();
        Read32::new(addr, dwords).run(&mut ep).map_err(|e| self.fail(e))
    }

    pub fn write32(&mut self, addr: u32, values: &[u32]) -> Result<()> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();
        Write32::new(addr, values).run(&mut ep).map_err(|e| self.fail(e))
    }

    pub fn write16(&mut self, addr: u32, values: &[u16]) -> Result<()> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();
        Write16::new(addr, values).run(&mut ep).map_err(|e| self.fail(e))
    }

    /// Upload a DA image. `last_upload_status` is refreshed by every
    /// attempt that reached a status word.
    pub fn send_da(
        &mut self,
        addr: u32,
        image: &[u8],
        sig_len: u32,
        auth: Option<&dyn SlaAuthenticator>,
    ) -> Result<SendDaOutcome> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();

        match SendDa::new(addr, image, sig_len).run(&mut ep, auth) {
            Ok(report) => {
                self.last_upload_status = Some(report.final_status);
                Ok(report.outcome)
            }
            Err(e) => {
                match &e {
                    Error::SendDaRejected(code)
                    | Error::PreloaderAuthRequired(code)
                    | Error::SlaRejected(code) => self.last_upload_status = Some(*code),
                    _ => (),
                }
                Err(self.fail(e))
            }
        }
    }

    /// Jump into the uploaded DA; the device may re-enumerate USB.
    pub fn jump_da(&mut self, addr: u32) -> Result<()> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();
        JumpDa::new(addr).run(&mut ep).map_err(|e| self.fail(e))?;
        drop(ep);
        self.state = SessionState::Da1Loaded { da_addr: addr };
        Ok(())
    }

    /// Inject a BROM-resident payload through the certificate slot.
    pub fn send_cert(&mut self, payload: &[u8]) -> Result<()> {
        let handle = self.handle.clone();
        let mut ep = handle.lock();
        SendCert::new(payload).run(&mut ep).map_err(|e| self.fail(e))
    }

    /// Recorded by the DA layer once DA2 is confirmed running.
    pub fn mark_da2_loaded(&mut self) {
        self.state = SessionState::Da2Loaded;
    }

    /// Terminal transition; the endpoint is gone.
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }
}

/// 20 pings with 5 ms spacing, replies drained as they trickle in.
fn heartbeat(ep: &mut Endpoint) -> Result<()> {
    let mut residue = [0u8; 1];
    for _ in 0..20 {
        ep.write_u8(opcode::HANDSHAKE_PING)?;
        sleep(Duration::from_millis(5));
        let _ = ep.read_some(&mut residue)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_port::script::ScriptedIo;

    /// Full scripted identify: handshake, hw code 0x0717, config bits
    /// {sbc, sla, daa} all set, BROM mode. Replies are staged per
    /// phase because the handshake discards stale input.
    #[test]
    fn identify_reaches_brom_state() {
        let io = ScriptedIo::new();
        io.queue(&[0x5F, 0xF5, 0xAF, 0xFA]); // handshake

        let mut session = BromSession::new(io.handle());
        {
            let handle = session.handle().clone();
            handle.lock().set_timeout(Duration::from_millis(20));
        }
        session.connect(&HandshakeOpts::default()).unwrap();

        io.queue(&[0xFD, 0x07, 0x17, 0x00, 0x01]); // GET_HW_CODE
        io.queue(&[0x5F; 20]); // heartbeat echoes
        io.queue(&[0xD8, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00]); // GET_TARGET_CONFIG
        io.queue(&[0xFE]); // GET_BL_VER -> BROM
        session.initialize().unwrap();

        assert!(session.state().is_brom());
        assert_eq!(*session.hw_code(), 0x0717);
        assert_eq!(*session.hw_ver(), 0x0001);

        let config = session.state().target_config().unwrap();
        assert!(config.sbc() && config.sla() && config.daa());
        assert_eq!(session.chip().unwrap().chip_name, "mt6761");
    }

    #[test]
    fn best_effort_readouts_do_not_abort_initialize() {
        let io = ScriptedIo::new();
        io.queue(&[0x5F, 0xF5, 0xAF, 0xFA]);

        let mut session = BromSession::new(io.handle());
        {
            let handle = session.handle().clone();
            handle.lock().set_timeout(Duration::from_millis(20));
        }
        session.connect(&HandshakeOpts::default()).unwrap();

        io.queue(&[0xFD, 0x07, 0x17, 0x00, 0x01]);
        io.queue(&[0x5F; 20]);
        io.queue(&[0xD8, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00]);
        io.queue(&[0xFE]);
        // Nothing queued for ME_ID/SOC_ID/version readouts: they all
        // time out and must be swallowed
        session.initialize().unwrap();

        assert!(session.state().is_brom());
        assert!(session.me_id().is_empty());
        assert!(session.soc_id().is_empty());
    }

    #[test]
    fn daa_outcome_keeps_session_alive() {
        let body = [0xAB; 8];
        let mut image = body.to_vec();
        image.extend([0x5A; 4]);

        let io = ScriptedIo::new();
        io.queue(&[opcode::SEND_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&8u32.to_be_bytes());
        io.queue(&4u32.to_be_bytes());
        io.queue(&[0x00, 0x00]);
        io.queue(&dl_port::checksum::xor16(&body).to_be_bytes());
        io.queue(&[0x70, 0x17]);

        let mut session = BromSession::new(io.handle());
        let outcome = session.send_da(0x20_0000, &image, 4, None).unwrap();

        assert_eq!(outcome, SendDaOutcome::Reconnect);
        assert_eq!(*session.last_upload_status(), Some(0x7017));
        assert!(!session.state().is_error());
    }

    #[test]
    fn cancellation_sets_error_state_and_releases_endpoint() {
        let io = ScriptedIo::new();
        io.queue(&[0xAA; 32]);

        let mut session = BromSession::new(io.handle());
        session.handle().cancel().cancel();

        let err = session.read32(0x1000_7000, 4).unwrap_err();
        assert!(err.is_cancelled());
        assert!(session.state().is_error());

        // The mutex must be free again for the next client
        let handle = session.handle().clone();
        drop(handle.lock());
    }

    #[test]
    fn failed_identify_sets_error_state() {
        let io = ScriptedIo::new();
        io.queue(&[0x5F, 0xF5, 0xAF, 0xFA]);

        let mut session = BromSession::new(io.handle());
        {
            let handle = session.handle().clone();
            handle.lock().set_timeout(Duration::from_millis(20));
        }
        session.connect(&HandshakeOpts::default()).unwrap();

        io.queue(&[0x00]); // wrong echo for GET_HW_CODE
        assert!(session.initialize().is_err());
        assert!(session.state().is_error());
    }
}
