//! DA upload, jump, and the certificate/payload injection path.

use std::{thread::sleep, time::Duration};

use derive_ctor::ctor;
use dl_port::{Endpoint, SimpleRead, SimpleWrite, checksum, config};

use crate::{
    EchoExt, Result,
    commands::expect_ok,
    err::Error,
    opcode,
    sla::{self, SlaAuthenticator},
    status::{BromStatus, StatusKind},
};

const UPLOAD_CHUNK: usize = 0x400;
const FLUSH_INTERVAL: usize = 0x2000;

/// Which SEND_DA wire dialect the device picked.
///
/// Some reverse-engineered preloaders never echo the command byte; they
/// answer 0xE7 or 0x00 plus a zero status instead and take the
/// parameters unacknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    Echoing,
    Mute,
}

/// How a completed SEND_DA ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDaOutcome {
    /// DA accepted and verified.
    Accepted,
    /// DAA-protected target (0x7015/0x7017). Not a failure: the device
    /// will re-enumerate and the caller must re-bind the endpoint.
    Reconnect,
}

/// Result of one SEND_DA attempt that reached the trailer.
#[derive(Debug, Clone, Copy)]
pub struct SendDaReport {
    pub outcome: SendDaOutcome,
    pub variant: ProtocolVariant,
    pub final_status: u16,
    pub device_checksum: u16,
    pub host_checksum: u16,
}

/// Upload a DA image: parameters, body in 0x400-byte chunks with a
/// flush every 0x2000 bytes, then checksum and final status trailer.
#[derive(ctor)]
pub struct SendDa<'a> {
    addr: u32,
    image: &'a [u8],
    sig_len: u32,
}

impl SendDa<'_> {
    pub fn run(
        &self,
        ep: &mut Endpoint,
        auth: Option<&dyn SlaAuthenticator>,
    ) -> Result<SendDaReport> {
        let body = self
            .image
            .len()
            .checked_sub(self.sig_len as usize)
            .map(|split| &self.image[..split])
            .ok_or(Error::BadLength {
                op: "SEND_DA",
                len: self.sig_len,
            })?;
        let host_checksum = checksum::xor16(body);

        ep.write_u8(opcode::SEND_DA)?;
        let first = ep.read_u8()?;
        let variant = match first {
            opcode::SEND_DA => ProtocolVariant::Echoing,
            0xE7 | 0x00 => ProtocolVariant::Mute,
            got => {
                return Err(Error::EchoMismatch {
                    expected: opcode::SEND_DA.into(),
                    got: got.into(),
                });
            }
        };

        match variant {
            ProtocolVariant::Echoing => {
                ep.echo_u32(self.addr)?;
                ep.echo_u32(body.len() as u32)?;
                ep.echo_u32(self.sig_len)?;

                let status = BromStatus(ep.read_u16_be()?);
                match status.kind() {
                    StatusKind::Ok => (),
                    StatusKind::PreloaderAuthRequired => {
                        return Err(Error::PreloaderAuthRequired(status.0));
                    }
                    StatusKind::SlaRequired => {
                        let auth = auth.ok_or(Error::SlaRequired)?;
                        sla::authenticate(ep, auth)?;
                    }
                    _ if status.0 > 0xFF => return Err(Error::SendDaRejected(status.0)),
                    _ => log::warn!("SEND_DA: tolerating parameter status {status}"),
                }
            }
            ProtocolVariant::Mute => {
                log::debug!("SEND_DA: device uses the mute dialect");
                let status = BromStatus(ep.read_u16_be()?);
                if !status.is_ok() {
                    return Err(Error::SendDaRejected(status.0));
                }
                ep.write_u32_be(self.addr)?;
                ep.write_u32_be(body.len() as u32)?;
                ep.write_u32_be(self.sig_len)?;
            }
        }

        upload_chunked(ep, body)?;
        ep.flush()?;
        sleep(Duration::from_millis(10));

        let mut trailer = [0u8; 4];
        ep.read_exact("SEND_DA trailer", &mut trailer, config::UPLOAD_STATUS_TIMEOUT)?;
        let device_checksum = u16::from_be_bytes([trailer[0], trailer[1]]);
        let final_status = u16::from_be_bytes([trailer[2], trailer[3]]);

        if device_checksum != host_checksum {
            // Diagnostics only; the final status is authoritative
            log::warn!(
                "SEND_DA checksum mismatch: host {host_checksum:#06x}, device {device_checksum:#06x}"
            );
        }

        let outcome = match BromStatus(final_status).kind() {
            StatusKind::Ok => SendDaOutcome::Accepted,
            StatusKind::DaaProtected => {
                log::info!(
                    "SEND_DA: DAA-protected target ({final_status:#06x}), expecting re-enumeration"
                );
                SendDaOutcome::Reconnect
            }
            _ => {
                return Err(Error::UploadFailed {
                    stage: "final status",
                    detail: BromStatus(final_status).to_string(),
                });
            }
        };

        Ok(SendDaReport {
            outcome,
            variant,
            final_status,
            device_checksum,
            host_checksum,
        })
    }
}

/// Jump into a previously uploaded DA. The device may re-enumerate USB
/// right after this, so nothing is read past the status word.
#[derive(ctor)]
pub struct JumpDa {
    addr: u32,
}

impl JumpDa {
    pub fn run(&self, ep: &mut Endpoint) -> Result<()> {
        ep.echo_u8(opcode::JUMP_DA)?;

        // The address is sent blind and confirmed as one word
        ep.write_u32_be(self.addr)?;
        let got = ep.read_u32_be()?;
        if got != self.addr {
            return Err(Error::EchoMismatch {
                expected: self.addr,
                got,
            });
        }

        expect_ok(ep, "JUMP_DA")?;
        sleep(Duration::from_millis(100));
        Ok(())
    }
}

/// Ship a BROM-resident payload through the certificate slot.
#[derive(ctor)]
pub struct SendCert<'a> {
    payload: &'a [u8],
}

impl SendCert<'_> {
    pub fn run(&self, ep: &mut Endpoint) -> Result<()> {
        ep.echo_u8(opcode::SEND_CERT)?;
        ep.echo_u32(self.payload.len() as u32)?;

        let status = BromStatus(ep.read_u16_be()?);
        if status.0 > 0xFF {
            return Err(Error::Status {
                op: "SEND_CERT",
                status,
            });
        }

        upload_chunked(ep, self.payload)?;
        ep.flush()?;
        sleep(Duration::from_millis(10));

        let checksum = ep.read_u16_be()?;
        log::debug!("SEND_CERT device checksum {checksum:#06x}");
        expect_ok(ep, "SEND_CERT")
    }
}

fn upload_chunked(ep: &mut Endpoint, body: &[u8]) -> Result<()> {
    let mut sent = 0;
    for chunk in body.chunks(UPLOAD_CHUNK) {
        ep.write_all(chunk)?;
        sent += chunk.len();
        if sent % FLUSH_INTERVAL == 0 {
            ep.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sla::testing::FixedSigner;
    use dl_port::script::ScriptedIo;

    fn image(body: &[u8], sig_len: usize) -> Vec<u8> {
        let mut image = body.to_vec();
        image.extend(std::iter::repeat_n(0x5A, sig_len));
        image
    }

    #[test]
    fn echoing_upload_accepted() {
        let body = [0x11u8, 0x22, 0x33, 0x44];
        let image = image(&body, 2);
        let checksum = checksum::xor16(&body);

        let io = ScriptedIo::new();
        io.queue(&[opcode::SEND_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&(body.len() as u32).to_be_bytes());
        io.queue(&2u32.to_be_bytes());
        io.queue(&[0x00, 0x00]); // parameter status
        io.queue(&checksum.to_be_bytes());
        io.queue(&[0x00, 0x00]); // final status

        let handle = io.handle();
        let mut ep = handle.lock();

        let report = SendDa::new(0x20_0000, &image, 2).run(&mut ep, None).unwrap();
        assert_eq!(report.outcome, SendDaOutcome::Accepted);
        assert_eq!(report.variant, ProtocolVariant::Echoing);
        assert_eq!(report.device_checksum, report.host_checksum);

        // The signature tail must never hit the wire
        let written = io.written();
        assert!(written.ends_with(&body));
    }

    #[test]
    fn daa_final_status_surfaces_reconnect() {
        let body = [0xABu8; 8];
        let image = image(&body, 4);

        let io = ScriptedIo::new();
        io.queue(&[opcode::SEND_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&(body.len() as u32).to_be_bytes());
        io.queue(&4u32.to_be_bytes());
        io.queue(&[0x00, 0x00]);
        io.queue(&checksum::xor16(&body).to_be_bytes());
        io.queue(&[0x70, 0x17]); // DAA-protected

        let handle = io.handle();
        let mut ep = handle.lock();

        let report = SendDa::new(0x20_0000, &image, 4).run(&mut ep, None).unwrap();
        assert_eq!(report.outcome, SendDaOutcome::Reconnect);
        assert_eq!(report.final_status, 0x7017);
    }

    #[test]
    fn preloader_auth_status_is_fatal() {
        let body = [0x00u8; 4];
        let image = image(&body, 0);

        let io = ScriptedIo::new();
        io.queue(&[opcode::SEND_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&4u32.to_be_bytes());
        io.queue(&0u32.to_be_bytes());
        io.queue(&[0x00, 0x10]);

        let handle = io.handle();
        let mut ep = handle.lock();

        assert!(matches!(
            SendDa::new(0x20_0000, &image, 0).run(&mut ep, None),
            Err(Error::PreloaderAuthRequired(0x0010))
        ));
    }

    #[test]
    fn sla_status_invokes_authenticator_then_uploads() {
        let body = [0x77u8; 4];
        let image = image(&body, 0);

        let io = ScriptedIo::new();
        io.queue(&[opcode::SEND_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&4u32.to_be_bytes());
        io.queue(&0u32.to_be_bytes());
        io.queue(&[0x1D, 0x0D]); // SLA required
        io.queue(&[0xC4; 16]); // challenge
        io.queue(&[0x00, 0x00]); // SLA accepted
        io.queue(&checksum::xor16(&body).to_be_bytes());
        io.queue(&[0x00, 0x00]);

        let handle = io.handle();
        let mut ep = handle.lock();

        let signer = FixedSigner(vec![0x99; 0x100]);
        let report = SendDa::new(0x20_0000, &image, 0)
            .run(&mut ep, Some(&signer))
            .unwrap();
        assert_eq!(report.outcome, SendDaOutcome::Accepted);

        let written = io.written();
        // Challenge request and signature delivery are on the wire
        assert!(written.contains(&opcode::SLA_CHALLENGE));
        assert!(written.contains(&opcode::SLA_RESPONSE));
    }

    #[test]
    fn sla_without_authenticator_fails() {
        let body = [0x00u8; 4];
        let image = image(&body, 0);

        let io = ScriptedIo::new();
        io.queue(&[opcode::SEND_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&4u32.to_be_bytes());
        io.queue(&0u32.to_be_bytes());
        io.queue(&[0x1D, 0x0D]);

        let handle = io.handle();
        let mut ep = handle.lock();

        assert!(matches!(
            SendDa::new(0x20_0000, &image, 0).run(&mut ep, None),
            Err(Error::SlaRequired)
        ));
    }

    #[test]
    fn mute_dialect_streams_without_echo() {
        let body = [0x42u8; 6];
        let image = image(&body, 2);

        let io = ScriptedIo::new();
        io.queue(&[0xE7]); // not an echo: mute dialect marker
        io.queue(&[0x00, 0x00]);
        io.queue(&checksum::xor16(&body).to_be_bytes());
        io.queue(&[0x00, 0x00]);

        let handle = io.handle();
        let mut ep = handle.lock();

        let report = SendDa::new(0x4000_0000, &image, 2).run(&mut ep, None).unwrap();
        assert_eq!(report.variant, ProtocolVariant::Mute);
        assert_eq!(report.outcome, SendDaOutcome::Accepted);

        let written = io.written();
        // opcode, three raw parameters, then the body
        assert_eq!(written[0], opcode::SEND_DA);
        assert_eq!(&written[1..5], &0x4000_0000u32.to_be_bytes());
        assert!(written.ends_with(&body));
    }

    #[test]
    fn jump_da_verifies_address_word() {
        let io = ScriptedIo::new();
        io.queue(&[opcode::JUMP_DA]);
        io.queue(&0x20_0000u32.to_be_bytes());
        io.queue(&[0x00, 0x00]);

        let handle = io.handle();
        let mut ep = handle.lock();
        JumpDa::new(0x20_0000).run(&mut ep).unwrap();
    }

    #[test]
    fn jump_da_address_mismatch_is_fatal() {
        let io = ScriptedIo::new();
        io.queue(&[opcode::JUMP_DA]);
        io.queue(&0xFFFF_FFFFu32.to_be_bytes());

        let handle = io.handle();
        let mut ep = handle.lock();
        assert!(matches!(
            JumpDa::new(0x20_0000).run(&mut ep),
            Err(Error::EchoMismatch { .. })
        ));
    }
}
