//! XML DA client: the flow ack loop, the BOOT_TO primitive with the
//! two-step runtime DA2-auth bypass on top of it, the negotiated DA2
//! download, and the XML partition command set.

use std::{thread::sleep, time::Duration};

use dl_brom::{BromSession, SlaAuthenticator};
use dl_port::{DeviceHandle, Endpoint, config};

use crate::{
    ProgressSink, Result, cmd,
    err::Error,
    frame::{self, DataType, Frame, SAFE_PAYLOAD_CAP},
    pt::{self, PartitionInfo},
    status::XflashStatus,
    xml,
};

/// Settle time after writing the DA1-resident digest.
const HASH_SETTLE: Duration = Duration::from_millis(30);
/// Settle time after shipping the DA2 image.
const DA2_SETTLE: Duration = Duration::from_millis(100);

/// Retransmissions allowed per DA2 chunk on a missing ACK.
const MAX_RETRANSMIT: usize = 3;

/// Parameters of the two-step runtime DA2-auth bypass.
pub struct Carbonara<'a> {
    pub da1_load_addr: u64,
    pub hash_offset: u64,
    pub new_hash: &'a [u8],
    pub da2_load_addr: u64,
    pub patched_da2: &'a [u8],
}

pub struct XmlDaClient {
    handle: DeviceHandle,
    timeout: Duration,
    ack_timeout: Duration,
    max_payload: u32,
}

impl XmlDaClient {
    #[must_use]
    pub fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            timeout: config::CMD_TIMEOUT,
            ack_timeout: config::CHUNK_ACK_TIMEOUT,
            max_payload: SAFE_PAYLOAD_CAP,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_ack_timeout(&mut self, timeout: Duration) {
        self.ack_timeout = timeout;
    }

    /// Opt into payloads above the 64 KiB safety bound.
    pub fn allow_large_payloads(&mut self, cap: u32) {
        self.max_payload = cap;
    }

    fn recv(&self, ep: &mut Endpoint) -> Result<Frame> {
        frame::recv_frame(ep, self.timeout, self.max_payload)
    }

    fn ack(&self, ep: &mut Endpoint) -> Result<()> {
        frame::send_frame(ep, DataType::ProtocolFlow, b"OK\0")
    }

    pub fn send_xml(&self, doc: &str) -> Result<()> {
        let mut ep = self.handle.lock();
        frame::send_frame(&mut ep, DataType::ProtocolFlow, doc.as_bytes())
    }

    pub fn send_ack(&self) -> Result<()> {
        let mut ep = self.handle.lock();
        self.ack(&mut ep)
    }

    pub fn send_ack_value(&self, value: u64) -> Result<()> {
        let mut ep = self.handle.lock();
        let text = format!("OK@{value:#x}\0");
        frame::send_frame(&mut ep, DataType::ProtocolFlow, text.as_bytes())
    }

    /// Framed exactly like control frames; the DA tells them apart by
    /// conversation context.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut ep = self.handle.lock();
        frame::send_frame(&mut ep, DataType::ProtocolFlow, bytes)
    }

    /// Numeric status frame; tolerates the 2/4/longer payload forms.
    fn read_status(&self, ep: &mut Endpoint) -> Result<XflashStatus> {
        let frame = self.recv(ep)?;
        XflashStatus::from_payload(&frame.payload)
    }

    fn expect_status_ok(&self, ep: &mut Endpoint, op: &'static str) -> Result<()> {
        let status = self.read_status(ep)?;
        if status.is_ok() {
            Ok(())
        } else {
            Err(Error::Status { op, status })
        }
    }

    /// READY/OK gate before a data phase; numeric zero counts too.
    fn gate(&self, ep: &mut Endpoint, op: &'static str) -> Result<()> {
        let frame = self.recv(ep)?;
        let text = frame.text();
        if text.starts_with("OK") || text.starts_with("READY") {
            return Ok(());
        }
        match XflashStatus::from_payload(&frame.payload) {
            Ok(status) if status.is_ok() => Ok(()),
            Ok(status) => Err(Error::Status { op, status }),
            Err(_) => Err(Error::UnexpectedReply { op, detail: text }),
        }
    }

    /// Wait for the DA to introduce itself after JUMP_DA and answer it.
    pub fn wait_ready(&self) -> Result<()> {
        let mut ep = self.handle.lock();
        loop {
            let frame = self.recv(&mut ep)?;
            let text = frame.text();
            if text.contains("CMD:START") || text.to_ascii_lowercase().contains("ready") {
                self.ack(&mut ep)?;
                log::info!("DA session open");
                return Ok(());
            }
            log::debug!("pre-ready chatter: {text}");
        }
    }

    /// Ack START/PROGRESS-REPORT chatter until `marker` arrives, then
    /// ack that too.
    fn ack_flow_until(&self, ep: &mut Endpoint, marker: &str, op: &'static str) -> Result<()> {
        loop {
            let frame = self.recv(ep)?;
            let text = frame.text();
            if text.contains(marker) {
                self.ack(ep)?;
                return Ok(());
            }
            if text.contains("CMD:START") || text.contains("CMD:PROGRESS-REPORT") || text.starts_with("OK") {
                if !text.starts_with("OK") {
                    self.ack(ep)?;
                }
                continue;
            }
            return Err(Error::UnexpectedReply { op, detail: text });
        }
    }

    pub fn set_runtime_parameter(&self, name: &str, value: &str) -> Result<()> {
        self.send_xml(&xml::command(
            "CMD:SET-RUNTIME-PARAMETER",
            &[(name, value.to_string())],
        ))?;
        let mut ep = self.handle.lock();
        self.gate(&mut ep, "CMD:SET-RUNTIME-PARAMETER")
    }

    /// Write-anywhere primitive while a DA is resident: command word,
    /// status, 16-byte `(addr, len)` parameter frame, the data as one
    /// frame, then a settle wait and the final status (`0` or `SYNC`).
    pub fn boot_to(&self, addr: u64, data: &[u8], settle: Duration) -> Result<()> {
        let mut ep = self.handle.lock();

        frame::send_frame(&mut ep, DataType::ProtocolFlow, &cmd::BOOT_TO.to_le_bytes())?;
        self.expect_status_ok(&mut ep, "BOOT_TO")?;

        let mut param = [0u8; 16];
        param[..8].copy_from_slice(&addr.to_le_bytes());
        param[8..].copy_from_slice(&(data.len() as u64).to_le_bytes());
        frame::send_frame(&mut ep, DataType::ProtocolFlow, &param)?;

        // One frame; the DA chunks it internally
        frame::send_frame(&mut ep, DataType::ProtocolFlow, data)?;

        sleep(settle);
        self.expect_status_ok(&mut ep, "BOOT_TO final")
    }

    /// Two back-to-back BOOT_TO calls: refresh DA1's embedded DA2
    /// digest in place, then ship the patched DA2 before DA1 validates
    /// it. Runs the XML SLA flow afterwards when the target enforces
    /// SLA.
    pub fn execute_carbonara(
        &self,
        session: &mut BromSession,
        params: &Carbonara<'_>,
        auth: Option<&dyn SlaAuthenticator>,
    ) -> Result<()> {
        let hash_addr = params.da1_load_addr + params.hash_offset;
        log::info!(
            "carbonara: digest to {hash_addr:#x}, {} byte DA2 to {:#x}",
            params.patched_da2.len(),
            params.da2_load_addr
        );

        self.boot_to(hash_addr, params.new_hash, HASH_SETTLE)?;
        self.boot_to(params.da2_load_addr, params.patched_da2, DA2_SETTLE)?;

        if session.target_config().sla() {
            match auth {
                Some(auth) => self.sla_authenticate(auth)?,
                None => return Err(Error::SlaRejected("no authenticator available".into())),
            }
        }

        session.mark_da2_loaded();
        Ok(())
    }

    /// Challenge/response over XML: `CMD:SLA-CHALLENGE` yields hex
    /// challenge bytes, `CMD:SLA-AUTH` delivers the hex signature.
    pub fn sla_authenticate(&self, auth: &dyn SlaAuthenticator) -> Result<()> {
        let mut ep = self.handle.lock();

        frame::send_frame(
            &mut ep,
            DataType::ProtocolFlow,
            xml::command("CMD:SLA-CHALLENGE", &[]).as_bytes(),
        )?;

        let reply = self.recv(&mut ep)?;
        let text = reply.text();
        let challenge_hex = xml::extract_tag(&text, "challenge").unwrap_or_else(|| text.clone());
        let challenge = hex::decode(challenge_hex.trim()).map_err(|e| Error::UnexpectedReply {
            op: "CMD:SLA-CHALLENGE",
            detail: format!("{text:?}: {e}"),
        })?;

        let signature = auth.sign(&challenge)?;
        frame::send_frame(
            &mut ep,
            DataType::ProtocolFlow,
            xml::command("CMD:SLA-AUTH", &[("signature", hex::encode(signature))]).as_bytes(),
        )?;

        let verdict = self.recv(&mut ep)?;
        let text = verdict.text();
        if text.starts_with("OK")
            || XflashStatus::from_payload(&verdict.payload).is_ok_and(XflashStatus::is_ok)
        {
            Ok(())
        } else {
            Err(Error::SlaRejected(text))
        }
    }

    /// DA1-driven DA2 upload: wait for `CMD:DOWNLOAD-FILE`, declare the
    /// total size, then stream `packet_length`-sized frames, each
    /// acknowledged within the ACK window or retransmitted.
    pub fn download_da2(&self, session: &mut BromSession, da2: &[u8]) -> Result<()> {
        let packet_length = {
            let mut ep = self.handle.lock();
            loop {
                let frame = self.recv(&mut ep)?;
                let text = frame.text();
                if text.contains("CMD:DOWNLOAD-FILE") {
                    let length = xml::extract_tag(&text, "packet_length")
                        .and_then(|t| xml::parse_hex(&t))
                        .ok_or_else(|| Error::UnexpectedReply {
                            op: "CMD:DOWNLOAD-FILE",
                            detail: text.clone(),
                        })?;
                    self.ack(&mut ep)?;

                    let declaration = format!("OK@{} ", da2.len());
                    frame::send_frame(&mut ep, DataType::ProtocolFlow, declaration.as_bytes())?;
                    break length as usize;
                } else if text.contains("CMD:START") || text.contains("CMD:PROGRESS-REPORT") {
                    self.ack(&mut ep)?;
                } else {
                    return Err(Error::UnexpectedReply {
                        op: "DA2 negotiation",
                        detail: text,
                    });
                }
            }
        };

        if packet_length == 0 {
            return Err(Error::UnexpectedReply {
                op: "CMD:DOWNLOAD-FILE",
                detail: "zero packet_length".into(),
            });
        }

        for (index, chunk) in da2.chunks(packet_length).enumerate() {
            let mut delivered = false;
            for attempt in 0..=MAX_RETRANSMIT {
                // Lock per chunk to keep cancellation latency bounded
                let mut ep = self.handle.lock();
                frame::send_frame(&mut ep, DataType::ProtocolFlow, chunk)?;

                match frame::recv_frame(&mut ep, self.ack_timeout, self.max_payload) {
                    Ok(frame) if frame.text().starts_with("OK") => {
                        delivered = true;
                        break;
                    }
                    Ok(frame) => {
                        return Err(Error::UnexpectedReply {
                            op: "DA2 chunk ack",
                            detail: frame.text(),
                        });
                    }
                    Err(e) if e.is_timeout() => {
                        log::warn!("DA2 chunk {index}: no ACK on attempt {attempt}, retransmitting");
                    }
                    Err(e) => return Err(e),
                }
            }
            if !delivered {
                return Err(Error::UploadFailed {
                    stage: "da2 chunk",
                    detail: format!("chunk {index} unacknowledged after {MAX_RETRANSMIT} retransmissions"),
                });
            }
        }

        let mut ep = self.handle.lock();
        self.ack_flow_until(&mut ep, "CMD:END", "DA2 completion")?;
        drop(ep);

        session.mark_da2_loaded();
        Ok(())
    }

    pub fn get_partition_table(&self) -> Result<Vec<PartitionInfo>> {
        self.send_xml(&xml::command("CMD:GET-PT", &[]))?;
        let mut ep = self.handle.lock();
        self.gate(&mut ep, "CMD:GET-PT")?;

        let doc = self.recv(&mut ep)?;
        let table = pt::parse_table(&doc.text());

        self.gate(&mut ep, "CMD:GET-PT")?;
        Ok(table)
    }

    pub fn read_partition(
        &self,
        name: &str,
        size: u64,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        self.send_xml(&xml::command(
            "CMD:READ-PARTITION",
            &[("partition", name.to_string()), ("length", xml::hex(size))],
        ))?;
        self.read_data_phase("CMD:READ-PARTITION", size, progress)
    }

    pub fn read_flash(
        &self,
        offset: u64,
        size: u64,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        self.send_xml(&xml::command(
            "CMD:READ-FLASH",
            &[("offset", xml::hex(offset)), ("length", xml::hex(size))],
        ))?;
        self.read_data_phase("CMD:READ-FLASH", size, progress)
    }

    fn read_data_phase(
        &self,
        op: &'static str,
        size: u64,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        {
            let mut ep = self.handle.lock();
            self.gate(&mut ep, op)?;
        }

        let mut data = Vec::with_capacity(size as usize);
        while (data.len() as u64) < size {
            let mut ep = self.handle.lock();
            let frame = self.recv(&mut ep)?;
            drop(ep);
            data.extend_from_slice(&frame.payload);
            progress.progress(op, data.len() as u64, size);
        }
        data.truncate(size as usize);

        let mut ep = self.handle.lock();
        self.gate(&mut ep, op)?;
        Ok(data)
    }

    pub fn write_partition(
        &self,
        name: &str,
        data: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        self.send_xml(&xml::command(
            "CMD:WRITE-PARTITION",
            &[
                ("partition", name.to_string()),
                ("length", xml::hex(data.len() as u64)),
            ],
        ))?;
        self.write_data_phase("CMD:WRITE-PARTITION", data, progress)
    }

    pub fn write_flash(
        &self,
        offset: u64,
        data: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        self.send_xml(&xml::command(
            "CMD:WRITE-FLASH",
            &[
                ("offset", xml::hex(offset)),
                ("length", xml::hex(data.len() as u64)),
            ],
        ))?;
        self.write_data_phase("CMD:WRITE-FLASH", data, progress)
    }

    fn write_data_phase(
        &self,
        op: &'static str,
        data: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        {
            let mut ep = self.handle.lock();
            self.gate(&mut ep, op)?;
        }

        let mut sent = 0u64;
        for chunk in data.chunks(self.max_payload as usize) {
            let mut ep = self.handle.lock();
            frame::send_frame(&mut ep, DataType::ProtocolFlow, chunk)?;
            drop(ep);
            sent += chunk.len() as u64;
            progress.progress(op, sent, data.len() as u64);
        }

        let mut ep = self.handle.lock();
        self.gate(&mut ep, op)
    }

    pub fn erase_partition(&self, name: &str) -> Result<()> {
        self.simple_command("CMD:ERASE-PARTITION", &[("partition", name.to_string())])
    }

    pub fn format_partition(&self, name: &str) -> Result<()> {
        self.simple_command("CMD:FORMAT-PARTITION", &[("partition", name.to_string())])
    }

    pub fn reboot(&self) -> Result<()> {
        self.simple_command("CMD:REBOOT", &[])
    }

    pub fn shutdown(&self) -> Result<()> {
        self.simple_command("CMD:SHUTDOWN", &[])
    }

    fn simple_command(&self, cmd: &'static str, args: &[(&str, String)]) -> Result<()> {
        self.send_xml(&xml::command(cmd, args))?;
        let mut ep = self.handle.lock();
        self.gate(&mut ep, cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_port::script::ScriptedIo;

    fn flow(payload: &[u8]) -> Vec<u8> {
        Frame {
            data_type: DataType::ProtocolFlow,
            payload: payload.to_vec(),
        }
        .to_wire()
    }

    fn client(io: &ScriptedIo) -> XmlDaClient {
        let mut client = XmlDaClient::new(io.handle());
        client.set_timeout(Duration::from_millis(100));
        client
    }

    #[test]
    fn ready_handshake_acks_start() {
        let io = ScriptedIo::new();
        io.queue(&flow(b"CMD:START"));

        client(&io).wait_ready().unwrap();
        assert_eq!(io.written(), flow(b"OK\0"));
    }

    #[test]
    fn boot_to_accepts_sync_as_final_status() {
        let io = ScriptedIo::new();
        io.queue(&flow(&[0, 0, 0, 0])); // command accepted
        io.queue(&flow(b"SYNC")); // final status

        client(&io)
            .boot_to(0x20_0000, &[0xAA; 8], Duration::from_millis(1))
            .unwrap();
    }

    #[test]
    fn boot_to_tolerates_two_byte_status() {
        let io = ScriptedIo::new();
        io.queue(&flow(&[0, 0])); // short-form status
        io.queue(&flow(&[0, 0, 0, 0]));

        client(&io)
            .boot_to(0x20_0000, &[0xAA; 8], Duration::from_millis(1))
            .unwrap();
    }

    #[test]
    fn boot_to_nonzero_status_is_fatal() {
        let io = ScriptedIo::new();
        io.queue(&flow(&[0x01, 0x30, 0x00, 0x00]));

        assert!(matches!(
            client(&io).boot_to(0x20_0000, &[0xAA; 8], Duration::from_millis(1)),
            Err(Error::Status { op: "BOOT_TO", .. })
        ));
    }

    /// The two-step bypass puts exactly two BOOT_TO sequences on the
    /// wire: digest first, DA2 image second.
    #[test]
    fn carbonara_wire_shape_and_state() {
        let io = ScriptedIo::new();
        for _ in 0..2 {
            io.queue(&flow(&[0, 0, 0, 0])); // command accepted
            io.queue(&flow(&[0, 0, 0, 0])); // final status
        }

        let new_hash = [0xAA; 32];
        let patched_da2 = [0xBB; 128];
        let mut session = BromSession::new(ScriptedIo::new().handle());

        client(&io)
            .execute_carbonara(
                &mut session,
                &Carbonara {
                    da1_load_addr: 0x20_0000,
                    hash_offset: 0x1D0,
                    new_hash: &new_hash,
                    da2_load_addr: 0x4000_0000,
                    patched_da2: &patched_da2,
                },
                None,
            )
            .unwrap();

        let mut expected = Vec::new();
        for (addr, data) in [(0x20_01D0u64, &new_hash[..]), (0x4000_0000, &patched_da2[..])] {
            expected.extend(flow(&cmd::BOOT_TO.to_le_bytes()));
            let mut param = [0u8; 16];
            param[..8].copy_from_slice(&addr.to_le_bytes());
            param[8..].copy_from_slice(&(data.len() as u64).to_le_bytes());
            expected.extend(flow(&param));
            expected.extend(flow(data));
        }
        assert_eq!(io.written(), expected);
        assert!(session.state().is_da_2_loaded());
    }

    #[test]
    fn da2_download_negotiates_and_streams() {
        let da2 = [0xDA; 40];
        let request = xml::command(
            "CMD:DOWNLOAD-FILE",
            &[("packet_length", "0x10".to_string())],
        );

        let io = ScriptedIo::new();
        io.queue(&flow(request.as_bytes()));
        for _ in 0..3 {
            io.queue(&flow(b"OK")); // chunk ACKs: 40 bytes in 16-byte frames
        }
        io.queue(&flow(b"CMD:END"));

        let mut session = BromSession::new(ScriptedIo::new().handle());
        client(&io).download_da2(&mut session, &da2).unwrap();
        assert!(session.state().is_da_2_loaded());

        let written = io.written();
        let declaration = b"OK@40 ";
        assert!(
            written
                .windows(declaration.len())
                .any(|w| w == declaration),
            "total size must be declared in decimal"
        );
    }

    #[test]
    fn da2_chunk_without_ack_is_retransmitted_then_fatal() {
        let da2 = [0xDA; 8];
        let request = xml::command(
            "CMD:DOWNLOAD-FILE",
            &[("packet_length", "0x8".to_string())],
        );

        let io = ScriptedIo::new();
        io.queue(&flow(request.as_bytes()));
        // No ACKs at all: every send must time out

        let mut client = client(&io);
        client.set_ack_timeout(Duration::from_millis(50));
        let mut session = BromSession::new(ScriptedIo::new().handle());

        let started = std::time::Instant::now();
        let err = client.download_da2(&mut session, &da2).unwrap_err();
        assert!(matches!(err, Error::UploadFailed { stage: "da2 chunk", .. }));

        // Initial transmission plus three retransmissions
        let chunks_sent = io
            .written()
            .windows(8)
            .filter(|w| *w == [0xDA; 8])
            .count();
        assert_eq!(chunks_sent, 1 + MAX_RETRANSMIT);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn read_partition_assembles_data_frames() {
        let io = ScriptedIo::new();
        io.queue(&flow(b"READY"));
        io.queue(&flow(&[0x11; 16]));
        io.queue(&flow(&[0x22; 16]));
        io.queue(&flow(b"OK"));

        let data = client(&io)
            .read_partition("boot", 32, &crate::NullProgress)
            .unwrap();
        assert_eq!(&data[..16], &[0x11; 16]);
        assert_eq!(&data[16..], &[0x22; 16]);
    }

    #[test]
    fn write_partition_streams_then_awaits_ok() {
        let io = ScriptedIo::new();
        io.queue(&flow(b"READY"));
        io.queue(&flow(b"OK"));

        let payload = [0x42u8; 24];
        client(&io)
            .write_partition("nvram", &payload, &crate::NullProgress)
            .unwrap();

        let written = io.written();
        assert!(written.windows(24).any(|w| w == payload));
    }

    #[test]
    fn get_partition_table_parses_reply() {
        let doc = "<pt><name>boot</name><start>0x400</start><sectors>0x800</sectors><size>0x100000</size><type>raw</type></pt>";

        let io = ScriptedIo::new();
        io.queue(&flow(b"OK"));
        io.queue(&flow(doc.as_bytes()));
        io.queue(&flow(b"OK"));

        let table = client(&io).get_partition_table().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].name, "boot");
    }

    #[test]
    fn sla_flow_signs_the_hex_challenge() {
        struct Recorder;
        impl SlaAuthenticator for Recorder {
            fn sign(
                &self,
                challenge: &[u8],
            ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
                assert_eq!(challenge, [0xC4; 16]);
                Ok(vec![0x55; 32])
            }
        }

        let challenge_doc = format!("<da><challenge>{}</challenge></da>", hex::encode([0xC4; 16]));

        let io = ScriptedIo::new();
        io.queue(&flow(challenge_doc.as_bytes()));
        io.queue(&flow(b"OK"));

        client(&io).sla_authenticate(&Recorder).unwrap();

        let written = String::from_utf8_lossy(&io.written()).to_string();
        assert!(written.contains("CMD:SLA-CHALLENGE"));
        assert!(written.contains("CMD:SLA-AUTH"));
        assert!(written.contains(&hex::encode([0x55; 32])));
    }
}
