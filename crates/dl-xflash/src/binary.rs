//! XFlash binary client: same frame shape as the XML DA, but the
//! command set is packed 24-bit words with numeric statuses.

use std::time::Duration;

use bincode::Encode;
use dl_port::{DeviceHandle, Endpoint, checksum, config};

use crate::{
    ProgressSink, Result, cmd, ctrl,
    err::Error,
    frame::{self, DataType, Frame, SAFE_PAYLOAD_CAP},
    status::XflashStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChecksumLevel {
    None = 0,
    Crc32 = 1,
    Md5 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Emmc,
    Ufs,
    Nand,
}

impl StorageType {
    #[must_use]
    fn as_wire(self) -> u32 {
        match self {
            Self::Emmc => 1,
            Self::Ufs => 3,
            Self::Nand => 4,
        }
    }
}

/// Read/write parameter block, little-endian on the wire.
#[derive(Encode)]
struct RwParams {
    part_type: u32,
    offset: u64,
    size: u64,
    storage_type: u32,
}

impl RwParams {
    fn to_wire(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding();
        Ok(bincode::encode_to_vec(self, config)?)
    }
}

pub struct XFlashClient {
    handle: DeviceHandle,
    timeout: Duration,
    max_payload: u32,
    checksum_level: ChecksumLevel,
    packet_length: u32,
    storage: Option<StorageType>,
}

impl XFlashClient {
    #[must_use]
    pub fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            timeout: config::CMD_TIMEOUT,
            max_payload: SAFE_PAYLOAD_CAP,
            checksum_level: ChecksumLevel::None,
            packet_length: 0x1000,
            storage: None,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    #[must_use]
    pub fn storage(&self) -> Option<StorageType> {
        self.storage
    }

    #[must_use]
    pub fn packet_length(&self) -> u32 {
        self.packet_length
    }

    /// At level 1 every flow frame is followed by a CRC32 of its
    /// payload, both directions.
    fn send_flow(&self, ep: &mut Endpoint, payload: &[u8]) -> Result<()> {
        frame::send_frame(ep, DataType::ProtocolFlow, payload)?;
        if self.checksum_level == ChecksumLevel::Crc32 {
            ep.write_all(&checksum::crc32(payload).to_le_bytes())?;
        }
        Ok(())
    }

    fn recv_flow(&self, ep: &mut Endpoint) -> Result<Frame> {
        let frame = frame::recv_frame(ep, self.timeout, self.max_payload)?;
        if self.checksum_level == ChecksumLevel::Crc32 {
            let mut trailer = [0u8; 4];
            ep.read_exact("frame crc", &mut trailer, self.timeout)?;
            let device = u32::from_le_bytes(trailer);
            let host = checksum::crc32(&frame.payload);
            if device != host {
                return Err(Error::ChecksumMismatch { host, device });
            }
        }
        Ok(frame)
    }

    fn expect_status(&self, ep: &mut Endpoint, op: &'static str) -> Result<()> {
        let frame = self.recv_flow(ep)?;
        let status = XflashStatus::from_payload(&frame.payload)?;
        if status.is_ok() {
            Ok(())
        } else {
            Err(Error::Status { op, status })
        }
    }

    /// DEVICE_CTRL getter: command word, sub-command, data frame,
    /// final status.
    fn device_ctrl_get(&self, code: u32, op: &'static str) -> Result<Vec<u8>> {
        let mut ep = self.handle.lock();
        self.send_flow(&mut ep, &cmd::DEVICE_CTRL.to_le_bytes())?;
        self.expect_status(&mut ep, op)?;
        self.send_flow(&mut ep, &code.to_le_bytes())?;
        self.expect_status(&mut ep, op)?;
        let data = self.recv_flow(&mut ep)?;
        self.expect_status(&mut ep, op)?;
        Ok(data.payload)
    }

    /// DEVICE_CTRL setter: command word, sub-command, parameter, final
    /// status.
    fn device_ctrl_set(&self, code: u32, param: &[u8], op: &'static str) -> Result<()> {
        let mut ep = self.handle.lock();
        self.send_flow(&mut ep, &cmd::DEVICE_CTRL.to_le_bytes())?;
        self.expect_status(&mut ep, op)?;
        self.send_flow(&mut ep, &code.to_le_bytes())?;
        self.expect_status(&mut ep, op)?;
        self.send_flow(&mut ep, param)?;
        self.expect_status(&mut ep, op)
    }

    /// Level 0 none, 1 CRC32, 2 MD5. The trailer discipline starts
    /// with the first frame after the acknowledgement.
    pub fn set_checksum_level(&mut self, level: ChecksumLevel) -> Result<()> {
        self.device_ctrl_set(
            ctrl::SET_CHECKSUM_LEVEL,
            &(level as u32).to_le_bytes(),
            "SET_CHECKSUM_LEVEL",
        )?;
        self.checksum_level = level;
        log::debug!("checksum level set to {level:?}");
        Ok(())
    }

    /// Negotiated maximum chunk size for subsequent reads and writes.
    pub fn get_packet_length(&mut self) -> Result<u32> {
        let payload = self.device_ctrl_get(ctrl::GET_PACKET_LENGTH, "GET_PACKET_LENGTH")?;
        let length = payload
            .get(..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .filter(|len| *len > 0)
            .ok_or_else(|| Error::UnexpectedReply {
                op: "GET_PACKET_LENGTH",
                detail: format!("{}-byte reply", payload.len()),
            })?;
        self.packet_length = length;
        Ok(length)
    }

    /// Probe EMMC, UFS and NAND in turn; the first info command the DA
    /// answers with status 0 defines the storage type.
    pub fn detect_storage(&mut self) -> Result<StorageType> {
        for (code, op, storage) in [
            (ctrl::GET_EMMC_INFO, "GET_EMMC_INFO", StorageType::Emmc),
            (ctrl::GET_UFS_INFO, "GET_UFS_INFO", StorageType::Ufs),
            (ctrl::GET_NAND_INFO, "GET_NAND_INFO", StorageType::Nand),
        ] {
            match self.device_ctrl_get(code, op) {
                Ok(_) => {
                    log::info!("storage detected: {storage:?}");
                    self.storage = Some(storage);
                    return Ok(storage);
                }
                Err(Error::Status { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::UnexpectedReply {
            op: "detect_storage",
            detail: "no storage info command answered".into(),
        })
    }

    fn storage_or_err(&self, op: &'static str) -> Result<StorageType> {
        self.storage.ok_or(Error::UnexpectedReply {
            op,
            detail: "storage type not detected yet".into(),
        })
    }

    pub fn read_partition(
        &self,
        part_type: u32,
        offset: u64,
        size: u64,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        let params = RwParams {
            part_type,
            offset,
            size,
            storage_type: self.storage_or_err("READ_DATA")?.as_wire(),
        }
        .to_wire()?;

        {
            let mut ep = self.handle.lock();
            self.send_flow(&mut ep, &cmd::READ_DATA.to_le_bytes())?;
            self.expect_status(&mut ep, "READ_DATA")?;
            self.send_flow(&mut ep, &params)?;
            self.expect_status(&mut ep, "READ_DATA")?;
        }

        let mut data = Vec::with_capacity(size as usize);
        while (data.len() as u64) < size {
            let mut ep = self.handle.lock();
            let frame = self.recv_flow(&mut ep)?;
            drop(ep);
            data.extend_from_slice(&frame.payload);
            progress.progress("READ_DATA", data.len() as u64, size);
        }
        data.truncate(size as usize);

        let mut ep = self.handle.lock();
        self.expect_status(&mut ep, "READ_DATA")?;
        Ok(data)
    }

    pub fn write_partition(
        &self,
        part_type: u32,
        offset: u64,
        data: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let params = RwParams {
            part_type,
            offset,
            size: data.len() as u64,
            storage_type: self.storage_or_err("WRITE_DATA")?.as_wire(),
        }
        .to_wire()?;

        {
            let mut ep = self.handle.lock();
            self.send_flow(&mut ep, &cmd::WRITE_DATA.to_le_bytes())?;
            self.expect_status(&mut ep, "WRITE_DATA")?;
            self.send_flow(&mut ep, &params)?;
            self.expect_status(&mut ep, "WRITE_DATA")?;
        }

        let mut sent = 0u64;
        for chunk in data.chunks(self.packet_length as usize) {
            // Per-chunk status keeps the DA's buffer honest
            let mut ep = self.handle.lock();
            self.send_flow(&mut ep, chunk)?;
            self.expect_status(&mut ep, "WRITE_DATA chunk")?;
            drop(ep);
            sent += chunk.len() as u64;
            progress.progress("WRITE_DATA", sent, data.len() as u64);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullProgress;
    use dl_port::script::ScriptedIo;

    fn flow(payload: &[u8]) -> Vec<u8> {
        Frame {
            data_type: DataType::ProtocolFlow,
            payload: payload.to_vec(),
        }
        .to_wire()
    }

    fn ok_status() -> Vec<u8> {
        flow(&[0, 0, 0, 0])
    }

    fn client(io: &ScriptedIo) -> XFlashClient {
        let mut client = XFlashClient::new(io.handle());
        client.set_timeout(Duration::from_millis(100));
        client
    }

    #[test]
    fn packet_length_is_negotiated() {
        let io = ScriptedIo::new();
        io.queue(&ok_status()); // DEVICE_CTRL accepted
        io.queue(&ok_status()); // sub-command accepted
        io.queue(&flow(&0x2000u32.to_le_bytes())); // reply
        io.queue(&ok_status()); // final status

        let mut client = client(&io);
        assert_eq!(client.get_packet_length().unwrap(), 0x2000);
        assert_eq!(client.packet_length(), 0x2000);
    }

    #[test]
    fn storage_detection_falls_through_to_ufs() {
        let io = ScriptedIo::new();
        // EMMC probe: DEVICE_CTRL ok, sub-command refused
        io.queue(&ok_status());
        io.queue(&flow(&0x1D1Eu32.to_le_bytes()));
        // UFS probe: fully answered
        io.queue(&ok_status());
        io.queue(&ok_status());
        io.queue(&flow(&[0xAB; 16]));
        io.queue(&ok_status());

        let mut client = client(&io);
        assert_eq!(client.detect_storage().unwrap(), StorageType::Ufs);
        assert_eq!(client.storage(), Some(StorageType::Ufs));
    }

    #[test]
    fn crc_trailer_follows_every_flow_frame_after_level_change() {
        let io = ScriptedIo::new();
        for _ in 0..3 {
            io.queue(&ok_status());
        }

        let mut client = client(&io);
        client.set_checksum_level(ChecksumLevel::Crc32).unwrap();
        io.take_written();

        // Next frame must carry a CRC32 trailer
        io.queue(&ok_status());
        io.queue(&checksum::crc32(&[0, 0, 0, 0]).to_le_bytes());
        let payload = cmd::DEVICE_CTRL.to_le_bytes();
        {
            let handle = io.handle();
            let mut ep = handle.lock();
            client.send_flow(&mut ep, &payload).unwrap();
            client.expect_status(&mut ep, "test").unwrap();
        }

        let written = io.written();
        assert_eq!(
            &written[written.len() - 4..],
            checksum::crc32(&payload).to_le_bytes()
        );
    }

    #[test]
    fn crc_mismatch_on_receive_is_fatal() {
        let io = ScriptedIo::new();
        for _ in 0..3 {
            io.queue(&ok_status());
        }

        let mut client = client(&io);
        client.set_checksum_level(ChecksumLevel::Crc32).unwrap();

        io.queue(&ok_status());
        io.queue(&[0xDE, 0xAD, 0xBE, 0xEF]); // wrong trailer
        let handle = io.handle();
        let mut ep = handle.lock();
        assert!(matches!(
            client.recv_flow(&mut ep),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn write_partition_packs_parameters_little_endian() {
        let io = ScriptedIo::new();
        io.queue(&ok_status()); // command
        io.queue(&ok_status()); // params
        io.queue(&ok_status()); // chunk

        let mut client = client(&io);
        client.storage = Some(StorageType::Emmc);
        client
            .write_partition(8, 0x4000, &[0x77; 16], &NullProgress)
            .unwrap();

        let mut expected = Vec::new();
        expected.extend(8u32.to_le_bytes());
        expected.extend(0x4000u64.to_le_bytes());
        expected.extend(16u64.to_le_bytes());
        expected.extend(1u32.to_le_bytes()); // EMMC
        let written = io.written();
        assert!(
            written.windows(expected.len()).any(|w| w == expected),
            "packed {{part_type, offset, size, storage}} struct on the wire"
        );
    }

    #[test]
    fn read_partition_reassembles_until_satisfied() {
        let io = ScriptedIo::new();
        io.queue(&ok_status());
        io.queue(&ok_status());
        io.queue(&flow(&[0x10; 8]));
        io.queue(&flow(&[0x20; 8]));
        io.queue(&ok_status());

        let mut client = client(&io);
        client.storage = Some(StorageType::Emmc);
        let data = client.read_partition(8, 0, 16, &NullProgress).unwrap();
        assert_eq!(&data[..8], &[0x10; 8]);
        assert_eq!(&data[8..], &[0x20; 8]);
    }

    #[test]
    fn operations_require_detected_storage() {
        let io = ScriptedIo::new();
        let client = client(&io);
        assert!(matches!(
            client.read_partition(8, 0, 16, &NullProgress),
            Err(Error::UnexpectedReply { op: "READ_DATA", .. })
        ));
    }
}
