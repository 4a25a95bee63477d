//! The 12-byte framed packet protocol shared by the XML DA and the
//! XFlash binary DA.

use std::time::Duration;

use dl_port::Endpoint;

use crate::{Result, err::Error};

pub const MAGIC: u32 = 0xFEEE_EEEF;

/// Payload cap applied to frames from unknown sources.
pub const SAFE_PAYLOAD_CAP: u32 = 65_536;

/// How many garbage bytes a resync will scan before giving up.
const RESYNC_WINDOW: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DataType {
    /// Command XML or textual ACK
    ProtocolFlow = 1,
    /// Raw payload or device-originated message
    Message = 2,
}

impl DataType {
    fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::ProtocolFlow),
            2 => Some(Self::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data_type: DataType,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Payload as text, trailing NULs and whitespace stripped.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload)
            .trim_end_matches(['\0', ' ', '\r', '\n'])
            .to_string()
    }

    /// Serialised wire form: header plus payload.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(12 + self.payload.len());
        wire.extend(MAGIC.to_le_bytes());
        wire.extend((self.data_type as u32).to_le_bytes());
        wire.extend((self.payload.len() as u32).to_le_bytes());
        wire.extend(&self.payload);
        wire
    }
}

/// Emit one frame. The caller holds the endpoint lock, which makes the
/// header and payload atomic on the wire.
pub fn send_frame(ep: &mut Endpoint, data_type: DataType, payload: &[u8]) -> Result<()> {
    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&(data_type as u32).to_le_bytes());
    header[8..12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    ep.write_all(&header)?;
    ep.write_all(payload)?;
    Ok(())
}

/// Read one frame, resynchronising on a lost magic.
pub fn recv_frame(ep: &mut Endpoint, timeout: Duration, cap: u32) -> Result<Frame> {
    let mut header = [0u8; 12];
    ep.read_exact("frame header", &mut header, timeout)?;

    if header[0..4] != MAGIC.to_le_bytes() {
        header = resync(ep, header, timeout)?;
    }

    let data_type = u32::from_le_bytes(header[4..8].try_into().unwrap_or_default());
    let length = u32::from_le_bytes(header[8..12].try_into().unwrap_or_default());

    let data_type = DataType::from_wire(data_type).ok_or_else(|| Error::UnexpectedReply {
        op: "frame header",
        detail: format!("data_type {data_type:#x}"),
    })?;

    if length > cap {
        return Err(Error::OversizedFrame { len: length, cap });
    }

    let mut payload = vec![0u8; length as usize];
    ep.read_exact("frame payload", &mut payload, timeout)?;

    Ok(Frame { data_type, payload })
}

/// Scan up to [`RESYNC_WINDOW`] bytes for the magic, then re-read the
/// rest of the header once.
fn resync(ep: &mut Endpoint, first: [u8; 12], timeout: Duration) -> Result<[u8; 12]> {
    log::warn!("frame magic lost, resynchronising");

    let magic = MAGIC.to_le_bytes();
    let mut window = first.to_vec();
    let mut scanned = 0usize;

    loop {
        if let Some(position) = window.windows(4).position(|w| w == magic) {
            let mut header = [0u8; 12];
            let have = (window.len() - position).min(12);
            header[..have].copy_from_slice(&window[position..position + have]);
            if have < 12 {
                ep.read_exact("frame resync", &mut header[have..], timeout)?;
            }
            log::debug!("frame resynchronised after {scanned} garbage bytes");
            return Ok(header);
        }

        if scanned >= RESYNC_WINDOW {
            return Err(Error::ProtocolDesync);
        }

        let mut byte = [0u8; 1];
        ep.read_exact("frame resync", &mut byte, timeout)?;
        window.push(byte[0]);
        scanned += 1;
    }
}
