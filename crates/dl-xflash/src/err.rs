use thiserror::Error as TError;

use crate::status::XflashStatus;

#[derive(Debug, TError)]
pub enum Error {
    /// Frame magic lost and not recovered within the resync window
    #[error("Frame magic lost; transport unusable")]
    ProtocolDesync,

    /// Incoming payload length above the safety cap
    #[error("Frame payload of {len} bytes exceeds the cap of {cap}")]
    OversizedFrame { len: u32, cap: u32 },

    /// The DA replied with a non-zero numeric status
    #[error("{op} failed with status {status}")]
    Status {
        op: &'static str,
        status: XflashStatus,
    },

    /// A textual reply was not the expected control string
    #[error("Unexpected reply during {op}: {detail}")]
    UnexpectedReply { op: &'static str, detail: String },

    /// A chunk exhausted its retransmissions or a trailer went wrong
    #[error("Upload failed during {stage}: {detail}")]
    UploadFailed {
        stage: &'static str,
        detail: String,
    },

    /// CRC32 trailer of a flow frame did not match its payload
    #[error("Frame checksum mismatch: host {host:#010x}, device {device:#010x}")]
    ChecksumMismatch { host: u32, device: u32 },

    /// The DA rejected the SLA signature
    #[error("SLA authentication rejected: {0}")]
    SlaRejected(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Port(#[from] dl_port::err::Error),

    /// bincode crate error
    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),

    /// Any other error
    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}

impl Error {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Port(dl_port::err::Error::Timeout { .. }))
    }
}
