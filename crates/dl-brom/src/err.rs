use thiserror::Error as TError;

use crate::status::BromStatus;

#[derive(Debug, TError)]
pub enum Error {
    /// No 0x5F reply after the retry budget
    #[error("Handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    /// The device returned invalid data when echoing bytes back
    #[error("Echo mismatch! Expected {expected:#x}, got {got:#x}")]
    EchoMismatch { expected: u32, got: u32 },

    /// The device replied with a non-zero status
    #[error("{op} failed with status {status}")]
    Status { op: &'static str, status: BromStatus },

    /// `send_da` parameters rejected outright (status > 0xFF)
    #[error("send_da rejected with status {0:#06x}")]
    SendDaRejected(u16),

    /// The preloader enforces DAA and wants a signed DA (0x0010/0x0011)
    #[error("Preloader requires a signed DA (status {0:#06x})")]
    PreloaderAuthRequired(u16),

    /// The device demanded SLA and no authenticator is available
    #[error("Device requires SLA authentication and no authenticator was supplied")]
    SlaRequired,

    /// The SLA signature was not accepted
    #[error("SLA authentication rejected (status {0:#06x})")]
    SlaRejected(u16),

    /// A chunk or trailer of an upload went wrong
    #[error("Upload failed during {stage}: {detail}")]
    UploadFailed {
        stage: &'static str,
        detail: String,
    },

    /// A length field fell outside its published bound
    #[error("{op}: implausible length {len}")]
    BadLength { op: &'static str, len: u32 },

    /// The hardware code is not in the chip database
    #[error("Unsupported SoC {0:#06x}")]
    UnsupportedSoC(u16),

    /// Transport error
    #[error("Transport error: {0}")]
    Port(#[from] dl_port::err::Error),

    /// Any other error
    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}

impl Error {
    /// Caller-initiated cancellation, as opposed to a device failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Port(dl_port::err::Error::Cancelled))
    }
}
