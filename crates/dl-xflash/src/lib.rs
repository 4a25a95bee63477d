//! XFlash-family DA clients over the framed packet protocol: the XML
//! dialect and the packed 24-bit binary dialect.

use crate::err::Error;

pub mod binary;
pub mod client;
pub mod err;
pub mod frame;
pub mod pt;
pub mod status;
pub mod xml;

pub use binary::{ChecksumLevel, StorageType, XFlashClient};
pub use client::{Carbonara, XmlDaClient};
pub use pt::PartitionInfo;

pub type Result<T> = core::result::Result<T, Error>;

/// XFlash command words, little-endian on the wire.
pub mod cmd {
    pub const DOWNLOAD: u32 = 0x01_0001;
    pub const UPLOAD: u32 = 0x01_0002;
    pub const FORMAT: u32 = 0x01_0003;
    pub const WRITE_DATA: u32 = 0x01_0004;
    pub const READ_DATA: u32 = 0x01_0005;
    pub const FORMAT_PARTITION: u32 = 0x01_0006;
    pub const SHUTDOWN: u32 = 0x01_0007;
    pub const BOOT_TO: u32 = 0x01_0008;
    pub const DEVICE_CTRL: u32 = 0x01_0009;
}

/// DEVICE_CTRL sub-commands.
pub mod ctrl {
    pub const SET_CHECKSUM_LEVEL: u32 = 0x02_0003;
    pub const GET_EMMC_INFO: u32 = 0x04_0001;
    pub const GET_NAND_INFO: u32 = 0x04_0002;
    pub const GET_UFS_INFO: u32 = 0x04_0004;
    pub const GET_PACKET_LENGTH: u32 = 0x04_0007;
}

/// Byte-level progress reporting for long transfers.
pub trait ProgressSink {
    fn progress(&self, stage: &str, bytes_done: u64, bytes_total: u64);
}

/// Sink for callers that do not care.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn progress(&self, _stage: &str, _bytes_done: u64, _bytes_total: u64) {}
}
