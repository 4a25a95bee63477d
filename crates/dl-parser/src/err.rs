use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    #[error("Unknown DA archive format")]
    UnknownFormat,

    #[error("Invalid magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    #[error("Invalid entry count: {0}")]
    InvalidEntryCount(u32),

    #[error("Archive truncated: {what} needs {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("No DA entry for hw_code {0:#06x}")]
    NoEntryForChip(u16),

    #[error("Region smaller than its signature ({len} < {sig_len})")]
    RegionTooSmall { len: usize, sig_len: u32 },

    #[error("Bincode decode error: {0}")]
    Bincode(#[from] bincode::error::DecodeError),

    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}
