use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// The bootloader answered `FAIL`
    #[error("Device replied FAIL to `{command}`: {message}")]
    Fail { command: String, message: String },

    /// No terminal reply within the command budget
    #[error("No reply to `{command}` within the budget")]
    Timeout { command: String },

    /// Reply prefix was not one of OKAY/FAIL/DATA/INFO
    #[error("Unexpected reply prefix {prefix:?} to `{command}`")]
    UnexpectedReply { command: String, prefix: String },

    /// The device offered a smaller staging buffer than requested
    #[error("Device offered {offered:#x} bytes for a {requested:#x}-byte download")]
    DownloadRejected { offered: u32, requested: usize },

    /// An OEM reply line defeated the vendor recognisers
    #[error("Unparseable OEM reply line: {line:?}")]
    VendorParse { line: String },

    /// Transport error
    #[error("Transport error: {0}")]
    Port(#[from] dl_port::err::Error),
}
