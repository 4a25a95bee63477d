use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// More than one device in download mode is connected
    #[error("Please disconnect other devices in download mode")]
    MoreThanOneDevice,

    /// The DAA-protected device dropped off the bus after SEND_DA
    #[error("Target is DAA-protected; reconnect the device and retry with a signed DA")]
    ReconnectRequired,

    /// dl-brom error
    #[error("BROM error: {0}")]
    Brom(#[from] dl_brom::err::Error),

    /// dl-parser error
    #[error("DA archive error: {0}")]
    Parser(#[from] dl_parser::err::Error),

    /// dl-patcher error
    #[error("Patch error: {0}")]
    Patcher(#[from] dl_patcher::err::Error),

    /// dl-xflash error
    #[error("DA protocol error: {0}")]
    Xflash(#[from] dl_xflash::err::Error),

    /// dl-fastboot error
    #[error("Fastboot error: {0}")]
    Fastboot(#[from] dl_fastboot::err::Error),

    /// Transport error
    #[error("Transport error: {0}")]
    Port(#[from] dl_port::err::Error),

    /// serialport crate error
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}
