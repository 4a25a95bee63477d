use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// Wall-clock budget for `op` elapsed before all bytes arrived
    #[error("Timed out during {op}: wanted {wanted} bytes, got {got}")]
    Timeout {
        op: &'static str,
        wanted: usize,
        got: usize,
    },

    /// Caller-initiated abort through the cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// `serialport` crate error
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}
