//! Compile-time defaults for the serial link.

use std::time::Duration;

/// Default baud rate for MediaTek BROM/Preloader/DA links.
pub const MTK_BAUD: u32 = 921_600;

/// Baud rate used when the device is in Meta mode.
pub const META_BAUD: u32 = 115_200;

/// Read polling slice; cancellation is honoured at every slice.
pub const POLL_SLICE: Duration = Duration::from_millis(10);

/// Default command round-trip budget.
pub const CMD_TIMEOUT: Duration = Duration::from_secs(5);

/// Total handshake budget.
pub const HANDSHAKE_BUDGET: Duration = Duration::from_secs(30);

/// Final-status wait after a DA body upload.
pub const UPLOAD_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-chunk ACK window during negotiated DA2 download.
pub const CHUNK_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum read/write buffer size requested from the driver.
pub const IO_BUFFER: usize = 64 * 1024;

/// Buffered byte channel hint per direction.
pub const CHANNEL_HINT: usize = 16 * 1024 * 1024;
