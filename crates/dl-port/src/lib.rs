//! Shared serial transport for the flashing protocol clients.
//!
//! One [`DeviceHandle`] owns the endpoint and its mutex; every protocol
//! client borrows the handle by shared ownership and locks it around each
//! compound write-then-read sequence whose atomicity matters.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

pub use serialport::ClearBuffer;
use serialport::SerialPort;

use crate::{cancel::CancelToken, err::Error};

pub mod cancel;
pub mod checksum;
pub mod config;
pub mod err;
#[cfg(any(test, feature = "script"))]
pub mod script;

pub type Result<T> = core::result::Result<T, Error>;

/// Byte-level endpoint the transport drives.
///
/// Implemented by [`SerialEndpoint`] for real hardware and by the scripted
/// endpoint protocol tests replay conversations through.
pub trait SerialIo: Send {
    /// Write the whole buffer.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`, waiting at most one poll
    /// slice. Returns 0 when the slice elapsed without data.
    fn read_avail(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Bytes currently queued in the receive direction.
    fn bytes_to_read(&mut self) -> Result<u32>;

    /// Drop buffered data in the given direction.
    fn clear(&mut self, buffer: ClearBuffer) -> Result<()>;

    /// Drain the transmit queue to the device.
    fn flush(&mut self) -> Result<()>;
}

/// Real serial endpoint: 8N1, DTR and RTS asserted.
pub struct SerialEndpoint {
    port: Box<dyn SerialPort>,
}

impl SerialEndpoint {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let mut port = serialport::new(path, baud)
            .timeout(config::POLL_SLICE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        port.write_data_terminal_ready(true)?;
        port.write_request_to_send(true)?;

        Ok(Self { port })
    }
}

impl SerialIo for SerialEndpoint {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        std::io::Write::write_all(&mut self.port, data)?;
        Ok(())
    }

    fn read_avail(&mut self, buf: &mut [u8]) -> Result<usize> {
        match std::io::Read::read(&mut self.port, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn clear(&mut self, buffer: ClearBuffer) -> Result<()> {
        Ok(self.port.clear(buffer)?)
    }

    fn flush(&mut self) -> Result<()> {
        std::io::Write::flush(&mut self.port)?;
        Ok(())
    }
}

pub trait FromBytes<const N: usize> {
    fn from_be(bytes: [u8; N]) -> Self;
    fn from_le(bytes: [u8; N]) -> Self;
}

pub trait ToBytes<const N: usize> {
    fn to_be(&self) -> [u8; N];
    fn to_le(&self) -> [u8; N];
}

macro_rules! impl_bytes {
    ($ty:ty, $n:literal) => {
        impl FromBytes<$n> for $ty {
            fn from_be(bytes: [u8; $n]) -> Self {
                Self::from_be_bytes(bytes)
            }

            fn from_le(bytes: [u8; $n]) -> Self {
                Self::from_le_bytes(bytes)
            }
        }

        impl ToBytes<$n> for $ty {
            fn to_be(&self) -> [u8; $n] {
                self.to_be_bytes()
            }

            fn to_le(&self) -> [u8; $n] {
                self.to_le_bytes()
            }
        }
    };
}

impl_bytes!(u8, 1);
impl_bytes!(u16, 2);
impl_bytes!(u32, 4);
impl_bytes!(u64, 8);

/// Locked view of the endpoint with deadline-bounded reads.
pub struct Endpoint {
    io: Box<dyn SerialIo>,
    cancel: CancelToken,
    timeout: Duration,
}

impl Endpoint {
    fn new(io: Box<dyn SerialIo>, cancel: CancelToken) -> Self {
        Self {
            io,
            cancel,
            timeout: config::CMD_TIMEOUT,
        }
    }

    /// Default per-read budget used by the `SimpleRead` helpers.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fill `buf`, polling in slices of at most
    /// [`config::POLL_SLICE`]. Cancellation is honoured at every slice.
    pub fn read_exact(
        &mut self,
        op: &'static str,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut got = 0;

        while got < buf.len() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let n = self.io.read_avail(&mut buf[got..])?;
            got += n;

            if got < buf.len() && n == 0 && Instant::now() >= deadline {
                return Err(Error::Timeout {
                    op,
                    wanted: buf.len(),
                    got,
                });
            }
        }

        Ok(())
    }

    /// Read whatever is available within one poll slice; 0 means the
    /// slice elapsed without data.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.io.read_avail(buf)
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.io.write_all(data)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.io.flush()
    }

    pub fn bytes_to_read(&mut self) -> Result<u32> {
        self.io.bytes_to_read()
    }

    pub fn discard_in(&mut self) -> Result<()> {
        self.io.clear(ClearBuffer::Input)
    }

    pub fn discard_out(&mut self) -> Result<()> {
        self.io.clear(ClearBuffer::Output)
    }

    pub fn discard_all(&mut self) -> Result<()> {
        self.io.clear(ClearBuffer::All)
    }

    /// Read and drop everything currently queued.
    pub fn drain(&mut self) -> Result<usize> {
        let mut buf = [0u8; 64];
        let mut drained = 0;
        while self.io.bytes_to_read()? > 0 {
            drained += self.io.read_avail(&mut buf)?;
        }
        Ok(drained)
    }
}

pub trait SimpleRead {
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    fn simple_read_be<T: FromBytes<N>, const N: usize>(&mut self) -> Result<T> {
        let mut bytes = [0; N];
        self.read(&mut bytes)?;
        Ok(T::from_be(bytes))
    }

    fn simple_read_le<T: FromBytes<N>, const N: usize>(&mut self) -> Result<T> {
        let mut bytes = [0; N];
        self.read(&mut bytes)?;
        Ok(T::from_le(bytes))
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.simple_read_be()
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        self.simple_read_be()
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        self.simple_read_be()
    }

    fn read_u16_le(&mut self) -> Result<u16> {
        self.simple_read_le()
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        self.simple_read_le()
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        self.simple_read_le()
    }
}

pub trait SimpleWrite {
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn simple_write_be<T: ToBytes<N>, const N: usize>(&mut self, value: T) -> Result<()> {
        Self::write(self, &value.to_be())
    }

    fn simple_write_le<T: ToBytes<N>, const N: usize>(&mut self, value: T) -> Result<()> {
        Self::write(self, &value.to_le())
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.simple_write_be(value)
    }

    fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.simple_write_be(value)
    }

    fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.simple_write_be(value)
    }

    fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.simple_write_le(value)
    }

    fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.simple_write_le(value)
    }

    fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.simple_write_le(value)
    }
}

impl SimpleRead for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let timeout = self.timeout;
        self.read_exact("read", buf, timeout)
    }
}

impl SimpleWrite for Endpoint {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.write_all(buf)
    }
}

/// Exclusive owner of one open serial endpoint.
///
/// Cloning shares the endpoint; only the internal mutex serialises I/O.
#[derive(Clone)]
pub struct DeviceHandle {
    endpoint: Arc<Mutex<Endpoint>>,
    cancel: CancelToken,
}

impl DeviceHandle {
    pub fn new(io: Box<dyn SerialIo>) -> Self {
        let cancel = CancelToken::new();
        Self {
            endpoint: Arc::new(Mutex::new(Endpoint::new(io, cancel.clone()))),
            cancel,
        }
    }

    pub fn open(path: &str, baud: u32) -> Result<Self> {
        Ok(Self::new(Box::new(SerialEndpoint::open(path, baud)?)))
    }

    /// Acquire the endpoint for one logical command.
    ///
    /// Never held across more than one command; long uploads re-acquire
    /// per chunk to keep cancellation latency bounded.
    pub fn lock(&self) -> MutexGuard<'_, Endpoint> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptedIo;

    #[test]
    fn read_exact_returns_queued_bytes() {
        let io = ScriptedIo::new();
        io.queue(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let handle = io.handle();
        let mut ep = handle.lock();

        assert_eq!(ep.read_u32_be().unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn read_exact_times_out_with_partial_data() {
        let io = ScriptedIo::new();
        io.queue(&[0x01]);
        let handle = io.handle();
        let mut ep = handle.lock();

        let mut buf = [0u8; 4];
        match ep.read_exact("test", &mut buf, Duration::from_millis(20)) {
            Err(Error::Timeout { wanted: 4, got: 1, .. }) => (),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_token_short_circuits_reads() {
        let io = ScriptedIo::new();
        io.queue(&[0xAA; 16]);
        let handle = io.handle();
        handle.cancel().cancel();
        let mut ep = handle.lock();

        assert!(matches!(ep.read_u8(), Err(Error::Cancelled)));
    }

    #[test]
    fn simple_write_helpers_are_endian_correct() {
        let io = ScriptedIo::new();
        let handle = io.handle();
        {
            let mut ep = handle.lock();
            ep.write_u16_be(0x1234).unwrap();
            ep.write_u32_le(0xA0B0C0D0).unwrap();
            ep.write_u64_le(0x1122334455667788).unwrap();
        }

        assert_eq!(
            io.written(),
            [
                0x12, 0x34, // u16 be
                0xD0, 0xC0, 0xB0, 0xA0, // u32 le
                0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, // u64 le
            ]
        );
    }
}
