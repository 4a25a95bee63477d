//! Scripted endpoint for replaying canned device conversations in tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{ClearBuffer, DeviceHandle, Result, SerialIo};

#[derive(Default)]
struct Inner {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<u8>,
}

/// A device stand-in: replies are queued up front, writes are recorded.
///
/// Each `queue` call becomes one delivery burst, the way a USB packet
/// arrives in one read. Clones share state, so a test can keep one
/// clone for inspection after handing another to a [`DeviceHandle`].
#[derive(Clone, Default)]
pub struct ScriptedIo {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedIo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one burst of reply bytes.
    pub fn queue(&self, bytes: &[u8]) {
        self.inner().rx.push_back(bytes.to_vec());
    }

    /// Everything the host has written so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.inner().tx.clone()
    }

    /// Take and clear the recorded host writes.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner().tx)
    }

    /// Reply bytes not yet consumed by the host.
    #[must_use]
    pub fn unread(&self) -> usize {
        self.inner().rx.iter().map(Vec::len).sum()
    }

    /// Wrap a clone of this endpoint in a fresh [`DeviceHandle`].
    #[must_use]
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle::new(Box::new(self.clone()))
    }
}

impl SerialIo for ScriptedIo {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner().tx.extend_from_slice(data);
        Ok(())
    }

    fn read_avail(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner();
        loop {
            let taken = {
                let Some(front) = inner.rx.front_mut() else {
                    return Ok(0);
                };
                let n = buf.len().min(front.len());
                buf[..n].copy_from_slice(&front[..n]);
                front.drain(..n);
                n
            };

            if taken == 0 {
                // Empty burst; skip it
                inner.rx.pop_front();
                continue;
            }
            if inner.rx.front().is_some_and(Vec::is_empty) {
                inner.rx.pop_front();
            }
            return Ok(taken);
        }
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.inner().rx.iter().map(Vec::len).sum::<usize>() as u32)
    }

    fn clear(&mut self, buffer: ClearBuffer) -> Result<()> {
        let mut inner = self.inner();
        match buffer {
            ClearBuffer::Input | ClearBuffer::All => inner.rx.clear(),
            ClearBuffer::Output => (),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
