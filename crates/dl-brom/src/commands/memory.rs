//! Echo-acknowledged memory access: every address, count and data word
//! is confirmed by the device before the next one goes out.

use derive_ctor::ctor;
use dl_port::{Endpoint, SimpleRead};

use crate::{EchoExt, Result, commands::expect_ok, opcode};

/// Read `dwords` 32-bit words starting at `addr`.
#[derive(ctor)]
pub struct Read32 {
    addr: u32,
    dwords: u32,
}

impl Read32 {
    pub fn run(&self, ep: &mut Endpoint) -> Result<Vec<u32>> {
        ep.echo_u8(opcode::READ32)?;
        ep.echo_u32(self.addr)?;
        ep.echo_u32(self.dwords)?;
        expect_ok(ep, "READ32")?;

        let mut words = Vec::with_capacity(self.dwords as usize);
        for _ in 0..self.dwords {
            words.push(ep.read_u32_be()?);
        }

        expect_ok(ep, "READ32")?;
        Ok(words)
    }
}

/// Write 32-bit words starting at `addr`.
#[derive(ctor)]
pub struct Write32<'a> {
    addr: u32,
    values: &'a [u32],
}

impl Write32<'_> {
    pub fn run(&self, ep: &mut Endpoint) -> Result<()> {
        ep.echo_u8(opcode::WRITE32)?;
        ep.echo_u32(self.addr)?;
        ep.echo_u32(self.values.len() as u32)?;
        expect_ok(ep, "WRITE32")?;

        for value in self.values {
            ep.echo_u32(*value)?;
        }

        expect_ok(ep, "WRITE32")
    }
}

/// Write 16-bit words starting at `addr`; used by the legacy watchdog
/// disable path.
#[derive(ctor)]
pub struct Write16<'a> {
    addr: u32,
    values: &'a [u16],
}

impl Write16<'_> {
    pub fn run(&self, ep: &mut Endpoint) -> Result<()> {
        ep.echo_u8(opcode::WRITE16)?;
        ep.echo_u32(self.addr)?;
        ep.echo_u32(self.values.len() as u32)?;
        expect_ok(ep, "WRITE16")?;

        for value in self.values {
            ep.echo_u16(*value)?;
        }

        expect_ok(ep, "WRITE16")
    }
}
