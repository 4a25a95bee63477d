//! Startup handshake: spam 0xA0 until the ROM answers 0x5F, then walk
//! the canonical three-byte exchange.

use std::time::{Duration, Instant};

use dl_port::{Endpoint, SimpleWrite, config};

use crate::{Result, err::Error, opcode};

/// Each entry is one write followed by the complement the device must
/// answer with; any mismatch resets the attempt.
const SEQUENCE: [(u8, u8); 3] = [(0x0A, 0xF5), (0x50, 0xAF), (0x05, 0xFA)];

pub struct HandshakeOpts {
    pub max_attempts: u32,
    pub budget: Duration,
}

impl Default for HandshakeOpts {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            budget: config::HANDSHAKE_BUDGET,
        }
    }
}

/// Ping interval for the given attempt number (1-based).
fn backoff(attempt: u32) -> Duration {
    match attempt {
        0..=20 => Duration::from_millis(50),
        21..=50 => Duration::from_millis(100),
        _ => Duration::from_millis(200),
    }
}

pub fn handshake(ep: &mut Endpoint, opts: &HandshakeOpts) -> Result<()> {
    let started = Instant::now();
    let mut attempts = 0;

    'attempt: while attempts < opts.max_attempts && started.elapsed() < opts.budget {
        attempts += 1;

        ep.write_u8(opcode::HANDSHAKE_PING)?;

        let mut byte = [0u8; 1];
        match ep.read_exact("handshake", &mut byte, backoff(attempts)) {
            Ok(()) if byte[0] == opcode::HANDSHAKE_PONG => (),
            Ok(()) => continue 'attempt,
            Err(dl_port::err::Error::Timeout { .. }) => continue 'attempt,
            Err(e) => return Err(e.into()),
        }

        for (tx, want) in SEQUENCE {
            ep.write_u8(tx)?;
            let mut got = [0u8; 1];
            match ep.read_exact("handshake", &mut got, Duration::from_secs(1)) {
                Ok(()) if got[0] == want => (),
                Ok(()) => {
                    log::debug!("handshake byte mismatch: sent {tx:#04x}, got {:#04x}", got[0]);
                    continue 'attempt;
                }
                Err(dl_port::err::Error::Timeout { .. }) => continue 'attempt,
                Err(e) => return Err(e.into()),
            }
        }

        // Our own ping spam may still be echoing around
        ep.discard_all()?;
        return Ok(());
    }

    Err(Error::HandshakeFailed { attempts })
}
