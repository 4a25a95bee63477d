//! Serial Link Authentication: a 16-byte challenge signed by external
//! key material.

use dl_port::{Endpoint, SimpleRead, SimpleWrite};

use crate::{Result, err::Error, opcode};

/// External signer for SLA challenges; the core never holds key material.
pub trait SlaAuthenticator {
    fn sign(&self, challenge: &[u8]) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>>;
}

/// Run the challenge/response exchange. Invoked when an operation
/// reports status 0x1D0D; on success the interrupted operation resumes.
pub(crate) fn authenticate(ep: &mut Endpoint, auth: &dyn SlaAuthenticator) -> Result<()> {
    ep.write_u8(opcode::SLA_CHALLENGE)?;
    let mut challenge = [0u8; 16];
    {
        let timeout = ep.timeout();
        ep.read_exact("SLA challenge", &mut challenge, timeout)?;
    }

    let signature = auth.sign(&challenge)?;
    log::debug!("SLA: signing {}-byte challenge, {}-byte signature", challenge.len(), signature.len());

    ep.write_u8(opcode::SLA_RESPONSE)?;
    ep.write_all(&signature)?;

    let status = ep.read_u16_be()?;
    if status != 0 {
        return Err(Error::SlaRejected(status));
    }
    Ok(())
}
