//! Stateless byte-buffer surgery on DA images: guarded byte patches and
//! the embedded DA2 digest recompute that the runtime auth bypass
//! builds on.

use sha2::{Digest, Sha256};

use crate::err::Error;

pub mod err;
pub mod slice;

pub type Result<T> = core::result::Result<T, Error>;

/// Size of the SHA-256 digest DA1 embeds for DA2.
pub const DIGEST_LEN: usize = 32;

/// Distance of the digest from the end of DA1's code, counted before
/// the signature tail.
const DIGEST_BACK_OFFSET: usize = 0x30;

/// Offset in DA1 of the embedded SHA-256 digest of DA2.
pub fn find_da2_hash_position(da1: &[u8], sig_len: u32) -> Result<usize> {
    da1.len()
        .checked_sub(sig_len as usize)
        .and_then(|code_end| code_end.checked_sub(DIGEST_BACK_OFFSET))
        .ok_or(Error::NoRoomForDigest {
            len: da1.len(),
            offset: sig_len as usize + DIGEST_BACK_OFFSET,
        })
}

/// SHA-256 over a DA2 image, its signature tail excluded.
#[must_use]
pub fn da2_digest(da2: &[u8], sig_len: u32) -> [u8; 32] {
    let body = &da2[..da2.len() - (sig_len as usize).min(da2.len())];
    Sha256::digest(body).into()
}

/// Recompute the DA2 digest and splice it into DA1 at the embedded
/// position. Used after DA2 has been patched, so DA1's verification
/// still passes.
pub fn patch_da1_hash(da1: &mut [u8], da1_sig_len: u32, da2: &[u8], da2_sig_len: u32) -> Result<[u8; 32]> {
    let position = find_da2_hash_position(da1, da1_sig_len)?;
    let digest = da2_digest(da2, da2_sig_len);

    if position + digest.len() > da1.len() {
        return Err(Error::OutOfBounds {
            offset: position,
            len: digest.len(),
            image_len: da1.len(),
        });
    }

    log::debug!("splicing DA2 digest at {position:#x} in DA1");
    slice::replace(da1, position, &digest);
    Ok(digest)
}

/// Overwrite `patch` at `offset`, but only if `original` matches there
/// first. The guard catches images from a different build than the
/// patch was derived from.
pub fn apply_byte_patch(
    image: &mut [u8],
    original: &[u8],
    patch: &[u8],
    offset: usize,
) -> Result<()> {
    let guard_end = offset
        .checked_add(original.len())
        .filter(|end| *end <= image.len())
        .ok_or(Error::OutOfBounds {
            offset,
            len: original.len(),
            image_len: image.len(),
        })?;

    if offset + patch.len() > image.len() {
        return Err(Error::OutOfBounds {
            offset,
            len: patch.len(),
            image_len: image.len(),
        });
    }

    if &image[offset..guard_end] != original {
        return Err(Error::PatchMismatch { offset });
    }

    slice::replace(image, offset, patch);
    Ok(())
}
