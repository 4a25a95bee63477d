//! Checksums used on the wire.

/// XOR reduction across 16-bit little-endian windows.
///
/// This is the transport checksum of DA uploads; an odd trailing byte is
/// zero-extended to a full window.
#[must_use]
pub fn xor16(data: &[u8]) -> u16 {
    let mut sum = 0u16;
    let mut windows = data.chunks_exact(2);
    for w in &mut windows {
        sum ^= u16::from_le_bytes([w[0], w[1]]);
    }
    if let [tail] = windows.remainder() {
        sum ^= u16::from_le_bytes([*tail, 0]);
    }
    sum
}

/// CRC32 (IEEE) over `data`, as appended to flow frames at checksum level 1.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
