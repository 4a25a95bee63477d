//! DA archive parser.
//!
//! Two on-disk families, discriminated by the first four bytes: the
//! legacy single-image `MMMM` format and the V6 `hvea` format with a
//! per-SoC entry table.

use bincode::Decode;
use getset::Getters;

use crate::err::Error;

pub mod err;
pub mod legacy;
pub mod v6;

pub type Result<T> = core::result::Result<T, Error>;

pub(crate) const LEGACY_MAGIC: &[u8; 4] = b"MMMM";
pub(crate) const V6_MAGIC: &[u8; 4] = b"hvea";

/// Low-level structs decode themselves off the wire and then vouch for
/// their own plausibility.
pub trait LLParser: Decode<()> + Sized {
    fn parse(data: &[u8]) -> Result<Self> {
        let config = bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding();
        let parsed = bincode::decode_from_slice(data, config).map(|r| r.0)?;
        Self::validate(&parsed)?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()>;
}

/// Which download-agent protocol family an image speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaType {
    Legacy,
    XFlash,
    Xml,
}

/// One DA stage ready for upload.
#[derive(Debug, Clone, Getters)]
pub struct DaEntry {
    #[getset(get = "pub")]
    name: String,

    #[getset(get = "pub")]
    load_addr: u32,

    #[getset(get = "pub")]
    signature_len: u32,

    #[getset(get = "pub")]
    version: u32,

    #[getset(get = "pub")]
    da_type: DaType,

    data: Vec<u8>,
}

impl DaEntry {
    pub(crate) fn new(
        name: &str,
        load_addr: u32,
        signature_len: u32,
        version: u32,
        da_type: DaType,
        data: Vec<u8>,
    ) -> Result<Self> {
        if data.len() < signature_len as usize {
            return Err(Error::RegionTooSmall {
                len: data.len(),
                sig_len: signature_len,
            });
        }
        Ok(Self {
            name: name.to_owned(),
            load_addr,
            signature_len,
            version,
            da_type,
            data,
        })
    }

    /// Full image, signature tail included.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Executable code without the signature tail.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.data[..self.data.len() - self.signature_len as usize]
    }

    /// Signature tail.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.data[self.data.len() - self.signature_len as usize..]
    }
}

/// Parse an archive and select DA1 (and DA2 where the format carries
/// one) for `hw_code`.
pub fn parse(data: &[u8], hw_code: u16) -> Result<(DaEntry, Option<DaEntry>)> {
    match data.get(..4) {
        Some(magic) if magic == LEGACY_MAGIC => legacy::parse(data),
        Some(magic) if magic == V6_MAGIC => v6::parse(data, hw_code),
        _ => Err(Error::UnknownFormat),
    }
}

pub(crate) fn slice(
    data: &[u8],
    what: &'static str,
    offset: usize,
    len: usize,
) -> Result<Vec<u8>> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .map(<[u8]>::to_vec)
        .ok_or(Error::Truncated {
            what,
            needed: offset.saturating_add(len),
            available: data.len(),
        })
}
