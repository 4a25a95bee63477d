//! On-disk layout of the V6 archive, all fields little-endian.

use bincode::Decode;

use crate::{LLParser, Result, err::Error};

pub(crate) const ENTRY_SIZE: usize = 64;

#[derive(Debug, Decode)]
#[repr(C)]
pub(crate) struct Header {
    pub magic: [u8; 4],
    pub version: u32,
    pub count: u32,
    pub entry_table_offset: u32,
}

impl LLParser for Header {
    fn validate(&self) -> Result<()> {
        if &self.magic != crate::V6_MAGIC {
            Err(Error::InvalidMagic(self.magic))
        } else if self.count == 0 || self.count > 0x100 {
            Err(Error::InvalidEntryCount(self.count))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Decode)]
#[repr(C)]
pub(crate) struct Entry {
    pub hw_code: u16,
    _reserved0: [u8; 14],
    pub da1_offset: u32,
    pub da1_size: u32,
    pub da1_load_addr: u32,
    _reserved1: u32,
    pub da2_offset: u32,
    pub da2_size: u32,
    pub da2_load_addr: u32,
    _reserved2: [u8; 20],
}

impl LLParser for Entry {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
