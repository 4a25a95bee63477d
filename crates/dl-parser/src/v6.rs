//! V6 `hvea` archives: a header, then a table of 64-byte per-SoC
//! entries carrying DA1/DA2 offset triples.

use crate::{DaEntry, DaType, Result, err::Error, slice};

pub(crate) mod ll;

const SIG_LEN: u32 = 0x30;

pub(crate) fn parse(data: &[u8], hw_code: u16) -> Result<(DaEntry, Option<DaEntry>)> {
    let header = <ll::Header as crate::LLParser>::parse(data)?;

    for i in 0..header.count as usize {
        let start = header.entry_table_offset as usize + i * ll::ENTRY_SIZE;
        let raw = slice(data, "entry table", start, ll::ENTRY_SIZE)?;
        let entry = <ll::Entry as crate::LLParser>::parse(&raw)?;

        if entry.hw_code != hw_code {
            continue;
        }

        let da1 = DaEntry::new(
            "da1",
            entry.da1_load_addr,
            SIG_LEN,
            header.version,
            DaType::Xml,
            slice(data, "da1 region", entry.da1_offset as usize, entry.da1_size as usize)?,
        )?;

        let da2 = if entry.da2_size != 0 {
            Some(DaEntry::new(
                "da2",
                entry.da2_load_addr,
                SIG_LEN,
                header.version,
                DaType::Xml,
                slice(data, "da2 region", entry.da2_offset as usize, entry.da2_size as usize)?,
            )?)
        } else {
            None
        };

        log::debug!(
            "hvea entry for {hw_code:#06x}: da1 {} bytes @ {:#x}, da2 {}",
            da1.data().len(),
            da1.load_addr(),
            da2.as_ref().map_or("absent".into(), |d| format!("{} bytes @ {:#x}", d.data().len(), d.load_addr())),
        );

        return Ok((da1, da2));
    }

    Err(Error::NoEntryForChip(hw_code))
}
