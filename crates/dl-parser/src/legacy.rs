//! Legacy `MMMM` archives: the whole file is one DA image.

use crate::{DaEntry, DaType, Result};

const LOAD_ADDR: u32 = 0x20_0000;
const SIG_LEN: u32 = 0x100;

pub(crate) fn parse(data: &[u8]) -> Result<(DaEntry, Option<DaEntry>)> {
    let da1 = DaEntry::new("da", LOAD_ADDR, SIG_LEN, 1, DaType::Legacy, data.to_vec())?;
    log::debug!("legacy DA image, {} bytes", da1.data().len());
    Ok((da1, None))
}
