//! Loader lookup: given a device identity, produce the DA stage images.

use std::{fs, path::PathBuf};

use dl_parser::DaEntry;

use crate::Result;

/// Source of DA images for an identified device. The cloud-backed
/// implementation lives with the caller; the CLI reads archives from
/// disk.
pub trait LoaderSource {
    fn lookup(
        &self,
        hw_code: u16,
        hw_ver: u16,
        me_id: Option<&[u8]>,
    ) -> Result<(DaEntry, Option<DaEntry>)>;
}

/// A DA archive on disk.
pub struct FileLoaderSource {
    path: PathBuf,
}

impl FileLoaderSource {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LoaderSource for FileLoaderSource {
    fn lookup(
        &self,
        hw_code: u16,
        hw_ver: u16,
        _me_id: Option<&[u8]>,
    ) -> Result<(DaEntry, Option<DaEntry>)> {
        log::debug!(
            "looking up DA for hw_code {hw_code:#06x} hw_ver {hw_ver:#06x} in {}",
            self.path.display()
        );
        let archive = fs::read(&self.path)?;
        Ok(dl_parser::parse(&archive, hw_code)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn v6_archive() -> Vec<u8> {
        let mut file = vec![
            0x68, 0x76, 0x65, 0x61, // "hvea"
            0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
        ];
        let mut entry = [0u8; 64];
        entry[0..2].copy_from_slice(&0x0717u16.to_le_bytes());
        entry[0x10..0x14].copy_from_slice(&0x80u32.to_le_bytes());
        entry[0x14..0x18].copy_from_slice(&0x200u32.to_le_bytes());
        entry[0x18..0x1C].copy_from_slice(&0x20_0000u32.to_le_bytes());
        file.extend(entry);
        file.resize(0x80, 0);
        file.extend(vec![0xDA; 0x200]);
        file
    }

    #[test]
    fn file_source_resolves_by_hw_code() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&v6_archive()).unwrap();

        let source = FileLoaderSource::new(tmp.path().to_path_buf());
        let (da1, da2) = source.lookup(0x0717, 0x0001, None).unwrap();
        assert_eq!(*da1.load_addr(), 0x20_0000);
        assert!(da2.is_none());
    }

    #[test]
    fn file_source_propagates_missing_entry() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&v6_archive()).unwrap();

        let source = FileLoaderSource::new(tmp.path().to_path_buf());
        assert!(source.lookup(0x0766, 0, None).is_err());
    }
}
