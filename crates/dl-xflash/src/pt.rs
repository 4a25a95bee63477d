//! Partition table records as reported by `CMD:GET-PT`.

use crate::xml;

/// One partition as the DA reports it. Value-only; sectors are in the
/// storage's native sector size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    pub start_sector: u64,
    pub sector_count: u64,
    pub size_bytes: u64,
    pub type_tag: String,
}

/// Parse the `<pt>` entries out of a GET-PT reply document.
#[must_use]
pub fn parse_table(doc: &str) -> Vec<PartitionInfo> {
    let mut partitions = Vec::new();
    let mut rest = doc;

    while let (Some(start), Some(end)) = (rest.find("<pt>"), rest.find("</pt>")) {
        if end < start {
            break;
        }
        let entry = &rest[start + 4..end];

        let name = xml::extract_tag(entry, "name").unwrap_or_default();
        if name.is_empty() || name.len() > 31 || !name.is_ascii() {
            log::warn!("skipping partition entry with implausible name {name:?}");
        } else {
            partitions.push(PartitionInfo {
                name,
                start_sector: xml::extract_tag(entry, "start")
                    .and_then(|t| xml::parse_hex(&t))
                    .unwrap_or_default(),
                sector_count: xml::extract_tag(entry, "sectors")
                    .and_then(|t| xml::parse_hex(&t))
                    .unwrap_or_default(),
                size_bytes: xml::extract_tag(entry, "size")
                    .and_then(|t| xml::parse_hex(&t))
                    .unwrap_or_default(),
                type_tag: xml::extract_tag(entry, "type").unwrap_or_default(),
            });
        }

        rest = &rest[end + 5..];
    }

    partitions
}
