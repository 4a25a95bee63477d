//! XML command documents and the minimal extraction the DA's replies
//! need. The DA's documents are flat and machine-generated, so tag
//! scanning is deliberate here.

/// Build a `<da>` command document with the given `<arg>` children.
#[must_use]
pub fn command(cmd: &str, args: &[(&str, String)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><da><version>1.0</version>",
    );
    xml.push_str(&format!("<command>{cmd}</command><arg>"));
    for (tag, value) in args {
        xml.push_str(&format!("<{tag}>{value}</{tag}>"));
    }
    xml.push_str("</arg></da>");
    xml
}

/// First `<tag>...</tag>` body in `xml`, if present.
#[must_use]
pub fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

/// Parse `0x`-prefixed or bare hex.
#[must_use]
pub fn parse_hex(text: &str) -> Option<u64> {
    let digits = text.trim().trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).ok()
}

#[must_use]
pub fn hex(value: u64) -> String {
    format!("{value:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_document_shape() {
        let xml = command("CMD:READ-PARTITION", &[("partition", "boot".into())]);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?><da>"));
        assert!(xml.contains("<command>CMD:READ-PARTITION</command>"));
        assert!(xml.contains("<arg><partition>boot</partition></arg>"));
    }

    #[test]
    fn extract_tag_finds_first_body() {
        let xml = command("CMD:DOWNLOAD-FILE", &[("packet_length", "0x1000".into())]);
        assert_eq!(extract_tag(&xml, "packet_length").as_deref(), Some("0x1000"));
        assert_eq!(extract_tag(&xml, "absent"), None);
    }

    #[test]
    fn hex_roundtrip() {
        assert_eq!(parse_hex("0x1000"), Some(0x1000));
        assert_eq!(parse_hex("ff"), Some(0xFF));
        assert_eq!(parse_hex("zz"), None);
        assert_eq!(hex(0x20_0000), "0x200000");
    }
}
