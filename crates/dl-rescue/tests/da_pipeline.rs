//! Archive-to-patch pipeline: what the parser selects, the patcher can
//! verify and rewrite.

const DA1_SIZE: u32 = 0x400;
const DA2_SIZE: u32 = 0x200;
const SIG_LEN: u32 = 0x30;

/// V6 archive with one entry for 0x0717 whose DA1 embeds the SHA-256
/// digest of DA2's body at the published window.
fn archive() -> Vec<u8> {
    let da2: Vec<u8> = (0..DA2_SIZE).map(|i| (i % 251) as u8).collect();
    let digest = dl_patcher::da2_digest(&da2, SIG_LEN);

    let mut da1 = vec![0x11u8; DA1_SIZE as usize];
    let position = dl_patcher::find_da2_hash_position(&da1, SIG_LEN).unwrap();
    da1[position..position + 32].copy_from_slice(&digest);

    let mut file = vec![
        0x68, 0x76, 0x65, 0x61, // "hvea"
        0x00, 0x00, 0x00, 0x00, // version
        0x01, 0x00, 0x00, 0x00, // entry count
        0x10, 0x00, 0x00, 0x00, // entry table offset
    ];

    let da1_offset = 0x80u32;
    let da2_offset = da1_offset + DA1_SIZE;

    let mut entry = [0u8; 64];
    entry[0..2].copy_from_slice(&0x0717u16.to_le_bytes());
    entry[0x10..0x14].copy_from_slice(&da1_offset.to_le_bytes());
    entry[0x14..0x18].copy_from_slice(&DA1_SIZE.to_le_bytes());
    entry[0x18..0x1C].copy_from_slice(&0x20_0000u32.to_le_bytes());
    entry[0x20..0x24].copy_from_slice(&da2_offset.to_le_bytes());
    entry[0x24..0x28].copy_from_slice(&DA2_SIZE.to_le_bytes());
    entry[0x28..0x2C].copy_from_slice(&0x4000_0000u32.to_le_bytes());
    file.extend(entry);

    file.resize(da1_offset as usize, 0);
    file.extend(&da1);
    file.extend(&da2);
    file
}

#[test]
fn parsed_da1_embeds_the_da2_digest() {
    let (da1, da2) = dl_parser::parse(&archive(), 0x0717).unwrap();
    let da2 = da2.expect("archive carries a DA2 triple");

    assert_eq!(*da1.load_addr(), 0x20_0000);
    assert_eq!(*da2.load_addr(), 0x4000_0000);

    let position = dl_patcher::find_da2_hash_position(da1.data(), *da1.signature_len()).unwrap();
    let digest = dl_patcher::da2_digest(da2.data(), *da2.signature_len());
    assert_eq!(
        &da1.data()[position..position + 32],
        digest,
        "unpatched image: embedded window equals the DA2 body digest"
    );
}

#[test]
fn patching_da2_and_resplicing_keeps_the_invariant() {
    let (mut da1, da2) = dl_parser::parse(&archive(), 0x0717).unwrap();
    let mut da2 = da2.unwrap();

    let original = [da2.data()[0x40], da2.data()[0x41]];
    dl_patcher::apply_byte_patch(da2.data_mut(), &original, &[0x00, 0xBF], 0x40).unwrap();

    let sig_len = *da1.signature_len();
    let digest =
        dl_patcher::patch_da1_hash(da1.data_mut(), sig_len, da2.data(), SIG_LEN).unwrap();

    let position = dl_patcher::find_da2_hash_position(da1.data(), sig_len).unwrap();
    assert_eq!(&da1.data()[position..position + 32], digest);
    assert_eq!(digest, dl_patcher::da2_digest(da2.data(), SIG_LEN));
}
