// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bytes::BytesMut;
use gdp_core::Signature;
use yare::parameterized;

fn name() -> GdpName {
    GdpName::from_alias("layout.test")
}

#[test]
fn extent_header_is_72_bytes() {
    let mut buf = BytesMut::new();
    ExtentHeader::new(name(), 0, 0, 2, 30).encode(&mut buf);
    assert_eq!(buf.len(), EXTENT_HEADER_LEN);
    assert_eq!(&buf[..4], b"GCLD");
}

#[test]
fn extent_header_decodes() {
    let hdr = ExtentHeader::new(name(), 3, 99, 0, 0);
    let mut buf = BytesMut::new();
    hdr.encode(&mut buf);
    assert_eq!(ExtentHeader::decode(&buf).unwrap(), hdr);
}

#[test]
fn extent_header_rejects_bad_magic() {
    let mut buf = BytesMut::new();
    ExtentHeader::new(name(), 0, 0, 0, 0).encode(&mut buf);
    buf[0] = 0;
    let err = ExtentHeader::decode(&buf).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");
}

#[test]
fn extent_header_rejects_future_version() {
    let mut buf = BytesMut::new();
    ExtentHeader::new(name(), 0, 0, 0, 0).encode(&mut buf);
    buf[7] = 9;
    assert!(ExtentHeader::decode(&buf).is_err());
}

#[test]
fn record_header_packs_sigmeta() {
    let mut d = Datum::new("abc");
    d.recno = 5;
    d.ts = Timestamp {
        sec: 10,
        nsec: 20,
        accuracy: 1.5,
    };
    d.sig = Some(Signature::new(2, vec![0u8; 64]).unwrap());
    let hdr = RecordHeader::for_datum(&d);
    assert_eq!(hdr.sig_len(), 64);
    assert_eq!(hdr.md_alg(), 2);
    assert_eq!(hdr.record_len(), Some(40 + 3 + 64));

    let mut buf = BytesMut::new();
    hdr.encode(&mut buf);
    assert_eq!(buf.len(), RECORD_HEADER_LEN);
    assert_eq!(RecordHeader::decode(&buf).unwrap(), hdr);
}

#[test]
fn index_header_and_entry_sizes() {
    let mut buf = BytesMut::new();
    IndexHeader { min_recno: 1 }.encode(&mut buf);
    assert_eq!(buf.len(), INDEX_HEADER_LEN);
    let entry = IndexEntry {
        recno: 1,
        offset: 72,
        extent: 0,
    };
    entry.encode(&mut buf);
    assert_eq!(buf.len(), INDEX_HEADER_LEN + INDEX_ENTRY_LEN);
    assert_eq!(IndexEntry::decode(&buf[INDEX_HEADER_LEN..]).unwrap(), entry);
}

#[test]
fn index_header_rejects_bad_magic() {
    let mut buf = BytesMut::new();
    IndexHeader { min_recno: 1 }.encode(&mut buf);
    buf[3] ^= 0xff;
    assert!(matches!(
        IndexHeader::decode(&buf),
        Err(StoreError::Corrupt { .. })
    ));
}

#[parameterized(
    zero = { 0 },
    negative = { -5 },
)]
fn index_header_rejects_first_record_below_one(min_recno: i64) {
    let mut buf = BytesMut::new();
    IndexHeader { min_recno }.encode(&mut buf);
    assert!(matches!(
        IndexHeader::decode(&buf),
        Err(StoreError::Corrupt { .. })
    ));
}

#[test]
fn paths_are_sharded_by_first_byte() {
    let root = Path::new("/var/gdp");
    let n = name();
    let p = extent_path(root, &n, 7);
    assert_eq!(p.parent().unwrap(), root.join(n.shard()));
    assert!(p.to_string_lossy().ends_with("-000007.data"));
    assert_eq!(
        index_path(root, &n).file_name().unwrap().to_string_lossy(),
        format!("{}.index", n.printable())
    );
}

#[test]
fn extent_file_names_parse() {
    let n = name();
    let file = format!("{}-000012.data", n.printable());
    assert_eq!(parse_extent_file(&file, &n), Some(12));
    assert_eq!(parse_extent_file(&format!("{}.index", n.printable()), &n), None);
    let other = GdpName::from_alias("other");
    assert_eq!(parse_extent_file(&file, &other), None);
}
