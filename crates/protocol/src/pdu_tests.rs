// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn log_name() -> GdpName {
    GdpName::from_alias("test.log")
}

fn sample() -> Pdu {
    Pdu::new(Command::Append, log_name(), GdpName::from_alias("client"))
        .with_rid(7)
        .with_recno(3)
        .with_ts(Timestamp {
            sec: 1_700_000_000,
            nsec: 42,
            accuracy: 0.5,
        })
        .with_data("hello")
        .with_sig(Some(Signature {
            md_alg: 3,
            bytes: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
        }))
}

#[test]
fn header_fields_land_at_fixed_offsets() {
    let bytes = encode(&sample()).expect("encode failed");
    assert_eq!(bytes[0], PROTO_VERSION);
    assert_eq!(bytes[1], DEFAULT_TTL);
    assert_eq!(bytes[3], Command::Append.code());
    assert_eq!(&bytes[4..36], log_name().as_bytes());
    assert_eq!(bytes[68], 3, "sigalg");
    assert_eq!(bytes[69], 2, "siglen words");
    assert_eq!(bytes[70], 7, "olen words: rid 4 + recno 8 + ts 16");
    assert_eq!(bytes[71], flags::RID | flags::RECNO | flags::TS);
    assert_eq!(&bytes[72..76], &[0, 0, 0, 5]);
    assert_eq!(bytes.len(), HEADER_LEN + 28 + 5 + 8);
}

#[test]
fn decode_restores_every_field() {
    let pdu = sample();
    let mut buf = BytesMut::from(&encode(&pdu).unwrap()[..]);
    let decoded = decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded, pdu);
    assert!(buf.is_empty());
}

#[test]
fn partial_input_asks_for_more() {
    let bytes = encode(&sample()).unwrap();
    for cut in [0, 10, HEADER_LEN, bytes.len() - 1] {
        let mut buf = BytesMut::from(&bytes[..cut]);
        assert_eq!(decode(&mut buf).unwrap(), None, "cut at {}", cut);
        assert_eq!(buf.len(), cut, "buffer must not be consumed");
    }
}

#[test]
fn two_frames_in_one_buffer_decode_in_order() {
    let first = Pdu::new(Command::Ping, GdpName::ZERO, log_name()).with_rid(1);
    let second = sample();
    let mut buf = BytesMut::new();
    encode_into(&first, &mut buf).unwrap();
    encode_into(&second, &mut buf).unwrap();
    assert_eq!(decode(&mut buf).unwrap(), Some(first));
    assert_eq!(decode(&mut buf).unwrap(), Some(second));
    assert_eq!(decode(&mut buf).unwrap(), None);
}

#[test]
fn unknown_version_is_a_hard_error() {
    let mut bytes = BytesMut::from(&encode(&sample()).unwrap()[..]);
    bytes[0] = 2;
    assert_eq!(decode(&mut bytes), Err(ProtocolError::BadVersion(2)));
}

#[test]
fn short_option_block_is_a_hard_error() {
    let mut bytes = BytesMut::from(&encode(&sample()).unwrap()[..]);
    bytes[70] = 1;
    assert_eq!(
        decode(&mut bytes),
        Err(ProtocolError::OptionsTooShort { need: 28, have: 4 })
    );
}

#[test]
fn unknown_trailing_options_are_skipped() {
    let pdu = Pdu::new(Command::Read, log_name(), GdpName::ZERO)
        .with_rid(9)
        .with_data("x");
    let bytes = encode(&pdu).unwrap();
    let mut raw = BytesMut::new();
    raw.extend_from_slice(&bytes[..HEADER_LEN]);
    raw[70] = 2;
    raw.extend_from_slice(&bytes[HEADER_LEN..HEADER_LEN + 4]);
    raw.extend_from_slice(&[0xee; 4]);
    raw.extend_from_slice(&bytes[HEADER_LEN + 4..]);
    assert_eq!(decode(&mut raw).unwrap(), Some(pdu));
}

#[test]
fn signature_is_padded_to_words() {
    let pdu = Pdu::new(Command::Append, log_name(), GdpName::ZERO).with_sig(Some(Signature {
        md_alg: 1,
        bytes: Bytes::from_static(&[9, 9, 9]),
    }));
    let bytes = encode(&pdu).unwrap();
    assert_eq!(bytes[69], 1);
    assert_eq!(&bytes[bytes.len() - 4..], &[9, 9, 9, 0]);
}

#[test]
fn oversized_signature_is_rejected() {
    let pdu = Pdu::new(Command::Append, log_name(), GdpName::ZERO).with_sig(Some(Signature {
        md_alg: 1,
        bytes: Bytes::from(vec![0u8; MAX_SIG_BYTES + 1]),
    }));
    assert!(matches!(encode(&pdu), Err(ProtocolError::SignatureTooLarge(_))));
}

#[test]
fn reply_swaps_addresses_and_keeps_rid() {
    let req = sample();
    let reply = req.reply(Command::AckSuccess);
    assert_eq!(reply.dst, req.src);
    assert_eq!(reply.src, req.dst);
    assert_eq!(reply.rid, Some(7));
    assert_eq!(reply.recno, None);
}

proptest! {
    #[test]
    fn arbitrary_prefixes_never_error(data in proptest::collection::vec(any::<u8>(), 0..64), cut in 0usize..200) {
        let pdu = Pdu::new(Command::Append, log_name(), GdpName::ZERO)
            .with_rid(1)
            .with_data(data);
        let bytes = encode(&pdu).unwrap();
        let cut = cut.min(bytes.len());
        let mut buf = BytesMut::from(&bytes[..cut]);
        let out = decode(&mut buf).unwrap();
        prop_assert_eq!(out.is_some(), cut == bytes.len());
    }
}
