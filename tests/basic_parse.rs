use jp2box::boxes::{BoxClass, BoxHeader, FourCC};
use jp2box::parser::{BoxScanner, ParseError, parse_children, read_box_header};
use jp2box::registry::{BoxValue, Registry, SIGNATURE_MAGIC};
use std::io::Cursor;

fn record(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn ihdr(height: u32, width: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&height.to_be_bytes());
    p.extend_from_slice(&width.to_be_bytes());
    p.extend_from_slice(&3u16.to_be_bytes()); // NC
    p.push(7); // BPC: 8 bits unsigned
    p.push(7); // C
    p.push(0); // UnkC
    p.push(0); // IPR
    record(b"ihdr", &p)
}

/// signature, ftyp, jp2h { ihdr }, jp2c with length 0 followed by `tail`
fn make_four_record_file(tail: &[u8]) -> Vec<u8> {
    let mut v = record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes());

    let mut ftyp = Vec::new();
    ftyp.extend_from_slice(b"jp2 ");
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(b"jp2 ");
    v.extend(record(b"ftyp", &ftyp));

    v.extend(record(b"jp2h", &ihdr(480, 640)));

    v.extend_from_slice(&0u32.to_be_bytes());
    v.extend_from_slice(b"jp2c");
    v.extend_from_slice(tail);
    v
}

#[test]
fn read_single_signature_header() {
    let data = record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes());
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let hdr = read_box_header(&mut cur, len).expect("read_box_header failed");

    assert_eq!(hdr.start, 0);
    assert_eq!(hdr.size, 12);
    assert_eq!(hdr.typ, FourCC(*b"jP  "));
    assert_eq!(hdr.header_size, 8);
    assert_eq!(hdr.data_offset(), 8);
    assert!(!hdr.extends_to_end());
}

#[test]
fn four_record_stream() {
    let data = make_four_record_file(&[0xFF, 0x4F, 0xFF, 0xD9]);
    let total = data.len() as u64;
    let mut cur = Cursor::new(data);
    let mut scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    let sig = scanner.next_box().unwrap().unwrap();
    assert_eq!(sig.hdr.size, 12);
    match sig.value {
        BoxValue::Signature(s) => {
            assert_eq!(s.magic, 0x0D0A_870A);
            assert!(s.is_valid());
        }
        other => panic!("expected signature, got {:?}", other),
    }

    let ftyp = scanner.next_box().unwrap().unwrap();
    assert_eq!(ftyp.hdr.start, 12);
    assert_eq!(ftyp.hdr.size, 20);
    match ftyp.value {
        BoxValue::FileType(ft) => {
            assert_eq!(ft.brand, FourCC(*b"jp2 "));
            assert_eq!(ft.minor_version, 0);
            assert_eq!(ft.compatible_brands, vec![FourCC(*b"jp2 ")]);
            assert!(ft.is_jp2_compatible());
        }
        other => panic!("expected file type, got {:?}", other),
    }

    let jp2h = scanner.next_box().unwrap().unwrap();
    assert!(jp2h.is_superbox());
    assert_eq!(jp2h.hdr.size, 30);
    {
        let mut kids = scanner.children(&jp2h);
        let ih = kids.next_box().unwrap().unwrap();
        assert_eq!(ih.hdr.size, 22);
        match ih.value {
            BoxValue::ImageHeader(h) => {
                assert_eq!(h.width, 640);
                assert_eq!(h.height, 480);
                assert_eq!(h.components, 3);
                assert_eq!(h.depth(), Some(8));
            }
            other => panic!("expected image header, got {:?}", other),
        }
        assert!(kids.next_box().unwrap().is_none());
    }

    let jp2c = scanner.next_box().unwrap().unwrap();
    assert!(jp2c.hdr.extends_to_end());
    assert_eq!(jp2c.hdr.end(), total);
    match jp2c.value {
        BoxValue::Codestream(cs) => {
            assert_eq!(cs.offset, 70);
            assert_eq!(cs.length, 4);
        }
        other => panic!("expected codestream, got {:?}", other),
    }

    assert!(scanner.next_box().unwrap().is_none());
}

#[test]
fn records_are_contiguous() {
    let data = make_four_record_file(&[0u8; 16]);
    let mut cur = Cursor::new(data);
    let scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    let boxes: Vec<_> = scanner.collect::<Result<_, _>>().unwrap();
    assert_eq!(boxes.len(), 4);
    for w in boxes.windows(2) {
        assert_eq!(w[0].hdr.end(), w[1].hdr.start);
    }
}

#[test]
fn rescanning_is_deterministic() {
    let data = make_four_record_file(&[1, 2, 3]);
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let first = parse_children(&mut cur, Registry::standard(), 0, len).unwrap();
    let second = parse_children(&mut cur, Registry::standard(), 0, len).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[2].children.len(), 1);
}

#[test]
fn unknown_record_between_known_records() {
    let mut data = record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes());
    data.extend(record(b"zzzz", &[0xAB; 37]));
    data.extend(record(b"xml ", b"<a/>\0\0"));
    let mut cur = Cursor::new(data);

    let boxes: Vec<_> = BoxScanner::new(&mut cur, Registry::standard())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(boxes.len(), 3);
    assert!(matches!(boxes[0].value, BoxValue::Signature(_)));
    assert_eq!(boxes[1].value, BoxValue::Generic);
    assert_eq!(boxes[1].hdr.size, 45);
    match &boxes[2].value {
        BoxValue::Xml(x) => assert_eq!(x.text, "<a/>"),
        other => panic!("expected xml, got {:?}", other),
    }
}

#[test]
fn oversize_record_is_a_framing_error() {
    let mut data = record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes());
    data.extend_from_slice(&100u32.to_be_bytes());
    data.extend_from_slice(b"xml ");
    data.extend_from_slice(&[0u8; 8]);
    let mut cur = Cursor::new(data);
    let mut scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    assert!(scanner.next_box().unwrap().is_some());
    let err = scanner.next_box().unwrap_err();
    assert!(matches!(err, ParseError::Framing { offset: 12, .. }), "got {:?}", err);
    // cursor stays at the malformed record and the scanner is fused
    assert_eq!(scanner.position(), 12);
    assert!(scanner.next_box().unwrap().is_none());
}

#[test]
fn child_may_not_extend_past_its_parent() {
    // jp2h declares 16 bytes but its child claims 22
    let mut data = Vec::new();
    data.extend_from_slice(&16u32.to_be_bytes());
    data.extend_from_slice(b"jp2h");
    data.extend(ihdr(1, 1));
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let err = parse_children(&mut cur, Registry::standard(), 0, len).unwrap_err();
    assert!(matches!(err, ParseError::Framing { offset: 8, .. }), "got {:?}", err);
}

#[test]
fn short_tail_is_truncated() {
    let mut data = record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes());
    data.extend_from_slice(&[0, 0, 0]);
    let mut cur = Cursor::new(data);
    let mut scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    assert!(scanner.next_box().unwrap().is_some());
    let err = scanner.next_box().unwrap_err();
    assert!(
        matches!(err, ParseError::Truncated { offset: 12, needed: 8, available: 3 }),
        "got {:?}",
        err
    );
}

#[test]
fn range_past_stream_end_is_truncated() {
    let data = record(b"xml ", b"<x/>");
    let mut cur = Cursor::new(data);
    // caller claims the range is longer than the stream
    let mut scanner = BoxScanner::with_range(&mut cur, Registry::standard(), 0, 64).unwrap();
    assert!(scanner.next_box().unwrap().is_some());
    let err = scanner.next_box().unwrap_err();
    assert!(matches!(err, ParseError::Truncated { offset: 12, .. }), "got {:?}", err);
}

#[test]
fn length_below_header_size_is_rejected() {
    let mut data = Vec::new();
    data.extend_from_slice(&4u32.to_be_bytes());
    data.extend_from_slice(b"free");
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let err = read_box_header(&mut cur, len).unwrap_err();
    assert!(matches!(err, ParseError::Framing { .. }));
}

#[test]
fn extended_length_header() {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"xml ");
    data.extend_from_slice(&21u64.to_be_bytes());
    data.extend_from_slice(b"hello");
    let mut cur = Cursor::new(data);
    let mut scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    let b = scanner.next_box().unwrap().unwrap();
    assert_eq!(b.hdr.header_size, 16);
    assert_eq!(b.hdr.size, 21);
    assert_eq!(b.hdr.data_len(), 5);
    match b.value {
        BoxValue::Xml(x) => assert_eq!(x.text, "hello"),
        other => panic!("expected xml, got {:?}", other),
    }
}

#[test]
fn extended_length_needs_sixteen_bytes() {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"xml ");
    data.extend_from_slice(&[0, 0]);
    let mut cur = Cursor::new(data);
    let mut scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    let err = scanner.next_box().unwrap_err();
    assert!(matches!(err, ParseError::Truncated { needed: 16, .. }), "got {:?}", err);
}

#[test]
fn extended_length_of_zero_is_a_framing_error() {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"zzzz");
    data.extend_from_slice(&0u64.to_be_bytes());
    data.extend(record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes()));
    let mut cur = Cursor::new(data);
    let mut scanner = BoxScanner::new(&mut cur, Registry::standard()).unwrap();

    let err = scanner.next_box().unwrap_err();
    assert!(matches!(err, ParseError::Framing { offset: 0, .. }), "got {:?}", err);
    // the following record is not swallowed into a to-the-end record
    assert!(scanner.next_box().unwrap().is_none());
}

#[test]
fn extended_length_below_sixteen_is_a_framing_error() {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(b"xml ");
    data.extend_from_slice(&12u64.to_be_bytes());
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let err = read_box_header(&mut cur, len).unwrap_err();
    assert!(matches!(err, ParseError::Framing { offset: 0, .. }), "got {:?}", err);
}

#[test]
fn stray_bytes_inside_a_superbox_are_a_framing_error() {
    let mut payload = record(b"lbl ", b"ab");
    payload.extend_from_slice(&[0, 0, 0]);
    let data = record(b"asoc", &payload);
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let err = parse_children(&mut cur, Registry::standard(), 0, len).unwrap_err();
    assert!(matches!(err, ParseError::Framing { offset: 18, .. }), "got {:?}", err);
}

#[test]
fn stray_bytes_inside_a_superbox_followed_by_more_records() {
    let mut payload = record(b"lbl ", b"ab");
    payload.extend_from_slice(&[0, 0, 0]);
    let mut data = record(b"asoc", &payload);
    data.extend(record(b"xml ", b"<x/>"));
    let len = data.len() as u64;
    let mut cur = Cursor::new(data);

    let err = parse_children(&mut cur, Registry::standard(), 0, len).unwrap_err();
    assert!(matches!(err, ParseError::Framing { offset: 18, .. }), "got {:?}", err);
}

#[test]
fn short_payload_decodes_to_invalid() {
    let mut data = record(b"ihdr", &[0, 0, 0, 1]);
    data.extend(record(b"lbl ", b"after"));
    let mut cur = Cursor::new(data);

    let boxes: Vec<_> = BoxScanner::new(&mut cur, Registry::standard())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert!(matches!(boxes[0].value, BoxValue::Invalid { .. }));
    assert_eq!(boxes[1].value, BoxValue::Label("after".to_string()));
}

#[test]
fn listener_sees_every_record() {
    let mut data = record(b"jP  ", &SIGNATURE_MAGIC.to_be_bytes());
    data.extend(record(b"zzzz", &[]));
    data.extend(record(b"jp2h", &ihdr(2, 2)));
    let mut cur = Cursor::new(data);

    let mut seen: Vec<(FourCC, BoxClass)> = Vec::new();
    {
        let mut cb = |h: &BoxHeader, c: BoxClass| seen.push((h.typ, c));
        let mut scanner = BoxScanner::new(&mut cur, Registry::standard())
            .unwrap()
            .with_listener(&mut cb);
        while let Some(b) = scanner.next_box().unwrap() {
            if b.is_superbox() {
                let mut kids = scanner.children(&b);
                while kids.next_box().unwrap().is_some() {}
            }
        }
    }

    assert_eq!(
        seen,
        vec![
            (FourCC(*b"jP  "), BoxClass::Known),
            (FourCC(*b"zzzz"), BoxClass::Unknown),
            (FourCC(*b"jp2h"), BoxClass::Known),
            (FourCC(*b"ihdr"), BoxClass::Known),
        ]
    );
}
