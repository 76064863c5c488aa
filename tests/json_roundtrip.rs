use jp2box::{analyze_file, get_boxes};
use serde_json::{self, Value};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::PathBuf;

fn record(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

/// [jP] [ftyp] [jp2h [ihdr] [res [resc]]] [uuid] [jp2c (to end)]
fn make_minimal_jp2() -> Vec<u8> {
    let mut data = record(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);

    let mut ftyp = b"jp2 ".to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(b"jp2 ");
    data.extend(record(b"ftyp", &ftyp));

    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&32u32.to_be_bytes());
    ihdr.extend_from_slice(&64u32.to_be_bytes());
    ihdr.extend_from_slice(&1u16.to_be_bytes());
    ihdr.extend_from_slice(&[7, 7, 0, 0]);
    let resc = record(b"resc", &[0, 72, 0, 1, 0, 72, 0, 1, 0, 0]);
    let mut jp2h = record(b"ihdr", &ihdr);
    jp2h.extend(record(b"res ", &resc));
    data.extend(record(b"jp2h", &jp2h));

    let mut uuid = vec![0xBE; 16];
    uuid.extend_from_slice(b"vendor");
    data.extend(record(b"uuid", &uuid));

    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"jp2c");
    data.extend_from_slice(&[0xFF, 0x4F, 0xFF, 0xD9]);
    data
}

fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    let mut f = File::create(&path).expect("create temp file failed");
    f.write_all(bytes).expect("write temp data failed");
    path
}

#[test]
fn analyze_and_serialize_to_json() {
    let data = make_minimal_jp2();
    let size = data.len() as u64;
    let mut cur = Cursor::new(data);

    let boxes = get_boxes(&mut cur, size, /*decode=*/ false).expect("get_boxes failed");
    assert_eq!(boxes.len(), 5);
    assert_eq!(boxes[0].typ, "jP  ");
    assert_eq!(boxes[0].size, 12);
    assert_eq!(boxes[0].header_size, 8);
    assert_eq!(boxes[0].payload_size, 4);
    assert!(boxes[0].decoded.is_none());

    let json_str = serde_json::to_string(&boxes).expect("serialize to JSON failed");
    let v: Value = serde_json::from_str(&json_str).expect("parse JSON failed");
    let arr = v.as_array().expect("array");

    let jp2h = &arr[2];
    assert_eq!(jp2h["typ"], "jp2h");
    assert_eq!(jp2h["kind"], "super");
    assert_eq!(jp2h["full_name"], "JP2 Header Box");
    let kids = jp2h["children"].as_array().expect("children");
    assert_eq!(kids[0]["typ"], "ihdr");
    assert_eq!(kids[1]["kind"], "super");
    assert_eq!(kids[1]["children"][0]["typ"], "resc");

    let jp2c = &arr[4];
    assert_eq!(jp2c["to_end"], true);
    assert_eq!(jp2c["payload_size"], 4);
    assert!(jp2c["children"].is_null());
}

#[test]
fn decoded_values_in_json() {
    let data = make_minimal_jp2();
    let size = data.len() as u64;
    let mut cur = Cursor::new(data);

    let boxes = get_boxes(&mut cur, size, true).unwrap();
    let v = serde_json::to_value(&boxes).unwrap();

    assert_eq!(v[0]["decoded"]["Signature"]["magic"], 0x0D0A_870A);
    assert_eq!(v[1]["decoded"]["FileType"]["brand"], "jp2 ");
    assert_eq!(v[2]["decoded"], "Super");
    assert_eq!(v[2]["children"][0]["decoded"]["ImageHeader"]["width"], 64);
    assert_eq!(v[3]["decoded"]["Uuid"]["id"], "be".repeat(16));
    assert_eq!(v[3]["decoded"]["Uuid"]["data"], hex::encode(b"vendor"));
    assert_eq!(v[4]["decoded"]["Codestream"]["offset"], v[4]["payload_offset"]);
}

#[test]
fn analyze_file_matches_in_memory_parse() {
    let data = make_minimal_jp2();
    let path = temp_file("jp2box_json_roundtrip_test.jp2", &data);

    let from_file = analyze_file(&path, true).expect("analyze_file failed");
    let size = data.len() as u64;
    let from_memory = get_boxes(&mut Cursor::new(data), size, true).unwrap();

    assert_eq!(
        serde_json::to_value(&from_file).unwrap(),
        serde_json::to_value(&from_memory).unwrap()
    );
}
