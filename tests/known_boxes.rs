use jp2box::boxes::FourCC;
use jp2box::known_boxes::KnownBox;
use jp2box::markers::{self, KnownMarker};
use jp2box::registry::Registry;

#[test]
fn known_box_from_ftyp() {
    let kb = KnownBox::from(FourCC(*b"ftyp"));
    assert!(matches!(kb, KnownBox::FileType));
    assert_eq!(kb.full_name(), "File Type Box");
}

#[test]
fn known_box_classifies_superbox() {
    for typ in [b"jp2h", b"res ", b"uinf", b"asoc"] {
        assert!(KnownBox::from(FourCC(*typ)).is_superbox(), "{:?}", typ);
    }
    assert!(!KnownBox::from(FourCC(*b"ihdr")).is_superbox());
    assert!(!KnownBox::from(FourCC(*b"jp2c")).is_superbox());
}

#[test]
fn unknown_type_round_trips_its_code() {
    let kb = KnownBox::from(FourCC(*b"abcd"));
    assert_eq!(kb, KnownBox::Unknown(FourCC(*b"abcd")));
    assert_eq!(kb.fourcc(), FourCC(*b"abcd"));
    assert_eq!(kb.full_name(), "Unknown Box");
}

#[test]
fn every_known_type_maps_back_to_itself() {
    for kb in KnownBox::ALL {
        assert_eq!(KnownBox::from(kb.fourcc()), kb);
    }
}

#[test]
fn standard_registry_agrees_with_known_superboxes() {
    let reg = Registry::standard();
    for kb in KnownBox::ALL {
        assert_eq!(reg.is_superbox(kb.fourcc()), kb.is_superbox(), "{:?}", kb);
    }
}

#[test]
fn marker_names() {
    assert_eq!(KnownMarker::from(markers::SIZ).short_name(), "SIZ");
    assert_eq!(KnownMarker::from(markers::COD).full_name(), "Coding style default");
    assert_eq!(KnownMarker::from(0xFF77), KnownMarker::Unknown(0xFF77));
    assert!(markers::is_reserved_standalone(0xFF30));
    assert!(!markers::is_reserved_standalone(0xFF40));
}
