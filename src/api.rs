use crate::{
    boxes::{BoxClass, BoxNode},
    codestream::{MainHeader, SegmentScanner},
    known_boxes::KnownBox,
    markers::{self, KnownMarker},
    parser::{BoxScanner, MAX_DEPTH, parse_children},
    registry::{BoxValue, Registry},
    segments::{SegmentRegistry, SegmentValue},
    util::{hex_dump, read_slice},
};
use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

/// A JSON-serializable representation of a single JP2 record.
///
/// This structure contains all the metadata and content information about a record,
/// making it suitable for serialization to JSON for use in UIs, CLIs, or APIs.
#[derive(Serialize)]
pub struct Jp2Box {
    /// Absolute byte offset of this record in the file
    pub offset: u64,
    /// Total size of this record including header and payload
    pub size: u64,
    /// Size of just the header (8 bytes, or 16 with an extended length)
    pub header_size: u64,
    /// Whether the record was written with length 0 ("to end of range")
    pub to_end: bool,
    /// Absolute offset where payload data starts
    pub payload_offset: u64,
    /// Size of payload data
    pub payload_size: u64,

    /// Four-character type code (e.g., "ftyp", "jp2h")
    pub typ: String,
    /// Classification: "super", "known" or "unknown"
    pub kind: String,
    /// Human-readable type name (e.g., "File Type Box")
    pub full_name: String,
    /// Decoded value if decode=true
    pub decoded: Option<BoxValue>,
    /// Child records of super-records
    pub children: Option<Vec<Jp2Box>>,
}

/// Parse a JP2 stream and return the complete record tree as JSON-serializable structures.
///
/// # Parameters
/// - `r`: A reader that implements `Read + Seek` (e.g., `File`, `Cursor<Vec<u8>>`)
/// - `size`: The number of bytes to parse (typically the file length)
/// - `decode`: Whether to include decoded values in the output
///
/// # Example
/// ```no_run
/// use jp2box::get_boxes;
/// use std::fs::File;
///
/// let mut file = File::open("image.jp2")?;
/// let size = file.metadata()?.len();
/// let boxes = get_boxes(&mut file, size, true)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_boxes<R: Read + Seek>(r: &mut R, size: u64, decode: bool) -> anyhow::Result<Vec<Jp2Box>> {
    let reg = Registry::standard();
    let nodes = parse_children(r, reg, 0, size)?;
    Ok(nodes.iter().map(|n| build_box(n, decode, reg)).collect())
}

/// Same as [`get_boxes`] over a file path.
pub fn analyze_file(path: impl AsRef<Path>, decode: bool) -> anyhow::Result<Vec<Jp2Box>> {
    let mut f = File::open(&path)?;
    let file_len = f.metadata()?.len();
    get_boxes(&mut f, file_len, decode)
}

fn classify(n: &BoxNode, reg: &Registry) -> BoxClass {
    if reg.is_known(n.hdr.typ) {
        BoxClass::Known
    } else {
        BoxClass::Unknown
    }
}

fn build_box(n: &BoxNode, decode: bool, reg: &Registry) -> Jp2Box {
    let hdr = &n.hdr;
    let kb = KnownBox::from(hdr.typ);

    let (kind, children) = if matches!(n.value, BoxValue::Super) {
        let kids = n.children.iter().map(|c| build_box(c, decode, reg)).collect();
        ("super".to_string(), Some(kids))
    } else {
        let kind = match classify(n, reg) {
            BoxClass::Known => "known",
            BoxClass::Unknown => "unknown",
        };
        (kind.to_string(), None)
    };

    Jp2Box {
        offset: hdr.start,
        size: hdr.size,
        header_size: hdr.header_size,
        to_end: hdr.extends_to_end(),
        payload_offset: hdr.data_offset(),
        payload_size: hdr.data_len(),

        typ: hdr.typ.to_string(),
        kind,
        full_name: kb.full_name().to_string(),
        decoded: if decode { Some(n.value.clone()) } else { None },
        children,
    }
}

/// A JSON-serializable codestream segment.
#[derive(Serialize)]
pub struct JsonSegment {
    pub offset: u64,
    pub marker: String,
    pub name: String,
    pub full_name: String,
    pub length: Option<u16>,
    pub decoded: Option<SegmentValue>,
}

/// List the segments of the codestream occupying `length` bytes at `offset`.
pub fn get_segments<R: Read + Seek>(
    r: &mut R,
    offset: u64,
    length: u64,
    decode: bool,
) -> anyhow::Result<Vec<JsonSegment>> {
    let scanner = SegmentScanner::new(r, SegmentRegistry::standard(), offset, length)?;
    let mut out = Vec::new();
    for seg in scanner {
        let seg = seg?;
        let km = KnownMarker::from(seg.hdr.marker);
        out.push(JsonSegment {
            offset: seg.hdr.offset,
            marker: format!("0x{:04X}", seg.hdr.marker),
            name: km.short_name().to_string(),
            full_name: km.full_name().to_string(),
            length: seg.hdr.length,
            decoded: if decode { Some(seg.value) } else { None },
        });
    }
    Ok(out)
}

/// Summary of the structural metadata of a JP2 file or raw codestream.
#[derive(Debug, Default, Serialize)]
pub struct ImageInfo {
    /// "jp2" or "j2k"
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compatible_brands: Vec<String>,

    pub width: u32,
    pub height: u32,
    pub components: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bits_per_component: Vec<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signed: Vec<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colourspace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles_x: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles_y: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition_levels: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progression_order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_block_size: Option<(u32, u32)>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub xml: Vec<String>,
}

/// Read the file structure and the codestream main header, without touching
/// tile data. Accepts JP2 files and raw codestreams starting with SOC.
pub fn read_image_info<R: Read + Seek>(r: &mut R) -> anyhow::Result<ImageInfo> {
    let size = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(0))?;
    let first = if size >= 2 { r.read_u16::<BigEndian>()? } else { 0 };

    let mut info = ImageInfo::default();
    let codestream = if first == markers::SOC {
        info.format = "j2k".to_string();
        Some((0, size))
    } else {
        info.format = "jp2".to_string();
        scan_file_format(r, &mut info)?
    };

    if let Some((offset, length)) = codestream {
        let mut scanner = SegmentScanner::new(r, SegmentRegistry::standard(), offset, length)?;
        let main = scanner.read_main_header()?;
        apply_main_header(&main, &mut info);
    }

    Ok(info)
}

fn scan_file_format<R: Read + Seek>(r: &mut R, info: &mut ImageInfo) -> anyhow::Result<Option<(u64, u64)>> {
    let mut scanner = BoxScanner::new(r, Registry::standard())?;
    let mut codestream = None;
    scan_records(&mut scanner, info, &mut codestream, 0)?;
    Ok(codestream)
}

// Header records are taken from jp2h; xml is collected at any depth.
fn scan_records<R: Read + Seek>(
    scanner: &mut BoxScanner<'_, R>,
    info: &mut ImageInfo,
    codestream: &mut Option<(u64, u64)>,
    depth: usize,
) -> anyhow::Result<()> {
    while let Some(b) = scanner.next_box()? {
        match &b.value {
            BoxValue::FileType(ft) if depth == 0 => {
                info.brand = Some(ft.brand.to_string());
                info.compatible_brands = ft.compatible_brands.iter().map(|c| c.to_string()).collect();
            }
            BoxValue::Super if &b.hdr.typ.0 == b"jp2h" => {
                let mut kids = scanner.children(&b);
                while let Some(c) = kids.next_box()? {
                    apply_header_record(&c.value, info);
                }
            }
            BoxValue::Super if depth < MAX_DEPTH => {
                let mut kids = scanner.children(&b);
                scan_records(&mut kids, info, codestream, depth + 1)?;
            }
            BoxValue::Xml(xml) => info.xml.push(xml.text.clone()),
            BoxValue::Codestream(cs) if depth == 0 && codestream.is_none() => {
                *codestream = Some((cs.offset, cs.length))
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_header_record(value: &BoxValue, info: &mut ImageInfo) {
    match value {
        BoxValue::ImageHeader(ih) => {
            info.width = ih.width;
            info.height = ih.height;
            info.components = ih.components;
            if let Some(depth) = ih.depth() {
                info.bits_per_component = vec![depth; ih.components as usize];
                info.signed = vec![ih.is_signed(); ih.components as usize];
            }
        }
        BoxValue::BitsPerComponent(bpc) => {
            info.bits_per_component = bpc.depths();
            info.signed = bpc.signed();
        }
        BoxValue::ColourSpecification(colr) if info.colourspace.is_none() => {
            let name = match (colr.colourspace_name(), &colr.icc_profile) {
                (Some(name), _) => name,
                (None, Some(_)) => "ICC profile",
                (None, None) => "unknown",
            };
            info.colourspace = Some(name.to_string());
        }
        _ => {}
    }
}

fn apply_main_header(main: &MainHeader, info: &mut ImageInfo) {
    if let Some(siz) = &main.siz {
        // the codestream is authoritative over the file-format header
        info.width = siz.image_width();
        info.height = siz.image_height();
        info.components = siz.component_count();
        info.bits_per_component = siz.components.iter().map(|c| c.precision()).collect();
        info.signed = siz.components.iter().map(|c| c.is_signed()).collect();
        info.tile_width = Some(siz.tile_width);
        info.tile_height = Some(siz.tile_height);
        info.tiles_x = Some(siz.tiles_x());
        info.tiles_y = Some(siz.tiles_y());
        info.tile_count = Some(siz.tile_count());
    }
    if let Some(cod) = &main.cod {
        info.decomposition_levels = Some(cod.decomposition_levels);
        info.layers = Some(cod.layers);
        info.progression_order = Some(cod.progression_order_name().to_string());
        info.transform = Some(cod.transform_name().to_string());
        info.code_block_size = Some((cod.code_block_width(), cod.code_block_height()));
    }
    info.comments = main.comments.iter().filter_map(|c| c.text.clone()).collect();
}

/// Result of a hex dump operation containing the formatted hex output.
#[derive(Serialize)]
pub struct HexDump {
    /// Starting offset of the dumped data
    pub offset: u64,
    /// Actual number of bytes that were read and dumped
    pub length: u64,
    /// Formatted hex dump string with addresses and ASCII representation
    pub hex: String,
}

/// Hex-dump a range of bytes.
///
/// This function never reads past `size`; if `offset + max_len` goes beyond it,
/// the returned length will be smaller than `max_len`.
///
/// ```no_run
/// use jp2box::hex_range;
/// use std::fs::File;
///
/// fn main() -> anyhow::Result<()> {
///     let mut file = File::open("image.jp2")?;
///     let size = file.metadata()?.len();
///     let dump = hex_range(&mut file, size, 0, 256)?;
///     println!("{}", dump.hex);
///     Ok(())
/// }
/// ```
pub fn hex_range<R: Read + Seek>(
    r: &mut R,
    size: u64,
    offset: u64,
    max_len: u64,
) -> anyhow::Result<HexDump> {
    let available = size.saturating_sub(offset);
    let to_read = available.min(max_len);

    if to_read == 0 {
        return Ok(HexDump {
            offset,
            length: 0,
            hex: String::new(),
        });
    }

    let data = read_slice(r, offset, to_read)?;
    Ok(HexDump {
        offset,
        length: to_read,
        hex: hex_dump(&data, offset),
    })
}
