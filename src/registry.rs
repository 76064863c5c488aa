use crate::boxes::{BoxHeader, FourCC};
use crate::known_boxes::KnownBox;
use anyhow::{anyhow, bail};
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::OnceLock;

/// `<CR><LF><0x87><LF>`, the content of a well-formed signature record.
pub const SIGNATURE_MAGIC: u32 = 0x0D0A_870A;

/// The `jp2 ` brand.
pub const BRAND_JP2: FourCC = FourCC(*b"jp2 ");

/// A value returned from a record decoder.
///
/// One variant per record kind the standard registry understands, plus the
/// placeholder variants used for super-records, unregistered type codes and
/// payloads a decoder could not make sense of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoxValue {
    Signature(SignatureData),
    FileType(FileTypeData),
    ImageHeader(ImageHeaderData),
    BitsPerComponent(BitsPerComponentData),
    ColourSpecification(ColourSpecificationData),
    Palette(PaletteData),
    ComponentMapping(ComponentMappingData),
    ChannelDefinition(ChannelDefinitionData),
    Resolution(ResolutionData),
    Xml(XmlData),
    Label(String),
    Uuid(UuidData),
    UuidList(UuidListData),
    DataEntryUrl(DataEntryUrlData),
    IntellectualProperty { length: u64 },
    Codestream(CodestreamData),
    /// Payload is a sequence of child records; scan it with [`crate::parser::BoxScanner::children`].
    Super,
    /// Unregistered type code, payload left uninterpreted.
    Generic,
    /// A registered decoder rejected the payload.
    Invalid { reason: String },
}

/// Signature Box (jP\040\040)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureData {
    pub magic: u32,
}

impl SignatureData {
    pub fn is_valid(&self) -> bool {
        self.magic == SIGNATURE_MAGIC
    }
}

/// File Type Box (ftyp)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileTypeData {
    pub brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl FileTypeData {
    /// A reader for plain JP2 can interpret the file when `jp2 ` is listed as compatible.
    pub fn is_jp2_compatible(&self) -> bool {
        self.compatible_brands.contains(&BRAND_JP2)
    }
}

/// Image Header Box (ihdr)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageHeaderData {
    pub height: u32,
    pub width: u32,
    pub components: u16,
    /// Raw BPC byte; 255 means the depths are given by a `bpcc` record.
    pub bits_per_component: u8,
    pub compression: u8,
    pub colourspace_unknown: u8,
    pub intellectual_property: u8,
}

impl ImageHeaderData {
    /// Component bit depth, or `None` when components differ in depth.
    pub fn depth(&self) -> Option<u8> {
        if self.bits_per_component == 0xFF {
            None
        } else {
            Some((self.bits_per_component & 0x7F) + 1)
        }
    }

    pub fn is_signed(&self) -> bool {
        self.bits_per_component != 0xFF && self.bits_per_component & 0x80 != 0
    }
}

/// Bits Per Component Box (bpcc)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitsPerComponentData {
    pub values: Vec<u8>,
}

impl BitsPerComponentData {
    pub fn depths(&self) -> Vec<u8> {
        self.values.iter().map(|v| (v & 0x7F) + 1).collect()
    }

    pub fn signed(&self) -> Vec<bool> {
        self.values.iter().map(|v| v & 0x80 != 0).collect()
    }
}

/// Colour Specification Box (colr)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColourSpecificationData {
    pub method: u8,
    pub precedence: i8,
    pub approximation: u8,
    pub enumerated_colourspace: Option<u32>,
    #[serde(serialize_with = "ser_hex_opt")]
    pub icc_profile: Option<Vec<u8>>,
}

impl ColourSpecificationData {
    pub fn colourspace_name(&self) -> Option<&'static str> {
        match self.enumerated_colourspace? {
            16 => Some("sRGB"),
            17 => Some("greyscale"),
            18 => Some("sYCC"),
            _ => Some("unknown"),
        }
    }
}

/// Palette Box (pclr). Palette entries themselves are not kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaletteData {
    pub entries: u16,
    pub columns: u8,
    pub depths: Vec<u8>,
}

/// Component Mapping Box (cmap)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentMappingData {
    pub mappings: Vec<ComponentMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentMapping {
    pub component: u16,
    pub mapping_type: u8,
    pub palette_column: u8,
}

/// Channel Definition Box (cdef)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDefinitionData {
    pub channels: Vec<ChannelDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDefinition {
    pub index: u16,
    pub channel_type: u16,
    pub association: u16,
}

/// Capture (resc) or Default Display (resd) Resolution Box
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionData {
    pub display: bool,
    pub vertical_numerator: u16,
    pub vertical_denominator: u16,
    pub horizontal_numerator: u16,
    pub horizontal_denominator: u16,
    pub vertical_exponent: i8,
    pub horizontal_exponent: i8,
}

impl ResolutionData {
    /// Grid points per metre, vertically.
    pub fn vertical(&self) -> Option<f64> {
        resolution(self.vertical_numerator, self.vertical_denominator, self.vertical_exponent)
    }

    /// Grid points per metre, horizontally.
    pub fn horizontal(&self) -> Option<f64> {
        resolution(self.horizontal_numerator, self.horizontal_denominator, self.horizontal_exponent)
    }
}

fn resolution(num: u16, den: u16, exp: i8) -> Option<f64> {
    if den == 0 {
        return None;
    }
    Some(num as f64 / den as f64 * 10f64.powi(exp as i32))
}

/// XML Box (xml\040)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmlData {
    pub text: String,
}

/// UUID Box (uuid)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UuidData {
    #[serde(serialize_with = "ser_hex")]
    pub id: [u8; 16],
    #[serde(serialize_with = "ser_hex")]
    pub data: Vec<u8>,
}

/// UUID List Box (ulst)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UuidListData {
    #[serde(serialize_with = "ser_hex_list")]
    pub ids: Vec<[u8; 16]>,
}

/// Data Entry URL Box (url\040)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataEntryUrlData {
    pub version: u8,
    pub flags: u32,
    pub location: String,
}

/// Contiguous Codestream Box (jp2c). Only the location of the codestream is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodestreamData {
    pub offset: u64,
    pub length: u64,
}

/// Trait for record payload decoders.
///
/// A decoder receives a reader limited to exactly the record's payload and
/// returns a [`BoxValue`]. Where the reader ends up afterwards does not
/// matter; the scanner always moves on by the declared record length.
pub trait BoxDecoder: Send + Sync {
    fn decode(&self, r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue>;
}

/// Registry of decoders keyed by type code, plus the set of super-record types.
///
/// The registry is immutable once constructed; use [`Registry::with_decoder`]
/// and [`Registry::with_superbox`] to build it fluently.
pub struct Registry {
    map: HashMap<FourCC, BoxDecoderEntry>,
    superboxes: HashSet<FourCC>,
}

struct BoxDecoderEntry {
    inner: Box<dyn BoxDecoder>,
    name: String,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            superboxes: HashSet::new(),
        }
    }

    /// The standard registry, built once and shared.
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(default_registry)
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for debugging / logging.
    pub fn with_decoder(mut self, typ: FourCC, name: &str, dec: Box<dyn BoxDecoder>) -> Self {
        self.map.insert(
            typ,
            BoxDecoderEntry {
                inner: dec,
                name: name.to_string(),
            },
        );
        self
    }

    /// Return a new registry where `typ` is scanned as a super-record.
    pub fn with_superbox(mut self, typ: FourCC) -> Self {
        self.superboxes.insert(typ);
        self
    }

    pub fn is_superbox(&self, typ: FourCC) -> bool {
        self.superboxes.contains(&typ)
    }

    /// Whether records of this type decode to anything but [`BoxValue::Generic`].
    pub fn is_known(&self, typ: FourCC) -> bool {
        self.is_superbox(typ) || self.map.contains_key(&typ)
    }

    pub fn decoder_name(&self, typ: FourCC) -> Option<&str> {
        self.map.get(&typ).map(|d| d.name.as_str())
    }

    /// Try to decode the payload of a record using a registered decoder.
    ///
    /// Returns `None` if no decoder exists for the given type code.
    pub fn decode(
        &self,
        typ: FourCC,
        r: &mut dyn Read,
        hdr: &BoxHeader,
    ) -> Option<anyhow::Result<BoxValue>> {
        self.map.get(&typ).map(|d| d.inner.decode(r, hdr))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Helpers ----------

fn read_all(r: &mut dyn Read) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_fourcc(r: &mut dyn Read) -> std::io::Result<FourCC> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(FourCC(b))
}

fn text_without_padding(mut bytes: Vec<u8>) -> String {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).to_string()
}

fn ser_hex<S: Serializer, T: AsRef<[u8]>>(bytes: &T, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

fn ser_hex_opt<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&hex::encode(b)),
        None => s.serialize_none(),
    }
}

fn ser_hex_list<S: Serializer>(ids: &[[u8; 16]], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(ids.iter().map(hex::encode))
}

// ---------- Decoders ----------

// jP\040\040: 4-byte magic
pub struct SignatureDecoder;

impl BoxDecoder for SignatureDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let magic = r.read_u32::<BigEndian>()?;
        if magic != SIGNATURE_MAGIC {
            log::warn!("signature magic 0x{:08x} does not match 0x{:08x}", magic, SIGNATURE_MAGIC);
        }
        Ok(BoxValue::Signature(SignatureData { magic }))
    }
}

// ftyp: brand + minor version + compatibility list
pub struct FtypDecoder;

impl BoxDecoder for FtypDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let buf = read_all(r)?;
        if buf.len() < 8 {
            bail!("ftyp: payload too short ({} bytes)", buf.len());
        }

        let brand = FourCC([buf[0], buf[1], buf[2], buf[3]]);
        let minor_version = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        // The number of CL fields is determined by the length of the box;
        // a ragged tail is ignored.
        let compatible_brands = buf[8..]
            .chunks_exact(4)
            .map(|c| FourCC([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(BoxValue::FileType(FileTypeData {
            brand,
            minor_version,
            compatible_brands,
        }))
    }
}

// ihdr: HEIGHT, WIDTH, NC, BPC, C, UnkC, IPR
pub struct IhdrDecoder;

impl BoxDecoder for IhdrDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let height = r.read_u32::<BigEndian>()?;
        let width = r.read_u32::<BigEndian>()?;
        let components = r.read_u16::<BigEndian>()?;
        let bits_per_component = r.read_u8()?;
        let compression = r.read_u8()?;
        let colourspace_unknown = r.read_u8()?;
        let intellectual_property = r.read_u8()?;

        Ok(BoxValue::ImageHeader(ImageHeaderData {
            height,
            width,
            components,
            bits_per_component,
            compression,
            colourspace_unknown,
            intellectual_property,
        }))
    }
}

// bpcc: one byte per component
pub struct BpccDecoder;

impl BoxDecoder for BpccDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let values = read_all(r)?;
        Ok(BoxValue::BitsPerComponent(BitsPerComponentData { values }))
    }
}

// colr: METH, PREC, APPROX, then EnumCS or an ICC profile
pub struct ColrDecoder;

impl BoxDecoder for ColrDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let method = r.read_u8()?;
        let precedence = r.read_i8()?;
        let approximation = r.read_u8()?;

        let (enumerated_colourspace, icc_profile) = match method {
            1 => (Some(r.read_u32::<BigEndian>()?), None),
            // restricted / any ICC profile
            2 | 3 => (None, Some(read_all(r)?)),
            _ => (None, None),
        };

        Ok(BoxValue::ColourSpecification(ColourSpecificationData {
            method,
            precedence,
            approximation,
            enumerated_colourspace,
            icc_profile,
        }))
    }
}

// pclr: NE, NPC, B[NPC]; the palette entries are skipped
pub struct PclrDecoder;

impl BoxDecoder for PclrDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let entries = r.read_u16::<BigEndian>()?;
        let columns = r.read_u8()?;
        let mut depths = vec![0u8; columns as usize];
        r.read_exact(&mut depths)?;
        Ok(BoxValue::Palette(PaletteData {
            entries,
            columns,
            depths,
        }))
    }
}

// cmap: (CMP, MTYP, PCOL) per channel
pub struct CmapDecoder;

impl BoxDecoder for CmapDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let buf = read_all(r)?;
        let mappings = buf
            .chunks_exact(4)
            .map(|c| ComponentMapping {
                component: u16::from_be_bytes([c[0], c[1]]),
                mapping_type: c[2],
                palette_column: c[3],
            })
            .collect();
        Ok(BoxValue::ComponentMapping(ComponentMappingData { mappings }))
    }
}

// cdef: N, then (Cn, Typ, Asoc) triples
pub struct CdefDecoder;

impl BoxDecoder for CdefDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let count = r.read_u16::<BigEndian>()?;
        let mut channels = Vec::with_capacity(count as usize);
        for _ in 0..count {
            channels.push(ChannelDefinition {
                index: r.read_u16::<BigEndian>()?,
                channel_type: r.read_u16::<BigEndian>()?,
                association: r.read_u16::<BigEndian>()?,
            });
        }
        Ok(BoxValue::ChannelDefinition(ChannelDefinitionData { channels }))
    }
}

// resc / resd: VR_N, VR_D, HR_N, HR_D, VR_E, HR_E
pub struct ResolutionDecoder;

impl BoxDecoder for ResolutionDecoder {
    fn decode(&self, r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        Ok(BoxValue::Resolution(ResolutionData {
            display: &hdr.typ.0 == b"resd",
            vertical_numerator: r.read_u16::<BigEndian>()?,
            vertical_denominator: r.read_u16::<BigEndian>()?,
            horizontal_numerator: r.read_u16::<BigEndian>()?,
            horizontal_denominator: r.read_u16::<BigEndian>()?,
            vertical_exponent: r.read_i8()?,
            horizontal_exponent: r.read_i8()?,
        }))
    }
}

// xml / lbl: text, NUL padding stripped
pub struct TextDecoder;

impl BoxDecoder for TextDecoder {
    fn decode(&self, r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let text = text_without_padding(read_all(r)?);
        if &hdr.typ.0 == b"lbl " {
            Ok(BoxValue::Label(text))
        } else {
            Ok(BoxValue::Xml(XmlData { text }))
        }
    }
}

// uuid: 16-byte id + vendor data
pub struct UuidDecoder;

impl BoxDecoder for UuidDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let mut id = [0u8; 16];
        r.read_exact(&mut id)?;
        let data = read_all(r)?;
        Ok(BoxValue::Uuid(UuidData { id, data }))
    }
}

// ulst: NU, then NU ids
pub struct UlstDecoder;

impl BoxDecoder for UlstDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let count = r.read_u16::<BigEndian>()?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut id = [0u8; 16];
            r.read_exact(&mut id)?;
            ids.push(id);
        }
        Ok(BoxValue::UuidList(UuidListData { ids }))
    }
}

// url\040: VERS, FLAG (24 bits), NUL-terminated location
pub struct UrlDecoder;

impl BoxDecoder for UrlDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let buf = read_all(r)?;
        if buf.len() < 4 {
            return Err(anyhow!("url: payload too short ({} bytes)", buf.len()));
        }
        let mut cur = Cursor::new(&buf);
        let version = cur.read_u8()?;
        let flags = cur.read_u24::<BigEndian>()?;
        let location = text_without_padding(buf[4..].to_vec());
        Ok(BoxValue::DataEntryUrl(DataEntryUrlData {
            version,
            flags,
            location,
        }))
    }
}

// jp2i: contents left to the application
pub struct IprDecoder;

impl BoxDecoder for IprDecoder {
    fn decode(&self, _r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        Ok(BoxValue::IntellectualProperty {
            length: hdr.data_len(),
        })
    }
}

// jp2c: nothing is read here, see `crate::codestream::SegmentScanner`
pub struct CodestreamDecoder;

impl BoxDecoder for CodestreamDecoder {
    fn decode(&self, _r: &mut dyn Read, hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        Ok(BoxValue::Codestream(CodestreamData {
            offset: hdr.data_offset(),
            length: hdr.data_len(),
        }))
    }
}

/// Registry with decoders for the JP2 record types and all known super-records.
pub fn default_registry() -> Registry {
    let reg = Registry::new()
        .with_decoder(FourCC(*b"jP  "), "jP", Box::new(SignatureDecoder))
        .with_decoder(FourCC(*b"ftyp"), "ftyp", Box::new(FtypDecoder))
        .with_decoder(FourCC(*b"ihdr"), "ihdr", Box::new(IhdrDecoder))
        .with_decoder(FourCC(*b"bpcc"), "bpcc", Box::new(BpccDecoder))
        .with_decoder(FourCC(*b"colr"), "colr", Box::new(ColrDecoder))
        .with_decoder(FourCC(*b"pclr"), "pclr", Box::new(PclrDecoder))
        .with_decoder(FourCC(*b"cmap"), "cmap", Box::new(CmapDecoder))
        .with_decoder(FourCC(*b"cdef"), "cdef", Box::new(CdefDecoder))
        .with_decoder(FourCC(*b"resc"), "resc", Box::new(ResolutionDecoder))
        .with_decoder(FourCC(*b"resd"), "resd", Box::new(ResolutionDecoder))
        .with_decoder(FourCC(*b"xml "), "xml", Box::new(TextDecoder))
        .with_decoder(FourCC(*b"lbl "), "lbl", Box::new(TextDecoder))
        .with_decoder(FourCC(*b"uuid"), "uuid", Box::new(UuidDecoder))
        .with_decoder(FourCC(*b"ulst"), "ulst", Box::new(UlstDecoder))
        .with_decoder(FourCC(*b"url "), "url", Box::new(UrlDecoder))
        .with_decoder(FourCC(*b"jp2i"), "jp2i", Box::new(IprDecoder))
        .with_decoder(FourCC(*b"jp2c"), "jp2c", Box::new(CodestreamDecoder));

    KnownBox::ALL
        .iter()
        .filter(|kb| kb.is_superbox())
        .fold(reg, |reg, kb| reg.with_superbox(kb.fourcc()))
}
