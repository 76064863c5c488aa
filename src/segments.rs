use crate::codestream::SegmentHeader;
use crate::markers;
use anyhow::bail;
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::OnceLock;

/// Precinct exponent used when COD signals no precinct list (2^15).
pub const DEFAULT_PRECINCT_EXPONENT: u8 = 15;

/// A value returned from a segment decoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SegmentValue {
    ImageAndTileSize(ImageAndTileSize),
    CodingStyleDefault(CodingStyleDefault),
    QuantizationDefault(QuantizationDefault),
    Comment(Comment),
    StartOfTile(StartOfTile),
    /// Stand-alone marker, no body.
    Marker,
    /// Unregistered marker; the body is left uninterpreted.
    Generic,
    /// A registered decoder rejected the body.
    Invalid { reason: String },
}

/// SIZ: image and tile size
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAndTileSize {
    /// Rsiz
    pub capabilities: u16,
    /// Xsiz, Ysiz
    pub width: u32,
    pub height: u32,
    /// XOsiz, YOsiz
    pub x_origin: u32,
    pub y_origin: u32,
    /// XTsiz, YTsiz
    pub tile_width: u32,
    pub tile_height: u32,
    /// XTOsiz, YTOsiz
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub components: Vec<ComponentSize>,
}

/// Ssiz, XRsiz, YRsiz of one component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSize {
    pub ssiz: u8,
    pub x_separation: u8,
    pub y_separation: u8,
}

impl ComponentSize {
    pub fn precision(&self) -> u8 {
        (self.ssiz & 0x7F) + 1
    }

    pub fn is_signed(&self) -> bool {
        self.ssiz & 0x80 != 0
    }
}

fn ceil_div(a: u32, b: u32) -> u32 {
    if b == 0 { 0 } else { a.div_ceil(b) }
}

impl ImageAndTileSize {
    pub fn component_count(&self) -> u16 {
        self.components.len() as u16
    }

    pub fn image_width(&self) -> u32 {
        self.width.saturating_sub(self.x_origin)
    }

    pub fn image_height(&self) -> u32 {
        self.height.saturating_sub(self.y_origin)
    }

    /// Number of tile columns: `ceil((Xsiz - XTOsiz) / XTsiz)`.
    pub fn tiles_x(&self) -> u32 {
        ceil_div(self.width.saturating_sub(self.tile_x_origin), self.tile_width)
    }

    /// Number of tile rows: `ceil((Ysiz - YTOsiz) / YTsiz)`.
    pub fn tiles_y(&self) -> u32 {
        ceil_div(self.height.saturating_sub(self.tile_y_origin), self.tile_height)
    }

    pub fn tile_count(&self) -> u64 {
        self.tiles_x() as u64 * self.tiles_y() as u64
    }

    /// Width of component `c` on its own sub-sampled grid.
    pub fn component_width(&self, c: usize) -> Option<u32> {
        let comp = self.components.get(c)?;
        let dx = comp.x_separation as u32;
        Some(ceil_div(self.width, dx).saturating_sub(ceil_div(self.x_origin, dx)))
    }

    /// Height of component `c` on its own sub-sampled grid.
    pub fn component_height(&self, c: usize) -> Option<u32> {
        let comp = self.components.get(c)?;
        let dy = comp.y_separation as u32;
        Some(ceil_div(self.height, dy).saturating_sub(ceil_div(self.y_origin, dy)))
    }
}

/// COD: coding style default
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodingStyleDefault {
    /// Scod
    pub style: u8,
    pub progression_order: u8,
    pub layers: u16,
    pub multiple_component_transform: u8,
    pub decomposition_levels: u8,
    /// xcb, ycb (code-block size is `2^(value + 2)`)
    pub code_block_width_exponent: u8,
    pub code_block_height_exponent: u8,
    pub code_block_style: u8,
    pub transform: u8,
    /// PPx in the low nibble, PPy in the high nibble; empty unless Scod bit 0 is set.
    pub precincts: Vec<u8>,
}

impl CodingStyleDefault {
    pub fn uses_precincts(&self) -> bool {
        self.style & 0x01 != 0
    }

    pub fn uses_sop(&self) -> bool {
        self.style & 0x02 != 0
    }

    pub fn uses_eph(&self) -> bool {
        self.style & 0x04 != 0
    }

    pub fn code_block_width(&self) -> u32 {
        1u32 << (self.code_block_width_exponent.min(29) + 2)
    }

    pub fn code_block_height(&self) -> u32 {
        1u32 << (self.code_block_height_exponent.min(29) + 2)
    }

    pub fn progression_order_name(&self) -> &'static str {
        match self.progression_order {
            0 => "LRCP",
            1 => "RLCP",
            2 => "RPCL",
            3 => "PCRL",
            4 => "CPRL",
            _ => "reserved",
        }
    }

    pub fn transform_name(&self) -> &'static str {
        match self.transform {
            0 => "9-7 irreversible",
            1 => "5-3 reversible",
            _ => "reserved",
        }
    }

    /// Precinct (width, height) per resolution level, lowest resolution first.
    pub fn precinct_sizes(&self) -> Vec<(u32, u32)> {
        if !self.uses_precincts() {
            let side = 1u32 << DEFAULT_PRECINCT_EXPONENT;
            return vec![(side, side); self.decomposition_levels as usize + 1];
        }
        self.precincts
            .iter()
            .map(|b| (1u32 << (b & 0x0F), 1u32 << (b >> 4)))
            .collect()
    }
}

/// QCD: quantization default
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantizationDefault {
    /// Sqcd
    pub style: u8,
    /// SPqcd, widened to 16 bits
    pub values: Vec<u16>,
}

impl QuantizationDefault {
    /// 0 = none, 1 = scalar derived, 2 = scalar expounded.
    pub fn quantization_type(&self) -> u8 {
        self.style & 0x1F
    }

    pub fn guard_bits(&self) -> u8 {
        self.style >> 5
    }

    pub fn style_name(&self) -> &'static str {
        match self.quantization_type() {
            0 => "no quantization",
            1 => "scalar derived",
            2 => "scalar expounded",
            _ => "reserved",
        }
    }

    pub fn exponents(&self) -> Vec<u8> {
        if self.quantization_type() == 0 {
            self.values.iter().map(|v| ((v >> 3) & 0x1F) as u8).collect()
        } else {
            self.values.iter().map(|v| ((v >> 11) & 0x1F) as u8).collect()
        }
    }

    /// Step size mantissas; empty without quantization.
    pub fn mantissas(&self) -> Vec<u16> {
        if self.quantization_type() == 0 {
            Vec::new()
        } else {
            self.values.iter().map(|v| v & 0x07FF).collect()
        }
    }
}

/// COM: comment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    /// Rcom: 0 = binary, 1 = Latin-1 text
    pub registration: u16,
    pub text: Option<String>,
    #[serde(serialize_with = "ser_hex_opt")]
    pub data: Option<Vec<u8>>,
}

/// SOT: start of tile-part
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartOfTile {
    pub tile_index: u16,
    /// Psot: bytes from the SOT marker to the end of the tile-part, 0 = up to EOC
    pub tile_part_length: u32,
    pub tile_part_index: u8,
    pub tile_part_count: u8,
}

fn ser_hex_opt<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&hex::encode(b)),
        None => s.serialize_none(),
    }
}

/// Trait for segment body decoders.
///
/// The reader is limited to the segment body (`Lxxx - 2` bytes, after the
/// length field).
pub trait SegmentDecoder: Send + Sync {
    fn decode(&self, r: &mut dyn Read, hdr: &SegmentHeader) -> anyhow::Result<SegmentValue>;
}

/// Registry of segment decoders keyed by marker code, plus the stand-alone markers.
pub struct SegmentRegistry {
    map: HashMap<u16, SegmentDecoderEntry>,
    standalone: HashSet<u16>,
}

struct SegmentDecoderEntry {
    inner: Box<dyn SegmentDecoder>,
    name: String,
}

impl SegmentRegistry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            standalone: HashSet::new(),
        }
    }

    /// The standard registry, built once and shared.
    pub fn standard() -> &'static SegmentRegistry {
        static STANDARD: OnceLock<SegmentRegistry> = OnceLock::new();
        STANDARD.get_or_init(default_segment_registry)
    }

    pub fn with_decoder(mut self, marker: u16, name: &str, dec: Box<dyn SegmentDecoder>) -> Self {
        self.map.insert(
            marker,
            SegmentDecoderEntry {
                inner: dec,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_standalone(mut self, marker: u16) -> Self {
        self.standalone.insert(marker);
        self
    }

    /// Stand-alone markers have neither length field nor body.
    pub fn is_standalone(&self, marker: u16) -> bool {
        self.standalone.contains(&marker) || markers::is_reserved_standalone(marker)
    }

    pub fn decoder_name(&self, marker: u16) -> Option<&str> {
        self.map.get(&marker).map(|d| d.name.as_str())
    }

    /// Returns `None` if no decoder exists for the marker.
    pub fn decode(
        &self,
        marker: u16,
        r: &mut dyn Read,
        hdr: &SegmentHeader,
    ) -> Option<anyhow::Result<SegmentValue>> {
        self.map.get(&marker).map(|d| d.inner.decode(r, hdr))
    }
}

impl Default for SegmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Decoders ----------

// A.5.1 SIZ: Rsiz, Xsiz, Ysiz, XOsiz, YOsiz, XTsiz, YTsiz, XTOsiz, YTOsiz, Csiz, then per component
pub struct SizDecoder;

impl SegmentDecoder for SizDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &SegmentHeader) -> anyhow::Result<SegmentValue> {
        let capabilities = r.read_u16::<BigEndian>()?;
        let width = r.read_u32::<BigEndian>()?;
        let height = r.read_u32::<BigEndian>()?;
        let x_origin = r.read_u32::<BigEndian>()?;
        let y_origin = r.read_u32::<BigEndian>()?;
        let tile_width = r.read_u32::<BigEndian>()?;
        let tile_height = r.read_u32::<BigEndian>()?;
        let tile_x_origin = r.read_u32::<BigEndian>()?;
        let tile_y_origin = r.read_u32::<BigEndian>()?;
        let count = r.read_u16::<BigEndian>()?;

        let mut components = Vec::with_capacity(count as usize);
        for _ in 0..count {
            components.push(ComponentSize {
                ssiz: r.read_u8()?,
                x_separation: r.read_u8()?,
                y_separation: r.read_u8()?,
            });
        }

        Ok(SegmentValue::ImageAndTileSize(ImageAndTileSize {
            capabilities,
            width,
            height,
            x_origin,
            y_origin,
            tile_width,
            tile_height,
            tile_x_origin,
            tile_y_origin,
            components,
        }))
    }
}

// A.6.1 COD: Scod, SGcod (order, layers, MCT), SPcod (levels, xcb, ycb, style, transform, precincts)
pub struct CodDecoder;

impl SegmentDecoder for CodDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &SegmentHeader) -> anyhow::Result<SegmentValue> {
        let style = r.read_u8()?;
        let progression_order = r.read_u8()?;
        let layers = r.read_u16::<BigEndian>()?;
        let multiple_component_transform = r.read_u8()?;
        let decomposition_levels = r.read_u8()?;
        let code_block_width_exponent = r.read_u8()?;
        let code_block_height_exponent = r.read_u8()?;
        let code_block_style = r.read_u8()?;
        let transform = r.read_u8()?;

        // One byte per resolution level when signalled; a short list is kept as is.
        let precincts = if style & 0x01 != 0 {
            let mut rest = Vec::new();
            r.read_to_end(&mut rest)?;
            rest.truncate(decomposition_levels as usize + 1);
            rest
        } else {
            Vec::new()
        };

        Ok(SegmentValue::CodingStyleDefault(CodingStyleDefault {
            style,
            progression_order,
            layers,
            multiple_component_transform,
            decomposition_levels,
            code_block_width_exponent,
            code_block_height_exponent,
            code_block_style,
            transform,
            precincts,
        }))
    }
}

// A.6.4 QCD: Sqcd, then one SPqcd per subband (8 bits without quantization, 16 bits otherwise)
pub struct QcdDecoder;

impl SegmentDecoder for QcdDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &SegmentHeader) -> anyhow::Result<SegmentValue> {
        let style = r.read_u8()?;
        let mut rest = Vec::new();
        r.read_to_end(&mut rest)?;

        let values = match style & 0x1F {
            0 => rest.iter().map(|&b| b as u16).collect(),
            1 | 2 => rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
            other => bail!("QCD: reserved quantization style {}", other),
        };

        Ok(SegmentValue::QuantizationDefault(QuantizationDefault { style, values }))
    }
}

// A.9.2 COM: Rcom, then text or binary data
pub struct ComDecoder;

impl SegmentDecoder for ComDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &SegmentHeader) -> anyhow::Result<SegmentValue> {
        let registration = r.read_u16::<BigEndian>()?;
        let mut bytes = Vec::new();
        r.read_to_end(&mut bytes)?;

        let (text, data) = if registration == 1 {
            // ISO 8859-15: close enough to map byte-for-byte
            (Some(bytes.iter().map(|&b| b as char).collect()), None)
        } else {
            (None, Some(bytes))
        };

        Ok(SegmentValue::Comment(Comment {
            registration,
            text,
            data,
        }))
    }
}

// A.4.2 SOT: Isot, Psot, TPsot, TNsot
pub struct SotDecoder;

impl SegmentDecoder for SotDecoder {
    fn decode(&self, r: &mut dyn Read, _hdr: &SegmentHeader) -> anyhow::Result<SegmentValue> {
        Ok(SegmentValue::StartOfTile(StartOfTile {
            tile_index: r.read_u16::<BigEndian>()?,
            tile_part_length: r.read_u32::<BigEndian>()?,
            tile_part_index: r.read_u8()?,
            tile_part_count: r.read_u8()?,
        }))
    }
}

/// Registry with the metadata-relevant segment decoders and the stand-alone markers.
pub fn default_segment_registry() -> SegmentRegistry {
    SegmentRegistry::new()
        .with_decoder(markers::SIZ, "SIZ", Box::new(SizDecoder))
        .with_decoder(markers::COD, "COD", Box::new(CodDecoder))
        .with_decoder(markers::QCD, "QCD", Box::new(QcdDecoder))
        .with_decoder(markers::COM, "COM", Box::new(ComDecoder))
        .with_decoder(markers::SOT, "SOT", Box::new(SotDecoder))
        .with_standalone(markers::SOC)
        .with_standalone(markers::SOD)
        .with_standalone(markers::EOC)
        .with_standalone(markers::EPH)
}
