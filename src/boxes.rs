use crate::registry::BoxValue;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else { None }
    }
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxHeader {
    pub start: u64,         // file offset of header start
    pub size: u64,          // effective total size including header
    pub declared_size: u64, // as written: 0 = to end of range, otherwise == size
    pub typ: FourCC,
    pub header_size: u64,   // 8, or 16 with extended length
}

impl BoxHeader {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
    pub fn data_offset(&self) -> u64 {
        self.start + self.header_size
    }
    pub fn data_len(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }
    /// True when the record was written with length 0 and runs to the end of its range.
    pub fn extends_to_end(&self) -> bool {
        self.declared_size == 0
    }
}

/// How the registry classified a record's type code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum BoxClass {
    Known,
    Unknown,
}

/// One decoded record. Holds no reference to the stream it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxRef {
    pub hdr: BoxHeader,
    pub value: BoxValue,
}

impl BoxRef {
    pub fn is_superbox(&self) -> bool {
        matches!(self.value, BoxValue::Super)
    }
}

/// Materialized record tree, built by [`crate::parser::parse_children`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxNode {
    pub hdr: BoxHeader,
    pub value: BoxValue,
    pub children: Vec<BoxNode>,
}
