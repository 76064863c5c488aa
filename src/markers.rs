//! Marker codes of the JPEG 2000 codestream (ITU-T T.800 Annex A).

// Delimiting markers
pub const SOC: u16 = 0xFF4F; // Start of codestream
pub const SOT: u16 = 0xFF90; // Start of tile-part
pub const SOD: u16 = 0xFF93; // Start of data
pub const EOC: u16 = 0xFFD9; // End of codestream

// Fixed information
pub const SIZ: u16 = 0xFF51; // Image and tile size
pub const CAP: u16 = 0xFF50; // Extended capabilities

// Functional
pub const COD: u16 = 0xFF52; // Coding style default
pub const COC: u16 = 0xFF53; // Coding style component
pub const RGN: u16 = 0xFF5E; // Region-of-interest
pub const QCD: u16 = 0xFF5C; // Quantization default
pub const QCC: u16 = 0xFF5D; // Quantization component
pub const POC: u16 = 0xFF5F; // Progression order change

// Pointer
pub const TLM: u16 = 0xFF55; // Tile-part lengths
pub const PLM: u16 = 0xFF57; // Packet length, main header
pub const PLT: u16 = 0xFF58; // Packet length, tile-part header
pub const PPM: u16 = 0xFF60; // Packed packet headers, main header
pub const PPT: u16 = 0xFF61; // Packed packet headers, tile-part header

// In bit stream
pub const SOP: u16 = 0xFF91; // Start of packet
pub const EPH: u16 = 0xFF92; // End of packet header

// Informational
pub const CRG: u16 = 0xFF63; // Component registration
pub const COM: u16 = 0xFF64; // Comment

/// Markers `0xFF30..=0xFF3F` are reserved and carry no segment body.
pub fn is_reserved_standalone(code: u16) -> bool {
    (0xFF30..=0xFF3F).contains(&code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownMarker {
    Soc,
    Sot,
    Sod,
    Eoc,
    Siz,
    Cap,
    Cod,
    Coc,
    Rgn,
    Qcd,
    Qcc,
    Poc,
    Tlm,
    Plm,
    Plt,
    Ppm,
    Ppt,
    Sop,
    Eph,
    Crg,
    Com,
    Unknown(u16),
}

impl From<u16> for KnownMarker {
    fn from(code: u16) -> Self {
        match code {
            SOC => KnownMarker::Soc,
            SOT => KnownMarker::Sot,
            SOD => KnownMarker::Sod,
            EOC => KnownMarker::Eoc,
            SIZ => KnownMarker::Siz,
            CAP => KnownMarker::Cap,
            COD => KnownMarker::Cod,
            COC => KnownMarker::Coc,
            RGN => KnownMarker::Rgn,
            QCD => KnownMarker::Qcd,
            QCC => KnownMarker::Qcc,
            POC => KnownMarker::Poc,
            TLM => KnownMarker::Tlm,
            PLM => KnownMarker::Plm,
            PLT => KnownMarker::Plt,
            PPM => KnownMarker::Ppm,
            PPT => KnownMarker::Ppt,
            SOP => KnownMarker::Sop,
            EPH => KnownMarker::Eph,
            CRG => KnownMarker::Crg,
            COM => KnownMarker::Com,
            other => KnownMarker::Unknown(other),
        }
    }
}

impl KnownMarker {
    pub fn short_name(&self) -> &'static str {
        match self {
            KnownMarker::Soc => "SOC",
            KnownMarker::Sot => "SOT",
            KnownMarker::Sod => "SOD",
            KnownMarker::Eoc => "EOC",
            KnownMarker::Siz => "SIZ",
            KnownMarker::Cap => "CAP",
            KnownMarker::Cod => "COD",
            KnownMarker::Coc => "COC",
            KnownMarker::Rgn => "RGN",
            KnownMarker::Qcd => "QCD",
            KnownMarker::Qcc => "QCC",
            KnownMarker::Poc => "POC",
            KnownMarker::Tlm => "TLM",
            KnownMarker::Plm => "PLM",
            KnownMarker::Plt => "PLT",
            KnownMarker::Ppm => "PPM",
            KnownMarker::Ppt => "PPT",
            KnownMarker::Sop => "SOP",
            KnownMarker::Eph => "EPH",
            KnownMarker::Crg => "CRG",
            KnownMarker::Com => "COM",
            KnownMarker::Unknown(_) => "???",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            KnownMarker::Soc => "Start of codestream",
            KnownMarker::Sot => "Start of tile-part",
            KnownMarker::Sod => "Start of data",
            KnownMarker::Eoc => "End of codestream",
            KnownMarker::Siz => "Image and tile size",
            KnownMarker::Cap => "Extended capabilities",
            KnownMarker::Cod => "Coding style default",
            KnownMarker::Coc => "Coding style component",
            KnownMarker::Rgn => "Region-of-interest",
            KnownMarker::Qcd => "Quantization default",
            KnownMarker::Qcc => "Quantization component",
            KnownMarker::Poc => "Progression order change",
            KnownMarker::Tlm => "Tile-part lengths",
            KnownMarker::Plm => "Packet length, main header",
            KnownMarker::Plt => "Packet length, tile-part header",
            KnownMarker::Ppm => "Packed packet headers, main header",
            KnownMarker::Ppt => "Packed packet headers, tile-part header",
            KnownMarker::Sop => "Start of packet",
            KnownMarker::Eph => "End of packet header",
            KnownMarker::Crg => "Component registration",
            KnownMarker::Com => "Comment",
            KnownMarker::Unknown(_) => "Unknown marker",
        }
    }
}
