use crate::boxes::FourCC;

/// Typed view over the JP2 / JPX record types.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    // File-level
    Signature,
    FileType,
    Header,
    ContiguousCodestream,
    IntellectualProperty,
    Xml,
    Uuid,
    UuidInfo,
    Association,
    Label,
    Free,

    // jp2h children
    ImageHeader,
    BitsPerComponent,
    ColourSpecification,
    Palette,
    ComponentMapping,
    ChannelDefinition,
    Resolution,

    // res children
    CaptureResolution,
    DisplayResolution,

    // uinf children
    UuidList,
    DataEntryUrl,

    // Anything else
    Unknown(FourCC),
}

impl KnownBox {
    pub const ALL: [KnownBox; 22] = [
        KnownBox::Signature,
        KnownBox::FileType,
        KnownBox::Header,
        KnownBox::ContiguousCodestream,
        KnownBox::IntellectualProperty,
        KnownBox::Xml,
        KnownBox::Uuid,
        KnownBox::UuidInfo,
        KnownBox::Association,
        KnownBox::Label,
        KnownBox::Free,
        KnownBox::ImageHeader,
        KnownBox::BitsPerComponent,
        KnownBox::ColourSpecification,
        KnownBox::Palette,
        KnownBox::ComponentMapping,
        KnownBox::ChannelDefinition,
        KnownBox::Resolution,
        KnownBox::CaptureResolution,
        KnownBox::DisplayResolution,
        KnownBox::UuidList,
        KnownBox::DataEntryUrl,
    ];

    pub fn fourcc(&self) -> FourCC {
        FourCC(match self {
            KnownBox::Signature => *b"jP  ",
            KnownBox::FileType => *b"ftyp",
            KnownBox::Header => *b"jp2h",
            KnownBox::ContiguousCodestream => *b"jp2c",
            KnownBox::IntellectualProperty => *b"jp2i",
            KnownBox::Xml => *b"xml ",
            KnownBox::Uuid => *b"uuid",
            KnownBox::UuidInfo => *b"uinf",
            KnownBox::Association => *b"asoc",
            KnownBox::Label => *b"lbl ",
            KnownBox::Free => *b"free",
            KnownBox::ImageHeader => *b"ihdr",
            KnownBox::BitsPerComponent => *b"bpcc",
            KnownBox::ColourSpecification => *b"colr",
            KnownBox::Palette => *b"pclr",
            KnownBox::ComponentMapping => *b"cmap",
            KnownBox::ChannelDefinition => *b"cdef",
            KnownBox::Resolution => *b"res ",
            KnownBox::CaptureResolution => *b"resc",
            KnownBox::DisplayResolution => *b"resd",
            KnownBox::UuidList => *b"ulst",
            KnownBox::DataEntryUrl => *b"url ",
            KnownBox::Unknown(cc) => return *cc,
        })
    }

    /// Does this record's payload consist of child records?
    pub fn is_superbox(&self) -> bool {
        matches!(
            self,
            KnownBox::Header | KnownBox::Resolution | KnownBox::UuidInfo | KnownBox::Association
        )
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            KnownBox::Signature => "JPEG 2000 Signature Box",
            KnownBox::FileType => "File Type Box",
            KnownBox::Header => "JP2 Header Box",
            KnownBox::ContiguousCodestream => "Contiguous Codestream Box",
            KnownBox::IntellectualProperty => "Intellectual Property Box",
            KnownBox::Xml => "XML Box",
            KnownBox::Uuid => "UUID Box",
            KnownBox::UuidInfo => "UUID Info Box",
            KnownBox::Association => "Association Box",
            KnownBox::Label => "Label Box",
            KnownBox::Free => "Free Box",
            KnownBox::ImageHeader => "Image Header Box",
            KnownBox::BitsPerComponent => "Bits Per Component Box",
            KnownBox::ColourSpecification => "Colour Specification Box",
            KnownBox::Palette => "Palette Box",
            KnownBox::ComponentMapping => "Component Mapping Box",
            KnownBox::ChannelDefinition => "Channel Definition Box",
            KnownBox::Resolution => "Resolution Box",
            KnownBox::CaptureResolution => "Capture Resolution Box",
            KnownBox::DisplayResolution => "Default Display Resolution Box",
            KnownBox::UuidList => "UUID List Box",
            KnownBox::DataEntryUrl => "Data Entry URL Box",
            KnownBox::Unknown(_) => "Unknown Box",
        }
    }
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        KnownBox::ALL
            .iter()
            .copied()
            .find(|kb| kb.fourcc() == cc)
            .unwrap_or(KnownBox::Unknown(cc))
    }
}
