pub mod api;
pub mod boxes;
pub mod codestream;
pub mod known_boxes;
pub mod markers;
pub mod parser;
pub mod registry;
pub mod segments;
pub mod util;

pub use api::{HexDump, ImageInfo, Jp2Box, JsonSegment, analyze_file, get_boxes, get_segments, hex_range, read_image_info};
pub use boxes::{BoxClass, BoxHeader, BoxNode, BoxRef, FourCC};
pub use codestream::{MainHeader, Segment, SegmentHeader, SegmentScanner};
pub use parser::{BoxListener, BoxScanner, ParseError, parse_children, read_box_header};
pub use registry::{BoxValue, Registry};
pub use segments::{SegmentRegistry, SegmentValue};
