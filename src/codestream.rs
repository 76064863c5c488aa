use crate::markers::{self, KnownMarker};
use crate::parser::{ParseError, Result};
use crate::registry::CodestreamData;
use crate::segments::{
    CodingStyleDefault, Comment, ImageAndTileSize, QuantizationDefault, SegmentRegistry,
    SegmentValue,
};
use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, warn};
use serde::Serialize;
use std::io::{self, Read, Seek, SeekFrom};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentHeader {
    pub marker: u16,
    pub offset: u64,         // absolute offset of the marker
    pub length: Option<u16>, // Lxxx, counts itself; None for stand-alone markers
}

impl SegmentHeader {
    pub fn name(&self) -> &'static str {
        KnownMarker::from(self.marker).short_name()
    }

    /// Offset one past the last byte of the segment.
    pub fn end(&self) -> u64 {
        self.offset + 2 + self.length.map(u64::from).unwrap_or(0)
    }

    pub fn body_offset(&self) -> u64 {
        self.offset + if self.length.is_some() { 4 } else { 2 }
    }

    pub fn body_len(&self) -> u64 {
        self.length.map(|l| l.saturating_sub(2) as u64).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub hdr: SegmentHeader,
    pub value: SegmentValue,
}

/// The metadata-relevant part of a codestream main header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MainHeader {
    pub siz: Option<ImageAndTileSize>,
    pub cod: Option<CodingStyleDefault>,
    pub qcd: Option<QuantizationDefault>,
    pub comments: Vec<Comment>,
    /// Every segment seen, in order.
    pub segments: Vec<SegmentHeader>,
}

/// Forward-only reader yielding one marker segment at a time.
///
/// Like [`crate::parser::BoxScanner`], the cursor always advances by the
/// declared segment length. After SOD the tile-part's bit stream is skipped
/// using the preceding SOT's Psot; after EOC the scan ends.
pub struct SegmentScanner<'a, R> {
    reader: &'a mut R,
    registry: &'a SegmentRegistry,
    pos: u64,
    end: u64,
    stream_len: u64,
    tile_part_end: Option<u64>,
    done: bool,
}

impl<'a, R: Read + Seek> SegmentScanner<'a, R> {
    /// Scan `length` bytes starting at the absolute offset `start`.
    pub fn new(reader: &'a mut R, registry: &'a SegmentRegistry, start: u64, length: u64) -> Result<Self> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader,
            registry,
            pos: start,
            end: start.saturating_add(length),
            stream_len,
            tile_part_end: None,
            done: false,
        })
    }

    /// Scan the payload of a contiguous-codestream record.
    pub fn for_codestream(reader: &'a mut R, registry: &'a SegmentRegistry, cs: &CodestreamData) -> Result<Self> {
        Self::new(reader, registry, cs.offset, cs.length)
    }

    /// Absolute offset of the next marker.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Next segment, or `None` at the end of the range.
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.done || self.pos >= self.end {
            return Ok(None);
        }
        match self.read_next() {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn available(&self, from: u64) -> u64 {
        self.end.min(self.stream_len).saturating_sub(from)
    }

    fn read_next(&mut self) -> Result<Segment> {
        let start = self.pos;
        let available = self.available(start);
        if available < 2 {
            return Err(ParseError::Truncated {
                offset: start,
                needed: 2,
                available,
            });
        }

        self.reader.seek(SeekFrom::Start(start))?;
        let marker = self.reader.read_u16::<BigEndian>()?;
        if marker < 0xFF00 {
            return Err(ParseError::InvalidMarker {
                offset: start,
                value: marker,
            });
        }

        if self.registry.is_standalone(marker) {
            let hdr = SegmentHeader {
                marker,
                offset: start,
                length: None,
            };
            debug!("marker {} (0x{:04x}) at {}", hdr.name(), marker, start);
            self.pos = self.after_standalone(&hdr)?;
            return Ok(Segment {
                hdr,
                value: SegmentValue::Marker,
            });
        }

        if available < 4 {
            return Err(ParseError::Truncated {
                offset: start,
                needed: 4,
                available,
            });
        }
        let length = self.reader.read_u16::<BigEndian>()?;
        let hdr = SegmentHeader {
            marker,
            offset: start,
            length: Some(length),
        };
        if length < 2 {
            return Err(self.framing(&hdr, format!("segment length {} is below 2", length)));
        }
        if hdr.end() > self.end {
            return Err(self.framing(
                &hdr,
                format!("segment ends at {} beyond the codestream end {}", hdr.end(), self.end),
            ));
        }
        if hdr.end() > self.stream_len {
            return Err(ParseError::Truncated {
                offset: start,
                needed: 2 + length as u64,
                available,
            });
        }

        let value = self.decode_body(&hdr)?;
        debug!("segment {} (0x{:04x}) at {} length {}", hdr.name(), marker, start, length);

        if let SegmentValue::StartOfTile(sot) = &value {
            self.tile_part_end = Some(if sot.tile_part_length == 0 {
                self.end
            } else {
                start + sot.tile_part_length as u64
            });
        }

        self.pos = hdr.end();
        Ok(Segment { hdr, value })
    }

    fn after_standalone(&mut self, hdr: &SegmentHeader) -> Result<u64> {
        match hdr.marker {
            markers::SOD => {
                // skip the bit stream up to the end of the tile-part
                let target = self.tile_part_end.take().unwrap_or(self.end);
                if target < hdr.end() || target > self.end {
                    return Err(self.framing(
                        hdr,
                        format!("tile-part ends at {} outside [{}, {}]", target, hdr.end(), self.end),
                    ));
                }
                Ok(target)
            }
            markers::EOC => {
                self.done = true;
                Ok(hdr.end())
            }
            _ => Ok(hdr.end()),
        }
    }

    fn decode_body(&mut self, hdr: &SegmentHeader) -> Result<SegmentValue> {
        let mut limited = (&mut *self.reader).take(hdr.body_len());
        match self.registry.decode(hdr.marker, &mut limited, hdr) {
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => {
                warn!("decoding {} at {} failed: {:#}", hdr.name(), hdr.offset, e);
                if let Some(io_err) = e.downcast_ref::<io::Error>() {
                    if io_err.kind() != io::ErrorKind::UnexpectedEof {
                        return Err(ParseError::Io(io::Error::new(io_err.kind(), e.to_string())));
                    }
                }
                Ok(SegmentValue::Invalid {
                    reason: format!("{:#}", e),
                })
            }
            None => Ok(SegmentValue::Generic),
        }
    }

    fn framing(&self, hdr: &SegmentHeader, reason: String) -> ParseError {
        ParseError::Framing {
            typ: format!("{} (0x{:04x})", hdr.name(), hdr.marker),
            offset: hdr.offset,
            reason,
        }
    }

    /// Collect the main header: every segment before the first SOT (which is
    /// consumed), SOD or EOC.
    pub fn read_main_header(&mut self) -> Result<MainHeader> {
        let mut header = MainHeader::default();
        while let Some(seg) = self.next_segment()? {
            if matches!(seg.hdr.marker, markers::SOT | markers::SOD | markers::EOC) {
                break;
            }
            match seg.value {
                SegmentValue::ImageAndTileSize(siz) if header.siz.is_none() => header.siz = Some(siz),
                SegmentValue::CodingStyleDefault(cod) if header.cod.is_none() => header.cod = Some(cod),
                SegmentValue::QuantizationDefault(qcd) if header.qcd.is_none() => header.qcd = Some(qcd),
                SegmentValue::Comment(com) => header.comments.push(com),
                _ => {}
            }
            header.segments.push(seg.hdr);
        }
        Ok(header)
    }
}

impl<R: Read + Seek> Iterator for SegmentScanner<'_, R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}
