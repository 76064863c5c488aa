use crate::boxes::{BoxClass, BoxHeader, BoxNode, BoxRef, FourCC};
use crate::registry::{BoxValue, Registry};
use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, trace, warn};
use std::io::{self, Read, Seek, SeekFrom};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error in {typ} at offset {offset}: {reason}")]
    Framing {
        typ: String,
        offset: u64,
        reason: String,
    },
    #[error("truncated stream at offset {offset}: {needed} bytes required, {available} available")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },
    #[error("invalid marker 0x{value:04x} at offset {offset}")]
    InvalidMarker { offset: u64, value: u16 },
}

pub type Result<T> = std::result::Result<T, ParseError>;

fn framing(typ: FourCC, offset: u64, reason: String) -> ParseError {
    ParseError::Framing {
        typ: typ.to_string(),
        offset,
        reason,
    }
}

/// Beyond this nesting depth `parse_children` stops expanding super-records.
pub(crate) const MAX_DEPTH: usize = 32;

/// Read a record header at the current position.
///
/// `range_end` is the exclusive upper bound of the enclosing range: a
/// zero length resolves to it and no record may extend past it.
pub fn read_box_header<R: Read + Seek>(r: &mut R, range_end: u64) -> Result<BoxHeader> {
    let start = r.stream_position()?;
    let in_stream = r.seek(SeekFrom::End(0))?.saturating_sub(start);
    r.seek(SeekFrom::Start(start))?;
    let available = range_end.saturating_sub(start);
    check_room(start, 8, available, in_stream)?;

    let size32 = r.read_u32::<BigEndian>()?;
    let mut typ = [0u8; 4];
    r.read_exact(&mut typ)?;
    let typ = FourCC(typ);

    let (declared_size, header_size) = if size32 == 1 {
        check_room(start, 16, available, in_stream)?;
        (r.read_u64::<BigEndian>()?, 16)
    } else {
        (size32 as u64, 8)
    };
    trace!("header at {}: size32={} typ={} declared={}", start, size32, typ, declared_size);

    // only the 32-bit length may be 0; an extended 0 is malformed
    let size = match declared_size {
        0 if header_size == 8 => available,
        n if n < header_size => {
            return Err(framing(
                typ,
                start,
                format!("declared length {} is smaller than its {}-byte header", n, header_size),
            ));
        }
        n => n,
    };

    let end = start
        .checked_add(size)
        .ok_or_else(|| framing(typ, start, format!("declared length {} overflows", size)))?;
    if end > range_end {
        return Err(framing(
            typ,
            start,
            format!("record ends at {} beyond the enclosing range end {}", end, range_end),
        ));
    }

    Ok(BoxHeader {
        start,
        size,
        declared_size,
        typ,
        header_size,
    })
}

// Truncated when the stream runs out, framing when only the enclosing range does.
fn check_room(start: u64, needed: u64, available: u64, in_stream: u64) -> Result<()> {
    if in_stream < needed {
        return Err(ParseError::Truncated {
            offset: start,
            needed,
            available: in_stream,
        });
    }
    if available < needed {
        return Err(ParseError::Framing {
            typ: "header".to_string(),
            offset: start,
            reason: format!("{} bytes left in the enclosing range, {} needed for a record header", available, needed),
        });
    }
    Ok(())
}

/// Receives one notification per scanned record. Diagnostics only.
pub trait BoxListener {
    fn on_box(&mut self, hdr: &BoxHeader, class: BoxClass);
}

impl<F: FnMut(&BoxHeader, BoxClass)> BoxListener for F {
    fn on_box(&mut self, hdr: &BoxHeader, class: BoxClass) {
        self(hdr, class)
    }
}

/// Forward-only reader yielding one record at a time from `[start, end)`.
///
/// After each record the cursor moves to `start + length` of that record,
/// regardless of how much of the payload its decoder consumed. A fatal error
/// fuses the scanner: subsequent calls report end-of-range.
pub struct BoxScanner<'a, R> {
    reader: &'a mut R,
    registry: &'a Registry,
    listener: Option<&'a mut dyn BoxListener>,
    pos: u64,
    end: u64,
    stream_len: u64,
    nested: bool,
    done: bool,
}

impl<'a, R: Read + Seek> BoxScanner<'a, R> {
    /// Scan the whole stream.
    pub fn new(reader: &'a mut R, registry: &'a Registry) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Self::with_range(reader, registry, 0, len)
    }

    /// Scan `[start, end)` of the stream.
    pub fn with_range(reader: &'a mut R, registry: &'a Registry, start: u64, end: u64) -> Result<Self> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader,
            registry,
            listener: None,
            pos: start,
            end,
            stream_len,
            nested: false,
            done: false,
        })
    }

    pub fn with_listener(mut self, listener: &'a mut dyn BoxListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Absolute offset of the next record header.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// A scanner over the payload of `parent`, sharing this scanner's stream,
    /// registry and listener. Intended for super-records.
    pub fn children(&mut self, parent: &BoxRef) -> BoxScanner<'_, R> {
        let listener: Option<&mut dyn BoxListener> = match &mut self.listener {
            Some(l) => Some(&mut **l),
            None => None,
        };
        BoxScanner {
            reader: &mut *self.reader,
            registry: self.registry,
            listener,
            pos: parent.hdr.data_offset(),
            end: parent.hdr.end(),
            stream_len: self.stream_len,
            nested: true,
            done: false,
        }
    }

    /// Next record, or `None` at the end of the range.
    pub fn next_box(&mut self) -> Result<Option<BoxRef>> {
        if self.done || self.pos >= self.end {
            return Ok(None);
        }
        match self.read_next() {
            Ok(b) => Ok(Some(b)),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn read_next(&mut self) -> Result<BoxRef> {
        self.reader.seek(SeekFrom::Start(self.pos))?;
        let hdr = match read_box_header(&mut *self.reader, self.end) {
            Ok(hdr) => hdr,
            Err(e) => return Err(self.short_header(e)),
        };
        if hdr.end() > self.stream_len {
            return Err(ParseError::Truncated {
                offset: hdr.start,
                needed: hdr.size,
                available: self.stream_len.saturating_sub(hdr.start),
            });
        }

        let (value, class) = self.decode_payload(&hdr)?;
        debug!(
            "box {} at {} size {} (header {}, {:?})",
            hdr.typ, hdr.start, hdr.size, hdr.header_size, class
        );
        if let Some(l) = self.listener.as_mut() {
            l.on_box(&hdr, class);
        }

        self.pos = hdr.end();
        Ok(BoxRef { hdr, value })
    }

    // Leftover bytes inside a record that lies wholly within the stream are
    // malformed content, not a short stream.
    fn short_header(&self, e: ParseError) -> ParseError {
        match e {
            ParseError::Truncated { offset, needed, .. } if self.nested && self.end <= self.stream_len => {
                ParseError::Framing {
                    typ: "header".to_string(),
                    offset,
                    reason: format!(
                        "{} bytes left in the enclosing record, {} needed for a record header",
                        self.end.saturating_sub(offset),
                        needed
                    ),
                }
            }
            e => e,
        }
    }

    fn decode_payload(&mut self, hdr: &BoxHeader) -> Result<(BoxValue, BoxClass)> {
        if self.registry.is_superbox(hdr.typ) {
            return Ok((BoxValue::Super, BoxClass::Known));
        }

        self.reader.seek(SeekFrom::Start(hdr.data_offset()))?;
        let mut limited = (&mut *self.reader).take(hdr.data_len());
        match self.registry.decode(hdr.typ, &mut limited, hdr) {
            Some(Ok(v)) => Ok((v, BoxClass::Known)),
            Some(Err(e)) => {
                warn!("decoding {} at {} failed: {:#}", hdr.typ, hdr.start, e);
                if let Some(io_err) = e.downcast_ref::<io::Error>() {
                    if io_err.kind() != io::ErrorKind::UnexpectedEof {
                        return Err(ParseError::Io(io::Error::new(io_err.kind(), e.to_string())));
                    }
                }
                Ok((
                    BoxValue::Invalid {
                        reason: format!("{:#}", e),
                    },
                    BoxClass::Known,
                ))
            }
            None => Ok((BoxValue::Generic, BoxClass::Unknown)),
        }
    }
}

impl<R: Read + Seek> Iterator for BoxScanner<'_, R> {
    type Item = Result<BoxRef>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_box().transpose()
    }
}

/// Scan `[start, parent_end)` and materialize the record tree, recursing into
/// super-records.
pub fn parse_children<R: Read + Seek>(
    r: &mut R,
    registry: &Registry,
    start: u64,
    parent_end: u64,
) -> Result<Vec<BoxNode>> {
    let mut scanner = BoxScanner::with_range(r, registry, start, parent_end)?;
    collect_nodes(&mut scanner, 0)
}

fn collect_nodes<R: Read + Seek>(scanner: &mut BoxScanner<'_, R>, depth: usize) -> Result<Vec<BoxNode>> {
    let mut kids = Vec::new();
    while let Some(b) = scanner.next_box()? {
        let children = if b.is_superbox() && depth < MAX_DEPTH {
            let mut child = scanner.children(&b);
            collect_nodes(&mut child, depth + 1)?
        } else {
            if b.is_superbox() {
                warn!("not expanding {} at {}: nesting deeper than {}", b.hdr.typ, b.hdr.start, MAX_DEPTH);
            }
            Vec::new()
        };
        kids.push(BoxNode {
            hdr: b.hdr,
            value: b.value,
            children,
        });
    }
    Ok(kids)
}
