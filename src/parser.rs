//! Parser for the bespoke binary bitmap-font format
//!
//! Layout (all multi-byte integers little-endian):
//!
//! ```text
//! header, 12 bytes:
//!   "FX" | version u8 | flags u8 | glyph count u16 | line height u8
//!   | baseline u8 | default advance u8 | reserved [u8; 3]
//! glyph record, repeated glyph-count times:
//!   codepoint u32 | width u8 | height u8 | advance u8 | top u8
//!   | bitmap length u16 | bitmap [u8; length]
//! ```
//!
//! Bitmaps are row-packed, `ceil(width / 8)` bytes per row. Parsing is
//! all-or-nothing: the first problem aborts with a format error.

use crate::error::{Error, Result};
use crate::font::{
    BitOrder, FontFlags, FontMetrics, FontTable, Glyph, FONT_MAGIC, FONT_VERSION,
    GLYPH_RECORD_LEN, HEADER_LEN,
};

/// Bounds-checked little-endian reader over a byte slice
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::format(format!(
                "Truncated {} at offset {}: need {} bytes, {} left",
                what,
                self.offset,
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Decoded font file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontHeader {
    /// Flag byte
    pub flags: FontFlags,
    /// Number of glyph records that follow
    pub glyph_count: u16,
    /// Line metrics
    pub metrics: FontMetrics,
}

/// Bitmap-font file parser
pub struct FontFormatParser;

impl FontFormatParser {
    /// Parse a complete font file into a [`FontTable`]
    pub fn parse(bytes: &[u8]) -> Result<FontTable> {
        let mut reader = Reader::new(bytes);
        let header = Self::read_header(&mut reader)?;

        let mut glyphs = Vec::with_capacity(header.glyph_count as usize);
        for index in 0..header.glyph_count {
            glyphs.push(Self::read_glyph(&mut reader, index, header.metrics.bit_order)?);
        }

        if reader.remaining() > 0 {
            return Err(Error::format(format!(
                "{} trailing bytes after {} glyphs",
                reader.remaining(),
                header.glyph_count
            )));
        }

        FontTable::from_glyphs(header.metrics, glyphs)
    }

    /// Parse only the fixed-size header
    pub fn parse_header(bytes: &[u8]) -> Result<FontHeader> {
        Self::read_header(&mut Reader::new(bytes))
    }

    fn read_header(reader: &mut Reader<'_>) -> Result<FontHeader> {
        let header = reader.take(HEADER_LEN, "header")?;
        let mut fields = Reader::new(header);

        let magic = fields.take(2, "magic")?;
        if magic != FONT_MAGIC {
            return Err(Error::format(format!("Bad magic {:02X?}", magic)));
        }
        let version = fields.u8("version")?;
        if version != FONT_VERSION {
            return Err(Error::format(format!(
                "Unsupported font version {}",
                version
            )));
        }

        let flags = FontFlags::from_byte(fields.u8("flags")?);
        let glyph_count = fields.u16("glyph count")?;
        let line_height = fields.u8("line height")?;
        let baseline = fields.u8("baseline")?;
        let default_advance = fields.u8("default advance")?;

        if line_height == 0 {
            return Err(Error::format("Line height is zero"));
        }
        if baseline > line_height {
            return Err(Error::format(format!(
                "Baseline {} lies below line height {}",
                baseline, line_height
            )));
        }

        Ok(FontHeader {
            flags,
            glyph_count,
            metrics: FontMetrics {
                line_height,
                baseline,
                default_advance,
                bit_order: BitOrder::from(flags),
            },
        })
    }

    fn read_glyph(reader: &mut Reader<'_>, index: u16, bit_order: BitOrder) -> Result<Glyph> {
        let record = reader.take(GLYPH_RECORD_LEN, "glyph record")?;
        let mut fields = Reader::new(record);

        let raw = fields.u32("codepoint")?;
        let codepoint = char::from_u32(raw).ok_or_else(|| {
            Error::format(format!("Glyph {} has invalid codepoint {:#x}", index, raw))
        })?;
        let width = fields.u8("width")?;
        let height = fields.u8("height")?;
        let advance = fields.u8("advance")?;
        let top = fields.u8("top")?;
        let bitmap_len = fields.u16("bitmap length")? as usize;

        if bitmap_len > reader.remaining() {
            return Err(Error::format(format!(
                "Glyph {} ({:?}) bitmap length {} points past end of buffer ({} bytes left)",
                index,
                codepoint,
                bitmap_len,
                reader.remaining()
            )));
        }
        let data = reader.take(bitmap_len, "glyph bitmap")?;

        Glyph::new(codepoint, width, height, advance, top, bit_order, data.to_vec())
    }
}
