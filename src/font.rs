//! In-memory bitmap font: glyphs and the table that owns them

use crate::error::{Error, Result};
use bitfield::bitfield;
use std::collections::BTreeMap;

/// Magic bytes at the start of every font file
pub const FONT_MAGIC: [u8; 2] = *b"FX";

/// Only font layout version understood
pub const FONT_VERSION: u8 = 1;

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 12;

/// Fixed part of a glyph record, before the bitmap bytes
pub const GLYPH_RECORD_LEN: usize = 10;

bitfield! {
    /// Header flag byte
    ///
    /// - Bit 0: glyph rows are packed most significant bit first
    /// - Bits 7-1: reserved
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct FontFlags(u8);
    impl Debug;
    pub msb_first, set_msb_first: 0;
}

impl FontFlags {
    /// Wrap a raw flag byte
    pub fn from_byte(byte: u8) -> Self {
        FontFlags(byte)
    }

    /// Raw flag byte
    pub fn byte(&self) -> u8 {
        self.0
    }
}

/// Bit order of pixels inside a packed glyph row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitOrder {
    /// Leftmost pixel in bit 0
    #[default]
    LsbFirst,
    /// Leftmost pixel in bit 7
    MsbFirst,
}

impl From<FontFlags> for BitOrder {
    fn from(flags: FontFlags) -> Self {
        if flags.msb_first() {
            BitOrder::MsbFirst
        } else {
            BitOrder::LsbFirst
        }
    }
}

/// Line metrics shared by every glyph of a font
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    /// Height of a rendered line in pixels
    pub line_height: u8,
    /// Baseline, in rows from the top of the line
    pub baseline: u8,
    /// Advance used for codepoints the font does not contain
    pub default_advance: u8,
    /// Row packing of glyph bitmaps
    pub bit_order: BitOrder,
}

/// One character's bitmap and advance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    codepoint: char,
    width: u8,
    height: u8,
    advance: u8,
    top: u8,
    bit_order: BitOrder,
    data: Vec<u8>,
}

impl Glyph {
    /// Create a glyph from row-packed bitmap data
    ///
    /// `data` must hold exactly `height` rows of `ceil(width / 8)` bytes.
    pub fn new(
        codepoint: char,
        width: u8,
        height: u8,
        advance: u8,
        top: u8,
        bit_order: BitOrder,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = Self::bitmap_len(width, height);
        if data.len() != expected {
            return Err(Error::format(format!(
                "Glyph {:?} is {}x{} and needs {} bitmap bytes, got {}",
                codepoint,
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Glyph {
            codepoint,
            width,
            height,
            advance,
            top,
            bit_order,
            data,
        })
    }

    /// Bitmap bytes for a glyph of the given size
    pub fn bitmap_len(width: u8, height: u8) -> usize {
        (width as usize).div_ceil(8) * height as usize
    }

    pub fn codepoint(&self) -> char {
        self.codepoint
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    /// Horizontal cursor movement after drawing this glyph
    pub fn advance(&self) -> u8 {
        self.advance
    }

    /// First bitmap row, counted from the top of the line
    pub fn top(&self) -> u8 {
        self.top
    }

    pub fn bit_order(&self) -> BitOrder {
        self.bit_order
    }

    /// Raw row-packed bitmap
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether pixel (x, y) of the glyph bitmap is set
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        if x >= self.width as usize || y >= self.height as usize {
            return false;
        }
        let row_bytes = (self.width as usize).div_ceil(8);
        let byte = self.data[y * row_bytes + x / 8];
        let bit = match self.bit_order {
            BitOrder::LsbFirst => x % 8,
            BitOrder::MsbFirst => 7 - x % 8,
        };
        (byte >> bit) & 1 != 0
    }
}

impl std::fmt::Display for Glyph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                f.write_str(if self.is_set(x, y) { "#" } else { "-" })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Parsed bitmap font, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontTable {
    metrics: FontMetrics,
    glyphs: BTreeMap<char, Glyph>,
}

impl FontTable {
    /// Build a table, validating metrics, glyph placement and uniqueness
    pub fn from_glyphs(metrics: FontMetrics, glyphs: Vec<Glyph>) -> Result<Self> {
        if metrics.line_height == 0 {
            return Err(Error::format("Line height is zero"));
        }
        if metrics.baseline > metrics.line_height {
            return Err(Error::format(format!(
                "Baseline {} lies below line height {}",
                metrics.baseline, metrics.line_height
            )));
        }

        let mut table = BTreeMap::new();
        for glyph in glyphs {
            if glyph.top as usize + glyph.height as usize > metrics.line_height as usize {
                return Err(Error::format(format!(
                    "Glyph {:?} rows {}..{} exceed line height {}",
                    glyph.codepoint,
                    glyph.top,
                    glyph.top as usize + glyph.height as usize,
                    metrics.line_height
                )));
            }
            if glyph.bit_order != metrics.bit_order {
                return Err(Error::format(format!(
                    "Glyph {:?} bit order differs from font",
                    glyph.codepoint
                )));
            }
            let codepoint = glyph.codepoint;
            if table.insert(codepoint, glyph).is_some() {
                return Err(Error::format(format!(
                    "Duplicate codepoint U+{:04X}",
                    codepoint as u32
                )));
            }
        }

        Ok(FontTable {
            metrics,
            glyphs: table,
        })
    }

    pub fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    pub fn line_height(&self) -> u8 {
        self.metrics.line_height
    }

    pub fn baseline(&self) -> u8 {
        self.metrics.baseline
    }

    pub fn default_advance(&self) -> u8 {
        self.metrics.default_advance
    }

    /// Look up a glyph by codepoint
    pub fn glyph(&self, codepoint: char) -> Option<&Glyph> {
        self.glyphs.get(&codepoint)
    }

    /// Advance of a codepoint, falling back to the default advance
    pub fn advance(&self, codepoint: char) -> u8 {
        self.glyph(codepoint)
            .map_or(self.metrics.default_advance, Glyph::advance)
    }

    /// Number of glyphs
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Glyphs in ascending codepoint order
    pub fn glyphs(&self) -> impl Iterator<Item = &Glyph> {
        self.glyphs.values()
    }

    /// Serialize in the font file layout read by
    /// [`FontFormatParser`](crate::parser::FontFormatParser)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.glyphs.len())
            .map_err(|_| Error::format(format!("{} glyphs do not fit a font file", self.len())))?;

        let mut flags = FontFlags::default();
        flags.set_msb_first(self.metrics.bit_order == BitOrder::MsbFirst);

        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(&FONT_MAGIC);
        bytes.push(FONT_VERSION);
        bytes.push(flags.byte());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.push(self.metrics.line_height);
        bytes.push(self.metrics.baseline);
        bytes.push(self.metrics.default_advance);
        bytes.extend_from_slice(&[0; 3]);

        for glyph in self.glyphs() {
            let len = u16::try_from(glyph.data.len())
                .map_err(|_| Error::format("Glyph bitmap too large"))?;
            bytes.extend_from_slice(&(glyph.codepoint as u32).to_le_bytes());
            bytes.push(glyph.width);
            bytes.push(glyph.height);
            bytes.push(glyph.advance);
            bytes.push(glyph.top);
            bytes.extend_from_slice(&len.to_le_bytes());
            bytes.extend_from_slice(&glyph.data);
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> FontMetrics {
        FontMetrics {
            line_height: 7,
            baseline: 6,
            default_advance: 4,
            bit_order: BitOrder::LsbFirst,
        }
    }

    #[test]
    fn test_glyph_bitmap_length_checked() {
        assert!(Glyph::new('A', 5, 7, 6, 0, BitOrder::LsbFirst, vec![0; 7]).is_ok());
        assert!(Glyph::new('A', 9, 7, 10, 0, BitOrder::LsbFirst, vec![0; 7]).is_err());
    }

    #[test]
    fn test_glyph_bit_order() -> Result<()> {
        let lsb = Glyph::new('i', 3, 1, 4, 0, BitOrder::LsbFirst, vec![0b0000_0001])?;
        let msb = Glyph::new('i', 3, 1, 4, 0, BitOrder::MsbFirst, vec![0b1000_0000])?;
        assert!(lsb.is_set(0, 0));
        assert!(msb.is_set(0, 0));
        assert!(!lsb.is_set(1, 0));
        assert!(!msb.is_set(3, 0));
        assert_eq!(lsb.to_string(), "#--\n");
        Ok(())
    }

    #[test]
    fn test_duplicate_codepoint_rejected() -> Result<()> {
        let a = Glyph::new('a', 1, 1, 2, 0, BitOrder::LsbFirst, vec![1])?;
        let err = FontTable::from_glyphs(metrics(), vec![a.clone(), a]).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
        Ok(())
    }

    #[test]
    fn test_glyph_below_line_rejected() -> Result<()> {
        let tall = Glyph::new('g', 1, 4, 2, 4, BitOrder::LsbFirst, vec![0; 4])?;
        assert!(FontTable::from_glyphs(metrics(), vec![tall]).is_err());
        Ok(())
    }

    #[test]
    fn test_advance_fallback() -> Result<()> {
        let a = Glyph::new('a', 3, 5, 5, 2, BitOrder::LsbFirst, vec![0; 5])?;
        let font = FontTable::from_glyphs(metrics(), vec![a])?;
        assert_eq!(font.advance('a'), 5);
        assert_eq!(font.advance('z'), 4);
        assert_eq!(font.line_height(), 7);
        assert_eq!(font.len(), 1);
        Ok(())
    }

    #[test]
    fn test_flags() {
        let mut flags = FontFlags::default();
        assert_eq!(BitOrder::from(flags), BitOrder::LsbFirst);
        flags.set_msb_first(true);
        assert_eq!(flags.byte(), 0x01);
        assert_eq!(BitOrder::from(FontFlags::from_byte(0xFF)), BitOrder::MsbFirst);
    }
}
