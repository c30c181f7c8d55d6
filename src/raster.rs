//! Single-line text layout onto a pixel canvas

use crate::core::{PixelCanvas, LIT, UNLIT};
use crate::error::{Error, Result};
use crate::font::{FontTable, Glyph};
use log::debug;

/// Lays glyphs out left to right onto a canvas one line high
pub struct TextRasterizer;

impl TextRasterizer {
    /// Canvas width `text` would occupy: the sum of its advances
    ///
    /// Codepoints missing from the font count with the font's default advance.
    pub fn measure(text: &str, font: &FontTable) -> usize {
        text.chars().map(|c| font.advance(c) as usize).sum()
    }

    /// Render `text` into a canvas `measure(text)` wide and one line high
    ///
    /// Each glyph's cell overwrites the canvas at the cursor (unset glyph
    /// pixels clear whatever an overhanging neighbour drew). Missing
    /// codepoints leave a blank cell of the default advance.
    pub fn layout(text: &str, font: &FontTable) -> Result<PixelCanvas> {
        let width = Self::measure(text, font);
        if width == 0 {
            return Err(Error::EmptyLayout);
        }
        let mut canvas = PixelCanvas::new(width, font.line_height() as usize)?;

        let mut cursor = 0usize;
        for c in text.chars() {
            match font.glyph(c) {
                Some(glyph) => {
                    Self::blit(&mut canvas, glyph, cursor);
                    cursor += glyph.advance() as usize;
                }
                None => {
                    debug!(
                        "No glyph for U+{:04X}, leaving {} blank columns",
                        c as u32,
                        font.default_advance()
                    );
                    Self::clear(&mut canvas, cursor, font.default_advance() as usize);
                    cursor += font.default_advance() as usize;
                }
            }
        }

        Ok(canvas)
    }

    fn clear(canvas: &mut PixelCanvas, x0: usize, width: usize) {
        for y in 0..canvas.height() {
            for x in x0..x0 + width {
                canvas.set(x, y, UNLIT);
            }
        }
    }

    fn blit(canvas: &mut PixelCanvas, glyph: &Glyph, x0: usize) {
        let y0 = glyph.top() as usize;
        for y in 0..glyph.height() as usize {
            for x in 0..glyph.width() as usize {
                let value = if glyph.is_set(x, y) { LIT } else { UNLIT };
                canvas.set(x0 + x, y0 + y, value);
            }
        }
    }
}
