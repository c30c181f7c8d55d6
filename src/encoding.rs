//! Canvas-to-payload encoders for LED and flip-dot panels
//!
//! Both encoders pack lit pixels as 1 bits, least significant bit first:
//! pixel 0 of a row (LED) or of a column (flip-dot) lands in bit 0 of the
//! first byte.

use crate::core::{PanelType, PixelCanvas};
use crate::error::{Error, Result};
use crate::limits;
use crate::registry::DisplayProfile;

/// Bytes needed to hold `bits` bits
pub fn packed_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Pack a canvas row-major, each row padded with 0 bits to a whole byte
pub fn pack_rows(canvas: &PixelCanvas) -> Vec<u8> {
    let row_bytes = packed_len(canvas.width());
    let mut result = vec![0u8; row_bytes * canvas.height()];

    for y in 0..canvas.height() {
        let row = &mut result[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..canvas.width() {
            if canvas.is_lit(x, y) {
                row[x / 8] |= 1 << (x % 8);
            }
        }
    }

    result
}

/// Pack one column top to bottom, padded with 0 bits to a whole byte
pub fn pack_column(canvas: &PixelCanvas, x: usize) -> Vec<u8> {
    let mut result = vec![0u8; packed_len(canvas.height())];
    for y in 0..canvas.height() {
        if canvas.is_lit(x, y) {
            result[y / 8] |= 1 << (y % 8);
        }
    }
    result
}

/// Full-frame bitmap encoder for LED panels
#[derive(Debug, Clone, Copy)]
pub struct BitmapEncoder {
    profile: DisplayProfile,
}

impl BitmapEncoder {
    /// Create an encoder bound to an LED display profile
    pub fn new(profile: &DisplayProfile) -> Result<Self> {
        profile.check_panel_type(PanelType::Led)?;
        Ok(BitmapEncoder { profile: *profile })
    }

    /// Encode the whole canvas as one bitmap payload
    ///
    /// The canvas must match the profile's dimensions exactly.
    pub fn encode(&self, canvas: &PixelCanvas) -> Result<Vec<u8>> {
        self.profile
            .check_dimensions(canvas.width(), canvas.height())?;
        Ok(pack_rows(canvas))
    }
}

/// One flip-dot column update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPayload {
    /// Absolute column index on the panel
    pub column: u8,
    /// Column bits, row 0 in bit 0 of the first byte
    pub data: Vec<u8>,
}

impl ColumnPayload {
    /// Wire payload: column index followed by the packed bits
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.data.len());
        bytes.push(self.column);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// Per-column encoder for flip-dot panels
#[derive(Debug, Clone, Copy)]
pub struct ColumnEncoder {
    profile: DisplayProfile,
}

impl ColumnEncoder {
    /// Create an encoder bound to a flip-dot display profile
    pub fn new(profile: &DisplayProfile) -> Result<Self> {
        profile.check_panel_type(PanelType::Flipdot)?;
        Ok(ColumnEncoder { profile: *profile })
    }

    /// Encode the canvas as column updates starting at `col_offset`
    ///
    /// Validation happens up front; the returned iterator then builds one
    /// column per `next()` call, in strictly ascending column order, so the
    /// caller can flush each column to the bus before the next is built.
    pub fn encode<'a>(&self, canvas: &'a PixelCanvas, col_offset: usize) -> Result<Columns<'a>> {
        self.profile
            .check_dimensions(canvas.width(), canvas.height())?;

        match col_offset.checked_add(canvas.width() - 1) {
            Some(last) if last <= limits::MAX_COLUMN => {}
            Some(last) => return Err(Error::ColumnOutOfRange { column: last }),
            None => return Err(Error::ColumnOutOfRange { column: col_offset }),
        }

        Ok(Columns {
            canvas,
            col_offset,
            next: 0,
        })
    }
}

/// Lazily built column payloads, ascending by column
#[derive(Debug, Clone)]
pub struct Columns<'a> {
    canvas: &'a PixelCanvas,
    col_offset: usize,
    next: usize,
}

impl Iterator for Columns<'_> {
    type Item = ColumnPayload;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.canvas.width() {
            return None;
        }
        let x = self.next;
        self.next += 1;
        Some(ColumnPayload {
            // range checked in ColumnEncoder::encode
            column: (self.col_offset + x) as u8,
            data: pack_column(self.canvas, x),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.canvas.width() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Columns<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, LIT};
    use proptest::prelude::*;

    fn led(width: usize, height: usize) -> DisplayProfile {
        DisplayProfile::new(Address::new(1), width, height, PanelType::Led).unwrap()
    }

    fn flipdot(width: usize, height: usize) -> DisplayProfile {
        DisplayProfile::new(Address::new(2), width, height, PanelType::Flipdot).unwrap()
    }

    #[test]
    fn test_single_lit_pixel() -> Result<()> {
        let mut canvas = PixelCanvas::new(1, 1)?;
        canvas.set(0, 0, LIT);
        let payload = BitmapEncoder::new(&led(1, 1))?.encode(&canvas)?;
        assert_eq!(payload, vec![0b0000_0001]);
        Ok(())
    }

    #[test]
    fn test_rows_are_byte_aligned() -> Result<()> {
        // 10 wide: two bytes per row, tail of each row padded with zeros
        let mut canvas = PixelCanvas::new(10, 2)?;
        canvas.set(0, 0, LIT);
        canvas.set(9, 0, LIT);
        canvas.set(8, 1, LIT);
        let payload = BitmapEncoder::new(&led(10, 2))?.encode(&canvas)?;
        assert_eq!(payload, vec![0x01, 0x02, 0x00, 0x01]);
        Ok(())
    }

    #[test]
    fn test_bitmap_rejects_mismatched_canvas() -> Result<()> {
        let canvas = PixelCanvas::new(8, 8)?;
        let err = BitmapEncoder::new(&led(8, 7))?.encode(&canvas).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected_width: 8,
                expected_height: 7,
                actual_width: 8,
                actual_height: 8,
            }
        );
        Ok(())
    }

    #[test]
    fn test_encoder_panel_type_checked() {
        assert!(BitmapEncoder::new(&flipdot(4, 4)).is_err());
        assert!(ColumnEncoder::new(&led(4, 4)).is_err());
    }

    #[test]
    fn test_blank_columns() -> Result<()> {
        let canvas = PixelCanvas::new(3, 2)?;
        let columns: Vec<_> = ColumnEncoder::new(&flipdot(3, 2))?
            .encode(&canvas, 0)?
            .collect();
        assert_eq!(columns.len(), 3);
        for (i, column) in columns.iter().enumerate() {
            assert_eq!(column.column as usize, i);
            assert_eq!(column.data, vec![0x00]);
        }
        Ok(())
    }

    #[test]
    fn test_column_bits_top_down() -> Result<()> {
        let mut canvas = PixelCanvas::new(2, 9)?;
        canvas.set(1, 0, LIT);
        canvas.set(1, 8, LIT);
        let columns: Vec<_> = ColumnEncoder::new(&flipdot(2, 9))?
            .encode(&canvas, 10)?
            .collect();
        assert_eq!(columns[0].to_bytes(), vec![10, 0x00, 0x00]);
        assert_eq!(columns[1].to_bytes(), vec![11, 0x01, 0x01]);
        Ok(())
    }

    #[test]
    fn test_column_offset_out_of_range() -> Result<()> {
        let canvas = PixelCanvas::new(4, 1)?;
        let encoder = ColumnEncoder::new(&flipdot(4, 1))?;
        assert!(encoder.encode(&canvas, 252).is_ok());
        assert!(matches!(
            encoder.encode(&canvas, 253),
            Err(Error::ColumnOutOfRange { column: 256 })
        ));
        assert!(matches!(
            encoder.encode(&canvas, usize::MAX),
            Err(Error::ColumnOutOfRange { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_tallest_column_fits_frame() -> Result<()> {
        let canvas = PixelCanvas::new(1, 256)?;
        let column = ColumnEncoder::new(&flipdot(1, 256))?
            .encode(&canvas, 0)?
            .next()
            .unwrap();
        assert_eq!(column.to_bytes().len(), limits::MAX_COLUMN_PAYLOAD);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_bitmap_encode_is_deterministic(
            width in 1usize..40,
            height in 1usize..20,
            seed in any::<u64>(),
        ) {
            let pixels: Vec<u8> = (0..width * height)
                .map(|i| (seed.rotate_left((i % 64) as u32) & 0xFF) as u8)
                .collect();
            let canvas = PixelCanvas::from_pixels(width, height, pixels).unwrap();
            let encoder = BitmapEncoder::new(&led(width, height)).unwrap();
            let first = encoder.encode(&canvas).unwrap();
            let second = encoder.encode(&canvas.clone()).unwrap();
            prop_assert_eq!(first.len(), packed_len(width) * height);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_columns_ascending_from_offset(
            width in 1usize..64,
            height in 1usize..24,
            offset in 0usize..128,
        ) {
            let canvas = PixelCanvas::new(width, height).unwrap();
            let encoder = ColumnEncoder::new(&flipdot(width, height)).unwrap();
            let columns: Vec<u8> = encoder
                .encode(&canvas, offset)
                .unwrap()
                .map(|c| c.column)
                .collect();
            let expected: Vec<u8> = (offset..offset + width).map(|c| c as u8).collect();
            prop_assert_eq!(columns, expected);
        }
    }
}
