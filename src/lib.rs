//! # Mono Display Bus
//!
//! Drive LED dot-matrix and flip-dot destination displays that share one
//! serial bus.
//!
//! This library provides:
//!
//! - Parsing of the bespoke binary bitmap-font format
//! - Single-line text rasterization into a 1-bit pixel canvas
//! - LED full-bitmap and flip-dot per-column payload encoding
//! - Addressed, checksummed frame building and parsing
//! - A transport session with acknowledgement, timeout and retry
//! - IBIS telegrams for the passenger-information bus
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization support
//!
//! ## Example
//!
//! ```
//! use mono_display_bus::{
//!     capture_canvas, Address, BitOrder, DisplayProfile, FontMetrics, FontTable, Glyph,
//!     PanelType, TextRasterizer,
//! };
//!
//! let metrics = FontMetrics { line_height: 2, baseline: 2, default_advance: 2, bit_order: BitOrder::LsbFirst };
//! let dot = Glyph::new('.', 1, 1, 2, 1, BitOrder::LsbFirst, vec![1])?;
//! let font = FontTable::from_glyphs(metrics, vec![dot])?;
//!
//! let canvas = TextRasterizer::layout("..", &font)?;
//! let profile = DisplayProfile::new(Address::new(1), 4, 2, PanelType::Flipdot)?;
//! let stream = capture_canvas(&profile, &canvas, 0)?;
//! assert_eq!(stream.len(), 4 * 9);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod core;
pub mod display;
pub mod encoding;
pub mod error;
pub mod font;
pub mod frame;
pub mod ibis;
pub mod parser;
pub mod raster;
pub mod registry;
pub mod session;
pub mod transport;

pub use crate::core::{Address, PanelType, PixelCanvas, LIT_THRESHOLD};
pub use display::{capture_canvas, DisplayBus};
pub use encoding::{BitmapEncoder, ColumnEncoder, ColumnPayload};
pub use error::{Error, ErrorKind, Result};
pub use font::{BitOrder, FontMetrics, FontTable, Glyph};
pub use frame::{Command, Frame, FrameCodec, FrameParser, PanelStatus};
pub use ibis::Telegram;
pub use parser::FontFormatParser;
pub use raster::TextRasterizer;
pub use registry::{DisplayProfile, DisplayRegistry};
pub use session::{Ack, CancelToken, SessionBuilder, SessionConfig, TransportSession};
pub use transport::{AckMode, CaptureTransport, StreamTransport, Transport};

/// Wire format limits
pub mod limits {
    /// Largest LED bitmap payload in bytes (e.g. 256x256 pixels)
    pub const MAX_BITMAP_PAYLOAD: usize = 8192;

    /// Largest flip-dot column payload: column index plus up to 256 rows of bits
    pub const MAX_COLUMN_PAYLOAD: usize = 1 + 32;

    /// Largest reply payload: one status byte
    pub const MAX_REPLY_PAYLOAD: usize = 1;

    /// Highest addressable flip-dot column
    pub const MAX_COLUMN: usize = u8::MAX as usize;
}
