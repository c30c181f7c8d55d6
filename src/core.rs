//! Core types shared by the rasterizer, the encoders and the transport

use crate::error::{Error, Result};
use std::str::FromStr;

/// Intensity above which a pixel counts as lit when encoding
pub const LIT_THRESHOLD: u8 = 127;

/// Intensity written for lit pixels by the rasterizer
pub const LIT: u8 = 0xFF;

/// Intensity written for unlit pixels by the rasterizer
pub const UNLIT: u8 = 0x00;

/// Panel address on the shared bus (0-255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(u8);

impl Address {
    /// Create a new address. Every byte value is a valid bus address.
    pub const fn new(addr: u8) -> Self {
        Address(addr)
    }

    /// Get the raw address value
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for Address {
    fn from(addr: u8) -> Self {
        Address(addr)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

/// Display technology behind an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PanelType {
    /// LED matrix, takes one full bitmap per update
    Led,
    /// Electromechanical flip-dot, updated column by column
    Flipdot,
}

impl std::fmt::Display for PanelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelType::Led => write!(f, "LED"),
            PanelType::Flipdot => write!(f, "flip-dot"),
        }
    }
}

impl FromStr for PanelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "led" => Ok(PanelType::Led),
            "flipdot" | "flip-dot" => Ok(PanelType::Flipdot),
            other => Err(Error::protocol(format!("Unknown panel type: {}", other))),
        }
    }
}

/// Rectangular pixel buffer exchanged between rasterization and encoding
///
/// Pixels are stored row-major as 8-bit intensities and interpreted as
/// lit/unlit through [`LIT_THRESHOLD`] at encoding time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelCanvas {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl PixelCanvas {
    /// Create an all-unlit canvas
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Self::check_dimensions(width, height)?;
        Ok(PixelCanvas {
            width,
            height,
            pixels: vec![UNLIT; width * height],
        })
    }

    /// Wrap an existing row-major buffer
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        Self::check_dimensions(width, height)?;
        if pixels.len() != width * height {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(PixelCanvas {
            width,
            height,
            pixels,
        })
    }

    fn check_dimensions(width: usize, height: usize) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        width
            .checked_mul(height)
            .map(|_| ())
            .ok_or(Error::InvalidDimensions { width, height })
    }

    /// Canvas width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Canvas height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Intensity at (x, y), `None` outside the canvas
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Set the intensity at (x, y). Writes outside the canvas are clipped.
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = value;
        }
    }

    /// Whether (x, y) is above the lit threshold
    pub fn is_lit(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some_and(|v| v > LIT_THRESHOLD)
    }

    /// One row of intensities
    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    /// Set every pixel to the same intensity
    pub fn fill(&mut self, value: u8) {
        self.pixels.fill(value);
    }

    /// Raw row-major buffer
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl std::fmt::Display for PixelCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for y in 0..self.height {
            for x in 0..self.width {
                f.write_str(if self.is_lit(x, y) { "#" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
