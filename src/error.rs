//! Error types for display bus encoding, font parsing and transport

use crate::core::{Address, PanelType};
use crate::frame::Command;
use thiserror::Error;

/// Result type for display bus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of an [`Error`], for callers that only branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or truncated font file
    Format,
    /// Canvas or payload rejected by an encoder or the frame builder
    Encoding,
    /// No display profile registered for an address
    NotFound,
    /// Malformed frame received from the bus
    Protocol,
    /// Channel failure, missing acknowledgement or cancellation
    Transport,
    /// IBIS telegram could not be built
    Telegram,
}

/// Error types encountered while rendering, encoding and sending frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Font file is malformed or truncated
    #[error("Font format error: {0}")]
    Format(String),

    /// Canvas dimensions differ from the target display profile
    #[error(
        "Canvas is {actual_width}x{actual_height} but display expects {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    /// Payload does not fit the command's wire format
    #[error("Payload of {len} bytes exceeds maximum of {max} for {command}")]
    PayloadTooLarge {
        command: Command,
        len: usize,
        max: usize,
    },

    /// Encoder used against a display of the other panel type
    #[error("Display {address} is a {actual} panel, encoder needs {expected}")]
    PanelMismatch {
        address: Address,
        expected: PanelType,
        actual: PanelType,
    },

    /// Column index does not fit the one-byte column field
    #[error("Column index {column} out of range [0, 255]")]
    ColumnOutOfRange { column: usize },

    /// Zero width or height
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Text produced a canvas of zero width
    #[error("Text layout has zero width")]
    EmptyLayout,

    /// No display profile registered for the address
    #[error("No display registered at {address}")]
    NotFound { address: Address },

    /// Received frame failed marker, length or checksum validation
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Acknowledgement not received after bounded retries
    #[error("No acknowledgement from {address} after {attempts} attempts")]
    Transport { address: Address, attempts: u32 },

    /// Underlying channel I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Session was cancelled between frames
    #[error("Session cancelled")]
    Cancelled,

    /// IBIS telegram arguments out of range
    #[error("Invalid telegram: {0}")]
    InvalidTelegram(String),
}

impl Error {
    /// Create a new Format error
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Create a new Protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new InvalidTelegram error
    pub fn invalid_telegram(msg: impl Into<String>) -> Self {
        Error::InvalidTelegram(msg.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            Error::DimensionMismatch { .. }
            | Error::PayloadTooLarge { .. }
            | Error::PanelMismatch { .. }
            | Error::ColumnOutOfRange { .. }
            | Error::InvalidDimensions { .. }
            | Error::EmptyLayout => ErrorKind::Encoding,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Transport { .. } | Error::Io(_) | Error::Cancelled => ErrorKind::Transport,
            Error::InvalidTelegram(_) => ErrorKind::Telegram,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
