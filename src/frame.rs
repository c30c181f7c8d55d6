//! Frame encoding and decoding for the display bus
//!
//! Frame format:
//! ```text
//! ┌─────┬──────┬─────┬────────────┬─────────┬─────┬─────┐
//! │ STX │ ADDR │ CMD │ LEN (u16)  │ PAYLOAD │ CHK │ ETX │
//! │ 1B  │ 1B   │ 1B  │ 2B, BE     │ LEN B   │ 1B  │ 1B  │
//! └─────┴──────┴─────┴────────────┴─────────┴─────┴─────┘
//! ```
//!
//! CHK is the XOR of ADDR, CMD, both LEN bytes and every payload byte.
//! Payloads are length-delimited, so marker values may appear inside them.

use crate::core::Address;
use crate::error::{Error, Result};
use crate::limits;
use bitfield::bitfield;

/// Frame start marker (ASCII STX)
pub const FRAME_START: u8 = 0x02;

/// Frame end marker (ASCII ETX)
pub const FRAME_END: u8 = 0x03;

/// Bytes surrounding the payload: STX, ADDR, CMD, LEN(2), CHK, ETX
pub const FRAME_OVERHEAD: usize = 7;

/// Command code carried in every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Full bitmap for an LED panel
    BitmapDataLed = 0x10,
    /// Single column update for a flip-dot panel
    ColumnDataFlipdot = 0x20,
    /// Positive acknowledgement from a panel
    Ack = 0x06,
    /// Negative acknowledgement, the panel wants the frame again
    Nak = 0x15,
    /// Unsolicited or requested panel status
    Status = 0x30,
}

impl Command {
    /// Raw command byte
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Largest payload the command's wire format accepts
    pub fn max_payload_len(&self) -> usize {
        match self {
            Command::BitmapDataLed => limits::MAX_BITMAP_PAYLOAD,
            Command::ColumnDataFlipdot => limits::MAX_COLUMN_PAYLOAD,
            Command::Ack | Command::Nak | Command::Status => limits::MAX_REPLY_PAYLOAD,
        }
    }

    /// Whether a panel sends this command back to the controller
    pub fn is_reply(&self) -> bool {
        matches!(self, Command::Ack | Command::Nak | Command::Status)
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x10 => Ok(Command::BitmapDataLed),
            0x20 => Ok(Command::ColumnDataFlipdot),
            0x06 => Ok(Command::Ack),
            0x15 => Ok(Command::Nak),
            0x30 => Ok(Command::Status),
            _ => Err(Error::protocol(format!(
                "Unknown command code: {:#04x}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::BitmapDataLed => write!(f, "BITMAP_DATA_LED"),
            Command::ColumnDataFlipdot => write!(f, "COLUMN_DATA_FLIPDOT"),
            Command::Ack => write!(f, "ACK"),
            Command::Nak => write!(f, "NAK"),
            Command::Status => write!(f, "STATUS"),
        }
    }
}

bitfield! {
    /// Status byte optionally carried by ACK and STATUS replies
    ///
    /// - Bit 3: panel powered
    /// - Bit 2: panel saw a checksum error since the last report
    /// - Bit 1: hardware fault
    /// - Bit 0: busy applying a previous update
    #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct PanelStatus(u8);
    impl Debug;
    pub busy, set_busy: 0;
    pub fault, set_fault: 1;
    pub checksum_error, set_checksum_error: 2;
    pub powered, set_powered: 3;
}

impl PanelStatus {
    /// Wrap a raw status byte
    pub fn from_byte(byte: u8) -> Self {
        PanelStatus(byte)
    }

    /// Raw status byte
    pub fn byte(&self) -> u8 {
        self.0
    }
}

/// A parsed or constructed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Target (outgoing) or source (incoming) panel
    pub address: Address,
    /// Command code
    pub command: Command,
    /// Command-specific data
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame, checking the payload against the command's limit
    pub fn new(address: Address, command: Command, payload: &[u8]) -> Result<Self> {
        check_payload_len(command, payload.len())?;
        Ok(Frame {
            address,
            command,
            payload: payload.to_vec(),
        })
    }

    /// Panel status byte of an ACK/STATUS reply, if present
    pub fn status(&self) -> Option<PanelStatus> {
        if self.command.is_reply() {
            self.payload.first().copied().map(PanelStatus::from_byte)
        } else {
            None
        }
    }

    /// Serialize to wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        FrameCodec::build(self.address, self.command, &self.payload)
    }
}

fn check_payload_len(command: Command, len: usize) -> Result<()> {
    let max = command.max_payload_len();
    if len > max {
        return Err(Error::PayloadTooLarge { command, len, max });
    }
    Ok(())
}

/// Stateless builder and validator for complete frames
pub struct FrameCodec;

impl FrameCodec {
    /// Calculate the XOR checksum over address, command, length and payload
    pub fn checksum(address: u8, command: u8, len: u16, payload: &[u8]) -> u8 {
        let [len_hi, len_lo] = len.to_be_bytes();
        payload
            .iter()
            .fold(address ^ command ^ len_hi ^ len_lo, |acc, &b| acc ^ b)
    }

    /// Build the wire bytes for one frame
    pub fn build(address: Address, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        check_payload_len(command, payload.len())?;
        // every per-command maximum fits the u16 length field
        let len = payload.len() as u16;

        let mut bytes = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
        bytes.push(FRAME_START);
        bytes.push(address.value());
        bytes.push(command.code());
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes.push(Self::checksum(address.value(), command.code(), len, payload));
        bytes.push(FRAME_END);
        Ok(bytes)
    }

    /// Validate and decode a buffer holding exactly one frame
    ///
    /// Markers, command code, length, and checksum are all checked before a
    /// [`Frame`] is returned. A malformed buffer is rejected as a whole.
    pub fn parse_incoming(bytes: &[u8]) -> Result<Frame> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(Error::protocol(format!(
                "Frame too short: {} bytes, need at least {}",
                bytes.len(),
                FRAME_OVERHEAD
            )));
        }
        if bytes[0] != FRAME_START {
            return Err(Error::protocol(format!(
                "Bad start marker {:#04x}",
                bytes[0]
            )));
        }

        let address = Address::new(bytes[1]);
        let command = Command::try_from(bytes[2])?;
        let len = u16::from_be_bytes([bytes[3], bytes[4]]);
        let payload_len = len as usize;

        let expected_total = FRAME_OVERHEAD + payload_len;
        if bytes.len() != expected_total {
            return Err(Error::protocol(format!(
                "Length field declares {} payload bytes but frame has {} bytes (expected {})",
                payload_len,
                bytes.len(),
                expected_total
            )));
        }
        check_payload_len(command, payload_len)
            .map_err(|e| Error::protocol(e.to_string()))?;

        let payload = &bytes[5..5 + payload_len];
        let checksum = bytes[5 + payload_len];
        let end = bytes[6 + payload_len];

        if end != FRAME_END {
            return Err(Error::protocol(format!("Bad end marker {:#04x}", end)));
        }

        let expected = Self::checksum(bytes[1], bytes[2], len, payload);
        if checksum != expected {
            return Err(Error::protocol(format!(
                "Checksum mismatch: got {:#04x}, expected {:#04x}",
                checksum, expected
            )));
        }

        Ok(Frame {
            address,
            command,
            payload: payload.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for STX
    WaitingForStart,
    WaitingForAddress,
    WaitingForCommand,
    WaitingForLengthHigh,
    WaitingForLengthLow,
    ReadingPayload,
    WaitingForChecksum,
    /// Checksum verified, waiting for ETX
    WaitingForEnd,
}

/// State machine for parsing frames out of a byte stream
///
/// Bytes before a start marker are skipped. A frame that fails validation is
/// dropped whole and the parser returns to hunting for the next start marker.
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParseState,
    address: u8,
    command: Option<Command>,
    expected_length: u16,
    buffer: Vec<u8>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a new frame parser
    pub fn new() -> Self {
        FrameParser {
            state: ParseState::WaitingForStart,
            address: 0,
            command: None,
            expected_length: 0,
            buffer: Vec::new(),
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.state = ParseState::WaitingForStart;
        self.address = 0;
        self.command = None;
        self.expected_length = 0;
        self.buffer.clear();
    }

    fn fail(&mut self, err: Error) -> Result<Option<Frame>> {
        self.reset();
        Err(err)
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(frame))` when a complete valid frame is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` when the frame in
    /// progress was malformed and has been discarded.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>> {
        match self.state {
            ParseState::WaitingForStart => {
                if byte == FRAME_START {
                    self.state = ParseState::WaitingForAddress;
                }
                Ok(None)
            }
            ParseState::WaitingForAddress => {
                self.address = byte;
                self.state = ParseState::WaitingForCommand;
                Ok(None)
            }
            ParseState::WaitingForCommand => match Command::try_from(byte) {
                Ok(command) => {
                    self.command = Some(command);
                    self.state = ParseState::WaitingForLengthHigh;
                    Ok(None)
                }
                Err(e) => self.fail(e),
            },
            ParseState::WaitingForLengthHigh => {
                self.expected_length = u16::from(byte) << 8;
                self.state = ParseState::WaitingForLengthLow;
                Ok(None)
            }
            ParseState::WaitingForLengthLow => {
                self.expected_length |= u16::from(byte);
                let Some(command) = self.command else {
                    return self.fail(Error::protocol("Length before command"));
                };
                if let Err(e) = check_payload_len(command, self.expected_length as usize) {
                    return self.fail(Error::protocol(e.to_string()));
                }
                self.buffer.clear();
                self.state = if self.expected_length == 0 {
                    ParseState::WaitingForChecksum
                } else {
                    ParseState::ReadingPayload
                };
                Ok(None)
            }
            ParseState::ReadingPayload => {
                self.buffer.push(byte);
                if self.buffer.len() == self.expected_length as usize {
                    self.state = ParseState::WaitingForChecksum;
                }
                Ok(None)
            }
            ParseState::WaitingForChecksum => {
                let code = self.command.map(|c| c.code()).unwrap_or_default();
                let expected =
                    FrameCodec::checksum(self.address, code, self.expected_length, &self.buffer);
                if byte != expected {
                    return self.fail(Error::protocol(format!(
                        "Checksum mismatch: got {:#04x}, expected {:#04x}",
                        byte, expected
                    )));
                }
                self.state = ParseState::WaitingForEnd;
                Ok(None)
            }
            ParseState::WaitingForEnd => {
                if byte != FRAME_END {
                    return self.fail(Error::protocol(format!("Bad end marker {:#04x}", byte)));
                }
                let Some(command) = self.command else {
                    return self.fail(Error::protocol("Frame without command"));
                };
                let frame = Frame {
                    address: Address::new(self.address),
                    command,
                    payload: std::mem::take(&mut self.buffer),
                };
                self.reset();
                Ok(Some(frame))
            }
        }
    }

    /// Feed multiple bytes, collecting every complete frame and every error
    ///
    /// Errors do not stop the scan: the malformed frame is dropped and
    /// parsing resumes with the following bytes.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<Result<Frame>> {
        bytes
            .iter()
            .filter_map(|&byte| self.feed(byte).transpose())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_good_ack_frame() -> Result<()> {
        let bytes = FrameCodec::build(Address::new(0x01), Command::Ack, &[])?;
        assert_eq!(bytes, vec![0x02, 0x01, 0x06, 0x00, 0x00, 0x07, 0x03]);
        Ok(())
    }

    #[test]
    fn test_known_good_column_frame() -> Result<()> {
        let bytes = FrameCodec::build(Address::new(0x05), Command::ColumnDataFlipdot, &[0x03, 0xA5])?;
        // 0x05 ^ 0x20 ^ 0x00 ^ 0x02 ^ 0x03 ^ 0xA5 = 0x81
        assert_eq!(
            bytes,
            vec![0x02, 0x05, 0x20, 0x00, 0x02, 0x03, 0xA5, 0x81, 0x03]
        );
        Ok(())
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; Command::ColumnDataFlipdot.max_payload_len() + 1];
        let result = FrameCodec::build(Address::new(1), Command::ColumnDataFlipdot, &payload);
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() -> Result<()> {
        let mut bytes = FrameCodec::build(Address::new(2), Command::BitmapDataLed, &[1, 2, 3])?;
        let chk = bytes.len() - 2;
        bytes[chk] ^= 0xFF;
        let err = FrameCodec::parse_incoming(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum"));
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_markers() -> Result<()> {
        let good = FrameCodec::build(Address::new(2), Command::Ack, &[])?;

        let mut bad_start = good.clone();
        bad_start[0] = 0x7E;
        assert!(FrameCodec::parse_incoming(&bad_start).is_err());

        let mut bad_end = good.clone();
        let last = bad_end.len() - 1;
        bad_end[last] = 0x00;
        assert!(FrameCodec::parse_incoming(&bad_end).is_err());

        let mut trailing = good;
        trailing.push(0x00);
        assert!(FrameCodec::parse_incoming(&trailing).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        let bytes = [0x02, 0x01, 0x99, 0x00, 0x00, 0x98, 0x03];
        assert!(FrameCodec::parse_incoming(&bytes).is_err());
    }

    #[test]
    fn test_panel_status_bits() {
        let mut status = PanelStatus::default();
        status.set_busy(true);
        status.set_powered(true);
        assert_eq!(status.byte(), 0b1001);
        assert!(!PanelStatus::from_byte(0b0100).fault());
        assert!(PanelStatus::from_byte(0b0100).checksum_error());
    }

    #[test]
    fn test_reply_status_byte() -> Result<()> {
        let frame = Frame::new(Address::new(4), Command::Ack, &[0b0010])?;
        assert!(frame.status().is_some_and(|s| s.fault()));
        let frame = Frame::new(Address::new(4), Command::ColumnDataFlipdot, &[0, 1])?;
        assert_eq!(frame.status(), None);
        Ok(())
    }

    #[test]
    fn test_parser_resync_after_garbage() -> Result<()> {
        let encoded = FrameCodec::build(Address::new(9), Command::Ack, &[0x08])?;
        let mut data = vec![0x00, 0xFF, 0x12, 0x03];
        data.extend_from_slice(&encoded);

        let mut parser = FrameParser::new();
        let results = parser.feed_bytes(&data);
        assert_eq!(results.len(), 1);
        let frame = results[0].clone()?;
        assert_eq!(frame.address, Address::new(9));
        assert_eq!(frame.command, Command::Ack);
        Ok(())
    }

    #[test]
    fn test_parser_recovers_after_corrupt_frame() -> Result<()> {
        let mut corrupt = FrameCodec::build(Address::new(1), Command::Nak, &[])?;
        corrupt[5] ^= 0x01;
        let good = FrameCodec::build(Address::new(1), Command::Ack, &[])?;

        let mut parser = FrameParser::new();
        let mut stream = corrupt;
        stream.extend_from_slice(&good);
        let results = parser.feed_bytes(&stream);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1].clone()?.command, Command::Ack);
        Ok(())
    }

    fn any_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            Just(Command::BitmapDataLed),
            Just(Command::ColumnDataFlipdot),
            Just(Command::Ack),
            Just(Command::Nak),
            Just(Command::Status),
        ]
    }

    proptest! {
        #[test]
        fn prop_build_parse_roundtrip(
            address in any::<u8>(),
            command in any_command(),
            payload in proptest::collection::vec(any::<u8>(), 0..=33),
        ) {
            let payload = &payload[..payload.len().min(command.max_payload_len())];
            let bytes = FrameCodec::build(Address::new(address), command, payload).unwrap();
            let frame = FrameCodec::parse_incoming(&bytes).unwrap();
            prop_assert_eq!(frame.address, Address::new(address));
            prop_assert_eq!(frame.command, command);
            prop_assert_eq!(frame.payload.as_slice(), payload);

            let mut parser = FrameParser::new();
            let streamed = parser.feed_bytes(&bytes);
            prop_assert_eq!(streamed.len(), 1);
            prop_assert_eq!(streamed[0].clone().unwrap(), frame);
        }
    }
}
