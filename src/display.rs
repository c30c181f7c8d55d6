//! Registry-aware facade that pushes canvases to addressed panels

use crate::core::{Address, PanelType, PixelCanvas};
use crate::encoding::{BitmapEncoder, ColumnEncoder};
use crate::error::Result;
use crate::frame::Command;
use crate::registry::{DisplayProfile, DisplayRegistry};
use crate::session::{Ack, SessionBuilder, TransportSession};
use crate::transport::{AckMode, CaptureTransport, Transport};
use log::trace;

/// Displays on one bus together with the session that drives it
pub struct DisplayBus<T> {
    registry: DisplayRegistry,
    session: TransportSession<T>,
}

impl<T: Transport> DisplayBus<T> {
    /// Combine a registry and a session
    pub fn new(registry: DisplayRegistry, session: TransportSession<T>) -> Self {
        DisplayBus { registry, session }
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    /// Mutable access for reconfiguring displays
    pub fn registry_mut(&mut self) -> &mut DisplayRegistry {
        &mut self.registry
    }

    pub fn session(&self) -> &TransportSession<T> {
        &self.session
    }

    /// Send a canvas to the panel at `address`
    ///
    /// LED panels receive exactly one bitmap frame. Flip-dot panels receive
    /// one frame per column starting at `col_offset`, each acknowledged
    /// before the next column is encoded. `col_offset` is ignored for LED.
    pub fn send_canvas(
        &self,
        address: Address,
        canvas: &PixelCanvas,
        col_offset: usize,
    ) -> Result<Vec<Ack>> {
        let profile = self.registry.get(address)?;
        send_to_profile(&self.session, profile, canvas, col_offset)
    }
}

fn send_to_profile<T: Transport>(
    session: &TransportSession<T>,
    profile: &DisplayProfile,
    canvas: &PixelCanvas,
    col_offset: usize,
) -> Result<Vec<Ack>> {
    match profile.panel_type {
        PanelType::Led => {
            let payload = BitmapEncoder::new(profile)?.encode(canvas)?;
            let ack = session.send(profile.address, Command::BitmapDataLed, &payload)?;
            Ok(vec![ack])
        }
        PanelType::Flipdot => {
            let columns = ColumnEncoder::new(profile)?.encode(canvas, col_offset)?;
            let payloads = columns.map(|column| {
                trace!("{} column {}", profile.address, column.column);
                column.to_bytes()
            });
            session.send_sequence(profile.address, Command::ColumnDataFlipdot, payloads)
        }
    }
}

/// Encode a canvas for one display into the contiguous frame stream that
/// would go over the bus, without a live channel
///
/// The result is what an offline payload file holds: one frame for LED,
/// one frame per column for flip-dot.
pub fn capture_canvas(
    profile: &DisplayProfile,
    canvas: &PixelCanvas,
    col_offset: usize,
) -> Result<Vec<u8>> {
    let session = SessionBuilder::new()
        .with_ack_mode(AckMode::None)
        .build(CaptureTransport::new());
    send_to_profile(&session, profile, canvas, col_offset)?;
    Ok(session.into_transport()?.bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LIT;
    use crate::error::Error;
    use crate::frame::{FrameCodec, FrameParser};

    fn bus() -> DisplayBus<CaptureTransport> {
        let mut registry = DisplayRegistry::new();
        registry.set(Address::new(1), 8, 2, PanelType::Led).unwrap();
        registry.set(Address::new(2), 3, 2, PanelType::Flipdot).unwrap();
        let session = SessionBuilder::new()
            .with_ack_mode(AckMode::None)
            .build(CaptureTransport::new());
        DisplayBus::new(registry, session)
    }

    #[test]
    fn test_led_sends_one_frame() -> Result<()> {
        let bus = bus();
        let mut canvas = PixelCanvas::new(8, 2)?;
        canvas.set(7, 1, LIT);
        let acks = bus.send_canvas(Address::new(1), &canvas, 0)?;
        assert_eq!(acks.len(), 1);

        let frames = bus.session().with_transport(|t| t.frames().to_vec())?;
        let frame = FrameCodec::parse_incoming(&frames[0])?;
        assert_eq!(frame.command, Command::BitmapDataLed);
        assert_eq!(frame.payload, vec![0x00, 0x80]);
        Ok(())
    }

    #[test]
    fn test_flipdot_sends_column_frames_in_order() -> Result<()> {
        let bus = bus();
        let canvas = PixelCanvas::new(3, 2)?;
        let acks = bus.send_canvas(Address::new(2), &canvas, 5)?;
        assert_eq!(acks.len(), 3);

        let stream = bus.session().with_transport(|t| t.bytes())?;
        let columns: Vec<u8> = FrameParser::new()
            .feed_bytes(&stream)
            .into_iter()
            .map(|frame| frame.map(|f| f.payload[0]))
            .collect::<Result<_>>()?;
        assert_eq!(columns, vec![5, 6, 7]);
        Ok(())
    }

    #[test]
    fn test_unknown_address() -> Result<()> {
        let bus = bus();
        let canvas = PixelCanvas::new(8, 2)?;
        assert!(matches!(
            bus.send_canvas(Address::new(9), &canvas, 0),
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_mismatched_canvas_sends_nothing() -> Result<()> {
        let bus = bus();
        let canvas = PixelCanvas::new(4, 2)?;
        assert!(bus.send_canvas(Address::new(2), &canvas, 0).is_err());
        assert!(bus.session().with_transport(|t| t.frames().is_empty())?);
        Ok(())
    }

    #[test]
    fn test_capture_canvas() -> Result<()> {
        let profile = DisplayProfile::new(Address::new(1), 3, 2, PanelType::Flipdot)?;
        let canvas = PixelCanvas::new(3, 2)?;
        let stream = capture_canvas(&profile, &canvas, 0)?;
        // three frames of 7 overhead bytes plus column index and one data byte
        assert_eq!(stream.len(), 3 * 9);
        Ok(())
    }
}
