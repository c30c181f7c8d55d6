//! Byte channel capability beneath the transport session

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Size of the read buffer used by [`StreamTransport`]
const READ_CHUNK: usize = 256;

/// Pause between reads of a stream that has nothing buffered
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Whether panels on the channel answer each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AckMode {
    /// Wait for an ACK after every frame, retrying on timeout or NAK
    #[default]
    Required,
    /// The channel never replies; a frame counts as delivered once written
    None,
}

/// Send-bytes / receive-bytes capability the session drives
pub trait Transport {
    /// Write one complete frame. Implementations must not return until the
    /// whole buffer has been handed to the channel or an error occurred.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for reply bytes. `Ok(None)` means nothing
    /// arrived and the whole timeout has been used up.
    fn read_reply(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_reply(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        (**self).read_reply(timeout)
    }
}

/// In-memory channel that records frames instead of driving hardware
///
/// Used to produce offline payload files and in tests. Replies queued with
/// [`CaptureTransport::push_reply`] are handed out one per read, and an
/// empty queue reads as a timeout straight away.
#[derive(Debug, Clone, Default)]
pub struct CaptureTransport {
    frames: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
}

impl CaptureTransport {
    /// Create an empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by a later read
    pub fn push_reply(&mut self, bytes: impl Into<Vec<u8>>) {
        self.replies.push_back(bytes.into());
    }

    /// Every frame written, in order
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// All written frames concatenated into one stream
    pub fn bytes(&self) -> Vec<u8> {
        self.frames.concat()
    }

    /// Replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Drop recorded frames and queued replies
    pub fn clear(&mut self) {
        self.frames.clear();
        self.replies.clear();
    }
}

impl Transport for CaptureTransport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.frames.push(frame.to_vec());
        Ok(())
    }

    fn read_reply(&mut self, _timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        Ok(self.replies.pop_front())
    }
}

/// Channel over any byte stream, such as an opened serial device
///
/// Reads are repeated until bytes arrive or the reply timeout runs out, so
/// the stream's own read timeout only needs to be short enough to bound a
/// single read. Timed-out, would-block, interrupted and empty reads are
/// retried.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream
    pub fn new(stream: S) -> Self {
        StreamTransport { stream }
    }

    /// Borrow the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()
    }

    fn read_reply(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => return Ok(Some(buf[..n].to_vec())),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL.min(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Loopback stream: reads come from `input`, writes land in `output`
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_capture_records_frames() -> io::Result<()> {
        let mut capture = CaptureTransport::new();
        capture.write_frame(&[1, 2])?;
        capture.write_frame(&[3])?;
        assert_eq!(capture.frames().len(), 2);
        assert_eq!(capture.bytes(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_capture_replies_in_order() -> io::Result<()> {
        let mut capture = CaptureTransport::new();
        capture.push_reply(vec![0xAA]);
        capture.push_reply(vec![0xBB]);
        assert_eq!(capture.read_reply(Duration::ZERO)?, Some(vec![0xAA]));
        assert_eq!(capture.pending_replies(), 1);
        assert_eq!(capture.read_reply(Duration::ZERO)?, Some(vec![0xBB]));
        assert_eq!(capture.read_reply(Duration::ZERO)?, None);
        Ok(())
    }

    #[test]
    fn test_stream_transport() -> io::Result<()> {
        let duplex = Duplex {
            input: Cursor::new(vec![0x02, 0x01]),
            output: Vec::new(),
        };
        let mut transport = StreamTransport::new(duplex);
        transport.write_frame(&[9, 8, 7])?;
        assert_eq!(transport.read_reply(Duration::ZERO)?, Some(vec![0x02, 0x01]));
        assert_eq!(transport.read_reply(Duration::ZERO)?, None);
        assert_eq!(transport.into_inner().output, vec![9, 8, 7]);
        Ok(())
    }

    /// Stream whose reads time out until `ready` reads have been attempted
    struct SlowDevice {
        ready: usize,
        reads: usize,
        reply: Vec<u8>,
    }

    impl Read for SlowDevice {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            if self.reads < self.ready {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let n = self.reply.len().min(buf.len());
            buf[..n].copy_from_slice(&self.reply[..n]);
            self.reply.drain(..n);
            Ok(n)
        }
    }

    impl Write for SlowDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_read_waits_out_device_timeouts() -> io::Result<()> {
        let mut transport = StreamTransport::new(SlowDevice {
            ready: 3,
            reads: 0,
            reply: vec![0x06],
        });
        let reply = transport.read_reply(Duration::from_secs(5))?;
        assert_eq!(reply, Some(vec![0x06]));
        assert_eq!(transport.get_ref().reads, 3);
        Ok(())
    }

    #[test]
    fn test_stream_read_gives_up_at_timeout() -> io::Result<()> {
        let mut transport = StreamTransport::new(SlowDevice {
            ready: usize::MAX,
            reads: 0,
            reply: Vec::new(),
        });
        let started = Instant::now();
        assert_eq!(transport.read_reply(Duration::from_millis(20))?, None);
        assert!(started.elapsed() >= Duration::from_millis(20));
        Ok(())
    }
}
