//! Frame send / acknowledge / retry over one shared bus channel

use crate::core::Address;
use crate::error::{Error, Result};
use crate::frame::{Command, FrameCodec, FrameParser, PanelStatus};
use crate::transport::{AckMode, Transport};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default wait for an acknowledgement
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of retransmissions after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// How long to wait for a reply after each transmission
    pub ack_timeout: Duration,
    /// Retransmissions of the same bytes before giving up
    pub max_retries: u32,
    /// Whether the channel replies at all
    pub ack_mode: AckMode,
    /// Log every frame written and read as hex
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            ack_mode: AckMode::Required,
            debug: false,
        }
    }
}

/// Shared flag that abandons a session at the next frame boundary
///
/// Cancellation is observed before each transmission and while waiting for
/// a reply, never in the middle of writing a frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the session can be used again
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Successful delivery of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Panel that acknowledged
    pub address: Address,
    /// Transmissions needed, 1 when the first one got through
    pub attempts: u32,
    /// Status byte carried by the reply, if any
    pub status: Option<PanelStatus>,
}

enum Reply {
    Ack(Option<PanelStatus>),
    Nak,
    Timeout,
}

/// Owner of the bus channel
///
/// Every send holds the channel for its whole send/acknowledge cycle, so
/// concurrent callers are serialized and only one frame is ever in flight
/// across all addresses.
pub struct TransportSession<T> {
    transport: Mutex<T>,
    config: SessionConfig,
    cancel: CancelToken,
}

impl<T: Transport> TransportSession<T> {
    /// Create a session with default settings
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a session with explicit settings
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self::with_cancel_token(transport, config, CancelToken::new())
    }

    /// Create a session observing an existing cancellation token
    pub fn with_cancel_token(transport: T, config: SessionConfig, cancel: CancelToken) -> Self {
        TransportSession {
            transport: Mutex::new(transport),
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that cancels this session's sends
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Build and deliver one frame
    pub fn send(&self, address: Address, command: Command, payload: &[u8]) -> Result<Ack> {
        let mut transport = self.lock()?;
        self.send_locked(&mut transport, address, command, payload)
    }

    /// Deliver a sequence of frames to one address without releasing the bus
    ///
    /// Payloads are pulled from the iterator one at a time, and each frame is
    /// acknowledged before the next payload is requested. The first failure
    /// stops the sequence.
    pub fn send_sequence<I>(&self, address: Address, command: Command, payloads: I) -> Result<Vec<Ack>>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut transport = self.lock()?;
        let mut acks = Vec::new();
        for payload in payloads {
            acks.push(self.send_locked(&mut transport, address, command, &payload)?);
        }
        Ok(acks)
    }

    /// Run `f` with exclusive access to the channel
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut transport = self.lock()?;
        Ok(f(&mut transport))
    }

    /// Consume the session, returning the channel
    pub fn into_transport(self) -> Result<T> {
        self.transport
            .into_inner()
            .map_err(|_| Error::Io("transport lock poisoned".to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.transport
            .lock()
            .map_err(|_| Error::Io("transport lock poisoned".to_string()))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn send_locked(
        &self,
        transport: &mut T,
        address: Address,
        command: Command,
        payload: &[u8],
    ) -> Result<Ack> {
        let bytes = FrameCodec::build(address, command, payload)?;
        let mut attempts = 0u32;

        loop {
            self.check_cancelled()?;
            attempts += 1;
            if self.config.debug {
                debug!("-> {} {} #{}: {}", address, command, attempts, hex(&bytes));
            }
            transport.write_frame(&bytes)?;

            if self.config.ack_mode == AckMode::None {
                return Ok(Ack {
                    address,
                    attempts,
                    status: None,
                });
            }

            match self.await_reply(transport, address)? {
                Reply::Ack(status) => {
                    return Ok(Ack {
                        address,
                        attempts,
                        status,
                    })
                }
                Reply::Nak => warn!("{} rejected {} (attempt {})", address, command, attempts),
                Reply::Timeout => warn!(
                    "No reply from {} within {:?} (attempt {})",
                    address, self.config.ack_timeout, attempts
                ),
            }

            if attempts > self.config.max_retries {
                info!(
                    "Giving up on {} {} after {} attempts",
                    address, command, attempts
                );
                return Err(Error::Transport { address, attempts });
            }
        }
    }

    fn await_reply(&self, transport: &mut T, address: Address) -> Result<Reply> {
        let deadline = Instant::now() + self.config.ack_timeout;
        let mut parser = FrameParser::new();

        loop {
            self.check_cancelled()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Reply::Timeout);
            }

            let Some(bytes) = transport.read_reply(remaining)? else {
                return Ok(Reply::Timeout);
            };
            if self.config.debug {
                debug!("<- {}", hex(&bytes));
            }

            for result in parser.feed_bytes(&bytes) {
                match result {
                    Ok(frame) if frame.address != address => {
                        debug!("Ignoring {} from {}", frame.command, frame.address);
                    }
                    Ok(frame) => match frame.command {
                        Command::Ack | Command::Status => return Ok(Reply::Ack(frame.status())),
                        Command::Nak => return Ok(Reply::Nak),
                        // our own frame echoed back on the half-duplex line
                        _ => {}
                    },
                    Err(e) => warn!("Discarding malformed reply: {}", e),
                }
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builder for transport sessions
pub struct SessionBuilder {
    config: SessionConfig,
    cancel: Option<CancelToken>,
}

impl SessionBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        SessionBuilder {
            config: SessionConfig::default(),
            cancel: None,
        }
    }

    /// Set the acknowledgement timeout
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set the retransmission bound
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the acknowledgement mode
    pub fn with_ack_mode(mut self, mode: AckMode) -> Self {
        self.config.ack_mode = mode;
        self
    }

    /// Enable frame hex dumps
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Share a cancellation token, e.g. one token for several buses
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the session around a channel
    pub fn build<T: Transport>(self, transport: T) -> TransportSession<T> {
        let cancel = self.cancel.unwrap_or_default();
        TransportSession::with_cancel_token(transport, self.config, cancel)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
