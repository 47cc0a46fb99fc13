//! Detection channel lifecycle.
//!
//! ```text
//! Disconnected -> Connecting -> Connected | Error
//! Connected    -> Disconnected          (explicit or abnormal close)
//! Error        -> Connecting            (manual retry only)
//! ```
//!
//! The channel itself never touches a socket. It hands out
//! [`ConnectRequest`]s, is told about their outcome through `on_open`,
//! `on_error` and `on_close`, and writes through a [`ConnectionHandle`]. Every
//! attempt carries a sequence number so that late events from an abandoned
//! attempt are recognised and dropped.
//!
//! Reconnect policy: an abnormal close while the consumer is still active
//! schedules a reconnect after a fixed delay. An error does not; the consumer
//! is offered a manual retry instead.

use serde::Serialize;
use url::Url;

use super::protocol::{parse_inbound, InboundMessage, Payload};
use crate::error::{ConnectionError, ProtocolError};

pub const NORMAL_CLOSE: u16 = 1000;
pub const ABNORMAL_CLOSE: u16 = 1006;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Write side of an open connection.
pub trait ConnectionHandle: Send {
    fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;
    fn close(&mut self, code: u16);
}

/// Instruction to open a socket for attempt `attempt`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub attempt: u64,
    pub url: Url,
}

/// Socket-side events, produced by a connection pump.
pub enum LinkEvent {
    Opened {
        attempt: u64,
        handle: Box<dyn ConnectionHandle>,
    },
    Failed {
        attempt: u64,
        error: ConnectionError,
    },
    Message {
        attempt: u64,
        payload: Payload,
    },
    Closed {
        attempt: u64,
        code: u16,
    },
}

impl std::fmt::Debug for LinkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEvent::Opened { attempt, .. } => write!(f, "Opened({})", attempt),
            LinkEvent::Failed { attempt, error } => write!(f, "Failed({}, {})", attempt, error),
            LinkEvent::Message { attempt, .. } => write!(f, "Message({})", attempt),
            LinkEvent::Closed { attempt, code } => write!(f, "Closed({}, {})", attempt, code),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub messages_received: u64,
    pub messages_discarded: u64,
}

pub struct DetectionChannel {
    url: Url,
    state: ConnectionState,
    in_flight: bool,
    attempt: u64,
    handle: Option<Box<dyn ConnectionHandle>>,
    pending_connect_ms: Option<u64>,
    reconnect_delay_ms: u64,
    last_error: Option<ConnectionError>,
    stats: ChannelStats,
}

impl DetectionChannel {
    pub fn new(url: Url, reconnect_delay_ms: u64) -> Self {
        Self {
            url,
            state: ConnectionState::Disconnected,
            in_flight: false,
            attempt: 0,
            handle: None,
            pending_connect_ms: None,
            reconnect_delay_ms,
            last_error: None,
            stats: ChannelStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Deadline of a scheduled (re)connect, if any.
    pub fn pending_connect(&self) -> Option<u64> {
        self.pending_connect_ms
    }

    /// Start a connection attempt unless one is in flight or already open.
    pub fn connect(&mut self) -> Option<ConnectRequest> {
        if self.in_flight || self.state == ConnectionState::Connected {
            log::debug!("connect skipped: state={} in_flight={}", self.state, self.in_flight);
            return None;
        }
        self.pending_connect_ms = None;
        self.attempt += 1;
        self.in_flight = true;
        self.state = ConnectionState::Connecting;
        log::info!("connecting to {} (attempt {})", self.url, self.attempt);
        Some(ConnectRequest {
            attempt: self.attempt,
            url: self.url.clone(),
        })
    }

    /// Arrange for `poll_connect` to start an attempt at `at_ms`.
    pub fn schedule_connect(&mut self, at_ms: u64) {
        self.pending_connect_ms = Some(at_ms);
    }

    pub fn cancel_pending_connect(&mut self) {
        self.pending_connect_ms = None;
    }

    /// Fire a scheduled connect once due. The `consumer_active` condition is
    /// checked now, at fire time, not when the connect was scheduled.
    pub fn poll_connect(&mut self, now_ms: u64, consumer_active: bool) -> Option<ConnectRequest> {
        match self.pending_connect_ms {
            Some(at) if now_ms >= at => {
                self.pending_connect_ms = None;
                if !consumer_active {
                    log::debug!("scheduled connect dropped: consumer inactive");
                    return None;
                }
                self.connect()
            }
            _ => None,
        }
    }

    pub fn on_open(&mut self, attempt: u64, mut handle: Box<dyn ConnectionHandle>) -> bool {
        if attempt != self.attempt || self.state != ConnectionState::Connecting {
            log::debug!("closing stale connection from attempt {}", attempt);
            handle.close(NORMAL_CLOSE);
            return false;
        }
        self.in_flight = false;
        self.state = ConnectionState::Connected;
        self.handle = Some(handle);
        self.last_error = None;
        log::info!("connected to {}", self.url);
        true
    }

    /// Returns true when the error applies to the current attempt and the
    /// consumer should be offered a retry.
    pub fn on_error(&mut self, attempt: u64, error: ConnectionError) -> bool {
        if attempt != self.attempt {
            return false;
        }
        log::warn!("detection channel error: {}", error);
        self.in_flight = false;
        self.handle = None;
        self.state = ConnectionState::Error;
        self.last_error = Some(error);
        true
    }

    /// Returns the reconnect deadline if one was scheduled.
    pub fn on_close(
        &mut self,
        attempt: u64,
        code: u16,
        now_ms: u64,
        consumer_active: bool,
    ) -> Option<u64> {
        if attempt != self.attempt {
            return None;
        }
        log::info!("detection channel closed (code {})", code);
        self.in_flight = false;
        self.handle = None;
        if self.state != ConnectionState::Error {
            self.state = ConnectionState::Disconnected;
        }
        if code != NORMAL_CLOSE && consumer_active {
            let at = now_ms + self.reconnect_delay_ms;
            self.pending_connect_ms = Some(at);
            log::info!("reconnect scheduled in {}ms", self.reconnect_delay_ms);
            return Some(at);
        }
        None
    }

    /// Explicit close. Cancels any scheduled connect and orphans an attempt
    /// that is still connecting.
    pub fn close(&mut self) {
        let had_attempt = self.in_flight || self.handle.is_some();
        if let Some(mut handle) = self.handle.take() {
            handle.close(NORMAL_CLOSE);
        }
        if had_attempt {
            // Late events from the abandoned attempt are now stale; a late
            // open is closed on arrival.
            self.attempt += 1;
        }
        self.in_flight = false;
        self.cancel_pending_connect();
        self.state = ConnectionState::Disconnected;
    }

    /// Send a text frame. Dropped silently unless connected.
    pub fn send(&mut self, text: String) -> bool {
        let handle = match (self.state, self.handle.as_mut()) {
            (ConnectionState::Connected, Some(handle)) => handle,
            _ => {
                self.stats.frames_dropped += 1;
                return false;
            }
        };
        match handle.send_text(text) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                // The pump reports the close separately.
                log::debug!("send failed: {}", e);
                self.stats.frames_dropped += 1;
                false
            }
        }
    }

    /// Validate an inbound frame. Protocol errors are logged and swallowed;
    /// the connection stays open.
    pub fn receive(&mut self, attempt: u64, payload: &Payload) -> Option<InboundMessage> {
        if attempt != self.attempt || self.state != ConnectionState::Connected {
            return None;
        }
        self.stats.messages_received += 1;
        match parse_inbound(payload) {
            Ok(msg) => Some(msg),
            Err(e) => {
                self.stats.messages_discarded += 1;
                match e {
                    ProtocolError::Malformed(_) => log::warn!("discarding inbound message: {}", e),
                    _ => log::debug!("discarding inbound message: {}", e),
                }
                None
            }
        }
    }
}
