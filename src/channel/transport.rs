//! Transport seam and channel events

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::errors::{ChannelError, ChannelResult};

/// Which of the two logical connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// Replica endpoint, serves reads
    Read,
    /// Master endpoint, serves writes and pinned reads
    Write,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Read => "read",
            ConnectionRole::Write => "write",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transport reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    Closed,
    Error(String),
    /// Inbound text frame, undecoded
    Message(String),
}

/// A transport notification tagged with its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub role: ConnectionRole,
    pub kind: ChannelEventKind,
}

impl ChannelEvent {
    pub fn opened(role: ConnectionRole) -> Self {
        Self { role, kind: ChannelEventKind::Opened }
    }

    pub fn closed(role: ConnectionRole) -> Self {
        Self { role, kind: ChannelEventKind::Closed }
    }

    pub fn error(role: ConnectionRole, reason: impl Into<String>) -> Self {
        Self { role, kind: ChannelEventKind::Error(reason.into()) }
    }

    pub fn message(role: ConnectionRole, text: impl Into<String>) -> Self {
        Self { role, kind: ChannelEventKind::Message(text.into()) }
    }
}

/// Outbound half of a duplex channel
///
/// Implementations deliver frames in the order `send` is called.
pub trait Transport: Send {
    /// Queue a text frame for delivery.
    fn send(&mut self, payload: String) -> ChannelResult<()>;

    /// Whether the underlying channel is currently connected.
    fn is_open(&self) -> bool;

    /// When set, the channel is not re-established after it closes.
    fn set_force_close(&mut self, force: bool);

    /// Close the channel for good.
    fn close(&mut self);
}

#[derive(Debug, Default)]
struct MemoryLog {
    sent: Vec<String>,
    open: bool,
    force_close: bool,
    closed: bool,
}

/// In-memory transport that records what was sent
///
/// Clones share the same log, so a test can keep one clone and hand the
/// other to a [`super::ConnectionManager`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    role: ConnectionRole,
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryTransport {
    /// A transport that starts out open.
    pub fn new(role: ConnectionRole) -> Self {
        let log = MemoryLog {
            open: true,
            ..MemoryLog::default()
        };
        Self {
            role,
            log: Arc::new(Mutex::new(log)),
        }
    }

    /// A transport that has not connected yet.
    pub fn connecting(role: ConnectionRole) -> Self {
        Self {
            role,
            log: Arc::new(Mutex::new(MemoryLog::default())),
        }
    }

    pub fn set_open(&self, open: bool) {
        if let Ok(mut log) = self.log.lock() {
            log.open = open;
        }
    }

    /// Raw frames sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.log.lock().map(|log| log.sent.clone()).unwrap_or_default()
    }

    /// Sent frames decoded as JSON. Frames that are not JSON are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    pub fn force_close(&self) -> bool {
        self.log.lock().map(|log| log.force_close).unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().map(|log| log.closed).unwrap_or(false)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, payload: String) -> ChannelResult<()> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| ChannelError::ChannelClosed(self.role))?;
        if !log.open || log.closed {
            return Err(ChannelError::ChannelClosed(self.role));
        }
        log.sent.push(payload);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.log
            .lock()
            .map(|log| log.open && !log.closed)
            .unwrap_or(false)
    }

    fn set_force_close(&mut self, force: bool) {
        if let Ok(mut log) = self.log.lock() {
            log.force_close = force;
        }
    }

    fn close(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.closed = true;
            log.open = false;
        }
    }
}
