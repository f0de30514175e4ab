//! Ownership of the read and write connections

use tracing::{debug, warn};

use super::errors::{ChannelError, ChannelResult};
use super::transport::{ConnectionRole, Transport};

/// Lifecycle of one connection as seen through channel events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

struct Connection {
    transport: Box<dyn Transport>,
    state: ConnectionState,
}

impl Connection {
    fn new(transport: Box<dyn Transport>) -> Self {
        let state = if transport.is_open() {
            ConnectionState::Open
        } else {
            ConnectionState::Connecting
        };
        Self { transport, state }
    }
}

/// Holds the mandatory read connection and the optional write connection
pub struct ConnectionManager {
    read: Connection,
    write: Option<Connection>,
}

impl ConnectionManager {
    pub fn new(read: Box<dyn Transport>, write: Option<Box<dyn Transport>>) -> Self {
        Self {
            read: Connection::new(read),
            write: write.map(Connection::new),
        }
    }

    /// Whether a write (master) connection was configured.
    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }

    /// State of a connection, `None` if it does not exist.
    pub fn state(&self, role: ConnectionRole) -> Option<ConnectionState> {
        self.connection(role).map(|c| c.state)
    }

    /// Send a frame on one connection.
    ///
    /// `force_close` is handed to the transport before sending, so that a
    /// query asking to close on end stops the channel from reconnecting.
    pub fn send(&mut self, role: ConnectionRole, payload: String, force_close: bool) -> ChannelResult<()> {
        let connection = self
            .connection_mut(role)
            .ok_or(ChannelError::ChannelClosed(role))?;
        if connection.state != ConnectionState::Open {
            return Err(ChannelError::ChannelClosed(role));
        }
        connection.transport.set_force_close(force_close);
        connection.transport.send(payload)
    }

    pub fn on_open(&mut self, role: ConnectionRole) {
        if let Some(connection) = self.connection_mut(role) {
            debug!(role = %role, "connection opened");
            connection.state = ConnectionState::Open;
        }
    }

    pub fn on_close(&mut self, role: ConnectionRole) {
        if let Some(connection) = self.connection_mut(role) {
            debug!(role = %role, "connection closed");
            connection.state = ConnectionState::Closed;
        }
    }

    pub fn on_error(&mut self, role: ConnectionRole, reason: &str) {
        warn!(role = %role, error = %reason, "connection error");
    }

    /// Close both connections.
    pub fn close_all(&mut self) {
        self.read.transport.close();
        self.read.state = ConnectionState::Closed;
        if let Some(write) = self.write.as_mut() {
            write.transport.close();
            write.state = ConnectionState::Closed;
        }
    }

    fn connection(&self, role: ConnectionRole) -> Option<&Connection> {
        match role {
            ConnectionRole::Read => Some(&self.read),
            ConnectionRole::Write => self.write.as_ref(),
        }
    }

    fn connection_mut(&mut self, role: ConnectionRole) -> Option<&mut Connection> {
        match role {
            ConnectionRole::Read => Some(&mut self.read),
            ConnectionRole::Write => self.write.as_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryTransport;

    #[test]
    fn test_send_without_write_connection() {
        let read = MemoryTransport::new(ConnectionRole::Read);
        let mut manager = ConnectionManager::new(Box::new(read), None);

        assert!(!manager.has_write());
        assert_eq!(manager.state(ConnectionRole::Write), None);
        assert_eq!(
            manager.send(ConnectionRole::Write, "x".into(), false),
            Err(ChannelError::ChannelClosed(ConnectionRole::Write))
        );
    }

    #[test]
    fn test_send_respects_connection_state() {
        let read = MemoryTransport::connecting(ConnectionRole::Read);
        let mut manager = ConnectionManager::new(Box::new(read.clone()), None);
        assert_eq!(manager.state(ConnectionRole::Read), Some(ConnectionState::Connecting));
        assert!(manager.send(ConnectionRole::Read, "early".into(), false).is_err());

        read.set_open(true);
        manager.on_open(ConnectionRole::Read);
        manager.send(ConnectionRole::Read, "one".into(), false).unwrap();
        manager.send(ConnectionRole::Read, "two".into(), true).unwrap();
        assert_eq!(read.sent(), vec!["one".to_string(), "two".to_string()]);
        assert!(read.force_close());

        manager.on_close(ConnectionRole::Read);
        assert_eq!(
            manager.send(ConnectionRole::Read, "late".into(), false),
            Err(ChannelError::ChannelClosed(ConnectionRole::Read))
        );
    }

    #[test]
    fn test_close_all() {
        let read = MemoryTransport::new(ConnectionRole::Read);
        let write = MemoryTransport::new(ConnectionRole::Write);
        let mut manager = ConnectionManager::new(Box::new(read.clone()), Some(Box::new(write.clone())));

        manager.close_all();

        assert!(read.is_closed());
        assert!(write.is_closed());
        assert_eq!(manager.state(ConnectionRole::Write), Some(ConnectionState::Closed));
    }
}
