//! WebSocket transport
//!
//! One supervisor task per connection owns the socket. It writes queued
//! frames in order, sends the keep-alive ping, forwards inbound text frames
//! as [`ChannelEvent`]s and re-establishes the socket after it drops,
//! unless the connection was force-closed or shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::errors::{ChannelError, ChannelResult};
use super::transport::{ChannelEvent, ConnectionRole, Transport};
use crate::protocol::KEEPALIVE_PING;

/// Interval between keep-alive pings, identical on both connections
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(60_000);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket behaviour knobs
#[derive(Debug, Clone)]
pub struct WebSocketOptions {
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: KEEPALIVE_INTERVAL,
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}

/// Why a socket session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Transport over a tokio-tungstenite WebSocket
pub struct WebSocketTransport {
    role: ConnectionRole,
    outgoing: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    force_close: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Connect to `url` and start the supervisor task.
    ///
    /// An `Opened` event is published once the first handshake succeeds.
    pub async fn connect(
        url: &str,
        role: ConnectionRole,
        options: WebSocketOptions,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> ChannelResult<Self> {
        let (socket, _) = connect_async(url).await.map_err(|e| ChannelError::Connect {
            role,
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        info!(role = %role, url = %url, "websocket connected");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let open = Arc::new(AtomicBool::new(true));
        let force_close = Arc::new(AtomicBool::new(false));

        let _ = events.send(ChannelEvent::opened(role));

        let supervisor = Supervisor {
            url: url.to_string(),
            role,
            options,
            outgoing: outgoing_rx,
            events,
            open: Arc::clone(&open),
            force_close: Arc::clone(&force_close),
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run(socket));

        Ok(Self {
            role,
            outgoing,
            open,
            force_close,
            shutdown,
            task,
        })
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }
}

impl Transport for WebSocketTransport {
    fn send(&mut self, payload: String) -> ChannelResult<()> {
        if !self.is_open() {
            return Err(ChannelError::ChannelClosed(self.role));
        }
        self.outgoing
            .send(payload)
            .map_err(|_| ChannelError::ChannelClosed(self.role))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.task.is_finished()
    }

    fn set_force_close(&mut self, force: bool) {
        self.force_close.store(force, Ordering::Release);
    }

    fn close(&mut self) {
        self.force_close.store(true, Ordering::Release);
        let _ = self.shutdown.send(true);
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

struct Supervisor {
    url: String,
    role: ConnectionRole,
    options: WebSocketOptions,
    outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    open: Arc<AtomicBool>,
    force_close: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self, mut socket: Socket) {
        loop {
            let end = self.session(socket).await;
            self.open.store(false, Ordering::Release);
            let _ = self.events.send(ChannelEvent::closed(self.role));

            if end == SessionEnd::Shutdown || self.force_close.load(Ordering::Acquire) {
                debug!(role = %self.role, "websocket supervisor stopped");
                return;
            }

            socket = match self.reconnect().await {
                Some(socket) => socket,
                None => return,
            };
            self.open.store(true, Ordering::Release);
            let _ = self.events.send(ChannelEvent::opened(self.role));
        }
    }

    /// Drive one socket until it drops or the transport shuts down.
    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut source) = socket.split();
        let period = self.options.keepalive_interval;
        let mut keepalive = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.events.send(ChannelEvent::message(self.role, text));
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = self.events.send(ChannelEvent::error(self.role, e.to_string()));
                        return SessionEnd::Disconnected;
                    }
                },

                payload = self.outgoing.recv() => match payload {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = self.events.send(ChannelEvent::error(self.role, e.to_string()));
                            return SessionEnd::Disconnected;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return SessionEnd::Shutdown;
                    }
                },

                _ = keepalive.tick() => {
                    if let Err(e) = sink.send(Message::Text(KEEPALIVE_PING.to_string())).await {
                        let _ = self.events.send(ChannelEvent::error(self.role, e.to_string()));
                        return SessionEnd::Disconnected;
                    }
                }

                _ = self.shutdown.changed() => {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Retry the handshake every `reconnect_delay` until it succeeds or the
    /// transport shuts down.
    async fn reconnect(&mut self) -> Option<Socket> {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return None,
                _ = time::sleep(self.options.reconnect_delay) => {}
            }
            if self.force_close.load(Ordering::Acquire) {
                return None;
            }

            match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => {
                    info!(role = %self.role, url = %self.url, "websocket reconnected");
                    return Some(socket);
                }
                Err(e) => {
                    warn!(role = %self.role, url = %self.url, error = %e, "websocket reconnect failed");
                    let _ = self.events.send(ChannelEvent::error(self.role, e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelEventKind;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("hello".into())).await.unwrap();

            let mut received = Vec::new();
            while received.len() < 2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    received.push(text);
                }
            }
            received
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut transport =
            WebSocketTransport::connect(&url, ConnectionRole::Read, WebSocketOptions::default(), events_tx)
                .await
                .unwrap();

        assert_eq!(events_rx.recv().await.unwrap(), ChannelEvent::opened(ConnectionRole::Read));
        assert_eq!(
            events_rx.recv().await.unwrap(),
            ChannelEvent::message(ConnectionRole::Read, "hello")
        );

        transport.send("first".into()).unwrap();
        transport.send("second".into()).unwrap();
        assert_eq!(server.await.unwrap(), vec!["first".to_string(), "second".to_string()]);

        transport.close();
    }

    #[tokio::test]
    async fn test_keepalive_ping() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            loop {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    return text;
                }
            }
        });

        let options = WebSocketOptions {
            keepalive_interval: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(20),
        };
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::connect(&url, ConnectionRole::Write, options, events_tx)
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), KEEPALIVE_PING);
        transport.close();
    }

    #[tokio::test]
    async fn test_force_close_stops_reconnect() {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.close(None).await;
        });

        let options = WebSocketOptions {
            keepalive_interval: KEEPALIVE_INTERVAL,
            reconnect_delay: Duration::from_millis(10),
        };
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::connect(&url, ConnectionRole::Read, options, events_tx)
            .await
            .unwrap();
        transport.set_force_close(true);

        let mut saw_close = false;
        while let Some(event) = events_rx.recv().await {
            if event.kind == ChannelEventKind::Closed {
                saw_close = true;
            }
        }
        assert!(saw_close);
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (listener, url) = listener().await;
        drop(listener);

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let result =
            WebSocketTransport::connect(&url, ConnectionRole::Read, WebSocketOptions::default(), events_tx).await;
        assert!(matches!(result, Err(ChannelError::Connect { role: ConnectionRole::Read, .. })));
    }
}
