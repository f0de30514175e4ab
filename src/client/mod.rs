//! Client facade
//!
//! [`Client::connect`] opens the read connection (and the write connection
//! when configured) and starts one task that owns all routing state.
//! [`ClientHandle`] is the cheap, cloneable way to talk to that task.
//!
//! ```ignore
//! let handle = Client::connect(&config).await?;
//! let rows = handle
//!     .execute(QuerySpec::new("users.mustache").data(json!({"id": 7})))
//!     .await?;
//! handle.close().await;
//! ```

mod actor;
mod errors;

pub use errors::{ClientError, ClientResult};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;

use self::actor::{ClientActor, Command};
use crate::buffer::{RowBuffer, RowSet};
use crate::channel::{
    ChannelEvent, ConnectionManager, ConnectionRole, Transport, WebSocketOptions, WebSocketTransport,
};
use crate::config::ClientConfig;
use crate::observability::{MetricsSnapshot, RouterMetrics};
use crate::protocol::QueryId;
use crate::router::{
    BroadcastSink, ConsistencySnapshot, QueryRouter, QuerySpec, RouterEvent, RouterSettings,
    TokioProbeScheduler,
};

/// Capacity of the event broadcast; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 1024;

/// Pending handle commands before `send` waits
const COMMAND_CAPACITY: usize = 64;

/// Entry point for building a client
pub struct Client;

impl Client {
    /// Connect to the configured endpoints and start the client task.
    pub async fn connect(config: &ClientConfig) -> ClientResult<ClientHandle> {
        config.validate()?;

        let options = WebSocketOptions {
            reconnect_delay: config.reconnect_delay(),
            ..WebSocketOptions::default()
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let read = WebSocketTransport::connect(
            &config.read_url,
            ConnectionRole::Read,
            options.clone(),
            events_tx.clone(),
        )
        .await?;
        let write: Option<Box<dyn Transport>> = match &config.write_url {
            Some(url) => Some(Box::new(
                WebSocketTransport::connect(url, ConnectionRole::Write, options, events_tx).await?,
            )),
            None => None,
        };

        info!(
            read_url = %config.read_url,
            write_url = ?config.write_url,
            "client connected"
        );
        let connections = ConnectionManager::new(Box::new(read), write);
        Ok(Self::spawn(config.router_settings(), connections, events_rx))
    }

    /// Start the client task over connections that are already set up.
    ///
    /// The transports behind `connections` must publish their notifications
    /// on the sender half of `events`.
    pub fn spawn(
        settings: RouterSettings,
        connections: ConnectionManager,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> ClientHandle {
        let (probes_tx, probes_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let metrics = Arc::new(RouterMetrics::new());

        let sink = RowBuffer::new(BroadcastSink::new(event_tx.clone()));
        let router = QueryRouter::new(
            settings,
            connections,
            Box::new(TokioProbeScheduler::new(probes_tx)),
            sink,
        )
        .with_metrics(Arc::clone(&metrics));

        tokio::spawn(ClientActor::new(router, commands_rx, events, probes_rx).run());

        ClientHandle {
            commands: commands_tx,
            events: event_tx,
            metrics,
        }
    }
}

/// Handle to a running client. Clones talk to the same task.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<RouterEvent>,
    metrics: Arc<RouterMetrics>,
}

impl ClientHandle {
    /// Submit a query and return its id once it has been sent.
    ///
    /// Its result sets stay buffered until [`Self::wait_for_end`] or
    /// [`Self::take_results`] collects them.
    pub async fn query(&self, spec: QuerySpec) -> ClientResult<QueryId> {
        let id = self
            .request(|reply| Command::Submit { spec, reply })
            .await??;
        Ok(id)
    }

    /// Submit a query and wait for its buffered result sets.
    pub async fn execute(&self, spec: QuerySpec) -> ClientResult<Vec<RowSet>> {
        let query_id = self.query(spec).await?;
        self.wait_for_end(&query_id).await
    }

    /// Wait until `query_id` ends and take its result sets.
    ///
    /// Fails if the server reports an error for the query.
    pub async fn wait_for_end(&self, query_id: &QueryId) -> ClientResult<Vec<RowSet>> {
        let mut events = self.subscribe();
        if let Some(results) = self.take_results(query_id).await? {
            return Ok(results);
        }

        loop {
            match events.recv().await {
                Ok(RouterEvent::EndQuery { query_id: ended }) if &ended == query_id => {
                    return Ok(self.take_results(query_id).await?.unwrap_or_default());
                }
                Ok(RouterEvent::Error {
                    query_id: Some(failed),
                    error,
                    ..
                }) if &failed == query_id => {
                    return Err(ClientError::Query {
                        query_id: failed,
                        error,
                    });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(results) = self.take_results(query_id).await? {
                        return Ok(results);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ClientError::Closed),
            }
        }
    }

    /// Result sets of a finished query, removed from the buffer.
    pub async fn take_results(&self, query_id: &QueryId) -> ClientResult<Option<Vec<RowSet>>> {
        let query_id = query_id.clone();
        self.request(|reply| Command::TakeResults { query_id, reply })
            .await
    }

    pub async fn consistency(&self) -> ClientResult<ConsistencySnapshot> {
        self.request(|reply| Command::Consistency { reply }).await
    }

    /// Every router event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the client. Any scheduled probe is cancelled and both
    /// connections are closed. Closing twice is fine.
    pub async fn close(&self) {
        let _ = self.request(|reply| Command::Close { reply }).await;
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> ClientResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ClientError::Closed)?;
        response.await.map_err(|_| ClientError::Closed)
    }
}
