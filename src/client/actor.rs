//! The task that owns the router
//!
//! Commands from handles, channel events and probe timer expiries arrive on
//! three queues and are applied one at a time, so the router never sees
//! concurrent mutation.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::buffer::{RowBuffer, RowSet};
use crate::channel::ChannelEvent;
use crate::protocol::QueryId;
use crate::router::{BroadcastSink, ConsistencySnapshot, ProbeFired, QueryRouter, QuerySpec, RouterResult};

pub(crate) type ClientRouter = QueryRouter<RowBuffer<BroadcastSink>>;

/// Requests a handle can make of the actor
pub(crate) enum Command {
    Submit {
        spec: QuerySpec,
        reply: oneshot::Sender<RouterResult<QueryId>>,
    },
    TakeResults {
        query_id: QueryId,
        reply: oneshot::Sender<Option<Vec<RowSet>>>,
    },
    Consistency {
        reply: oneshot::Sender<ConsistencySnapshot>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct ClientActor {
    router: ClientRouter,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    probes: mpsc::UnboundedReceiver<ProbeFired>,
}

impl ClientActor {
    pub(crate) fn new(
        router: ClientRouter,
        commands: mpsc::Receiver<Command>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
        probes: mpsc::UnboundedReceiver<ProbeFired>,
    ) -> Self {
        Self {
            router,
            commands,
            events,
            probes,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close { reply }) => {
                        self.router.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all client handles dropped");
                        self.router.shutdown();
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.router.handle_channel_event(event),
                Some(fired) = self.probes.recv() => self.router.on_probe_timer(fired),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { spec, reply } => {
                let _ = reply.send(self.router.submit(spec));
            }
            Command::TakeResults { query_id, reply } => {
                let _ = reply.send(self.router.sink_mut().take_results(&query_id));
            }
            Command::Consistency { reply } => {
                let _ = reply.send(self.router.consistency());
            }
            // Handled by the run loop
            Command::Close { reply } => {
                let _ = reply.send(());
            }
        }
    }
}
