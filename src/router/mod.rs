//! Consistency routing
//!
//! Decides per query whether it goes to the replica or to master, and keeps
//! every query on master from the moment a write is suspected until a
//! watermark probe proves the replica has caught up.
//!
//! # Phases
//!
//! ```text
//!   Clean ──write observed──▶ AwaitingVisibility ──write ends──▶ Probing
//!     ▲                                                            │
//!     └───────────── watermark > last write, nothing ambiguous ────┘
//! ```
//!
//! All state lives in one [`QueryRouter`] that is driven by one task.

mod errors;
mod events;
mod recovery;
#[allow(clippy::module_inception)]
mod router;
mod scheduler;
mod state;
mod watcher;
mod watermark;

pub use errors::{RouterError, RouterResult};
pub use events::{BroadcastSink, EventSink, NullSink, RouterEvent};
pub use recovery::StaleReadRecovery;
pub use router::{QueryRouter, QuerySpec, RouterSettings, DEFAULT_PROBE_TEMPLATE};
pub use scheduler::{
    ManualProbeScheduler, ProbeFired, ProbeScheduler, ProbeTimer, ScheduledProbe, TokioProbeScheduler,
    PROBE_RETRY_DELAY,
};
pub use state::{ConsistencyPhase, ConsistencySnapshot, ConsistencyState, WriteMark};
pub use watcher::{ConsistencyWatcher, ProbeRequest, WatermarkOutcome};
pub use watermark::{parse_watermark, row_watermark};
