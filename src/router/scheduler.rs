//! Probe retry timers
//!
//! A scheduled probe retry is represented by a [`ProbeTimer`] the watcher
//! holds until it fires or is cancelled. Firing is reported back as a
//! [`ProbeFired`] carrying the generation the timer was created with, so a
//! notification that raced with a cancellation is recognised as stale.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

/// Fixed delay before a replica probe is retried
pub const PROBE_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Timer expiry notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeFired {
    pub generation: u64,
}

/// Cancellable handle for one scheduled probe
pub struct ProbeTimer {
    delay: Duration,
    generation: u64,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ProbeTimer {
    pub fn new(delay: Duration, generation: u64, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            delay,
            generation,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the timer. It will not fire afterwards.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for ProbeTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeTimer")
            .field("delay", &self.delay)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Source of probe timers
pub trait ProbeScheduler: Send {
    /// Arrange for `ProbeFired { generation }` to be delivered after `delay`.
    fn schedule(&mut self, delay: Duration, generation: u64) -> ProbeTimer;
}

/// Timers backed by `tokio::time::sleep`
///
/// Expiry is delivered on an mpsc channel that the owning event loop reads,
/// so timer firing is serialised with every other state change.
#[derive(Debug, Clone)]
pub struct TokioProbeScheduler {
    fired: mpsc::UnboundedSender<ProbeFired>,
}

impl TokioProbeScheduler {
    pub fn new(fired: mpsc::UnboundedSender<ProbeFired>) -> Self {
        Self { fired }
    }
}

impl ProbeScheduler for TokioProbeScheduler {
    fn schedule(&mut self, delay: Duration, generation: u64) -> ProbeTimer {
        let fired = self.fired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired.send(ProbeFired { generation });
        });
        ProbeTimer::new(delay, generation, move || task.abort())
    }
}

/// A timer request recorded by [`ManualProbeScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledProbe {
    pub delay: Duration,
    pub generation: u64,
    pub cancelled: bool,
}

/// Scheduler that never fires on its own
///
/// Records every request; tests fire timers by calling the router with the
/// recorded generation. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct ManualProbeScheduler {
    scheduled: Arc<Mutex<Vec<ScheduledProbe>>>,
}

impl ManualProbeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<ScheduledProbe> {
        self.scheduled.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent request, if any.
    pub fn last(&self) -> Option<ScheduledProbe> {
        self.scheduled().last().copied()
    }
}

impl ProbeScheduler for ManualProbeScheduler {
    fn schedule(&mut self, delay: Duration, generation: u64) -> ProbeTimer {
        let index = match self.scheduled.lock() {
            Ok(mut scheduled) => {
                scheduled.push(ScheduledProbe {
                    delay,
                    generation,
                    cancelled: false,
                });
                scheduled.len() - 1
            }
            Err(_) => usize::MAX,
        };
        let scheduled = Arc::clone(&self.scheduled);
        ProbeTimer::new(delay, generation, move || {
            if let Ok(mut scheduled) = scheduled.lock() {
                if let Some(entry) = scheduled.get_mut(index) {
                    entry.cancelled = true;
                }
            }
        })
    }
}
