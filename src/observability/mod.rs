//! Observability for the router
//!
//! - Structured logs through `tracing`
//! - Typed lifecycle events
//! - Monotonic counters
//!
//! # Usage
//!
//! ```ignore
//! use epistream::observability::{log_event, Event};
//!
//! log_event(Event::ReplicaRecovered, &[("write_counter", "3")]);
//! ```

mod events;
mod metrics;

pub use events::{Event, Severity};
pub use metrics::{MetricsSnapshot, RouterMetrics};

use std::fmt;

use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Renders `key=value` pairs for the `fields` attribute of a log line
struct Fields<'a>(&'a [(&'a str, &'a str)]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let fields = Fields(fields);
    match event.severity() {
        Severity::Debug => debug!(event = event.as_str(), fields = %fields),
        Severity::Info => info!(event = event.as_str(), fields = %fields),
        Severity::Warn => warn!(event = event.as_str(), fields = %fields),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
///
/// Installing twice is a no-op.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
