//! Pending query registry
//!
//! Tracks every submitted query from submission until its end-of-query
//! signal, together with its read/write classification.

mod errors;
mod pending;
mod query;

pub use errors::{RegistryError, RegistryResult};
pub use pending::PendingQueryRegistry;
pub use query::{Classification, Query};
