//! epistream - a query client that keeps reads consistent with its own writes
//!
//! Queries go to a read replica by default. Once a write is suspected every
//! query is pinned to master until a watermark probe shows the replica has
//! caught up.

pub mod buffer;
pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod router;
