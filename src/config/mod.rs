//! Client configuration
//!
//! Read from a JSON file:
//!
//! ```json
//! {
//!   "read_url": "ws://replica.local:8080",
//!   "write_url": "ws://master.local:8080",
//!   "replica_connection": "replica",
//!   "master_connection": "master"
//! }
//! ```
//!
//! Without `write_url` every query goes to the read endpoint and no
//! consistency pinning takes place.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::{log_event, Event};
use crate::router::{RouterSettings, DEFAULT_PROBE_TEMPLATE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Replica endpoint (required)
    pub read_url: String,

    /// Master endpoint
    #[serde(default)]
    pub write_url: Option<String>,

    /// Server side connection name for replica queries
    #[serde(default = "default_replica_connection")]
    pub replica_connection: String,

    /// Server side connection name substituted for pinned queries
    #[serde(default = "default_master_connection")]
    pub master_connection: String,

    #[serde(default = "default_probe_template")]
    pub probe_template: String,

    /// Delay before a dropped socket is re-established
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_replica_connection() -> String {
    "replica".to_string()
}
fn default_master_connection() -> String {
    "master".to_string()
}
fn default_probe_template() -> String {
    DEFAULT_PROBE_TEMPLATE.to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}

impl ClientConfig {
    /// A config with defaults for everything but the endpoints.
    pub fn new(read_url: impl Into<String>, write_url: Option<String>) -> Self {
        Self {
            read_url: read_url.into(),
            write_url,
            replica_connection: default_replica_connection(),
            master_connection: default_master_connection(),
            probe_template: default_probe_template(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig = serde_json::from_str(&content)?;
        config.validate()?;

        log_event(
            Event::ConfigLoaded,
            &[
                ("path", &*path.to_string_lossy()),
                ("write_endpoint", if config.write_url.is_some() { "yes" } else { "no" }),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        validate_url("read_url", &self.read_url)?;
        if let Some(url) = &self.write_url {
            validate_url("write_url", url)?;
        }

        if self.replica_connection.trim().is_empty() {
            return Err(ConfigError::invalid("replica_connection", "must not be empty"));
        }
        if self.master_connection.trim().is_empty() {
            return Err(ConfigError::invalid("master_connection", "must not be empty"));
        }
        if self.probe_template.trim().is_empty() {
            return Err(ConfigError::invalid("probe_template", "must not be empty"));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::invalid("reconnect_delay_ms", "must be > 0"));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            replica_connection: self.replica_connection.clone(),
            master_connection: self.master_connection.clone(),
            probe_template: self.probe_template.clone(),
        }
    }
}

fn validate_url(field: &'static str, url: &str) -> ConfigResult<()> {
    if url.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ConfigError::invalid(
            field,
            format!("must be a ws:// or wss:// URL, got '{}'", url),
        ));
    }
    Ok(())
}
