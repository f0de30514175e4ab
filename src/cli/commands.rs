//! CLI command implementations

use std::path::Path;

use serde_json::{Map, Value};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_response};
use crate::buffer::RowSet;
use crate::client::Client;
use crate::config::ClientConfig;
use crate::observability::init_logging;
use crate::router::QuerySpec;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.json_logs);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Query {
            config,
            template,
            connection,
            data,
            write,
        } => query(&config, template, connection, data.as_deref(), write),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Connect, run one query, print its result sets and disconnect.
pub fn query(
    config_path: &Path,
    template: String,
    connection: Option<String>,
    data: Option<&str>,
    write: bool,
) -> CliResult<()> {
    let config = ClientConfig::load(config_path)?;

    let mut spec = QuerySpec::new(template).data(parse_data(data)?);
    if let Some(connection) = connection {
        spec = spec.connection(connection);
    }
    if write {
        spec = spec.write();
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_failed(format!("Failed to create tokio runtime: {}", e)))?;

    let results = rt.block_on(async {
        let handle = Client::connect(&config).await?;
        let results = handle.execute(spec).await;
        handle.close().await;
        results
    })?;

    write_response(result_sets_json(&results))
}

/// Validate a config file and echo it back with defaults filled in.
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = ClientConfig::load(config_path)?;
    write_json(serde_json::to_value(&config)?)
}

fn parse_data(data: Option<&str>) -> CliResult<Value> {
    let Some(data) = data else {
        return Ok(Value::Object(Map::new()));
    };
    match serde_json::from_str(data) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(CliError::invalid_argument("--data must be a JSON object")),
        Err(e) => Err(CliError::invalid_argument(format!("--data is not valid JSON: {}", e))),
    }
}

/// Row-sets as nested arrays of column values.
fn result_sets_json(results: &[RowSet]) -> Value {
    Value::Array(
        results
            .iter()
            .map(|set| {
                Value::Array(
                    set.iter()
                        .map(|row| Value::Array(row.iter().map(|c| c.value.clone()).collect()))
                        .collect(),
                )
            })
            .collect(),
    )
}
