//! JSON output for the CLI
//!
//! One JSON document per line on stdout, UTF-8 only. Logs go to stderr.

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;

/// Write `{"status": "ok", "data": ...}` to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_json(serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write a JSON value to stdout
pub fn write_json(value: Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    write_line(&mut stdout, &value)
}

fn write_line(out: &mut impl Write, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
