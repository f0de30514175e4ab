//! CLI argument definitions using clap
//!
//! Commands:
//! - epistream query --config <path> --template <name>
//! - epistream check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// epistream - read-after-write consistent query client
#[derive(Parser, Debug)]
#[command(name = "epistream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one query and print its result sets
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./epistream.json")]
        config: PathBuf,

        /// Query template name
        #[arg(long)]
        template: String,

        /// Server side connection name (defaults to the replica connection)
        #[arg(long)]
        connection: Option<String>,

        /// Template data as a JSON object
        #[arg(long)]
        data: Option<String>,

        /// Send the query as a write
        #[arg(long)]
        write: bool,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./epistream.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "epistream",
            "query",
            "--config",
            "c.json",
            "--template",
            "users.mustache",
            "--data",
            r#"{"id":1}"#,
            "--write",
        ])
        .unwrap();

        match cli.command {
            Command::Query {
                config,
                template,
                connection,
                data,
                write,
            } => {
                assert_eq!(config, PathBuf::from("c.json"));
                assert_eq!(template, "users.mustache");
                assert_eq!(connection, None);
                assert_eq!(data.as_deref(), Some(r#"{"id":1}"#));
                assert!(write);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_query_requires_template() {
        assert!(Cli::try_parse_from(["epistream", "query"]).is_err());
    }
}
