//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::default_socket_path;

/// Load-generation console
#[derive(Parser)]
#[command(
    name = "lc",
    about = "Coordination console for distributed load-generation workers",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the console until interrupted
    Run,

    /// Send newline-delimited JSON messages to a running console
    Send {
        /// File of messages, or `-` for stdin
        #[arg(value_name = "FILE", default_value = "-")]
        input: PathBuf,

        /// Socket to send to, overriding the configured one
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Print the effective configuration as YAML
    Config,
}

pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadconsole")
        .join("logs")
        .join("console.log")
}

/// Help footer listing where the console logs and listens by default
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    format!(
        "Logs are written to: {}\nDefault socket: {}\n",
        get_log_path().display(),
        default_socket_path().display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_with_globals() {
        let cli = Cli::try_parse_from(["lc", "send", "messages.jsonl", "--log-level", "debug", "-c", "lc.yml"]).unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("lc.yml")));
        match cli.command {
            Command::Send { input, socket } => {
                assert_eq!(input, PathBuf::from("messages.jsonl"));
                assert!(socket.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_send_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["lc", "send"]).unwrap();

        assert!(matches!(cli.command, Command::Send { input, .. } if input == PathBuf::from("-")));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["lc"]).is_err());
    }
}
