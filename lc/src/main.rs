//! Load console
//!
//! CLI entry point for running the console and talking to a running one.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use loadconsole::cli::{Cli, Command, generate_after_help, get_log_path};
use loadconsole::config::Config;
use loadconsole::engine::Console;
use loadconsole::messages::Message;
use loadconsole::transport::send_messages;

/// Open the shared log file
///
/// Only `run` starts a fresh log; other commands append so they never wipe
/// the log of a console that is still running.
fn open_log_file(log_path: &Path, fresh: bool) -> Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.create(true);
    if fresh {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options
        .open(log_path)
        .context(format!("Failed to open log file {}", log_path.display()))
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, fresh_log: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = open_log_file(&log_path, fresh_log)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    let fresh_log = matches!(cli.command, Command::Run);
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), fresh_log)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Send { input, socket } => {
            let socket = socket.unwrap_or_else(|| config.transport.socket_path.clone());
            cmd_send(&input, &socket).await
        }
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_run(config: &Config) -> Result<()> {
    debug!("cmd_run: called");
    let console = Console::build(config).context("Failed to build console")?;

    println!(
        "{} listening on {}",
        "Console".bright_cyan().bold(),
        console.socket_path().display()
    );
    println!("Distributing files from {}", console.distribution().directory().display());

    let engine = console.engine();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                engine.shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });

    let result = console.run().await;
    let summary = console.summary();
    match &result {
        Ok(()) => println!("{} after {} messages", "Console stopped".green(), summary.messages_processed),
        Err(e) => eprintln!("{} {:#}", "Console failed:".red(), e),
    }
    let yaml = serde_yaml::to_string(&summary).context("Failed to serialize console summary")?;
    print!("{}", yaml);
    result
}

/// Parse newline-delimited JSON messages, skipping blank lines
fn read_messages<R: BufRead>(reader: R) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read message input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Message =
            serde_json::from_str(line).context(format!("Invalid message on line {}", index + 1))?;
        messages.push(message);
    }
    Ok(messages)
}

async fn cmd_send(input: &Path, socket: &Path) -> Result<()> {
    debug!(?input, ?socket, "cmd_send: called");
    let messages = if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        read_messages(buffer.as_bytes())?
    } else {
        let file = fs::File::open(input).context(format!("Failed to open {}", input.display()))?;
        read_messages(BufReader::new(file))?
    };

    let sent = send_messages(socket, &messages)
        .await
        .context(format!("Failed to send to console at {}", socket.display()))?;
    println!("{} {} messages to {}", "Sent".green(), sent, socket.display());
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadconsole::messages::MessageTag;

    #[test]
    fn test_read_messages_skips_blank_lines() {
        let input = "{\"type\":\"start-recording\"}\n\n{\"type\":\"register-tests\",\"tests\":[\"T1\"]}\n";

        let messages = read_messages(input.as_bytes()).unwrap();

        let tags: Vec<MessageTag> = messages.iter().map(|m| m.tag()).collect();
        assert_eq!(tags, vec![MessageTag::StartRecording, MessageTag::RegisterTests]);
    }

    #[test]
    fn test_read_messages_reports_bad_line() {
        let input = "{\"type\":\"stop-recording\"}\nnonsense\n";

        let err = read_messages(input.as_bytes()).unwrap_err();

        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_log_file_append_keeps_existing_lines() {
        let temp = tempfile::TempDir::new().unwrap();
        let log_path = temp.path().join("console.log");
        fs::write(&log_path, "running console\n").unwrap();

        {
            use std::io::Write;
            let mut file = open_log_file(&log_path, false).unwrap();
            file.write_all(b"send command\n").unwrap();
        }

        assert_eq!(fs::read_to_string(&log_path).unwrap(), "running console\nsend command\n");
    }

    #[test]
    fn test_log_file_fresh_truncates() {
        let temp = tempfile::TempDir::new().unwrap();
        let log_path = temp.path().join("console.log");
        fs::write(&log_path, "previous run\n").unwrap();

        open_log_file(&log_path, true).unwrap();

        assert_eq!(fs::read_to_string(&log_path).unwrap(), "");
        assert!(open_log_file(&temp.path().join("new.log"), false).is_ok());
    }
}
