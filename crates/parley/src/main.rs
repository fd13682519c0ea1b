// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - operator CLI for multi-instance messaging.
//!
//! This is the binary entry point. Each subcommand opens one messaging
//! session against the hosted backend configured in `parley.toml`.

mod connect;
mod doctor;
mod messaging;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use parley_config::ParleyConfig;
use parley_core::ParleyError;

/// Parley - multi-instance messaging from the terminal.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Messaging(MessagingCommand),
    /// Run diagnostic checks against the configuration and backend.
    Doctor,
}

/// Subcommands that run inside a messaging session.
#[derive(Subcommand, Debug)]
enum MessagingCommand {
    /// List channel instances and verify their connectivity.
    Instances {
        /// Skip the liveness probes.
        #[arg(long)]
        no_verify: bool,
    },
    /// List conversations, most recent first.
    Inbox {
        /// Free-text filter on name or number.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show the thread with a counterparty.
    Thread {
        address: String,
        /// Instance whose sibling to show (defaults to the most recent).
        #[arg(long)]
        instance: Option<String>,
    },
    /// Send a message to a counterparty through one instance.
    Send(SendArgs),
    /// Follow a thread and print messages as they arrive.
    Watch {
        address: String,
        #[arg(long)]
        instance: Option<String>,
    },
}

#[derive(Args, Debug)]
struct SendArgs {
    address: String,

    /// Instance the message goes out through.
    #[arg(long)]
    instance: String,

    #[command(flatten)]
    body: SendBody,

    /// Caption for image, document or audio sends.
    #[arg(long)]
    caption: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SendBody {
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    document: Option<PathBuf>,
    #[arg(long)]
    audio: Option<PathBuf>,
}

impl SendBody {
    fn into_outgoing(self) -> messaging::Outgoing {
        if let Some(text) = self.text {
            messaging::Outgoing::Text(text)
        } else if let Some(path) = self.image {
            messaging::Outgoing::Image(path)
        } else if let Some(path) = self.document {
            messaging::Outgoing::Document(path)
        } else if let Some(path) = self.audio {
            messaging::Outgoing::Audio(path)
        } else {
            // clap enforces exactly one body argument.
            messaging::Outgoing::Text(String::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.session.log_level);
    parley_messaging::metrics::register_metrics();

    let use_color = !cli.plain && std::io::stdout().is_terminal();

    let result = match cli.command {
        Commands::Doctor => doctor::run_doctor(&config, use_color).await,
        Commands::Messaging(command) => run_messaging(&config, command, use_color).await,
    };

    if let Err(e) = result {
        report_error(&e, use_color);
        std::process::exit(1);
    }
}

/// Opens a session, runs one messaging command and shuts the session down.
async fn run_messaging(
    config: &ParleyConfig,
    command: MessagingCommand,
    use_color: bool,
) -> Result<(), ParleyError> {
    let session = connect::open_session(config)?;
    let result = match command {
        MessagingCommand::Instances { no_verify } => {
            messaging::run_instances(&session, !no_verify, use_color).await
        }
        MessagingCommand::Inbox { filter } => {
            messaging::run_inbox(&session, filter.as_deref(), use_color).await
        }
        MessagingCommand::Thread { address, instance } => {
            messaging::run_thread(&session, &address, instance.as_deref(), use_color).await
        }
        MessagingCommand::Send(args) => {
            messaging::run_send(
                &session,
                &args.address,
                &args.instance,
                args.body.into_outgoing(),
                args.caption,
            )
            .await
        }
        MessagingCommand::Watch { address, instance } => {
            messaging::run_watch(&session, &address, instance.as_deref(), use_color).await
        }
    };
    session.shutdown();
    result
}

/// Prints the operator-facing notice for `err`.
fn report_error(err: &ParleyError, use_color: bool) {
    let notice = err.notice();
    if use_color {
        use colored::Colorize;
        eprintln!("{} {notice}", "error:".red().bold());
    } else {
        eprintln!("error: {notice}");
    }
    tracing::debug!(reason = err.reason(), error = %err, "command failed");
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_requires_exactly_one_body() {
        let missing = Cli::try_parse_from(["parley", "send", "5511999998888", "--instance", "a"]);
        assert!(missing.is_err());

        let both = Cli::try_parse_from([
            "parley",
            "send",
            "5511999998888",
            "--instance",
            "a",
            "--text",
            "hi",
            "--image",
            "photo.jpg",
        ]);
        assert!(both.is_err());

        let ok = Cli::try_parse_from([
            "parley",
            "send",
            "5511999998888",
            "--instance",
            "a",
            "--document",
            "invoice.pdf",
        ])
        .unwrap();
        match ok.command {
            Commands::Messaging(MessagingCommand::Send(args)) => assert!(matches!(
                args.body.into_outgoing(),
                messaging::Outgoing::Document(_)
            )),
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = parley_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.messaging.send_cooldown_ms, 5000);
    }
}
