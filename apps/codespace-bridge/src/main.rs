//! codespace-bridge: agent tools for a remote GitHub codespace.
//!
//! Logs go to stderr; stdout carries the tool protocol.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { target, no_ide } => commands::serve(&target, no_ide).await,
        Command::Exec { workdir, env, command } => commands::exec(workdir.as_deref(), &env, &command),
        Command::Rewrite {
            target,
            kind,
            input,
            output,
            strategy,
        } => commands::rewrite(&target, kind, &input, output.as_deref(), strategy.strategy).await,
        Command::Config {
            target,
            servers,
            output,
            strategy,
        } => commands::config(&target, servers.as_deref(), output.as_deref(), strategy.strategy).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
