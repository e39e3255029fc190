// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay: restaurant print agent
//
// Entry point. Initialises logging, parses the command line and runs one of
// the agent's commands.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use printrelay_agent::banner;
use printrelay_agent::dispatch::Dispatcher;
use printrelay_agent::remote::HttpRemoteQueue;
use printrelay_agent::shutdown;
use printrelay_agent::source::JobSourceClient;
use printrelay_core::config::{AgentConfig, SpoolerConfig};
use printrelay_core::error::RelayError;
use printrelay_core::human_errors::humanize_error;
use printrelay_print::diagnostics::run_diagnostics;
use printrelay_print::resolver::PrinterResolver;
use printrelay_print::spooler;

#[derive(Parser, Debug)]
#[command(name = "printrelay", version)]
#[command(about = "Delivers kitchen, bar and receipt tickets from the order server to a local printer")]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, global = true, env = "PRINTRELAY_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll for print jobs and print them until stopped (default)
    Run,
    /// Show which printers can actually take a job
    Diagnose,
    /// Validate the config file and print the effective settings
    CheckConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.config).await,
        Command::Diagnose => diagnose(&cli.config).await,
        Command::CheckConfig => check_config(&cli.config),
    }
}

fn config_error(path: &Path, err: &RelayError) -> ExitCode {
    let human = humanize_error(err);
    error!(config = %path.display(), error = %err, "cannot start");
    eprintln!("{}\n{}", human.message, human.suggestion);
    ExitCode::FAILURE
}

async fn run(path: &Path) -> ExitCode {
    let config = match AgentConfig::load(path) {
        Ok(config) => config,
        Err(e) => return config_error(path, &e),
    };
    info!(
        server = %config.base_url(),
        token = %config.token_fingerprint(),
        agent_id = %config.agent_id,
        "printrelay starting"
    );

    let queue = match HttpRemoteQueue::new(&config) {
        Ok(queue) => Arc::new(queue),
        Err(e) => return config_error(path, &e),
    };

    let spooler = spooler::from_config(&config.spooler);
    let printers = spooler.list_printers().await.unwrap_or_else(|e| {
        warn!(error = %e, "cannot list printers");
        Vec::new()
    });
    let mut resolver = PrinterResolver::from_config(spooler, &config);
    let selected = match resolver.resolve().await {
        Ok(printer) => Some(printer.name),
        Err(e) => {
            let human = humanize_error(&e);
            warn!(error = %e, "no printer at startup; {}", human.suggestion);
            None
        }
    };
    println!("{}", banner::startup_banner(&config, &printers, selected.as_deref()));

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(shutdown::trigger_on_signal(trigger));

    let source = JobSourceClient::new(queue, &config);
    let mut dispatcher = Dispatcher::new(source, resolver, &config, shutdown);
    dispatcher.run().await;

    info!("printrelay stopped");
    ExitCode::SUCCESS
}

async fn diagnose(path: &Path) -> ExitCode {
    // Diagnostics only need the printer settings; a missing or half-filled
    // config falls back to the system spooler.
    let spooler_config = match AgentConfig::load_unvalidated(path) {
        Ok(config) => config.spooler,
        Err(e) => {
            warn!(error = %e, "using the default spooler");
            SpoolerConfig::default()
        }
    };
    let spooler = spooler::from_config(&spooler_config);
    let report = run_diagnostics(spooler.as_ref()).await;
    println!("{}", report.render());
    ExitCode::SUCCESS
}

fn check_config(path: &Path) -> ExitCode {
    match AgentConfig::load(path) {
        Ok(config) => {
            println!("{}", banner::config_summary(&config));
            println!("\n{} is valid.", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => config_error(path, &e),
    }
}
