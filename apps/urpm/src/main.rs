#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::cast_precision_loss)]

//! urpm - package manager CLI
//!
//! Plain sequential command handling over the core crates; the only
//! parallelism is the engine's download pool. Exit codes follow the
//! documented contract.

mod cli;
mod commands;
mod context;
mod display;
mod events;

use clap::Parser;
use tracing::debug;
use urpm_errors::UserFacingError;

use crate::cli::Cli;
use crate::context::AppContext;
use crate::events::EventPrinter;

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "urpm=debug" } else { "urpm=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    debug!(command = cli.command.name(), "starting");

    let json = cli.global.json;
    let (tx, rx) = urpm_events::channel();
    let printer = EventPrinter {
        json,
        quiet: cli.global.quiet,
        verbose: cli.global.verbose,
    };
    let printer_task = tokio::spawn(printer.run(rx));

    let result = run(cli, tx).await;

    // Sender side dropped inside run(); the printer drains and exits
    let _ = printer_task.await;

    match result {
        Ok(()) => {}
        Err(e) => {
            if json {
                eprintln!(
                    "{}",
                    serde_json::to_string(&e).unwrap_or_else(|_| e.to_string())
                );
            } else {
                eprintln!("error: {}", e.user_message());
                if let Some(hint) = e.user_hint() {
                    eprintln!("hint: {hint}");
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli, tx: urpm_events::EventSender) -> Result<(), urpm_errors::Error> {
    let ctx = AppContext::build(&cli.global, tx).await?;

    // Ctrl-C flips the engine's cancel flag; in-flight work stops at the
    // next suspension point, the RPM handoff finishes first
    let cancel = ctx.engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    commands::dispatch(&ctx, cli.command).await
}
