//! Capsule CLI
//!
//! Runs the namespace bootstrap before anything else, then continues as
//! whichever process image it turned out to be.

use clap::Parser;
use std::process;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use capsule_nsenter::{Outcome, ResumptionTag};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Single-threaded up to here: setns into a mount namespace needs that.
    let mut command = Some(cli.command);
    let verbose = cli.verbose;
    let outcome = capsule_nsenter::nsexec(|tag| match tag {
        // child pid is already reported; whoever spawned us waits on it
        ResumptionTag::AsParent => 0,
        ResumptionTag::AsChild => finish(command.take(), Some(tag), verbose),
    });

    let code = match outcome {
        Outcome::NotRequested => finish(command.take(), None, verbose),
        Outcome::Parent { child, status } => {
            debug!(child_pid = %child, "Bootstrap done, parent exiting");
            status
        }
    };

    process::exit(code);
}

/// Logs go to stderr so `exec`'d commands keep a clean stdout
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("CAPSULE_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn finish(command: Option<Commands>, resumed: Option<ResumptionTag>, verbose: bool) -> i32 {
    let Some(command) = command else {
        error!("Resumed twice in one process");
        return capsule_nsenter::FATAL_EXIT_CODE;
    };

    match commands::dispatch(command, resumed, verbose) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            1
        }
    }
}
