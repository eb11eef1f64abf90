use crate::cli::Commands;
use anyhow::{Context, Result};
use capsule_nsenter::ResumptionTag;

pub mod exec;
pub mod init;
pub mod namespaces;

/// Dispatch command to appropriate handler, returning the exit code
pub fn dispatch(command: Commands, resumed: Option<ResumptionTag>, verbose: bool) -> Result<i32> {
    match command {
        Commands::Exec(args) => {
            // threads are fine from here on, the bootstrap is behind us
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(exec::execute(args, verbose))
        }

        Commands::Init => init::execute(resumed),

        Commands::Namespaces { pid } => {
            namespaces::execute(pid)?;
            Ok(0)
        }
    }
}
