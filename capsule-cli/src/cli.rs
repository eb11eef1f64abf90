//! CLI argument definitions

use capsule_core::ProcessId;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "capsule")]
#[command(about = "Capsule namespace runner", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command inside another process's namespaces
    Exec(ExecArgs),

    /// Finish setting up a cloned child (started by `exec`, not by hand)
    #[command(hide = true)]
    Init,

    /// Show namespace information
    Namespaces {
        /// Process ID (default: current process)
        #[arg(short, long)]
        pid: Option<ProcessId>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExecArgs {
    /// Process whose namespaces are joined
    #[arg(short, long)]
    pub target: ProcessId,

    /// Namespaces to join (mnt is always joined last)
    #[arg(long, value_delimiter = ',', default_value = "ipc,uts,net,pid,mnt")]
    pub join: Vec<String>,

    /// Namespaces the command gets fresh copies of
    #[arg(long = "new", value_delimiter = ',')]
    pub new_namespaces: Vec<String>,

    /// Hostname to set (requires --new uts)
    #[arg(long)]
    pub hostname: Option<String>,

    /// Extra environment variables (KEY=VALUE)
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Command to run
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}
