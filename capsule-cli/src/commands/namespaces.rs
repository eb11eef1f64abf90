//! Namespaces command implementation

use anyhow::{Context, Result};
use capsule_core::ProcessId;
use capsule_nsenter::{NamespaceInfo, NamespaceKind};

pub fn execute(pid: Option<ProcessId>) -> Result<()> {
    let target_pid = pid.unwrap_or_else(ProcessId::current);

    println!("\n🔒 Namespace Information for PID {target_pid}");
    println!("{:-<60}", "");

    let ns_info = NamespaceInfo::for_process(target_pid)
        .context("Failed to get namespace information")?;

    print!("{ns_info}");

    // Compare against init's namespaces
    match NamespaceInfo::for_process(ProcessId::from_raw(1)) {
        Ok(init) => {
            let differing = ns_info.differs_from(&init);
            if differing.is_empty() {
                println!("\n⚠️  Process is in host namespaces");
            } else {
                let names: Vec<&str> = differing.iter().map(|k| k.proc_name()).collect();
                println!("\n✅ Process is isolated in: {}", names.join(", "));
            }
        }
        Err(e) => println!("\n❌ Failed to check isolation: {e}"),
    }

    if ns_info.get(NamespaceKind::Uts).is_some() && pid.is_none() {
        if let Ok(hostname) = nix::unistd::gethostname() {
            println!("Hostname: {}", hostname.to_string_lossy());
        }
    }

    Ok(())
}
