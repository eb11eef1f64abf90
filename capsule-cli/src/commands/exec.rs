//! Exec command implementation: the host side of the bootstrap handshake

#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::process::Stdio;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use capsule_core::{InitConfig, ProcessId};
use capsule_nsenter::{
    ENV_CLOSE_CONFIG_PIPE, ENV_CONFIG_PIPE, NamespaceFlags, NamespaceKind, NamespaceList,
    encode_payload, encode_request,
};

use crate::cli::ExecArgs;

pub async fn execute(args: ExecArgs, verbose: bool) -> Result<i32> {
    let target = args.target;

    let join = parse_kinds(&args.join)?;
    let new_namespaces: NamespaceFlags = parse_kinds(&args.new_namespaces)?.into_iter().collect();
    let init = build_init_config(&args, new_namespaces)?;

    let list = NamespaceList::for_process(target, &join)
        .with_context(|| format!("Cannot join namespaces of PID {target}"))?;

    info!(
        target_pid = %target,
        join = list.len(),
        new = %new_namespaces,
        "🚀 Executing: {}",
        args.command.join(" ")
    );

    let (host_end, bootstrap_end) = StdUnixStream::pair().context("Failed to create config channel")?;
    let inheritable = inheritable_copy(&bootstrap_end)?;
    drop(bootstrap_end);

    let mut bootstrap = spawn_bootstrap(&inheritable, verbose)?;
    // our copy would keep the channel alive if the bootstrap dies early
    drop(inheritable);

    host_end.set_nonblocking(true)?;
    let mut channel = UnixStream::from_std(host_end)?;

    let child = match handshake(&mut channel, &list, new_namespaces).await {
        Ok(child) => child,
        Err(e) => {
            let status = bootstrap.wait().await?;
            return Err(e.context(format!("Bootstrap process failed ({status})")));
        }
    };
    info!(child_pid = %child, "👶 Child cloned");

    let payload = encode_payload(&init.to_json()?)?;
    channel
        .write_all(&payload)
        .await
        .context("Failed to send init config")?;
    channel.shutdown().await?;
    drop(channel);

    let status = bootstrap.wait().await?;
    if !status.success() {
        bail!("Bootstrap process failed ({status})");
    }
    debug!("Bootstrap process exited cleanly");

    wait_for_child(child).await
}

/// Parse namespace names such as `uts` or `NEWPID`
fn parse_kinds(names: &[String]) -> Result<Vec<NamespaceKind>> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| NamespaceKind::from_str(name).map_err(anyhow::Error::from))
        .collect()
}

fn build_init_config(args: &ExecArgs, new_namespaces: NamespaceFlags) -> Result<InitConfig> {
    let mut init = InitConfig::new(args.command.iter().cloned());
    init.env.extend(args.env.iter().cloned());

    if let Some(hostname) = &args.hostname {
        if !new_namespaces.contains(NamespaceFlags::UTS) {
            bail!("--hostname requires --new uts");
        }
        init = init.with_hostname(hostname.clone());
    }

    init.validate()?;
    Ok(init)
}

/// Duplicate the bootstrap's end without `FD_CLOEXEC` so it survives exec
fn inheritable_copy(stream: &StdUnixStream) -> Result<OwnedFd> {
    // SAFETY: dup only reads the descriptor table; the result is checked
    // before being wrapped.
    let raw = unsafe { libc::dup(stream.as_raw_fd()) };
    if raw < 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to duplicate config channel");
    }
    // SAFETY: `raw` is a freshly duplicated descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

fn spawn_bootstrap(channel: &OwnedFd, verbose: bool) -> Result<Child> {
    let mut command = Command::new("/proc/self/exe");
    if verbose {
        command.arg("--verbose");
    }

    command
        .arg("init")
        .env(ENV_CONFIG_PIPE, channel.as_raw_fd().to_string())
        .env_remove(ENV_CLOSE_CONFIG_PIPE)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn bootstrap process")
}

async fn handshake(
    channel: &mut UnixStream,
    list: &NamespaceList,
    flags: NamespaceFlags,
) -> Result<ProcessId> {
    let request = encode_request(list, flags)?;
    channel
        .write_all(&request)
        .await
        .context("Failed to send namespace request")?;

    let pid = channel
        .read_i32()
        .await
        .context("Bootstrap closed the channel before reporting a child")?;
    let pid = ProcessId::from_raw(pid);
    if !pid.is_valid() {
        bail!("Bootstrap reported invalid child PID {pid}");
    }
    Ok(pid)
}

/// Wait for the cloned child, forwarding Ctrl+C to it
async fn wait_for_child(child: ProcessId) -> Result<i32> {
    let pid = child.as_nix_pid();
    let mut waiter = tokio::task::spawn_blocking(move || reap(pid));

    loop {
        tokio::select! {
            result = &mut waiter => return result.context("Wait task panicked")?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                warn!("Received Ctrl+C, forwarding to child...");
                let _ = kill(pid, Signal::SIGTERM);
            }
        }
    }
}

fn reap(pid: nix::unistd::Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                info!("👋 Child exited with code: {code}");
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                warn!("Child terminated by signal: {signal:?}");
                return Ok(128 + signal as i32);
            }
            Ok(status) => debug!("Child status: {status:?}"),
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => bail!("Child {pid} is not ours to wait for (already reaped?)"),
            Err(e) => return Err(e).context("Wait failed"),
        }
    }
}
