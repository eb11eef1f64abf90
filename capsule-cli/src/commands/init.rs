//! Init command implementation: what the cloned child turns into
//!
//! Runs after the bootstrap handed control back as the child. The host is
//! still holding the other end of the config channel and sends one more
//! blob, the [`InitConfig`] describing the command to exec.

use std::collections::BTreeMap;
use std::ffi::CString;

use anyhow::{Context, Result, bail};
use nix::unistd::{execvpe, sethostname};
use tracing::{debug, info};

use capsule_core::InitConfig;
use capsule_nsenter::{
    ChannelDisposition, ChannelStream, ConfigChannel, ENV_CONFIG_PIPE, InheritedFd, ResumptionTag,
};

/// Prefix of variables that only make sense to the bootstrap
const BOOTSTRAP_ENV_PREFIX: &str = "_LIBCAPSULE_";

/// Exit code when the command cannot be executed
const EXEC_FAILED_EXIT_CODE: i32 = 127;

pub fn execute(resumed: Option<ResumptionTag>) -> Result<i32> {
    if resumed != Some(ResumptionTag::AsChild) {
        bail!("`capsule init` only runs inside a child cloned by `capsule exec`");
    }

    let config = receive_config()?;
    info!("👶 Child process started (PID {})", std::process::id());

    setup_uts(&config)?;
    Ok(exec(&config))
}

fn receive_config() -> Result<InitConfig> {
    let value = std::env::var(ENV_CONFIG_PIPE)
        .with_context(|| format!("{ENV_CONFIG_PIPE} is not set"))?;
    let fd = InheritedFd::parse(&value)?;

    let mut channel = ConfigChannel::new(InheritedFd::open(fd, ChannelDisposition::Close)?);
    let payload = channel.read_length_prefixed_blob("reading init config")?;
    // the command must not inherit the channel
    channel
        .get_mut()
        .release()
        .context("Failed to close config channel")?;

    let config = InitConfig::from_json(&payload).context("Invalid init config")?;
    debug!(args = ?config.args, env = config.env.len(), "Received init config");
    Ok(config)
}

fn setup_uts(config: &InitConfig) -> Result<()> {
    if let Some(hostname) = &config.hostname {
        debug!(hostname = %hostname, "Setting hostname");
        sethostname(hostname).with_context(|| format!("Failed to set hostname {hostname:?}"))?;
    }
    Ok(())
}

/// Inherited environment without bootstrap variables, overridden by `extra`
fn build_env<I>(inherited: I, extra: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = inherited
        .into_iter()
        .filter(|(key, _)| !key.starts_with(BOOTSTRAP_ENV_PREFIX))
        .collect();

    for entry in extra {
        if let Some((key, value)) = entry.split_once('=') {
            env.insert(key.to_string(), value.to_string());
        }
    }

    env.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
}

fn to_cstrings(items: &[String]) -> std::result::Result<Vec<CString>, std::ffi::NulError> {
    items.iter().map(|s| CString::new(s.as_bytes())).collect()
}

/// Replace this process with the configured command; returns only on failure
fn exec(config: &InitConfig) -> i32 {
    let env = build_env(std::env::vars(), &config.env);

    let (args, env) = match (to_cstrings(&config.args), to_cstrings(&env)) {
        (Ok(args), Ok(env)) => (args, env),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("❌ Invalid argument: {e}");
            return EXEC_FAILED_EXIT_CODE;
        }
    };
    let Some(program) = args.first() else {
        eprintln!("❌ Command cannot be empty");
        return EXEC_FAILED_EXIT_CODE;
    };

    info!("   Executing: {}", config.args.join(" "));
    let result = execvpe(program, &args, &env);

    eprintln!("❌ Failed to execute {}: {:?}", config.args[0], result);
    EXEC_FAILED_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_build_env_strips_bootstrap_vars() {
        let env = build_env(
            vars(&[
                ("PATH", "/bin"),
                ("_LIBCAPSULE_CONFIG_PIPE", "3"),
                ("_LIBCAPSULE_CLOSE_CONFIG_PIPE", "1"),
            ]),
            &[],
        );
        assert_eq!(env, vec!["PATH=/bin"]);
    }

    #[test]
    fn test_build_env_extra_overrides() {
        let env = build_env(
            vars(&[("HOME", "/root"), ("TERM", "xterm")]),
            &["HOME=/tmp".to_string(), "NEW=a=b".to_string()],
        );
        assert_eq!(env, vec!["HOME=/tmp", "NEW=a=b", "TERM=xterm"]);
    }

    #[test]
    fn test_init_without_handoff_fails() {
        assert!(execute(None).is_err());
        assert!(execute(Some(ResumptionTag::AsParent)).is_err());
    }

    #[test]
    fn test_exec_missing_program_returns_127() {
        let config = InitConfig::new(["/nonexistent/capsule-test-binary"]);
        assert_eq!(exec(&config), EXEC_FAILED_EXIT_CODE);
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let config = InitConfig::new(["/bin/true", "a\0b"]);
        assert_eq!(exec(&config), EXEC_FAILED_EXIT_CODE);
    }
}
