//! Core type definitions with strong typing and validation

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Process identifier
///
/// Travels over the bootstrap channel as a big-endian `i32`, so the raw
/// representation is kept signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        Self(nix::unistd::getpid().as_raw())
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Whether this refers to an actual process (strictly positive)
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let pid = s
            .trim()
            .parse::<i32>()
            .map_err(|e| Error::InvalidConfig {
                message: format!("invalid process id {s:?}: {e}"),
            })
            .map(Self)?;

        if !pid.is_valid() {
            return Err(Error::InvalidConfig {
                message: format!("process id must be positive, got {pid}"),
            });
        }

        Ok(pid)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        Self::from_raw(pid.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id() {
        let pid = ProcessId::from_raw(123);
        assert_eq!(pid.as_raw(), 123);

        let nix_pid = pid.as_nix_pid();
        assert_eq!(nix_pid.as_raw(), 123);
    }

    #[test]
    fn test_process_id_parse() {
        assert_eq!("42".parse::<ProcessId>().unwrap(), ProcessId::from_raw(42));
        assert_eq!(" 7\n".parse::<ProcessId>().unwrap(), ProcessId::from_raw(7));
        assert!("0".parse::<ProcessId>().is_err());
        assert!("-3".parse::<ProcessId>().is_err());
        assert!("abc".parse::<ProcessId>().is_err());
    }

    #[test]
    fn test_current_is_valid() {
        assert!(ProcessId::current().is_valid());
        assert_eq!(
            ProcessId::current().as_raw(),
            i32::try_from(std::process::id()).unwrap()
        );
    }
}
