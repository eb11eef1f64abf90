//! Namespace kinds and their `/proc` names

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use capsule_core::ProcessId;

use crate::error::NsenterError;
use crate::flags::NamespaceFlags;

/// A category of kernel namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamespaceKind {
    /// Mount namespace
    Mnt,
    /// Cgroup namespace
    Cgroup,
    /// UTS namespace (hostname)
    Uts,
    /// IPC namespace
    Ipc,
    /// User namespace
    User,
    /// PID namespace
    Pid,
    /// Network namespace
    Net,
}

impl NamespaceKind {
    /// Every kind, in ascending `CLONE_NEW*` bit order
    pub const ALL: [Self; 7] = [
        Self::Mnt,
        Self::Cgroup,
        Self::Uts,
        Self::Ipc,
        Self::User,
        Self::Pid,
        Self::Net,
    ];

    /// File name under `/proc/<pid>/ns`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Mnt => "mnt",
            Self::Cgroup => "cgroup",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::User => "user",
            Self::Pid => "pid",
            Self::Net => "net",
        }
    }

    /// Namespace-creation flag for this kind
    #[must_use]
    pub const fn clone_flag(self) -> NamespaceFlags {
        match self {
            Self::Mnt => NamespaceFlags::MNT,
            Self::Cgroup => NamespaceFlags::CGROUP,
            Self::Uts => NamespaceFlags::UTS,
            Self::Ipc => NamespaceFlags::IPC,
            Self::User => NamespaceFlags::USER,
            Self::Pid => NamespaceFlags::PID,
            Self::Net => NamespaceFlags::NET,
        }
    }

    /// Handle path of this namespace for a process
    #[must_use]
    pub fn path_for(self, pid: ProcessId) -> PathBuf {
        PathBuf::from(format!("/proc/{pid}/ns/{}", self.proc_name()))
    }

    /// Guess the kind from a handle path such as `/proc/1/ns/uts`
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL.into_iter().find(|kind| kind.proc_name() == name)
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

impl FromStr for NamespaceKind {
    type Err = NsenterError;

    /// Accepts `/proc` names (`uts`) and flag names (`NEWUTS`, `NEWNS`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "mnt" | "mount" | "newns" => Self::Mnt,
            "cgroup" | "newcgroup" => Self::Cgroup,
            "uts" | "newuts" => Self::Uts,
            "ipc" | "newipc" => Self::Ipc,
            "user" | "newuser" => Self::User,
            "pid" | "newpid" => Self::Pid,
            "net" | "network" | "newnet" => Self::Net,
            other => {
                return Err(NsenterError::Config {
                    message: format!("unknown namespace kind {other:?}"),
                });
            }
        };
        Ok(kind)
    }
}
