//! Reading which namespaces a process belongs to

use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use capsule_core::ProcessId;

use crate::error::{NsenterError, Result};
use crate::kind::NamespaceKind;

/// Namespace identities of one process, e.g. `uts:[4026531838]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    ids: BTreeMap<NamespaceKind, String>,
}

impl NamespaceInfo {
    /// Namespaces of the current process
    ///
    /// # Errors
    /// Returns error if `/proc/<pid>/ns` cannot be read
    pub fn current() -> Result<Self> {
        Self::for_process(ProcessId::current())
    }

    /// Namespaces of a specific process
    ///
    /// Kinds the kernel does not expose are skipped.
    ///
    /// # Errors
    /// Returns error if no namespace link can be read at all
    pub fn for_process(pid: ProcessId) -> Result<Self> {
        let mut ids = BTreeMap::new();
        let mut last_error = None;

        for kind in NamespaceKind::ALL {
            match fs::read_link(kind.path_for(pid)) {
                Ok(target) => {
                    ids.insert(kind, target.to_string_lossy().into_owned());
                }
                Err(e) => last_error = Some(e),
            }
        }

        match (ids.is_empty(), last_error) {
            (true, Some(e)) => Err(NsenterError::Config {
                message: format!("Failed to read namespaces of process {pid}: {e}"),
            }),
            _ => Ok(Self { ids }),
        }
    }

    /// Identity of one namespace kind
    #[must_use]
    pub fn get(&self, kind: NamespaceKind) -> Option<&str> {
        self.ids.get(&kind).map(String::as_str)
    }

    /// Kinds where `other` is in a different namespace
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> Vec<NamespaceKind> {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| {
                matches!((self.get(*kind), other.get(*kind)), (Some(a), Some(b)) if a != b)
            })
            .collect()
    }
}

impl fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Namespace Info:")?;
        for (kind, id) in &self.ids {
            let label = format!("{}:", kind.proc_name().to_ascii_uppercase());
            writeln!(f, "  {label:<8}{id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(NamespaceKind, &str)]) -> NamespaceInfo {
        NamespaceInfo {
            ids: pairs.iter().map(|(k, v)| (*k, (*v).to_string())).collect(),
        }
    }

    #[test]
    fn test_current_namespaces() {
        let info = NamespaceInfo::current().unwrap();
        assert!(info.get(NamespaceKind::Pid).is_some());
        assert!(info.get(NamespaceKind::Mnt).unwrap().starts_with("mnt:["));
    }

    #[test]
    fn test_same_process_has_no_differences() {
        let a = NamespaceInfo::current().unwrap();
        let b = NamespaceInfo::current().unwrap();
        assert!(a.differs_from(&b).is_empty());
    }

    #[test]
    fn test_differs_from() {
        let a = info(&[(NamespaceKind::Uts, "uts:[1]"), (NamespaceKind::Net, "net:[2]")]);
        let b = info(&[(NamespaceKind::Uts, "uts:[9]"), (NamespaceKind::Net, "net:[2]")]);

        assert_eq!(a.differs_from(&b), vec![NamespaceKind::Uts]);
    }

    #[test]
    fn test_namespace_info_display() {
        let display = info(&[
            (NamespaceKind::Pid, "pid:[4026531836]"),
            (NamespaceKind::Net, "net:[4026531905]"),
        ])
        .to_string();

        assert!(display.contains("PID:"));
        assert!(display.contains("NET:"));
    }

    #[test]
    fn test_missing_process() {
        assert!(NamespaceInfo::for_process(ProcessId::from_raw(i32::MAX)).is_err());
    }
}
