//! Namespace handles and the ordered list sent over the channel

use std::path::{Path, PathBuf};

use capsule_core::ProcessId;

use crate::error::{NsenterError, Result};
use crate::kind::NamespaceKind;

/// Separator between paths in the namespace-list blob
pub const NS_DELIMITER: char = ',';

/// Path to a kernel namespace object, e.g. `/proc/123/ns/ipc`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceHandle {
    path: PathBuf,
    kind: Option<NamespaceKind>,
}

impl NamespaceHandle {
    /// Create a handle for a path, without a kind to check against
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: None,
        }
    }

    /// Handle for one of a process's namespaces
    #[must_use]
    pub fn for_process(pid: ProcessId, kind: NamespaceKind) -> Self {
        Self {
            path: kind.path_for(pid),
            kind: Some(kind),
        }
    }

    /// Namespace path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared kind, if known
    #[must_use]
    pub const fn kind(&self) -> Option<NamespaceKind> {
        self.kind
    }

    /// Declared kind, falling back to the `/proc` file name
    #[must_use]
    pub fn inferred_kind(&self) -> Option<NamespaceKind> {
        self.kind.or_else(|| NamespaceKind::from_path(&self.path))
    }
}

/// Ordered, non-empty list of namespaces to join
///
/// Order is significant: joining a mount namespace can make `/proc/<pid>/ns`
/// paths unreachable, so mount entries must come last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceList(Vec<NamespaceHandle>);

impl NamespaceList {
    /// Build a list, checking every path can be sent over the wire
    ///
    /// # Errors
    /// Returns error if the list is empty or a path is empty, not UTF-8,
    /// or contains the delimiter
    pub fn new(handles: Vec<NamespaceHandle>) -> Result<Self> {
        if handles.is_empty() {
            return Err(NsenterError::Config {
                message: "namespace list cannot be empty".to_string(),
            });
        }

        for handle in &handles {
            let Some(path) = handle.path().to_str() else {
                return Err(NsenterError::Config {
                    message: format!("namespace path {} is not UTF-8", handle.path().display()),
                });
            };
            if path.is_empty() || path.contains(NS_DELIMITER) {
                return Err(NsenterError::Config {
                    message: format!("namespace path {path:?} cannot be sent"),
                });
            }
        }

        Ok(Self(handles))
    }

    /// Namespaces of `pid` for the given kinds, mount namespace moved last
    ///
    /// # Errors
    /// Returns error if `kinds` is empty
    pub fn for_process(pid: ProcessId, kinds: &[NamespaceKind]) -> Result<Self> {
        let mut ordered: Vec<NamespaceKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !ordered.contains(kind) {
                ordered.push(*kind);
            }
        }
        // stable: everything else keeps the caller's order
        ordered.sort_by_key(|kind| *kind == NamespaceKind::Mnt);

        Self::new(
            ordered
                .into_iter()
                .map(|kind| NamespaceHandle::for_process(pid, kind))
                .collect(),
        )
    }

    /// Parse the comma-separated blob read from the channel
    ///
    /// # Errors
    /// Returns a channel error if the blob is empty, not UTF-8, or has an
    /// empty entry
    pub fn decode(blob: &[u8]) -> Result<Self> {
        const STEP: &str = "decoding namespace list";

        let text = std::str::from_utf8(blob)
            .map_err(|e| NsenterError::protocol(STEP, format!("namespace list is not UTF-8: {e}")))?;
        if text.is_empty() {
            return Err(NsenterError::protocol(STEP, "namespace list is empty"));
        }

        let mut handles = Vec::new();
        for (index, path) in text.split(NS_DELIMITER).enumerate() {
            if path.is_empty() {
                return Err(NsenterError::protocol(
                    STEP,
                    format!("namespace list entry {index} is empty in {text:?}"),
                ));
            }
            handles.push(NamespaceHandle::new(path));
        }

        Ok(Self(handles))
    }

    /// Blob form: paths joined by [`NS_DELIMITER`], no terminator
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.0
            .iter()
            .map(|handle| handle.path().to_string_lossy())
            .collect::<Vec<_>>()
            .join(",")
            .into_bytes()
    }

    /// Handles in join order
    #[must_use]
    pub fn handles(&self) -> &[NamespaceHandle] {
        &self.0
    }

    /// Number of handles
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed list
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a NamespaceList {
    type Item = &'a NamespaceHandle;
    type IntoIter = std::slice::Iter<'a, NamespaceHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &NamespaceList) -> Vec<&Path> {
        list.handles().iter().map(NamespaceHandle::path).collect()
    }

    #[test]
    fn test_decode_keeps_order() {
        let list = NamespaceList::decode(b"/proc/123/ns/ipc,/proc/123/ns/uts,/proc/123/ns/mnt").unwrap();

        assert_eq!(
            paths(&list),
            vec![
                Path::new("/proc/123/ns/ipc"),
                Path::new("/proc/123/ns/uts"),
                Path::new("/proc/123/ns/mnt"),
            ]
        );
    }

    #[test]
    fn test_decode_does_not_need_terminator() {
        let blob = b"/proc/1/ns/uts\0garbage";
        let list = NamespaceList::decode(&blob[..14]).unwrap();
        assert_eq!(paths(&list), vec![Path::new("/proc/1/ns/uts")]);
    }

    #[test]
    fn test_decode_rejects_degenerate_lists() {
        assert!(NamespaceList::decode(b"").is_err());
        assert!(NamespaceList::decode(b",").is_err());
        assert!(NamespaceList::decode(b"/proc/1/ns/uts,").is_err());
        assert!(NamespaceList::decode(b"/proc/1/ns/uts,,/proc/1/ns/mnt").is_err());
        assert!(NamespaceList::decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_for_process_moves_mount_last() {
        let pid = ProcessId::from_raw(42);
        let list = NamespaceList::for_process(
            pid,
            &[NamespaceKind::Mnt, NamespaceKind::Net, NamespaceKind::Uts, NamespaceKind::Net],
        )
        .unwrap();

        assert_eq!(
            paths(&list),
            vec![
                Path::new("/proc/42/ns/net"),
                Path::new("/proc/42/ns/uts"),
                Path::new("/proc/42/ns/mnt"),
            ]
        );
        assert_eq!(list.handles()[2].kind(), Some(NamespaceKind::Mnt));
    }

    #[test]
    fn test_new_rejects_unsendable_paths() {
        assert!(NamespaceList::new(Vec::new()).is_err());
        assert!(NamespaceList::new(vec![NamespaceHandle::new("")]).is_err());
        assert!(NamespaceList::new(vec![NamespaceHandle::new("/a,b")]).is_err());
        assert!(NamespaceList::for_process(ProcessId::from_raw(1), &[]).is_err());
    }

    #[test]
    fn test_encode_then_decode_preserves_paths() {
        let list = NamespaceList::new(vec![
            NamespaceHandle::new("/proc/7/ns/net"),
            NamespaceHandle::new("/run/netns/blue"),
        ])
        .unwrap();

        assert_eq!(list.encode(), b"/proc/7/ns/net,/run/netns/blue".to_vec());
        let decoded = NamespaceList::decode(&list.encode()).unwrap();
        assert_eq!(paths(&decoded), paths(&list));
    }

    #[test]
    fn test_inferred_kind() {
        assert_eq!(
            NamespaceHandle::new("/proc/9/ns/pid").inferred_kind(),
            Some(NamespaceKind::Pid)
        );
        assert_eq!(NamespaceHandle::new("/run/netns/blue").inferred_kind(), None);
    }
}
