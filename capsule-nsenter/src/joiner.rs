//! Joining existing namespaces with setns(2)

use std::fs::File;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use nix::sched::{CloneFlags, setns};
use tracing::{debug, error, info};

use crate::error::{NsenterError, Result};
use crate::namespace::{NamespaceHandle, NamespaceList};

/// Something that can move the current process into a namespace
///
/// Joining is irreversible: there is no way back into the namespace the
/// process left, so a failure part-way through a list leaves the process
/// half-transitioned.
pub trait NamespaceBackend {
    /// Join one namespace
    ///
    /// # Errors
    /// Returns [`NsenterError::Join`] if the handle cannot be opened or joined
    fn enter(&mut self, handle: &NamespaceHandle) -> Result<()>;
}

/// Production backend: open(2) the path read-only, then setns(2)
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelNamespaces {
    check_kind: bool,
}

impl KernelNamespaces {
    /// Backend that lets the kernel accept any namespace type
    #[must_use]
    pub const fn new() -> Self {
        Self { check_kind: false }
    }

    /// Ask the kernel to verify each handle is of its declared kind
    #[must_use]
    pub const fn with_kind_check(mut self, enable: bool) -> Self {
        self.check_kind = enable;
        self
    }

    fn nstype(&self, handle: &NamespaceHandle) -> CloneFlags {
        if !self.check_kind {
            return CloneFlags::empty();
        }
        handle
            .inferred_kind()
            .map_or_else(CloneFlags::empty, |kind| kind.clone_flag().to_clone_flags())
    }
}

impl NamespaceBackend for KernelNamespaces {
    fn enter(&mut self, handle: &NamespaceHandle) -> Result<()> {
        let path = handle.path();

        let file = File::open(path).map_err(|cause| NsenterError::Join {
            path: path.to_path_buf(),
            cause,
        })?;

        // `file` is closed when it goes out of scope, joined or not
        setns(&file, self.nstype(handle)).map_err(|errno| NsenterError::Join {
            path: path.to_path_buf(),
            cause: io::Error::from(errno),
        })
    }
}

/// Joins an ordered namespace list, stopping at the first failure
#[derive(Debug, Clone, Default)]
pub struct NamespaceJoiner<B> {
    backend: B,
}

impl<B: NamespaceBackend> NamespaceJoiner<B> {
    /// Create a joiner over a backend
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Join every namespace in order
    ///
    /// Entries after a failing one are never attempted. Namespaces joined
    /// before the failure stay joined; the caller must terminate.
    ///
    /// # Errors
    /// Returns the [`NsenterError::Join`] of the first failing handle
    pub fn join_all(&mut self, list: &NamespaceList) -> Result<()> {
        for (index, handle) in list.into_iter().enumerate() {
            debug!(index, path = %handle.path().display(), "Entering namespace");

            if let Err(e) = self.backend.enter(handle) {
                error!(
                    path = %handle.path().display(),
                    joined = index,
                    remaining = list.len() - index - 1,
                    error = %e,
                    "Failed to join namespace"
                );
                return Err(e);
            }

            debug!(path = %handle.path().display(), "Entered namespace");
        }

        info!(count = list.len(), "Joined namespaces");
        Ok(())
    }

    /// Get the backend
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }
}

/// Mock backend for testing (records joins, never touches the kernel)
///
/// # Example
/// ```
/// use capsule_nsenter::{MockNamespaces, NamespaceJoiner, NamespaceList};
///
/// let mock = MockNamespaces::new().fail_on("/proc/1/ns/net");
/// let mut joiner = NamespaceJoiner::new(mock.clone());
///
/// let list = NamespaceList::decode(b"/proc/1/ns/uts,/proc/1/ns/net,/proc/1/ns/mnt").unwrap();
/// assert!(joiner.join_all(&list).is_err());
///
/// assert_eq!(mock.attempted(), vec!["/proc/1/ns/uts", "/proc/1/ns/net"]);
/// assert_eq!(mock.joined(), vec!["/proc/1/ns/uts"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockNamespaces {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    failing: Vec<String>,
    attempted: Vec<String>,
    joined: Vec<String>,
}

impl MockNamespaces {
    /// Create a mock where every join succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make joins of `path` fail with `EINVAL`
    #[must_use]
    pub fn fail_on(self, path: impl Into<String>) -> Self {
        self.lock().failing.push(path.into());
        self
    }

    /// Paths `enter` was called with, in order
    #[must_use]
    pub fn attempted(&self) -> Vec<String> {
        self.lock().attempted.clone()
    }

    /// Paths joined successfully, in order
    #[must_use]
    pub fn joined(&self) -> Vec<String> {
        self.lock().joined.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NamespaceBackend for MockNamespaces {
    fn enter(&mut self, handle: &NamespaceHandle) -> Result<()> {
        let path = handle.path().to_string_lossy().into_owned();
        let mut state = self.lock();
        state.attempted.push(path.clone());

        if state.failing.contains(&path) {
            return Err(NsenterError::Join {
                path: handle.path().to_path_buf(),
                cause: io::Error::from_raw_os_error(libc::EINVAL),
            });
        }

        state.joined.push(path);
        Ok(())
    }
}
