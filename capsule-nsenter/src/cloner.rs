//! Creating the child process inside new namespaces
//!
//! This module uses `unsafe` for clone(2), which is inherently unsafe but
//! the only way to get a child whose parent-of-record is our own parent.

#![allow(unsafe_code)]

use std::sync::{Arc, Mutex, PoisonError};

use capsule_core::ProcessId;
use nix::sched::{CloneFlags, clone};
use nix::sys::signal::Signal;
use tracing::{debug, error, info};

use crate::error::{NsenterError, Result};
use crate::flags::NamespaceFlags;

/// Stack handed to the child, the whole host runtime continues on it
pub const CHILD_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Code the cloned child starts executing; its return value is the child's
/// exit status
pub type ChildEntry<'a> = Box<dyn FnMut() -> isize + 'a>;

/// Something that can create the child process
pub trait ProcessCloner {
    /// Create a child running `entry` with `flags` applied to it only
    ///
    /// # Errors
    /// Returns [`NsenterError::Clone`] if the process cannot be created
    fn spawn_into(&mut self, flags: NamespaceFlags, entry: ChildEntry<'_>) -> Result<ProcessId>;
}

/// Production cloner: clone(2) with `CLONE_PARENT` on a dedicated stack
#[derive(Debug)]
pub struct KernelCloner {
    stack: Vec<u8>,
}

impl KernelCloner {
    /// Cloner with a [`CHILD_STACK_SIZE`] stack
    #[must_use]
    pub fn new() -> Self {
        Self::with_stack_size(CHILD_STACK_SIZE)
    }

    /// Cloner with a custom stack size
    #[must_use]
    pub fn with_stack_size(size: usize) -> Self {
        Self {
            stack: vec![0u8; size],
        }
    }

    /// Size of the child's stack
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }
}

impl Default for KernelCloner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCloner for KernelCloner {
    fn spawn_into(&mut self, flags: NamespaceFlags, entry: ChildEntry<'_>) -> Result<ProcessId> {
        for kind in flags.kinds() {
            debug!(namespace = %kind, "Child gets a new namespace");
        }

        // CLONE_PARENT: the child is reported to whoever started us, which
        // is the process that actually waits for it.
        let clone_flags = flags.to_clone_flags() | CloneFlags::CLONE_PARENT;

        // SAFETY: no CLONE_VM, so the child runs `entry` on its own copy of
        // the address space, including its own copy of `self.stack`.
        let pid = unsafe {
            clone(
                entry,
                &mut self.stack,
                clone_flags,
                Some(Signal::SIGCHLD as i32),
            )
        }
        .map_err(|cause| {
            error!(flags = %flags, error = %cause, "Failed to clone child");
            NsenterError::Clone { cause }
        })?;

        info!(child_pid = pid.as_raw(), flags = %flags, "Cloned child process");
        Ok(pid.into())
    }
}

/// Mock cloner for testing
///
/// Records the requested flags and hands out pids without creating a
/// process; the entry is dropped unrun.
#[derive(Debug, Clone)]
pub struct MockCloner {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug)]
struct MockState {
    next_pid: i32,
    fail_with: Option<nix::Error>,
    requested: Vec<NamespaceFlags>,
}

impl MockCloner {
    /// Mock that hands out pids starting at `first_pid`
    #[must_use]
    pub fn new(first_pid: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_pid: first_pid,
                fail_with: None,
                requested: Vec::new(),
            })),
        }
    }

    /// Make every clone fail with `errno`
    #[must_use]
    pub fn failing(self, errno: nix::Error) -> Self {
        self.lock().fail_with = Some(errno);
        self
    }

    /// Flags of every clone request, in order
    #[must_use]
    pub fn requested(&self) -> Vec<NamespaceFlags> {
        self.lock().requested.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessCloner for MockCloner {
    fn spawn_into(&mut self, flags: NamespaceFlags, _entry: ChildEntry<'_>) -> Result<ProcessId> {
        let mut state = self.lock();
        state.requested.push(flags);

        if let Some(cause) = state.fail_with {
            return Err(NsenterError::Clone { cause });
        }

        let pid = ProcessId::from_raw(state.next_pid);
        state.next_pid += 1;
        Ok(pid)
    }
}
