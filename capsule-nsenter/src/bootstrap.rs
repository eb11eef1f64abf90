//! Bootstrap entry: the handshake the host runtime runs first thing in `main`
//!
//! ```text
//! Idle ─┬─> NotRequested                       (no config pipe variable)
//!       └─> ChannelDetected ─> NamespacesJoined ─> CloneFlagsRead
//!                           ─> ChildCloned ─> HandoffComplete
//! ```
//!
//! Must run while the process is still single-threaded: the kernel refuses
//! to move a multi-threaded process into another mount namespace.

use std::fmt;
use std::io;

use capsule_core::ProcessId;
use tracing::{debug, error, info};

use crate::channel::{ChannelDisposition, ChannelStream, ConfigChannel, InheritedFd};
use crate::cloner::{KernelCloner, ProcessCloner};
use crate::config::BootstrapConfig;
use crate::error::{NsenterError, Result};
use crate::handoff::{ResumptionPoint, ResumptionTag};
use crate::joiner::{KernelNamespaces, NamespaceBackend, NamespaceJoiner};

/// Where the handshake currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing done yet
    Idle,
    /// No config pipe configured, nothing to do
    NotRequested,
    /// Config pipe descriptor parsed and open
    ChannelDetected,
    /// Every namespace in the list joined
    NamespacesJoined,
    /// Clone flags received
    CloneFlagsRead,
    /// Child created and its pid reported
    ChildCloned,
    /// Control handed back to the runtime
    HandoffComplete,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::NotRequested => "not-requested",
            Self::ChannelDetected => "channel-detected",
            Self::NamespacesJoined => "namespaces-joined",
            Self::CloneFlagsRead => "clone-flags-read",
            Self::ChildCloned => "child-cloned",
            Self::HandoffComplete => "handoff-complete",
        };
        f.write_str(name)
    }
}

/// How the bootstrap ended for the process that called it
///
/// The cloned child never sees this: it resumes through the continuation
/// and exits with the continuation's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No config pipe configured; the runtime proceeds unmodified
    NotRequested,
    /// Handshake done; the continuation ran `AsParent` and returned `status`
    Parent {
        /// Pid of the cloned child
        child: ProcessId,
        /// Status returned by the continuation
        status: i32,
    },
}

/// The handshake driver
#[derive(Debug)]
pub struct Bootstrap<B, C> {
    joiner: NamespaceJoiner<B>,
    cloner: C,
    state: BootstrapState,
}

impl Bootstrap<KernelNamespaces, KernelCloner> {
    /// Driver that talks to the kernel
    #[must_use]
    pub fn kernel(config: &BootstrapConfig) -> Self {
        Self::new(
            KernelNamespaces::new().with_kind_check(config.check_kinds),
            KernelCloner::with_stack_size(config.stack_size),
        )
    }
}

impl<B: NamespaceBackend, C: ProcessCloner> Bootstrap<B, C> {
    /// Create a driver over a namespace backend and a cloner
    #[must_use]
    pub const fn new(backend: B, cloner: C) -> Self {
        Self {
            joiner: NamespaceJoiner::new(backend),
            cloner,
            state: BootstrapState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> BootstrapState {
        self.state
    }

    fn advance(&mut self, next: BootstrapState) {
        debug!(from = %self.state, to = %next, "Bootstrap state change");
        self.state = next;
    }

    /// Run from the trigger variable's value
    ///
    /// `None` means the variable is unset: nothing is read, joined or
    /// cloned, and [`Outcome::NotRequested`] is returned.
    ///
    /// # Errors
    /// Returns error if the descriptor is malformed or the handshake fails
    pub fn enter<F>(
        &mut self,
        trigger: Option<&str>,
        disposition: ChannelDisposition,
        continuation: F,
    ) -> Result<Outcome>
    where
        F: FnMut(ResumptionTag) -> i32,
    {
        let Some(value) = trigger else {
            self.advance(BootstrapState::NotRequested);
            return Ok(Outcome::NotRequested);
        };

        info!(value, "Read config pipe env");
        let fd = InheritedFd::parse(value)?;
        let stream = InheritedFd::open(fd, disposition)?;
        debug!(fd, ?disposition, "Config pipe open");

        let mut channel = ConfigChannel::new(stream);
        self.run(&mut channel, continuation)
    }

    /// Run the handshake over an open channel
    ///
    /// In the original process this returns once the continuation has run
    /// `AsParent`. In the cloned child it never returns: the child's entry
    /// runs the continuation `AsChild` and the child exits with its status.
    ///
    /// # Errors
    /// Returns the first channel, join, clone or handoff failure
    pub fn run<S, F>(&mut self, channel: &mut ConfigChannel<S>, continuation: F) -> Result<Outcome>
    where
        S: ChannelStream,
        F: FnMut(ResumptionTag) -> i32,
    {
        self.advance(BootstrapState::ChannelDetected);
        let mut point = ResumptionPoint::establish(continuation);

        let list = channel.read_namespace_list()?;
        self.joiner.join_all(&list)?;
        self.advance(BootstrapState::NamespacesJoined);

        // joins are done; only processes created from here on see new namespaces
        let flags = channel.read_clone_flags()?;
        info!(flags = %flags, raw = flags.bits(), "Read clone flags");
        self.advance(BootstrapState::CloneFlagsRead);

        let child = {
            let entry = point.child_entry(|| release(channel));
            self.cloner.spawn_into(flags, entry)?
        };

        channel.write_child_pid(child)?;
        info!(child_pid = %child, "Reported child pid");
        self.advance(BootstrapState::ChildCloned);

        release(channel)?;
        let status = point.signal(ResumptionTag::AsParent)?;
        self.advance(BootstrapState::HandoffComplete);

        Ok(Outcome::Parent { child, status })
    }

    /// Namespace joiner in use
    #[must_use]
    pub const fn joiner(&self) -> &NamespaceJoiner<B> {
        &self.joiner
    }

    /// Cloner in use
    #[must_use]
    pub const fn cloner(&self) -> &C {
        &self.cloner
    }
}

fn release<S: ChannelStream>(channel: &mut ConfigChannel<S>) -> Result<()> {
    channel
        .get_mut()
        .release()
        .map_err(|cause: io::Error| NsenterError::Channel {
            step: "releasing config pipe",
            cause,
        })
}

/// Run the bootstrap as configured, returning failures to the caller
///
/// # Errors
/// Returns error if the descriptor is malformed or the handshake fails
pub fn try_nsexec<F>(config: &BootstrapConfig, continuation: F) -> Result<Outcome>
where
    F: FnMut(ResumptionTag) -> i32,
{
    let trigger = config.trigger();
    Bootstrap::kernel(config).enter(trigger.as_deref(), config.disposition, continuation)
}

/// Run the bootstrap, terminating the process on any failure
///
/// Call before anything starts a thread. When the config pipe variable is
/// unset this returns [`Outcome::NotRequested`] without side effects.
pub fn nsexec<F>(continuation: F) -> Outcome
where
    F: FnMut(ResumptionTag) -> i32,
{
    let config = BootstrapConfig::from_env();
    match try_nsexec(&config, continuation) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Namespace bootstrap failed");
            std::process::exit(e.exit_code())
        }
    }
}
