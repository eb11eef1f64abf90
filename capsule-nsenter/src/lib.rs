//! Namespace bootstrap for process startup
//!
//! This crate runs before the host runtime's normal execution starts:
//! - reads namespace paths and clone flags from an inherited config pipe
//! - joins each namespace in order with setns(2)
//! - clones a child into new namespaces
//! - hands control back to the runtime, once as parent and once as child

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod bootstrap;
pub mod channel;
pub mod cloner;
pub mod config;
pub mod error;
pub mod flags;
pub mod handoff;
pub mod info;
pub mod joiner;
pub mod kind;
pub mod namespace;

pub use bootstrap::{Bootstrap, BootstrapState, Outcome, nsexec, try_nsexec};
pub use channel::{
    ChannelDisposition, ChannelStream, ConfigChannel, InheritedFd, encode_payload, encode_request,
};
pub use cloner::{ChildEntry, KernelCloner, MockCloner, ProcessCloner};
pub use config::{BootstrapConfig, ENV_CLOSE_CONFIG_PIPE, ENV_CONFIG_PIPE};
pub use error::{FATAL_EXIT_CODE, NsenterError, Result};
pub use flags::NamespaceFlags;
pub use handoff::{ResumptionPoint, ResumptionTag};
pub use info::NamespaceInfo;
pub use joiner::{KernelNamespaces, MockNamespaces, NamespaceBackend, NamespaceJoiner};
pub use kind::NamespaceKind;
pub use namespace::{NamespaceHandle, NamespaceList};
