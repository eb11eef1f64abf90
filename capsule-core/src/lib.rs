//! Capsule Core - shared types for the namespace bootstrap and its host
//!
//! This crate provides the types both sides of the bootstrap channel agree on.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::InitConfig;
pub use error::{Error, Result};
pub use types::ProcessId;
