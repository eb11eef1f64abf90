//! Errors raised while running the bootstrap handshake
//!
//! None of these are recoverable: the bootstrap logs them and terminates
//! the process with [`FATAL_EXIT_CODE`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::handoff::ResumptionTag;

/// Exit status used for every fatal handshake failure
pub const FATAL_EXIT_CODE: i32 = 1;

/// Bootstrap error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NsenterError {
    /// Short read/write, I/O failure or malformed data on the config channel
    #[error("config channel failed while {step}: {cause}")]
    Channel {
        /// Protocol step that was running
        step: &'static str,
        /// Underlying cause
        #[source]
        cause: io::Error,
    },

    /// A namespace handle could not be opened or joined
    #[error("failed to join namespace {}: {cause}", path.display())]
    Join {
        /// Offending namespace path
        path: PathBuf,
        /// OS cause
        #[source]
        cause: io::Error,
    },

    /// The child process could not be created
    #[error("failed to clone child process: {cause}")]
    Clone {
        /// OS cause
        #[source]
        cause: nix::Error,
    },

    /// The resumption point was signalled twice in one process image
    #[error("resumption point already signalled {previous}, refusing {attempted}")]
    Handoff {
        /// Tag the point was consumed with
        previous: ResumptionTag,
        /// Tag of the rejected signal
        attempted: ResumptionTag,
    },

    /// Bootstrap trigger is present but unusable
    #[error("invalid bootstrap configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl NsenterError {
    /// Build a channel error for a malformed message
    pub(crate) fn protocol(step: &'static str, message: impl Into<String>) -> Self {
        Self::Channel {
            step,
            cause: io::Error::new(io::ErrorKind::InvalidData, message.into()),
        }
    }

    /// Process exit status for this failure
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

/// Result type alias for bootstrap operations
pub type Result<T> = std::result::Result<T, NsenterError>;
