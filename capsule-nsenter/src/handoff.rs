//! Handing control back to the host runtime after the handshake
//!
//! Both the original process and the cloned child end up calling the same
//! continuation, tagged with who they are. The child gets there through its
//! clone entry function instead of a non-local jump: it owns a private copy
//! of the [`ResumptionPoint`] taken at clone time, so each process image
//! consumes its own copy exactly once.

use std::fmt;

use tracing::{error, info};

use crate::cloner::ChildEntry;
use crate::error::{FATAL_EXIT_CODE, NsenterError, Result};

/// Which side of the clone is resuming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumptionTag {
    /// The process that joined the namespaces and issued the clone
    AsParent,
    /// The freshly cloned process
    AsChild,
}

impl fmt::Display for ResumptionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsParent => f.write_str("as parent"),
            Self::AsChild => f.write_str("as child"),
        }
    }
}

/// Place both process images resume at
///
/// The continuation receives the tag and returns the exit status the
/// resuming process should end with.
pub struct ResumptionPoint<F> {
    continuation: F,
    consumed: Option<ResumptionTag>,
}

impl<F> ResumptionPoint<F>
where
    F: FnMut(ResumptionTag) -> i32,
{
    /// Capture the continuation; call once, before any namespace work
    #[must_use]
    pub const fn establish(continuation: F) -> Self {
        Self {
            continuation,
            consumed: None,
        }
    }

    /// Resume into the continuation with `tag`
    ///
    /// # Errors
    /// Returns [`NsenterError::Handoff`] if this process image already
    /// resumed through this point
    pub fn signal(&mut self, tag: ResumptionTag) -> Result<i32> {
        if let Some(previous) = self.consumed {
            return Err(NsenterError::Handoff {
                previous,
                attempted: tag,
            });
        }
        self.consumed = Some(tag);

        info!(resuming = %tag, "Handing control back to runtime");
        Ok((self.continuation)(tag))
    }

    /// Tag this point was consumed with, if any
    #[must_use]
    pub const fn consumed(&self) -> Option<ResumptionTag> {
        self.consumed
    }

    /// Entry function for the cloned child: signal `AsChild`, exit with the
    /// continuation's status
    ///
    /// `prepare` runs first in the child; a failure there is fatal.
    pub fn child_entry<'a, P>(&'a mut self, mut prepare: P) -> ChildEntry<'a>
    where
        P: FnMut() -> Result<()> + 'a,
    {
        Box::new(move || {
            let status = prepare().and_then(|()| self.signal(ResumptionTag::AsChild));
            match status {
                Ok(code) => code as isize,
                Err(e) => {
                    error!(error = %e, "Child failed to resume");
                    FATAL_EXIT_CODE as isize
                }
            }
        })
    }
}

impl<F> fmt::Debug for ResumptionPoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumptionPoint")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_passes_tag_and_status() {
        let mut seen = Vec::new();
        let mut point = ResumptionPoint::establish(|tag| {
            seen.push(tag);
            42
        });

        assert_eq!(point.signal(ResumptionTag::AsParent).unwrap(), 42);
        assert_eq!(point.consumed(), Some(ResumptionTag::AsParent));
        drop(point);
        assert_eq!(seen, vec![ResumptionTag::AsParent]);
    }

    #[test]
    fn test_second_signal_is_rejected() {
        let mut calls = 0;
        let mut point = ResumptionPoint::establish(|_| {
            calls += 1;
            0
        });

        point.signal(ResumptionTag::AsChild).unwrap();
        let err = point.signal(ResumptionTag::AsParent).unwrap_err();

        assert!(matches!(
            err,
            NsenterError::Handoff {
                previous: ResumptionTag::AsChild,
                attempted: ResumptionTag::AsParent,
            }
        ));
        drop(point);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_child_entry_resumes_as_child() {
        let mut seen = None;
        let mut point = ResumptionPoint::establish(|tag| {
            seen = Some(tag);
            5
        });

        let mut entry = point.child_entry(|| Ok(()));
        assert_eq!(entry(), 5);
        // a second run in the same image must not resume again
        assert_eq!(entry(), FATAL_EXIT_CODE as isize);
        drop(entry);
        drop(point);

        assert_eq!(seen, Some(ResumptionTag::AsChild));
    }

    #[test]
    fn test_child_entry_prepare_failure_skips_continuation() {
        let mut resumed = false;
        let mut point = ResumptionPoint::establish(|_| {
            resumed = true;
            0
        });

        let mut entry = point.child_entry(|| {
            Err(NsenterError::Config {
                message: "boom".to_string(),
            })
        });
        assert_eq!(entry(), FATAL_EXIT_CODE as isize);
        drop(entry);

        assert_eq!(point.consumed(), None);
        drop(point);
        assert!(!resumed);
    }
}
