//! Namespace-creation flags carried by the clone-flags message

use std::fmt;

use nix::sched::CloneFlags;

use crate::kind::NamespaceKind;

/// Namespace-creation flags for the cloned child
///
/// Bit values are the kernel's `CLONE_NEW*` constants so the wire value is
/// the plain `i32` the host wrote. Bits this type has no name for are kept
/// as-is and handed to the kernel unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NamespaceFlags(i32);

impl NamespaceFlags {
    /// Mount namespace flag (`CLONE_NEWNS`)
    pub const MNT: Self = Self(libc::CLONE_NEWNS);
    /// Cgroup namespace flag
    pub const CGROUP: Self = Self(libc::CLONE_NEWCGROUP);
    /// UTS namespace flag
    pub const UTS: Self = Self(libc::CLONE_NEWUTS);
    /// IPC namespace flag
    pub const IPC: Self = Self(libc::CLONE_NEWIPC);
    /// User namespace flag
    pub const USER: Self = Self(libc::CLONE_NEWUSER);
    /// PID namespace flag
    pub const PID: Self = Self(libc::CLONE_NEWPID);
    /// Network namespace flag
    pub const NET: Self = Self(libc::CLONE_NEWNET);

    /// All named namespaces
    pub const ALL: Self = Self(
        Self::MNT.0 | Self::CGROUP.0 | Self::UTS.0 | Self::IPC.0 | Self::USER.0 | Self::PID.0 | Self::NET.0,
    );
    /// No namespaces
    pub const NONE: Self = Self(0);

    /// Create from the raw wire value
    #[must_use]
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// Get raw value, as written on the wire
    #[must_use]
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Check if every flag in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if no flag is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits outside the named namespace flags
    #[must_use]
    pub const fn unknown_bits(self) -> i32 {
        self.0 & !Self::ALL.0
    }

    /// Namespace kinds requested by this set, in kernel bit order
    #[must_use]
    pub fn kinds(self) -> Vec<NamespaceKind> {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| self.contains(kind.clone_flag()))
            .collect()
    }

    /// Convert to `nix` clone flags for clone(2)
    #[must_use]
    pub const fn to_clone_flags(self) -> CloneFlags {
        CloneFlags::from_bits_retain(self.0)
    }
}

impl From<NamespaceKind> for NamespaceFlags {
    fn from(kind: NamespaceKind) -> Self {
        kind.clone_flag()
    }
}

impl FromIterator<NamespaceKind> for NamespaceFlags {
    fn from_iter<T: IntoIterator<Item = NamespaceKind>>(iter: T) -> Self {
        iter.into_iter().fold(Self::NONE, |acc, kind| acc | kind.clone_flag())
    }
}

impl std::ops::BitOr for NamespaceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for NamespaceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for NamespaceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for NamespaceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }

        let mut names: Vec<String> = self
            .kinds()
            .into_iter()
            .map(|kind| kind.proc_name().to_string())
            .collect();
        if self.unknown_bits() != 0 {
            names.push(format!("{:#x}", self.unknown_bits()));
        }

        f.write_str(&names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_flags() {
        let flags = NamespaceFlags::PID | NamespaceFlags::NET;

        assert!(flags.contains(NamespaceFlags::PID));
        assert!(flags.contains(NamespaceFlags::NET));
        assert!(!flags.contains(NamespaceFlags::MNT));
        assert_eq!((flags & NamespaceFlags::PID), NamespaceFlags::PID);
    }

    #[test]
    fn test_wire_values_match_kernel() {
        assert_eq!(NamespaceFlags::UTS.bits(), 0x0400_0000);
        assert_eq!(NamespaceFlags::PID.bits(), 0x2000_0000);
        assert_eq!(NamespaceFlags::MNT.bits(), 0x0002_0000);
        assert_eq!(
            NamespaceFlags::from_bits(0x0400_0000).to_clone_flags(),
            CloneFlags::CLONE_NEWUTS
        );
    }

    #[test]
    fn test_clone_flags_conversion() {
        let flags = NamespaceFlags::IPC | NamespaceFlags::UTS;
        let clone_flags = flags.to_clone_flags();

        assert!(clone_flags.contains(CloneFlags::CLONE_NEWIPC));
        assert!(clone_flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(!clone_flags.contains(CloneFlags::CLONE_NEWPID));
    }

    #[test]
    fn test_unknown_bits_are_preserved() {
        let flags = NamespaceFlags::from_bits(NamespaceFlags::UTS.bits() | 0x1);

        assert_eq!(flags.unknown_bits(), 0x1);
        assert_eq!(flags.to_clone_flags().bits(), flags.bits());
        assert_eq!(flags.to_string(), "uts|0x1");
    }

    #[test]
    fn test_kinds_and_collect() {
        let flags: NamespaceFlags = [NamespaceKind::Net, NamespaceKind::Uts].into_iter().collect();

        assert_eq!(flags, NamespaceFlags::NET | NamespaceFlags::UTS);
        assert_eq!(flags.kinds(), vec![NamespaceKind::Uts, NamespaceKind::Net]);
        assert_eq!(NamespaceFlags::NONE.to_string(), "none");
    }
}
