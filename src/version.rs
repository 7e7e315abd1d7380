/// Monotonic version numbers for node updates.
///
/// Each successful write to a node advances its version by exactly one.
/// Versions are comparable and subtractable so that a node's history can
/// answer "how many updates behind is this subscriber" without reference
/// to wall-clock time.
use std::fmt;
use std::ops::Sub;

/// The version a freshly created node starts at, before any update has
/// been applied.
pub const FIRST_VERSION: Version = Version(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    pub fn new(n: u64) -> Self {
        Version(n)
    }

    /// The version following this one.
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }

    /// Number of updates between `self` and an earlier version `other`.
    /// Panics if `other` is later than `self`; callers only ever subtract
    /// a version known to be an ancestor.
    pub fn updates_since(self, other: Version) -> u64 {
        self.0 - other.0
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// `v - k`: the version `k` updates before `v`, saturating at the first
/// version. Used to refer to "k versions ago" without reference to any
/// particular node's history.
impl Sub<u64> for Version {
    type Output = Version;

    fn sub(self, k: u64) -> Version {
        Version(self.0.saturating_sub(k))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
