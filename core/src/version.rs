//! Row versions for optimistic concurrency on listings.
//!
//! Every committed mutation of a listing bumps its version by one. A store accepts a
//! mutation only if the listing is still at the version the mutation was decided
//! against, which turns "read, validate, write" into a compare-and-swap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::TryFromIntError;

/// Version of a listing row.
///
/// # Examples
///
/// Two writers decide against the same snapshot; only the first one commits.
///
/// ```
/// use surplus_core::version::Version;
///
/// let snapshot = Version::INITIAL;
/// let mut stored = snapshot;
///
/// // First writer: the row is where it read it, so the swap goes through.
/// assert_eq!(stored, snapshot);
/// stored = snapshot.next();
///
/// // Second writer: the row moved on, so it must reload and decide again.
/// assert_ne!(stored, snapshot);
/// assert_eq!(stored, Version::new(1));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created listing.
    pub const INITIAL: Self = Self(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The version a committed mutation leaves behind.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Versions are stored in a signed `BIGINT` column.
impl TryFrom<i64> for Version {
    type Error = TryFromIntError;

    fn try_from(column: i64) -> Result<Self, Self::Error> {
        u64::try_from(column).map(Self)
    }
}

impl TryFrom<Version> for i64 {
    type Error = TryFromIntError;

    fn try_from(version: Version) -> Result<Self, Self::Error> {
        Self::try_from(version.0)
    }
}
