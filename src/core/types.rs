/*!
 * Core Types
 * Identity and bookkeeping types shared by every lock directory
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recursion depth of a held lock
pub type RecursionCount = u32;

/// Opaque, process-unique identity of one lock instance
///
/// The identity is only compared for equality and hashed; it is never
/// dereferenced. [`LockId::of`] derives it from the address of the real lock
/// object, which is stable for as long as the lock is borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LockId(usize);

impl LockId {
    /// Identity of a lock object, taken from its address
    #[inline(always)]
    #[must_use]
    pub fn of<L: ?Sized>(lock: &L) -> Self {
        Self(lock as *const L as *const () as usize)
    }

    /// Identity from a caller-chosen handle value
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock@{:#x}", self.0)
    }
}

/// One lock held by the owning thread
///
/// A record exists only while `recursion_count >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockRecord {
    pub identity: LockId,
    pub recursion_count: RecursionCount,
}

impl LockRecord {
    /// Record for a lock just acquired through the real primitive
    #[inline]
    #[must_use]
    pub const fn first(identity: LockId) -> Self {
        Self {
            identity,
            recursion_count: 1,
        }
    }
}
