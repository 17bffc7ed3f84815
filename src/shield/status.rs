/*!
 * Shield Status Model
 *
 * Outcomes of shielded acquire/release calls. Misuse is reported here as an
 * ordinary value; nothing in the shield logs, panics or aborts on it.
 */

use crate::core::{LockId, ShieldError, ShieldResult};
use serde::{Deserialize, Serialize};

/// Acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reentrancy {
    /// Nested acquires by the owning thread are elided and counted
    Reentrant,
    /// The caller asserts it does not hold the lock yet
    Strict,
}

impl Reentrancy {
    #[inline(always)]
    pub const fn is_reentrant(self) -> bool {
        matches!(self, Self::Reentrant)
    }
}

impl From<bool> for Reentrancy {
    #[inline]
    fn from(reentrant: bool) -> Self {
        if reentrant {
            Self::Reentrant
        } else {
            Self::Strict
        }
    }
}

/// Outcome of a shielded acquire
#[must_use = "an unbalanced or rejected acquire leaves the lock unheld"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquireStatus {
    /// The real primitive was called; the thread now holds the lock once
    AcquireNow,
    /// Already held by this thread; recursion count incremented, primitive skipped
    SkipAcquisition,
    /// Strict acquire of a lock this thread already holds; primitive skipped
    UnbalancedLock,
    /// Lock not held and the directory has no room to track it; primitive skipped
    CapacityExceeded,
}

impl AcquireStatus {
    /// True if the real lock operation ran
    #[inline]
    pub const fn forwarded(self) -> bool {
        matches!(self, Self::AcquireNow)
    }

    /// True if the call was satisfied by existing ownership
    #[inline]
    pub const fn elided(self) -> bool {
        matches!(self, Self::SkipAcquisition)
    }

    /// True if the thread holds the lock after this call
    #[inline]
    pub const fn is_held(self) -> bool {
        matches!(self, Self::AcquireNow | Self::SkipAcquisition)
    }

    #[inline]
    pub const fn is_unbalanced(self) -> bool {
        matches!(self, Self::UnbalancedLock)
    }

    /// Convert misuse and overflow into errors
    ///
    /// `capacity` is only used to describe `CapacityExceeded`.
    pub fn into_result(self, lock: LockId, capacity: usize) -> ShieldResult<Self> {
        match self {
            Self::AcquireNow | Self::SkipAcquisition => Ok(self),
            Self::UnbalancedLock => Err(ShieldError::UnbalancedLock(lock)),
            Self::CapacityExceeded => Err(ShieldError::CapacityExceeded { lock, capacity }),
        }
    }
}

/// Outcome of a shielded release
#[must_use = "an unbalanced release means the caller's bookkeeping is wrong"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseStatus {
    /// The real primitive was called; the thread no longer holds the lock
    ReleaseNow,
    /// Recursion count decremented; the lock is still held
    SkipRelease,
    /// No matching acquire on this thread; primitive skipped
    UnbalancedUnlock,
}

impl ReleaseStatus {
    #[inline]
    pub const fn forwarded(self) -> bool {
        matches!(self, Self::ReleaseNow)
    }

    #[inline]
    pub const fn elided(self) -> bool {
        matches!(self, Self::SkipRelease)
    }

    #[inline]
    pub const fn is_unbalanced(self) -> bool {
        matches!(self, Self::UnbalancedUnlock)
    }

    pub fn into_result(self, lock: LockId) -> ShieldResult<Self> {
        match self {
            Self::ReleaseNow | Self::SkipRelease => Ok(self),
            Self::UnbalancedUnlock => Err(ShieldError::UnbalancedUnlock(lock)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentrancy_from_bool() {
        assert_eq!(Reentrancy::from(true), Reentrancy::Reentrant);
        assert_eq!(Reentrancy::from(false), Reentrancy::Strict);
        assert!(Reentrancy::Reentrant.is_reentrant());
    }

    #[test]
    fn test_acquire_predicates() {
        assert!(AcquireStatus::AcquireNow.forwarded());
        assert!(AcquireStatus::SkipAcquisition.elided());
        assert!(AcquireStatus::SkipAcquisition.is_held());
        assert!(!AcquireStatus::CapacityExceeded.is_held());
        assert!(AcquireStatus::UnbalancedLock.is_unbalanced());
    }

    #[test]
    fn test_into_result() {
        let id = LockId::from_raw(1);
        assert!(AcquireStatus::AcquireNow.into_result(id, 4).is_ok());
        assert_eq!(
            AcquireStatus::CapacityExceeded.into_result(id, 4),
            Err(ShieldError::CapacityExceeded { lock: id, capacity: 4 })
        );
        assert_eq!(
            ReleaseStatus::UnbalancedUnlock.into_result(id),
            Err(ShieldError::UnbalancedUnlock(id))
        );
        assert!(ReleaseStatus::SkipRelease.into_result(id).is_ok());
    }
}
