/*!
 * Lock Directories
 *
 * Per-thread bookkeeping of which locks the owning thread holds and how deep.
 * One contract, two backing strategies:
 * - `BoundedTable`: fixed array with linear scan, never allocates
 * - `PooledDirectory`: hashed chains over a preallocated node pool, grows past
 *   the pool with dynamically allocated nodes
 *
 * Directories are plain single-owner values. Thread confinement comes from
 * the scope that stores them, not from internal locking.
 */

mod bounded;
mod pooled;

pub use bounded::BoundedTable;
pub use pooled::{DirectoryStats, NodeOrigin, PooledDirectory};

use crate::core::{DirectoryFull, LockId, LockRecord, RecursionCount};

/// Contract shared by every lock directory
///
/// Each identity appears at most once and every stored record has a
/// recursion count of at least one.
pub trait LockDirectory {
    /// Maximum number of distinct records, `None` when unbounded
    fn capacity(&self) -> Option<usize>;

    /// Number of distinct locks recorded
    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if one more distinct lock can be recorded
    #[inline]
    fn has_room(&self) -> bool {
        self.capacity().map_or(true, |cap| self.len() < cap)
    }

    fn lookup(&self, id: LockId) -> Option<&LockRecord>;

    #[inline]
    fn contains(&self, id: LockId) -> bool {
        self.lookup(id).is_some()
    }

    /// Record `id` with a recursion count of one
    ///
    /// `id` must not already be present.
    fn insert(&mut self, id: LockId) -> Result<(), DirectoryFull>;

    /// Bump the recursion count, returning the new count
    fn increment(&mut self, id: LockId) -> Option<RecursionCount>;

    /// Drop one level of recursion, removing the record when it reaches zero
    ///
    /// Returns the remaining count (`Some(0)` when the record was removed),
    /// or `None` if `id` was not recorded.
    fn decrement_or_remove(&mut self, id: LockId) -> Option<RecursionCount>;

    /// Remove the record regardless of its count
    fn remove(&mut self, id: LockId) -> Option<LockRecord>;

    /// Forget every record
    fn clear(&mut self);

    /// Copy of all records, in unspecified order
    fn records(&self) -> Vec<LockRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercise the shared contract against any directory
    fn check_contract<D: LockDirectory>(dir: &mut D) {
        let a = LockId::from_raw(0x100);
        let b = LockId::from_raw(0x200);

        assert!(dir.is_empty());
        assert!(dir.lookup(a).is_none());
        assert_eq!(dir.increment(a), None);
        assert_eq!(dir.decrement_or_remove(a), None);

        dir.insert(a).unwrap();
        dir.insert(b).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.increment(a), Some(2));
        assert_eq!(dir.increment(a), Some(3));

        assert_eq!(dir.decrement_or_remove(a), Some(2));
        assert_eq!(dir.lookup(b).map(|r| r.recursion_count), Some(1));

        let removed = dir.remove(a).unwrap();
        assert_eq!(removed.recursion_count, 2);
        assert!(!dir.contains(a));

        assert_eq!(dir.decrement_or_remove(b), Some(0));
        assert!(dir.is_empty());

        dir.insert(a).unwrap();
        dir.clear();
        assert!(dir.is_empty());
        assert!(dir.records().is_empty());
    }

    #[test]
    fn test_bounded_contract() {
        check_contract(&mut BoundedTable::<4>::new());
    }

    #[test]
    fn test_pooled_contract() {
        check_contract(&mut PooledDirectory::new());
    }

    #[test]
    fn test_pooled_contract_without_pool() {
        check_contract(&mut PooledDirectory::with_capacity(0, 1));
    }
}
