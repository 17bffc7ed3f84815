/*!
 * Bounded Lock Table
 * Fixed-capacity array of records scanned linearly
 */

use super::LockDirectory;
use crate::core::limits::DEFAULT_TABLE_CAPACITY;
use crate::core::{DirectoryFull, LockId, LockRecord, RecursionCount};

const VACANT: LockRecord = LockRecord {
    identity: LockId::from_raw(0),
    recursion_count: 0,
};

/// Lock table for threads holding only a few distinct locks at once
///
/// # Performance
///
/// - **Lookup**: O(N) scan over at most `N` occupied slots
/// - **Insert**: appends at the next free slot
/// - **Remove**: swaps the last occupied slot into the hole, O(1)
/// - **No allocation**: storage is inline, so the table can live in a
///   `const`-initialized thread local
///
/// Once `N` distinct locks are recorded, `insert` fails with
/// [`DirectoryFull`] instead of silently dropping the record.
#[derive(Debug, Clone)]
pub struct BoundedTable<const N: usize = { DEFAULT_TABLE_CAPACITY }> {
    slots: [LockRecord; N],
    len: usize,
}

impl<const N: usize> BoundedTable<N> {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [VACANT; N],
            len: 0,
        }
    }

    #[inline(always)]
    fn occupied(&self) -> &[LockRecord] {
        &self.slots[..self.len]
    }

    #[inline(always)]
    fn position(&self, id: LockId) -> Option<usize> {
        self.occupied().iter().position(|r| r.identity == id)
    }
}

impl<const N: usize> Default for BoundedTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LockDirectory for BoundedTable<N> {
    #[inline]
    fn capacity(&self) -> Option<usize> {
        Some(N)
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn lookup(&self, id: LockId) -> Option<&LockRecord> {
        self.occupied().iter().find(|r| r.identity == id)
    }

    fn insert(&mut self, id: LockId) -> Result<(), DirectoryFull> {
        debug_assert!(self.position(id).is_none(), "{id} recorded twice");
        if self.len == N {
            return Err(DirectoryFull { capacity: N });
        }
        self.slots[self.len] = LockRecord::first(id);
        self.len += 1;
        Ok(())
    }

    #[inline]
    fn increment(&mut self, id: LockId) -> Option<RecursionCount> {
        let idx = self.position(id)?;
        let record = &mut self.slots[idx];
        record.recursion_count += 1;
        Some(record.recursion_count)
    }

    fn decrement_or_remove(&mut self, id: LockId) -> Option<RecursionCount> {
        let idx = self.position(id)?;
        let record = &mut self.slots[idx];
        if record.recursion_count > 1 {
            record.recursion_count -= 1;
            return Some(record.recursion_count);
        }
        self.remove(id);
        Some(0)
    }

    fn remove(&mut self, id: LockId) -> Option<LockRecord> {
        let idx = self.position(id)?;
        let record = self.slots[idx];
        self.len -= 1;
        self.slots.swap(idx, self.len);
        self.slots[self.len] = VACANT;
        Some(record)
    }

    fn clear(&mut self) {
        self.slots = [VACANT; N];
        self.len = 0;
    }

    fn records(&self) -> Vec<LockRecord> {
        self.occupied().to_vec()
    }
}
