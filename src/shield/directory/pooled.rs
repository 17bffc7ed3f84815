/*!
 * Pooled Lock Directory
 *
 * Hash-indexed records with collision chaining. Nodes come from a pool
 * preallocated at construction and recycled through an intrusive free list,
 * so steady-state insert/remove never touches the allocator. When the pool
 * runs dry, nodes are allocated on demand, tagged as dynamic, and freed
 * (not recycled) on removal.
 */

use super::LockDirectory;
use crate::core::limits::{DEFAULT_BUCKET_COUNT, DEFAULT_POOL_SIZE};
use crate::core::{DirectoryFull, LockId, LockRecord, RecursionCount};
use crate::shield::config::PoolConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::BuildHasher;

// Fixed seeds keep bucket placement reproducible across threads and runs
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

const VACANT: LockRecord = LockRecord {
    identity: LockId::from_raw(0),
    recursion_count: 0,
};

/// Where a directory node's storage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeOrigin {
    /// Preallocated; returns to the free list on removal
    Pool,
    /// Allocated past the pool; freed on removal
    Dynamic,
}

struct Node {
    record: LockRecord,
    next: Option<Box<Node>>,
    origin: NodeOrigin,
}

impl Node {
    fn boxed(origin: NodeOrigin) -> Box<Self> {
        Box::new(Self {
            record: VACANT,
            next: None,
            origin,
        })
    }
}

/// Snapshot of a pooled directory's node usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryStats {
    /// Records currently stored
    pub live: usize,
    /// Live records backed by pool nodes
    pub pooled_in_use: usize,
    /// Live records backed by dynamic nodes
    pub dynamic_in_use: usize,
    /// Pool nodes waiting on the free list
    pub free_nodes: usize,
    /// Nodes preallocated at construction
    pub pool_size: usize,
    /// Dynamic nodes allocated over the directory's lifetime
    pub dynamic_allocations: u64,
    /// Dynamic nodes freed over the directory's lifetime
    pub dynamic_releases: u64,
}

/// Lock directory for threads that may hold many distinct locks at once
///
/// # Performance
///
/// - **Lookup**: one hash plus a walk of a (short) bucket chain
/// - **Insert**: pops the free list, O(1) and allocation-free while the pool lasts
/// - **Remove**: unlinks from the chain and pushes pool nodes back on the free list
/// - **Unbounded**: never reports [`DirectoryFull`]
pub struct PooledDirectory {
    buckets: Box<[Option<Box<Node>>]>,
    mask: usize,
    free: Option<Box<Node>>,
    free_len: usize,
    pool_size: usize,
    len: usize,
    dynamic_in_use: usize,
    dynamic_allocations: u64,
    dynamic_releases: u64,
    hasher: ahash::RandomState,
}

impl PooledDirectory {
    /// Directory with the default pool and bucket sizes
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_SIZE, DEFAULT_BUCKET_COUNT)
    }

    pub fn with_config(config: &PoolConfig) -> Self {
        Self::with_capacity(config.pool_size, config.bucket_count)
    }

    /// Directory with `pool_size` preallocated nodes
    ///
    /// `bucket_count` is rounded up to a power of two (at least one).
    pub fn with_capacity(pool_size: usize, bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1).next_power_of_two();
        let buckets = std::iter::repeat_with(|| None)
            .take(bucket_count)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let mut free = None;
        for _ in 0..pool_size {
            let mut node = Node::boxed(NodeOrigin::Pool);
            node.next = free.take();
            free = Some(node);
        }

        Self {
            buckets,
            mask: bucket_count - 1,
            free,
            free_len: pool_size,
            pool_size,
            len: 0,
            dynamic_in_use: 0,
            dynamic_allocations: 0,
            dynamic_releases: 0,
            hasher: ahash::RandomState::with_seeds(
                HASH_SEEDS[0],
                HASH_SEEDS[1],
                HASH_SEEDS[2],
                HASH_SEEDS[3],
            ),
        }
    }

    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            live: self.len,
            pooled_in_use: self.len - self.dynamic_in_use,
            dynamic_in_use: self.dynamic_in_use,
            free_nodes: self.free_len,
            pool_size: self.pool_size,
            dynamic_allocations: self.dynamic_allocations,
            dynamic_releases: self.dynamic_releases,
        }
    }

    /// Storage origin of the node holding `id`
    pub fn node_origin(&self, id: LockId) -> Option<NodeOrigin> {
        self.find(id).map(|node| node.origin)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline(always)]
    fn bucket_of(&self, id: LockId) -> usize {
        (BuildHasher::hash_one(&self.hasher, id) as usize) & self.mask
    }

    fn find(&self, id: LockId) -> Option<&Node> {
        let mut cur = self.buckets[self.bucket_of(id)].as_deref();
        while let Some(node) = cur {
            if node.record.identity == id {
                return Some(node);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn find_mut(&mut self, id: LockId) -> Option<&mut Node> {
        let idx = self.bucket_of(id);
        let mut cur = self.buckets[idx].as_deref_mut();
        while let Some(node) = cur {
            if node.record.identity == id {
                return Some(node);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    fn take_node(&mut self) -> Box<Node> {
        match self.free.take() {
            Some(mut node) => {
                self.free = node.next.take();
                self.free_len -= 1;
                node
            }
            None => {
                self.dynamic_in_use += 1;
                self.dynamic_allocations += 1;
                tracing::trace!(
                    pool_size = self.pool_size,
                    live = self.len,
                    "lock directory pool exhausted, allocating dynamic node"
                );
                Node::boxed(NodeOrigin::Dynamic)
            }
        }
    }

    fn recycle(&mut self, mut node: Box<Node>) {
        match node.origin {
            NodeOrigin::Pool => {
                node.record = VACANT;
                node.next = self.free.take();
                self.free = Some(node);
                self.free_len += 1;
            }
            NodeOrigin::Dynamic => {
                self.dynamic_in_use -= 1;
                self.dynamic_releases += 1;
            }
        }
    }

    fn unlink(&mut self, id: LockId) -> Option<Box<Node>> {
        let idx = self.bucket_of(id);
        let mut link = &mut self.buckets[idx];
        while link.as_ref().is_some_and(|node| node.record.identity != id) {
            link = &mut link.as_mut()?.next;
        }
        let mut node = link.take()?;
        *link = node.next.take();
        self.len -= 1;
        Some(node)
    }
}

impl Default for PooledDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PooledDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledDirectory")
            .field("buckets", &self.buckets.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl LockDirectory for PooledDirectory {
    #[inline]
    fn capacity(&self) -> Option<usize> {
        None
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn lookup(&self, id: LockId) -> Option<&LockRecord> {
        self.find(id).map(|node| &node.record)
    }

    fn insert(&mut self, id: LockId) -> Result<(), DirectoryFull> {
        debug_assert!(self.find(id).is_none(), "{id} recorded twice");
        let mut node = self.take_node();
        node.record = LockRecord::first(id);

        let idx = self.bucket_of(id);
        node.next = self.buckets[idx].take();
        self.buckets[idx] = Some(node);
        self.len += 1;
        Ok(())
    }

    #[inline]
    fn increment(&mut self, id: LockId) -> Option<RecursionCount> {
        let node = self.find_mut(id)?;
        node.record.recursion_count += 1;
        Some(node.record.recursion_count)
    }

    fn decrement_or_remove(&mut self, id: LockId) -> Option<RecursionCount> {
        let node = self.find_mut(id)?;
        if node.record.recursion_count > 1 {
            node.record.recursion_count -= 1;
            return Some(node.record.recursion_count);
        }
        self.remove(id);
        Some(0)
    }

    fn remove(&mut self, id: LockId) -> Option<LockRecord> {
        let node = self.unlink(id)?;
        let record = node.record;
        self.recycle(node);
        Some(record)
    }

    fn clear(&mut self) {
        for idx in 0..self.buckets.len() {
            let mut cur = self.buckets[idx].take();
            while let Some(mut node) = cur {
                cur = node.next.take();
                self.recycle(node);
            }
        }
        self.len = 0;
    }

    fn records(&self) -> Vec<LockRecord> {
        let mut out = Vec::with_capacity(self.len);
        for bucket in self.buckets.iter() {
            let mut cur = bucket.as_deref();
            while let Some(node) = cur {
                out.push(node.record);
                cur = node.next.as_deref();
            }
        }
        out
    }
}

impl Drop for PooledDirectory {
    fn drop(&mut self) {
        // Unlink iteratively so long chains don't recurse through Box drops
        for bucket in self.buckets.iter_mut() {
            let mut cur = bucket.take();
            while let Some(mut node) = cur {
                cur = node.next.take();
            }
        }
        let mut cur = self.free.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
    }
}
