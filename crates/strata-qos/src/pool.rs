//! # Queue Entry Pool
//!
//! Recycles the entries that wrap PDUs while they wait in a port's queues, so
//! the hot path does not allocate per packet once the pool is warm.
//!
//! One pool is shared by every port of a scheduler (and by every scheduler
//! built on the same `Arc<EntryPool>`), so the free list sits behind a single
//! mutex. An entry is owned by exactly one queue or by the free list at any
//! time; moving it between the two is a move, never a copy.
//!
//! The pool is unbounded unless a capacity is set. With a capacity, fresh
//! allocation fails once `capacity` entries are in use, and the caller drops
//! the PDU.

use std::sync::Mutex;

use crate::error::PoolError;
use crate::util::lock_or_recover;

/// Most entries a configuration may ask to pre-allocate (`init_buffer`,
/// `add_buffer`, `[pool] prealloc`), cumulatively.
pub const MAX_PREALLOC: usize = 1 << 16;

// ─── QueueEntry ──────────────────────────────────────────────────────────────

/// One PDU plus its precomputed queuing cost.
#[derive(Debug)]
pub struct QueueEntry<P> {
    pdu: Option<P>,
    cost: u64,
}

impl<P> QueueEntry<P> {
    fn empty() -> Self {
        QueueEntry { pdu: None, cost: 0 }
    }

    /// Wrap a PDU. Any PDU already held is destroyed.
    pub fn load(&mut self, pdu: P, cost: u64) {
        self.pdu = Some(pdu);
        self.cost = cost;
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn pdu(&self) -> Option<&P> {
        self.pdu.as_ref()
    }

    pub fn pdu_mut(&mut self) -> Option<&mut P> {
        self.pdu.as_mut()
    }

    /// Unwrap the PDU, leaving the entry cleared.
    pub fn take(&mut self) -> Option<P> {
        self.cost = 0;
        self.pdu.take()
    }

    pub fn is_empty(&self) -> bool {
        self.pdu.is_none()
    }
}

// ─── EntryPool ───────────────────────────────────────────────────────────────

struct PoolInner<P> {
    free: Vec<QueueEntry<P>>,
    outstanding: usize,
    capacity: Option<usize>,
}

impl<P> PoolInner<P> {
    fn at_capacity(&self) -> bool {
        self.capacity
            .is_some_and(|cap| self.outstanding + self.free.len() >= cap)
    }
}

/// Shared free list of [`QueueEntry`] values.
pub struct EntryPool<P> {
    inner: Mutex<PoolInner<P>>,
}

impl<P> EntryPool<P> {
    /// An unbounded, empty pool.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// A pool that never holds more than `capacity` entries (free + in use).
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        EntryPool {
            inner: Mutex::new(PoolInner {
                free: Vec::with_capacity(capacity.unwrap_or(0).min(4096)),
                outstanding: 0,
                capacity,
            }),
        }
    }

    /// Hand out a cleared entry, recycled if one is free.
    pub fn acquire(&self) -> Result<QueueEntry<P>, PoolError> {
        let mut inner = lock_or_recover(&self.inner);
        let entry = match inner.free.pop() {
            Some(entry) => entry,
            None => {
                if let Some(capacity) = inner.capacity {
                    if inner.outstanding >= capacity {
                        return Err(PoolError::Exhausted {
                            outstanding: inner.outstanding,
                            capacity,
                        });
                    }
                }
                QueueEntry::empty()
            }
        };
        inner.outstanding += 1;
        Ok(entry)
    }

    /// Return an entry. A PDU still inside is destroyed.
    pub fn release(&self, mut entry: QueueEntry<P>) {
        drop(entry.take());
        let mut inner = lock_or_recover(&self.inner);
        inner.outstanding = inner.outstanding.saturating_sub(1);
        // Capacity may have been lowered while the entry was out.
        if !inner.at_capacity() {
            inner.free.push(entry);
        }
    }

    /// Pre-allocate up to `count` free entries. Returns how many were added.
    pub fn prefill(&self, count: usize) -> usize {
        let mut inner = lock_or_recover(&self.inner);
        let mut added = 0;
        while added < count && !inner.at_capacity() {
            inner.free.push(QueueEntry::empty());
            added += 1;
        }
        added
    }

    /// Change the bound. Surplus free entries are released immediately;
    /// entries in use are trimmed as they come back.
    pub fn set_capacity(&self, capacity: Option<usize>) {
        let mut inner = lock_or_recover(&self.inner);
        inner.capacity = capacity;
        if let Some(cap) = capacity {
            let keep = cap.saturating_sub(inner.outstanding);
            inner.free.truncate(keep);
        }
    }

    /// Drop every free entry. Returns how many were released.
    pub fn clear(&self) -> usize {
        let mut inner = lock_or_recover(&self.inner);
        let n = inner.free.len();
        inner.free.clear();
        inner.free.shrink_to_fit();
        n
    }

    pub fn capacity(&self) -> Option<usize> {
        lock_or_recover(&self.inner).capacity
    }

    /// Entries sitting in the free list.
    pub fn free_len(&self) -> usize {
        lock_or_recover(&self.inner).free.len()
    }

    /// Entries currently held by queues.
    pub fn outstanding(&self) -> usize {
        lock_or_recover(&self.inner).outstanding
    }
}

impl<P> Default for EntryPool<P> {
    fn default() -> Self {
        Self::new()
    }
}
