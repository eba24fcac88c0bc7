//! Fixed-capacity HIF TX descriptor ring.
//!
//! Producers stage a whole frame's descriptors and commit them with one
//! [`TxRing::reserve_and_push`] under the ring lock; the completion reclaimer
//! drains finished slots from the other end with [`TxRing::reclaim`]. The
//! `used` count is atomic so [`TxRing::free_slots`] never blocks and is safe
//! to call concurrently with reclamation.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::types::{DescFlags, TxDescriptor};
use crate::{TxError, TxResult};

struct RingInner {
    /// Slot images, `None` once reclaimed.
    slots: Vec<Option<TxDescriptor>>,
    /// Producer write cursor.
    wr: usize,
    /// Reclaimer read cursor.
    rd: usize,
}

/// One channel's TX descriptor ring.
///
/// The inner mutex is the channel's transmit lock: holding it for the whole
/// reserve-and-push step is what gives cross-frame FIFO ordering on a shared
/// channel.
pub struct TxRing {
    capacity: usize,
    used: AtomicUsize,
    inner: Mutex<RingInner>,
}

impl TxRing {
    /// Allocate a ring with `capacity` descriptor slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            capacity,
            used: AtomicUsize::new(0),
            inner: Mutex::new(RingInner { slots, wr: 0, rd: 0 }),
        }
    }

    /// Total descriptor capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently occupied and not yet reclaimed.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Free slot count. Lock-free; safe concurrent with reclamation.
    pub fn free_slots(&self) -> usize {
        self.capacity - self.used()
    }

    /// Commit a frame's descriptor batch to the ring.
    ///
    /// All-or-nothing: if fewer than `descs.len()` slots are free the ring is
    /// left untouched and `RingFull` is returned. `RingFull` is backpressure,
    /// not a fault. The final descriptor of the batch must carry
    /// [`DescFlags::LAST`] so hardware sees the packet boundary.
    pub fn reserve_and_push(&self, descs: &[TxDescriptor]) -> TxResult {
        if descs.is_empty() {
            return Ok(());
        }
        debug_assert!(descs.last().is_some_and(|d| d.flags.contains(DescFlags::LAST)));

        let mut inner = self.inner.lock();
        // `used` only shrinks concurrently (reclaimer side), so this check
        // cannot admit a batch that does not fit.
        if self.free_slots() < descs.len() {
            return Err(TxError::RingFull);
        }
        for desc in descs {
            let slot = inner.wr;
            debug_assert!(inner.slots[slot].is_none());
            inner.slots[slot] = Some(*desc);
            inner.wr = (slot + 1) % self.capacity;
        }
        let prev = self.used.fetch_add(descs.len(), Ordering::Release);
        debug_assert!(prev + descs.len() <= self.capacity);
        Ok(())
    }

    /// Drain up to `n` completed slots, oldest first, returning their
    /// descriptor images so the caller can unmap and release them.
    ///
    /// Completion path only: never called concurrently with itself (single
    /// reclaimer per ring), but safe concurrently with `reserve_and_push`.
    pub fn reclaim(&self, n: usize) -> Vec<TxDescriptor> {
        let mut inner = self.inner.lock();
        let n = n.min(self.used());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let slot = inner.rd;
            let desc = inner.slots[slot].take();
            debug_assert!(desc.is_some());
            if let Some(d) = desc {
                out.push(d);
            }
            inner.rd = (slot + 1) % self.capacity;
        }
        self.used.fetch_sub(out.len(), Ordering::Release);
        out
    }

    /// Reset cursors and drop all slot images. Channel start/stop only.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        for slot in inner.slots.iter_mut() {
            *slot = None;
        }
        inner.wr = 0;
        inner.rd = 0;
        self.used.store(0, Ordering::Release);
    }
}
