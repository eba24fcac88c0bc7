//! In-flight DMA mapping bookkeeping for one channel.
//!
//! Every segment referenced by a ring slot is registered here first. The
//! entry either gets released by the completion reclaimer (unmapping the
//! segment and, for the final fragment, surrendering the owning frame) or is
//! unwound when a transmit attempt aborts part-way through mapping.

use alloc::sync::Arc;
use alloc::vec::Vec;

use memory_addr::PhysAddr;
use spin::Mutex;

use crate::DmaMapper;
use crate::types::TxFrame;

/// Opaque ticket for one registered DMA mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle(pub(crate) usize);

struct Entry {
    addr: PhysAddr,
    len: usize,
    owner: Arc<TxFrame>,
    frag_index: usize,
    last_frag: bool,
}

struct TrackerInner {
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
}

/// DMA mapping ledger, pre-sized to the ring capacity so registration never
/// fails while the ring still admits descriptors.
pub struct DmaBufferTracker {
    inner: Mutex<TrackerInner>,
}

impl DmaBufferTracker {
    /// Pre-size the ledger for a ring of `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        let free = (0..capacity).rev().collect();
        Self {
            inner: Mutex::new(TrackerInner { entries, free }),
        }
    }

    /// Record a mapping about to be referenced by a ring slot.
    ///
    /// `frag_index` 0 is the linear part; `last_frag` marks the final segment
    /// of the owning frame.
    pub fn register(
        &self,
        addr: PhysAddr,
        len: usize,
        owner: Arc<TxFrame>,
        frag_index: usize,
        last_frag: bool,
    ) -> SlotHandle {
        let mut inner = self.inner.lock();
        let entry = Entry {
            addr,
            len,
            owner,
            frag_index,
            last_frag,
        };
        let idx = match inner.free.pop() {
            Some(idx) => {
                debug_assert!(inner.entries[idx].is_none());
                inner.entries[idx] = Some(entry);
                idx
            }
            // The ring admits at most `capacity` in-flight slots, so the
            // free list cannot run dry; grow rather than fail if it ever
            // does.
            None => {
                inner.entries.push(Some(entry));
                inner.entries.len() - 1
            }
        };
        SlotHandle(idx)
    }

    /// Unwind mappings registered during an aborted transmit attempt, in
    /// reverse registration order.
    ///
    /// An empty list is a no-op, and so is a handle that was already
    /// released: re-unwinding never double-unmaps.
    pub fn unwind<D: DmaMapper>(&self, handles: &[SlotHandle], dma: &D) {
        let mut inner = self.inner.lock();
        for handle in handles.iter().rev() {
            if let Some(entry) = inner.entries[handle.0].take() {
                dma.unmap(entry.addr, entry.len);
                inner.free.push(handle.0);
            }
        }
    }

    /// Release one completed slot: unmap the segment and, if it was the final
    /// fragment of its frame, return ownership of the frame so the caller can
    /// recycle it.
    pub fn release_on_completion<D: DmaMapper>(
        &self,
        handle: SlotHandle,
        dma: &D,
    ) -> Option<Arc<TxFrame>> {
        let mut inner = self.inner.lock();
        let entry = inner.entries[handle.0].take()?;
        dma.unmap(entry.addr, entry.len);
        inner.free.push(handle.0);
        trace!(
            "released slot {} (frag {} of frame, last={})",
            handle.0, entry.frag_index, entry.last_frag
        );
        if entry.last_frag { Some(entry.owner) } else { None }
    }

    /// Mappings currently registered and not yet released.
    pub fn in_flight(&self) -> usize {
        let inner = self.inner.lock();
        inner.entries.iter().filter(|e| e.is_some()).count()
    }
}
