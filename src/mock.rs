//! Test doubles for the platform collaborator traits.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use memory_addr::PhysAddr;
use spin::Mutex;

use crate::types::ShaperQueueId;
use crate::{DmaMapper, QueueControl, ShaperRegs, TxError, TxResult};

/// Scripted shaper: fixed configured depth, settable counter and fill level,
/// and query counters for asserting on hardware round-trips.
pub struct MockShaper {
    depth: u32,
    confirmed: Mutex<u32>,
    fill: Mutex<u8>,
    count_queries: AtomicUsize,
    fill_queries: AtomicUsize,
    window_queries: AtomicUsize,
}

impl MockShaper {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            confirmed: Mutex::new(0),
            fill: Mutex::new(0),
            count_queries: AtomicUsize::new(0),
            fill_queries: AtomicUsize::new(0),
            window_queries: AtomicUsize::new(0),
        }
    }

    pub fn set_confirmed(&self, count: u32) {
        *self.confirmed.lock() = count;
    }

    pub fn set_fill(&self, fill: u8) {
        *self.fill.lock() = fill;
    }

    pub fn count_queries(&self) -> usize {
        self.count_queries.load(Ordering::Relaxed)
    }

    pub fn fill_queries(&self) -> usize {
        self.fill_queries.load(Ordering::Relaxed)
    }

    pub fn window_queries(&self) -> usize {
        self.window_queries.load(Ordering::Relaxed)
    }
}

impl ShaperRegs for MockShaper {
    fn confirmed_count(&self, _queue: ShaperQueueId) -> u32 {
        self.count_queries.fetch_add(1, Ordering::Relaxed);
        *self.confirmed.lock()
    }

    fn fill_level(&self, _queue: ShaperQueueId) -> u8 {
        self.fill_queries.fetch_add(1, Ordering::Relaxed);
        *self.fill.lock()
    }

    fn configured_window(&self, _queue: ShaperQueueId) -> u32 {
        self.window_queries.fetch_add(1, Ordering::Relaxed);
        self.depth
    }
}

/// Recording DMA mapper with optional scripted failure.
pub struct MockDma {
    next: AtomicUsize,
    mapped: Mutex<Vec<usize>>,
    unmapped: Mutex<Vec<usize>>,
    /// Fail the n-th `map` call (zero-based), once set.
    fail_at: Mutex<Option<usize>>,
    /// One-shot callback fired at the start of the next `map` call, for
    /// injecting concurrent activity mid-transmit.
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl MockDma {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
            mapped: Mutex::new(Vec::new()),
            unmapped: Mutex::new(Vec::new()),
            fail_at: Mutex::new(None),
            hook: Mutex::new(None),
        }
    }

    /// Make the `n`-th map call (zero-based, counted from now) fail.
    pub fn fail_at(&self, n: usize) {
        *self.fail_at.lock() = Some(self.next.load(Ordering::Relaxed) + n);
    }

    /// Run `f` once, at the start of the next `map` call.
    pub fn on_next_map(&self, f: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some(Box::new(f));
    }

    pub fn maps(&self) -> usize {
        self.mapped.lock().len()
    }

    pub fn unmaps(&self) -> usize {
        self.unmapped.lock().len()
    }

    pub fn mapped_addrs(&self) -> Vec<usize> {
        self.mapped.lock().clone()
    }

    pub fn unmapped_addrs(&self) -> Vec<usize> {
        self.unmapped.lock().clone()
    }

    /// Mappings not yet unmapped.
    pub fn outstanding(&self) -> usize {
        self.maps() - self.unmaps()
    }
}

impl DmaMapper for MockDma {
    fn map(&self, buf: &[u8]) -> TxResult<PhysAddr> {
        if let Some(hook) = self.hook.lock().take() {
            hook();
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        if *self.fail_at.lock() == Some(n) {
            return Err(TxError::MappingFailed);
        }
        let addr = 0x1_0000 + n * 0x1000 + buf.len().min(0xfff);
        self.mapped.lock().push(addr);
        Ok(PhysAddr::from(addr))
    }

    fn unmap(&self, addr: PhysAddr, _len: usize) {
        self.unmapped.lock().push(addr.as_usize());
    }
}

/// Pause/resume probe for the upstream queue.
pub struct MockQueue {
    paused: AtomicBool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }
}

impl QueueControl for MockQueue {
    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }
}
