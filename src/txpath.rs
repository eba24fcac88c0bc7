//! Per-interface transmit orchestration.
//!
//! One `TxPath` exists per logical interface. A transmit attempt moves
//! through validation, a ring-space precheck, the shaper admission gate,
//! segment mapping, and finally the atomic descriptor-batch commit. Any
//! abort before the commit unwinds every mapping made so far, so a failed
//! attempt leaves nothing visible to hardware.
//!
//! Backpressure is never fatal: ring exhaustion pauses the upstream queue
//! until the reclaimer frees slots, and shaper saturation pauses it until
//! the deferred admission recheck succeeds.

use alloc::sync::Arc;
use alloc::vec::Vec;

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};

use spin::Mutex;

use crate::channel::Channel;
use crate::constants::{
    CSUM_OFFLOAD_MAX_LEN, CSUM_OFFSET_TCP, CSUM_OFFSET_UDP, ETH_ZLEN, HIF_TX_HDR_LEN,
    MAX_ETH_FRAME_SIZE, MAX_FRAME_SEGMENTS,
};
use crate::credit::CreditEstimator;
use crate::tracker::SlotHandle;
use crate::types::{
    DescFlags, HifTxFlags, HifTxHeader, IfaceId, InjectMode, ShaperQueueId, TxDescriptor, TxFrame,
};
use crate::{DmaMapper, QueueControl, ShaperRegs, TxError, TxResult};

/// Per-interface transmit statistics.
#[derive(Default)]
pub struct TxStats {
    packets: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

impl TxStats {
    /// Consistent-enough point-in-time copy for reporting.
    pub fn snapshot(&self) -> TxStatsSnapshot {
        TxStatsSnapshot {
            tx_packets: self.packets.load(Ordering::Relaxed),
            tx_bytes: self.bytes.load(Ordering::Relaxed),
            tx_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TxStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatsSnapshot {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_dropped: u64,
}

/// Transmit state of one logical interface bound to a channel.
pub struct TxPath {
    iface: IfaceId,
    channel: Arc<Channel>,
    queue: ShaperQueueId,
    mode: InjectMode,
    estimator: Mutex<CreditEstimator>,
    stats: TxStats,
    congested: AtomicBool,
    recheck_pending: AtomicBool,
    ring_stalled: AtomicBool,
}

impl TxPath {
    /// Bind `iface` to `channel` and initialize its admission state from a
    /// one-time query of the shaper's configured queue depth.
    pub fn attach<S: ShaperRegs>(
        iface: IfaceId,
        channel: Arc<Channel>,
        queue: ShaperQueueId,
        mode: InjectMode,
        shaper: &S,
    ) -> TxResult<Self> {
        channel.bind(iface)?;
        let estimator = CreditEstimator::new(queue, shaper);
        Ok(Self {
            iface,
            channel,
            queue,
            mode,
            estimator: Mutex::new(estimator),
            stats: TxStats::default(),
            congested: AtomicBool::new(false),
            recheck_pending: AtomicBool::new(false),
            ring_stalled: AtomicBool::new(false),
        })
    }

    /// Unsubscribe from the channel at interface teardown.
    pub fn detach(self) {
        let _ = self.channel.unbind(self.iface);
    }

    /// Owning interface id.
    pub fn iface(&self) -> IfaceId {
        self.iface
    }

    /// The interface's primary channel.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> TxStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether shaper saturation currently holds the queue paused.
    pub fn is_congested(&self) -> bool {
        self.congested.load(Ordering::Acquire)
    }

    /// Whether an admission recheck is armed.
    pub fn recheck_pending(&self) -> bool {
        self.recheck_pending.load(Ordering::Acquire)
    }

    /// Transmit one frame.
    ///
    /// Never blocks on I/O: the attempt either commits synchronously or is
    /// rejected with a recoverable error. `RingFull` and `ShaperSaturated`
    /// mean the upstream queue has been paused.
    pub fn transmit<D, S, Q>(&self, frame: TxFrame, dma: &D, shaper: &S, queue: &Q) -> TxResult
    where
        D: DmaMapper,
        S: ShaperRegs,
        Q: QueueControl,
    {
        if !self.channel.is_running() {
            return Err(TxError::NotRunning);
        }
        self.validate(&frame)?;
        let payload_len = frame.total_len();
        let needed = frame.descriptor_count();

        // Ring-space precheck. The reclaimer may free slots on another core
        // between the first check and the queue-stop, so stop first, fence,
        // and check again; otherwise the queue could stay stopped forever.
        if self.channel.free_slots() < needed {
            queue.pause();
            fence(Ordering::SeqCst);
            if self.channel.free_slots() < needed {
                self.ring_stalled.store(true, Ordering::Release);
                return Err(TxError::RingFull);
            }
            queue.resume();
        }

        // Shaper admission gate.
        if !self.estimator.lock().can_admit(shaper) {
            self.congested.store(true, Ordering::Release);
            queue.pause();
            self.schedule_recheck();
            debug!("iface {}: shaper queue {} saturated", self.iface.0, self.queue.0);
            return Err(TxError::ShaperSaturated);
        }

        // Header injection, checksum policy, and padding happen before any
        // mapping so every staged segment is final.
        let frame = Arc::new(self.prepare(frame));

        let mut descs: Vec<TxDescriptor> = Vec::with_capacity(needed);
        let mut handles: Vec<SlotHandle> = Vec::with_capacity(needed);
        let tracker = self.channel.tracker();
        let segments = core::iter::once(frame.head.as_slice())
            .chain(frame.frags.iter().map(|f| f.as_slice()));
        for (i, seg) in segments.enumerate() {
            let addr = match dma.map(seg) {
                Ok(addr) => addr,
                Err(_) => {
                    // Roll back every mapping made for this frame; no
                    // descriptor has been committed yet.
                    tracker.unwind(&handles, dma);
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "iface {}: DMA mapping failed at segment {}/{}, frame dropped",
                        self.iface.0,
                        i + 1,
                        needed
                    );
                    return Err(TxError::MappingFailed);
                }
            };
            let last = i == needed - 1;
            let handle = tracker.register(addr, seg.len(), Arc::clone(&frame), i, last);
            handles.push(handle);
            let mut flags = DescFlags::empty();
            if i == 0 {
                flags |= DescFlags::FIRST;
            }
            if last {
                flags |= DescFlags::LAST;
            }
            descs.push(TxDescriptor {
                addr,
                len: seg.len() as u32,
                flags,
                handle,
            });
        }

        // Atomic batch commit. A peer interface sharing the channel can
        // consume the prechecked slots before we take the ring lock;
        // unwinding here is identical to the mapping abort, and losing the
        // race stalls the queue exactly like the precheck path.
        if let Err(e) = self.channel.submit(&descs) {
            tracker.unwind(&handles, dma);
            if e == TxError::RingFull {
                queue.pause();
                fence(Ordering::SeqCst);
                if self.channel.free_slots() >= needed {
                    queue.resume();
                } else {
                    self.ring_stalled.store(true, Ordering::Release);
                }
            }
            return Err(e);
        }

        self.stats.packets.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Completion-side hook: wake a queue stalled on ring space once enough
    /// slots have been reclaimed to fit any frame.
    ///
    /// Called by the reclaimer context after [`Channel::on_tx_complete`].
    pub fn on_reclaimed<Q: QueueControl>(&self, queue: &Q) {
        if self.ring_stalled.load(Ordering::Acquire)
            && self.channel.free_slots() >= MAX_FRAME_SEGMENTS
            && self
                .ring_stalled
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            queue.resume();
        }
    }

    /// Arm the deferred admission recheck. Idempotent: duplicate schedules
    /// are no-ops. Returns whether this call armed it.
    pub fn schedule_recheck(&self) -> bool {
        self.recheck_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// One probe of the deferred congestion-recovery task: run the
    /// estimator's slow path and, on success, lift congestion and resume the
    /// upstream queue.
    ///
    /// Returns `true` when congestion lifted; `false` means the queue is
    /// still saturated and the task should be re-scheduled.
    pub fn admission_recheck<S, Q>(&self, shaper: &S, queue: &Q) -> bool
    where
        S: ShaperRegs,
        Q: QueueControl,
    {
        if !self.estimator.lock().reconcile(shaper) {
            return false;
        }
        self.congested.store(false, Ordering::Release);
        self.recheck_pending.store(false, Ordering::Release);
        queue.resume();
        debug!("iface {}: congestion lifted", self.iface.0);
        true
    }

    fn validate(&self, frame: &TxFrame) -> TxResult {
        let total = frame.total_len();
        if frame.head.is_empty() || total > MAX_ETH_FRAME_SIZE {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(TxError::InvalidFrame);
        }
        if frame.frags.iter().any(|f| f.is_empty())
            || frame.descriptor_count() > MAX_FRAME_SEGMENTS
        {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(TxError::InvalidFrame);
        }
        // A checksum request must name a field inside the linear part.
        // Checked arithmetic: `start` and `offset` are caller-supplied and
        // may be arbitrarily large.
        if let Some(csum) = frame.csum {
            let field_end = csum
                .start
                .checked_add(csum.offset)
                .and_then(|v| v.checked_add(2));
            if !field_end.is_some_and(|end| end <= frame.head.len()) {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(TxError::InvalidFrame);
            }
        }
        Ok(())
    }

    /// Finalize the frame image: checksum policy, minimum-length padding,
    /// and HIF TX header injection, in that order (offsets in the checksum
    /// request are relative to the unprefixed frame).
    fn prepare(&self, mut frame: TxFrame) -> TxFrame {
        let mut flags = HifTxFlags::empty();
        if self.mode == InjectMode::Direct {
            flags |= HifTxFlags::DIRECT;
        }

        if let Some(csum) = frame.csum.take() {
            let offloadable = frame.total_len() < CSUM_OFFLOAD_MAX_LEN
                && (csum.offset == CSUM_OFFSET_TCP || csum.offset == CSUM_OFFSET_UDP);
            if offloadable {
                flags |= HifTxFlags::CSUM_L3 | HifTxFlags::CSUM_L4;
            } else {
                software_checksum(&mut frame, csum.start, csum.offset);
            }
        }

        let refnum = match frame.ts_refnum {
            Some(refnum) => {
                flags |= HifTxFlags::TIMESTAMP;
                refnum
            }
            None => 0,
        };

        // Runt frames are padded with zeros ahead of the wire, after the
        // last payload byte.
        let total = frame.total_len();
        if total < ETH_ZLEN {
            let pad = ETH_ZLEN - total;
            match frame.frags.last_mut() {
                Some(frag) => frag.resize(frag.len() + pad, 0),
                None => frame.head.resize(frame.head.len() + pad, 0),
            }
        }

        let hdr = HifTxHeader {
            flags: flags.bits(),
            queue: self.queue.0,
            chid: self.channel.id().0,
            cookie: self.iface.0,
            refnum,
        };
        let mut head = Vec::with_capacity(HIF_TX_HDR_LEN + frame.head.len());
        head.extend_from_slice(&hdr.to_bytes());
        head.extend_from_slice(&frame.head);
        frame.head = head;
        frame
    }
}

/// Fold the 16-bit ones'-complement internet checksum over the frame bytes
/// from `start` onward and store it (big-endian) `offset` bytes into that
/// region. The field itself is treated as zero during summation.
fn software_checksum(frame: &mut TxFrame, start: usize, offset: usize) {
    let field = start + offset;
    frame.head[field] = 0;
    frame.head[field + 1] = 0;

    let mut sum: u32 = 0;
    let mut hi: Option<u8> = None;
    let bytes = frame.head[start..]
        .iter()
        .chain(frame.frags.iter().flat_map(|f| f.iter()));
    for &b in bytes {
        match hi.take() {
            None => hi = Some(b),
            Some(h) => sum += u32::from(u16::from_be_bytes([h, b])),
        }
    }
    if let Some(h) = hi {
        sum += u32::from(u16::from_be_bytes([h, 0]));
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    let csum = !(sum as u16);
    frame.head[field..field + 2].copy_from_slice(&csum.to_be_bytes());
}
