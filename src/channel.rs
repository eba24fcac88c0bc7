//! One HIF channel: a TX descriptor ring, its DMA bookkeeping, and the set
//! of logical interfaces multiplexed onto it.
//!
//! Channels are created once at driver init and outlive all interfaces.
//! Binding and unbinding are configuration-time operations; the transmit hot
//! path only ever takes the ring lock.

use alloc::sync::Arc;
use alloc::vec::Vec;

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::constants::MAX_SUBSCRIBERS;
use crate::ring::TxRing;
use crate::tracker::DmaBufferTracker;
use crate::types::{ChannelId, IfaceId, TxDescriptor, TxFrame};
use crate::{DmaMapper, TxError, TxResult};

/// Lifecycle state of a channel's hardware context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Created, hardware context not yet configured.
    Disabled,
    /// Configured but not accepting traffic.
    Enabled,
    /// Accepting traffic.
    Running,
}

/// One hardware DMA transmit context, shared by up to
/// [`MAX_SUBSCRIBERS`] logical interfaces.
pub struct Channel {
    id: ChannelId,
    status: Mutex<ChannelStatus>,
    ring: TxRing,
    tracker: DmaBufferTracker,
    /// One slot per possible interface; config-time only.
    subscribers: Mutex<[Option<IfaceId>; MAX_SUBSCRIBERS]>,
    /// Doorbell rings observed by the platform glue.
    doorbells: AtomicUsize,
}

impl Channel {
    /// Create a channel with a ring of `ring_len` descriptors, initially
    /// `Disabled`.
    pub fn new(id: ChannelId, ring_len: usize) -> Self {
        Self {
            id,
            status: Mutex::new(ChannelStatus::Disabled),
            ring: TxRing::new(ring_len),
            tracker: DmaBufferTracker::new(ring_len),
            subscribers: Mutex::new([None; MAX_SUBSCRIBERS]),
            doorbells: AtomicUsize::new(0),
        }
    }

    /// Channel index.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ChannelStatus {
        *self.status.lock()
    }

    /// Whether the channel accepts transmit traffic.
    pub fn is_running(&self) -> bool {
        self.status() == ChannelStatus::Running
    }

    /// Configure the hardware context. Idempotent once enabled.
    pub fn enable(&self) {
        let mut status = self.status.lock();
        if *status == ChannelStatus::Disabled {
            debug!("channel {} enabled", self.id.0);
            *status = ChannelStatus::Enabled;
        }
    }

    /// Start accepting traffic. The ring is reset to a clean state.
    pub fn start(&self) -> TxResult {
        let mut status = self.status.lock();
        match *status {
            ChannelStatus::Disabled => Err(TxError::NotRunning),
            ChannelStatus::Enabled => {
                self.ring.reset();
                debug!("channel {} running", self.id.0);
                *status = ChannelStatus::Running;
                Ok(())
            }
            ChannelStatus::Running => Ok(()),
        }
    }

    /// Stop accepting traffic; in-flight slots remain until reclaimed.
    pub fn stop(&self) {
        let mut status = self.status.lock();
        if *status == ChannelStatus::Running {
            debug!("channel {} stopped", self.id.0);
            *status = ChannelStatus::Enabled;
        }
    }

    /// Subscribe `iface` to this channel. Fails with `AlreadyBound` if its
    /// slot is occupied, `NotBound` if the id names no subscriber slot.
    /// Configuration-time only.
    pub fn bind(&self, iface: IfaceId) -> TxResult {
        let mut subs = self.subscribers.lock();
        let slot = subs.get_mut(iface.index()).ok_or(TxError::NotBound)?;
        if slot.is_some() {
            return Err(TxError::AlreadyBound);
        }
        *slot = Some(iface);
        debug!("iface {} bound to channel {}", iface.0, self.id.0);
        Ok(())
    }

    /// Remove `iface` from this channel's subscriber table.
    pub fn unbind(&self, iface: IfaceId) -> TxResult {
        let mut subs = self.subscribers.lock();
        match subs.get_mut(iface.index()) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                debug!("iface {} unbound from channel {}", iface.0, self.id.0);
                Ok(())
            }
            _ => Err(TxError::NotBound),
        }
    }

    /// Whether `iface` is currently subscribed.
    pub fn is_bound(&self, iface: IfaceId) -> bool {
        let subs = self.subscribers.lock();
        subs.get(iface.index()).is_some_and(|s| s.is_some())
    }

    /// Number of subscribed interfaces.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Free descriptor slots in this channel's ring. Lock-free.
    pub fn free_slots(&self) -> usize {
        self.ring.free_slots()
    }

    /// Commit a frame's staged descriptors as one atomic batch and ring the
    /// doorbell. The ring mutex held across the whole push is the channel's
    /// transmit lock.
    pub fn submit(&self, descs: &[TxDescriptor]) -> TxResult {
        if !self.is_running() {
            return Err(TxError::NotRunning);
        }
        self.ring.reserve_and_push(descs)?;
        self.doorbells.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Doorbell rings since creation; the glue turns these into the hardware
    /// trigger write.
    pub fn doorbell_count(&self) -> usize {
        self.doorbells.load(Ordering::Acquire)
    }

    /// Completion-reclaimer entry point: drain `n` finished slots, unmap
    /// their segments, and return the frames whose final fragment completed
    /// so the caller can recycle them.
    ///
    /// Single reclaimer per channel; runs concurrently with transmit.
    pub fn on_tx_complete<D: DmaMapper>(&self, n: usize, dma: &D) -> Vec<Arc<TxFrame>> {
        let descs = self.ring.reclaim(n);
        let mut done = Vec::with_capacity(descs.len());
        for desc in descs {
            if let Some(frame) = self.tracker.release_on_completion(desc.handle, dma) {
                done.push(frame);
            }
        }
        done
    }

    pub(crate) fn ring(&self) -> &TxRing {
        &self.ring
    }

    pub(crate) fn tracker(&self) -> &DmaBufferTracker {
        &self.tracker
    }
}
