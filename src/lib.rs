//! Host-side transmit path for a PFE (packet forwarding engine) network
//! accelerator.
//!
//! Outbound frames from multiple logical interfaces are multiplexed onto a
//! small set of shared hardware DMA rings ("HIF channels"), gated by a
//! remote traffic-shaping queue (TMU) that reports its state asynchronously.
//!
//! Module hierarchy:
//!
//! - [`ring`]: fixed-capacity TX descriptor ring, produced under the channel
//!   lock and drained by an asynchronous completion reclaimer.
//! - [`tracker`]: per-slot DMA mapping bookkeeping, for completion unmap and
//!   for rollback of aborted transmit attempts.
//! - [`credit`]: shaper-queue admission control with a locally cached credit
//!   estimate reconciled against the hardware counter.
//! - [`channel`]: one HIF channel (ring + tracker + subscriber table) and its
//!   lifecycle.
//! - [`txpath`]: per-interface orchestration (validation, HIF header
//!   injection, checksum policy, fragment mapping, backpressure).
//!
//! The platform glue implements the collaborator traits defined here
//! ([`ShaperRegs`], [`DmaMapper`], [`QueueControl`]); the core never reaches
//! for global state.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[macro_use]
extern crate log;

pub mod channel;
pub mod constants;
pub mod credit;
pub mod ring;
pub mod tracker;
pub mod txpath;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use channel::{Channel, ChannelStatus};
pub use credit::CreditEstimator;
pub use ring::TxRing;
pub use tracker::{DmaBufferTracker, SlotHandle};
pub use txpath::{TxPath, TxStats, TxStatsSnapshot};
pub use types::{ChannelId, IfaceId, InjectMode, ShaperQueueId, TxFrame};

use memory_addr::PhysAddr;

/// The error type for transmit-path failures.
///
/// `RingFull` and `ShaperSaturated` are expected backpressure signals, not
/// faults; callers map them to queue-pause, never to a log at error level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// The descriptor ring has no room for the frame's descriptor batch.
    RingFull,
    /// The shaper queue refused admission; a background recheck is due.
    ShaperSaturated,
    /// DMA mapping resources were exhausted; the frame is dropped.
    MappingFailed,
    /// The channel is not in the `Running` state.
    NotRunning,
    /// The interface slot is already occupied on this channel.
    AlreadyBound,
    /// The interface is not subscribed to this channel.
    NotBound,
    /// The frame failed validation (empty, oversized, bad checksum request).
    InvalidFrame,
}

impl TxError {
    /// Stable error message for display/logging.
    pub const fn message(&self) -> &'static str {
        match self {
            TxError::RingFull => "TX ring full",
            TxError::ShaperSaturated => "Shaper queue saturated",
            TxError::MappingFailed => "DMA mapping failed",
            TxError::NotRunning => "Channel not running",
            TxError::AlreadyBound => "Interface slot already bound",
            TxError::NotBound => "Interface not bound",
            TxError::InvalidFrame => "Invalid frame",
        }
    }
}

impl core::fmt::Display for TxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

/// A specialized `Result` type for transmit-path operations.
pub type TxResult<T = ()> = Result<T, TxError>;

/// Register access to the remote traffic shaper (TMU), implemented by the
/// platform glue.
///
/// The shaper reports per-queue state asynchronously; the counters it exposes
/// wrap at 8 bits per the hardware contract.
pub trait ShaperRegs {
    /// Cumulative transmitted-packet count for `queue`, wrapping at 256.
    fn confirmed_count(&self, queue: ShaperQueueId) -> u32;

    /// Current fill level of `queue`.
    fn fill_level(&self, queue: ShaperQueueId) -> u8;

    /// Configured depth of `queue`. Queried once at interface attach.
    fn configured_window(&self, queue: ShaperQueueId) -> u32;
}

/// DMA mapping services provided by the platform.
pub trait DmaMapper {
    /// Map `buf` for device access and return its bus address.
    fn map(&self, buf: &[u8]) -> TxResult<PhysAddr>;

    /// Release a mapping previously returned by [`DmaMapper::map`].
    fn unmap(&self, addr: PhysAddr, len: usize);
}

/// Pause/resume controls of a logical interface's upstream transmit queue.
pub trait QueueControl {
    /// Stop the upstream queue from submitting further frames.
    fn pause(&self);

    /// Allow the upstream queue to submit frames again.
    fn resume(&self);
}
