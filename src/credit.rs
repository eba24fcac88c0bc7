//! Shaper-queue admission control.
//!
//! The remote shaper (TMU) enforces per-queue rate limits but only reports
//! its state through registers that are slow to read and wrap at 8 bits.
//! The estimator predicts remaining capacity locally so the hot path admits
//! packets without touching hardware, and reconciles its prediction against
//! the authoritative counter only when the cached credit runs out.
//!
//! The hardware counter can move under us: a second traffic source sharing
//! the queue, or drops the local counter never saw. Reconciliation treats an
//! implausibly large local/remote divergence as such external perturbation
//! and resyncs to the hardware count instead of refusing admission forever.

use crate::ShaperRegs;
use crate::constants::{SHAPER_COUNT_MOD, credit_floor, credit_window};
use crate::types::ShaperQueueId;

/// Per-(interface, shaper-queue) admission state.
///
/// Invariants: `cached_capacity <= window` and both counters stay within the
/// 8-bit hardware modulus.
pub struct CreditEstimator {
    queue: ShaperQueueId,
    /// Max in-flight packets the remote queue may hold.
    queue_capacity: u32,
    /// Damping window: `queue_capacity / 4`.
    window: u32,
    /// Floor below which the queue counts as saturated.
    min_threshold: u32,
    /// Local monotonic sent count, modulo 256.
    pkts_sent: u32,
    /// Admissions remaining before the next hardware reconciliation.
    cached: u32,
}

impl CreditEstimator {
    /// Attach-time construction from a one-time query of the shaper's
    /// configured queue depth.
    pub fn new<S: ShaperRegs>(queue: ShaperQueueId, shaper: &S) -> Self {
        if queue.is_disabled() {
            return Self::disabled();
        }
        let queue_capacity = shaper.configured_window(queue);
        let window = credit_window(queue_capacity);
        debug!(
            "credit estimator for queue {}: capacity={} window={}",
            queue.0, queue_capacity, window
        );
        Self {
            queue,
            queue_capacity,
            window,
            min_threshold: credit_floor(window),
            pkts_sent: 0,
            cached: window,
        }
    }

    /// Estimator for interfaces not subject to shaping: every check passes.
    pub const fn disabled() -> Self {
        Self {
            queue: ShaperQueueId::DISABLED,
            queue_capacity: 0,
            window: 0,
            min_threshold: 0,
            pkts_sent: 0,
            cached: 0,
        }
    }

    /// Whether admission control is disabled for this binding.
    pub const fn is_disabled(&self) -> bool {
        self.queue.is_disabled()
    }

    /// Damping window of this binding.
    pub const fn window(&self) -> u32 {
        self.window
    }

    /// Admissions remaining before the next hardware reconciliation.
    pub const fn cached_capacity(&self) -> u32 {
        self.cached
    }

    /// Admission gate for one packet.
    ///
    /// Fast path: consume cached credit without any hardware access. Once the
    /// cache is exhausted, fall back to [`CreditEstimator::reconcile`].
    pub fn can_admit<S: ShaperRegs>(&mut self, shaper: &S) -> bool {
        if self.queue.is_disabled() {
            return true;
        }
        if self.cached > 0 {
            self.cached -= 1;
            self.pkts_sent = (self.pkts_sent + 1) % SHAPER_COUNT_MOD;
            return true;
        }
        self.reconcile(shaper)
    }

    /// Slow path: reconcile the local counter against the hardware counter
    /// and recompute the credit cache. On refusal nothing is mutated; the
    /// background recheck task calls this until it succeeds.
    pub fn reconcile<S: ShaperRegs>(&mut self, shaper: &S) -> bool {
        if self.queue.is_disabled() {
            return true;
        }
        let hw = shaper.confirmed_count(self.queue) % SHAPER_COUNT_MOD;
        // 8-bit modular distance: both counters wrap at 256.
        let mut delta = (self.pkts_sent + SHAPER_COUNT_MOD - hw) % SHAPER_COUNT_MOD;

        if hw > self.pkts_sent && delta > self.window {
            // The hardware counter jumped ahead of us: another source bumped
            // the queue. Resync instead of refusing admission.
            self.pkts_sent = hw;
            delta = 0;
        } else if self.pkts_sent > hw + self.window {
            // Cumulative local drift beyond the tolerance bound.
            self.pkts_sent = hw;
            delta = 0;
        }
        debug_assert!(delta <= self.window);

        let spare = self.window.saturating_sub(delta);
        if spare <= self.min_threshold {
            return false;
        }

        // Second, independent saturation signal from the live queue depth.
        let fill = u32::from(shaper.fill_level(self.queue));
        let headroom = self.queue_capacity as i64 - delta as i64 - fill as i64;
        if spare as i64 > headroom {
            return false;
        }

        self.cached = spare;
        self.pkts_sent = (self.pkts_sent + 1) % SHAPER_COUNT_MOD;
        debug_assert!(self.cached <= self.window);
        true
    }

    #[cfg(test)]
    pub(crate) fn force_counters(&mut self, pkts_sent: u32, cached: u32) {
        self.pkts_sent = pkts_sent % SHAPER_COUNT_MOD;
        self.cached = cached;
    }

    #[cfg(test)]
    pub(crate) fn pkts_sent(&self) -> u32 {
        self.pkts_sent
    }
}
