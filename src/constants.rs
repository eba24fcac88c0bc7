//! Hardware and policy constants for the HIF transmit path.
//!
//! The credit-window and admission-floor ratios are behavioral constants
//! carried over from hardware characterization; changing them changes the
//! admission policy, not just a tuning knob.

/// Number of descriptors in one HIF TX ring.
pub const RING_LEN: usize = 256;

/// Number of HIF channels provided by the hardware.
pub const NUM_CHANNELS: usize = 4;

/// Maximum logical interfaces that may subscribe to one channel.
pub const MAX_SUBSCRIBERS: usize = 8;

/// Length of the HIF TX metadata header prefixed to every frame.
pub const HIF_TX_HDR_LEN: usize = 6;

/// Modulus of the shaper's transmitted-count counters (8-bit hardware field).
pub const SHAPER_COUNT_MOD: u32 = 256;

/// Cap applied to the admission floor (`min_threshold`).
pub const CREDIT_FLOOR_CAP: u32 = 8;

/// Minimum ethernet frame size; shorter frames are zero-padded in software.
pub const ETH_ZLEN: usize = 60;

/// Maximum ethernet frame size accepted by the transmit path.
pub const MAX_ETH_FRAME_SIZE: usize = 1536;

/// Maximum ring descriptors one frame may occupy (linear part + fragments).
/// Doubles as the free-slot level at which a ring-stalled queue is woken.
pub const MAX_FRAME_SEGMENTS: usize = 8;

/// Small-packet threshold for hardware checksum offload; frames at or above
/// this length get a software checksum before transmit.
pub const CSUM_OFFLOAD_MAX_LEN: usize = 256;

/// TCP checksum field offset from the start of the L4 header.
pub const CSUM_OFFSET_TCP: usize = 16;

/// UDP checksum field offset from the start of the L4 header.
pub const CSUM_OFFSET_UDP: usize = 6;

/// Admission window for a shaper queue of the given configured depth.
pub const fn credit_window(queue_capacity: u32) -> u32 {
    queue_capacity >> 2
}

/// Admission floor below which a queue is considered saturated.
pub const fn credit_floor(window: u32) -> u32 {
    let t = window >> 2;
    if t < CREDIT_FLOOR_CAP { t } else { CREDIT_FLOOR_CAP }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_quarter_capacity() {
        assert_eq!(credit_window(64), 16);
        assert_eq!(credit_window(32), 8);
        assert_eq!(credit_window(3), 0);
    }

    #[test]
    fn floor_is_capped() {
        assert_eq!(credit_floor(16), 4);
        assert_eq!(credit_floor(8), 2);
        // Quarter-window exceeds the cap for large queues.
        assert_eq!(credit_floor(64), CREDIT_FLOOR_CAP);
    }
}
