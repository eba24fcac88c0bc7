//! Identifiers, frame model, and descriptor/header definitions for the
//! transmit path.
//!
//! `HifTxHeader` uses `#[repr(C, packed)]` to match the firmware's metadata
//! layout byte for byte, with no padding between fields.

use alloc::vec::Vec;

use bitflags::bitflags;
use memory_addr::PhysAddr;

use crate::constants::HIF_TX_HDR_LEN;
use crate::tracker::SlotHandle;

/// Index of one hardware HIF channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// Channel index as a table offset.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of one logical network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfaceId(pub u8);

impl IfaceId {
    /// Interface index as a subscriber-slot offset.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of one remote shaper (TMU) queue.
///
/// The reserved value [`ShaperQueueId::DISABLED`] selects the
/// admission-disabled mode for interfaces not subject to shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaperQueueId(pub u8);

impl ShaperQueueId {
    /// Sentinel id: every admission check passes trivially.
    pub const DISABLED: Self = Self(0xFF);

    /// Whether this binding is exempt from shaper admission control.
    pub const fn is_disabled(self) -> bool {
        self.0 == Self::DISABLED.0
    }
}

bitflags! {
    /// Flag byte of the HIF TX metadata header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HifTxFlags: u8 {
        /// Inject directly on the target port, bypassing classification.
        /// When clear the frame is tagged for classification and the header
        /// cookie names the target interface.
        const DIRECT = 1 << 0;
        /// Firmware fills the L3 (IP) header checksum.
        const CSUM_L3 = 1 << 1;
        /// Firmware fills the L4 (TCP/UDP) checksum.
        const CSUM_L4 = 1 << 2;
        /// Request an egress timestamp, correlated by the header refnum.
        const TIMESTAMP = 1 << 3;
    }
}

bitflags! {
    /// Control flags of one TX ring descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescFlags: u32 {
        /// First descriptor of a frame (the linear/header part).
        const FIRST = 1 << 0;
        /// Last descriptor of a frame; marks the packet boundary for
        /// hardware.
        const LAST = 1 << 1;
    }
}

/// HIF TX metadata header, prefixed to every outbound frame.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct HifTxHeader {
    /// Mode and offload flags ([`HifTxFlags`]).
    pub flags: u8,
    /// Target shaper queue id.
    pub queue: u8,
    /// Target HIF channel id.
    pub chid: u8,
    /// Target-interface cookie, consumed when classification is not bypassed.
    pub cookie: u8,
    /// Timestamp correlation reference number.
    pub refnum: u16,
}

impl HifTxHeader {
    /// Encode the header into its wire layout (refnum big-endian).
    pub fn to_bytes(&self) -> [u8; HIF_TX_HDR_LEN] {
        let refnum = self.refnum.to_be_bytes();
        [
            self.flags, self.queue, self.chid, self.cookie, refnum[0], refnum[1],
        ]
    }
}

/// Checksum-completion request carried by an outbound frame: the L4 header
/// starts at `start` and the checksum field sits `offset` bytes into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsumRequest {
    /// Byte offset of the L4 header from the start of the frame.
    pub start: usize,
    /// Byte offset of the checksum field within the L4 header.
    pub offset: usize,
}

/// Injection mode stamped into the HIF TX header of every frame an interface
/// transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectMode {
    /// Bypass classification and inject on the bound physical port.
    Direct,
    /// Tag for classification with a target-interface cookie.
    Classify,
}

/// One outbound frame: a linear part followed by zero or more fragments.
#[derive(Debug)]
pub struct TxFrame {
    /// Linear part of the frame. The HIF TX header is prepended here before
    /// mapping.
    pub head: Vec<u8>,
    /// Paged fragments, transmitted in order after the linear part.
    pub frags: Vec<Vec<u8>>,
    /// Pending checksum-completion request, if any.
    pub csum: Option<CsumRequest>,
    /// Egress-timestamp correlation refnum, if requested.
    pub ts_refnum: Option<u16>,
}

impl TxFrame {
    /// A linear frame with no fragments.
    pub fn new(head: Vec<u8>) -> Self {
        Self {
            head,
            frags: Vec::new(),
            csum: None,
            ts_refnum: None,
        }
    }

    /// A fragmented frame.
    pub fn with_frags(head: Vec<u8>, frags: Vec<Vec<u8>>) -> Self {
        Self {
            head,
            frags,
            csum: None,
            ts_refnum: None,
        }
    }

    /// Total payload length across the linear part and all fragments.
    pub fn total_len(&self) -> usize {
        self.head.len() + self.frags.iter().map(Vec::len).sum::<usize>()
    }

    /// Ring descriptors this frame occupies: one for the linear part plus
    /// one per fragment.
    pub fn descriptor_count(&self) -> usize {
        1 + self.frags.len()
    }
}

/// One staged TX ring descriptor.
///
/// Descriptors are staged while mapping and committed to the ring as a
/// single batch, so an aborted attempt leaves nothing visible to hardware.
#[derive(Debug, Clone, Copy)]
pub struct TxDescriptor {
    /// Bus address of the mapped segment.
    pub addr: PhysAddr,
    /// Segment length in bytes.
    pub len: u32,
    /// Descriptor control flags.
    pub flags: DescFlags,
    /// Tracker handle of the segment's DMA mapping.
    pub handle: SlotHandle,
}
