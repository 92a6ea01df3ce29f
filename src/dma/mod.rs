//! Asynchronous bulk-transfer subsystem.
//!
//! The transfer engine moves data between the backing store and the
//! scratchpad replicas. It knows nothing about buffer slots or pipeline
//! roles: it sees flat address ranges, and all slot bookkeeping lives in
//! [`crate::pipeline`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  TransferEngine                        │
//! │  ┌──────────────────────┐  ┌──────────────────────┐   │
//! │  │      Channel 0       │  │      Channel 1       │   │
//! │  │  pending: FIFO of    │  │  pending: FIFO of    │   │
//! │  │  descriptors         │  │  descriptors         │   │
//! │  │  last_completed: id  │  │  last_completed: id  │   │
//! │  └──────────────────────┘  └──────────────────────┘   │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! A channel serialises its transfers: descriptors retire strictly in
//! submission order and the per-channel completion counter increases
//! monotonically. Channels are independent of one another.
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = TransferEngine::new(2);
//!
//! let id = engine.start_1d(spm_addr, store_addr, 4096, 0);
//! // ... other work ...
//! engine.wait(id, 0, &mut memory);
//! ```
//!
//! There is no failure return anywhere on this path: out-of-range or
//! misaligned arguments are configuration errors and trip debug
//! assertions, mirroring the undefined hardware behaviour they would
//! produce.

pub mod engine;
pub mod multicast;

pub use engine::{ChannelStats, TransferEngine};
pub use multicast::MulticastScope;

pub use crate::cluster::ReplicaMask;
pub use crate::cluster::params::{DMA_BUS_BYTES, MEMSET_SEED_BYTES};

/// Identifier of a submitted transfer, strictly increasing per channel.
///
/// Ids start at 1 on every channel; `TransferId` values from different
/// channels are not comparable in any meaningful way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransferId(pub(crate) u64);

impl TransferId {
    /// The raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t#{}", self.0)
    }
}

/// One submitted transfer: `rows` independent row copies of `row_size`
/// bytes, with source and destination advancing by their respective
/// strides between rows. `rows == 1` is the 1-D form.
#[derive(Debug, Clone, Copy)]
pub struct TransferDescriptor {
    /// Source start address.
    pub src: u64,
    /// Destination start address.
    pub dst: u64,
    /// Bytes per row.
    pub row_size: u32,
    /// Source address increment between rows (may be zero or negative).
    pub src_stride: i64,
    /// Destination address increment between rows.
    pub dst_stride: i64,
    /// Number of rows.
    pub rows: u32,
    /// Replicas additionally receiving every write (multicast).
    pub replicas: ReplicaMask,
}

impl TransferDescriptor {
    /// A contiguous 1-D copy.
    pub fn contiguous(dst: u64, src: u64, size: u32) -> Self {
        Self {
            src,
            dst,
            row_size: size,
            src_stride: 0,
            dst_stride: 0,
            rows: 1,
            replicas: ReplicaMask::EMPTY,
        }
    }

    /// A strided 2-D copy.
    pub fn strided(
        dst: u64,
        src: u64,
        row_size: u32,
        dst_stride: i64,
        src_stride: i64,
        rows: u32,
    ) -> Self {
        Self { src, dst, row_size, src_stride, dst_stride, rows, replicas: ReplicaMask::EMPTY }
    }

    /// Attach a multicast replica selection.
    pub(crate) fn with_replicas(mut self, replicas: ReplicaMask) -> Self {
        self.replicas = replicas;
        self
    }

    /// Total payload bytes.
    pub fn total_bytes(&self) -> u64 {
        self.row_size as u64 * self.rows as u64
    }

    /// Source address of one row.
    #[inline]
    pub(crate) fn src_row(&self, row: u32) -> u64 {
        self.src.wrapping_add((row as i64 * self.src_stride) as u64)
    }

    /// Destination address of one row.
    #[inline]
    pub(crate) fn dst_row(&self, row: u32) -> u64 {
        self.dst.wrapping_add((row as i64 * self.dst_stride) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_descriptor() {
        let d = TransferDescriptor::contiguous(0x2000, 0x1000, 256);
        assert_eq!(d.rows, 1);
        assert_eq!(d.total_bytes(), 256);
        assert_eq!(d.src_row(0), 0x1000);
        assert_eq!(d.dst_row(0), 0x2000);
    }

    #[test]
    fn test_strided_row_addresses() {
        let d = TransferDescriptor::strided(0x2000, 0x1000, 64, 128, 64, 4);
        assert_eq!(d.src_row(0), 0x1000);
        assert_eq!(d.src_row(3), 0x10C0);
        assert_eq!(d.dst_row(3), 0x2180);
        assert_eq!(d.total_bytes(), 256);
    }

    #[test]
    fn test_negative_stride() {
        let d = TransferDescriptor::strided(0x2000, 0x1100, 64, 64, -64, 3);
        assert_eq!(d.src_row(1), 0x10C0);
        assert_eq!(d.src_row(2), 0x1080);
    }

    #[test]
    fn test_zero_source_stride_repeats_row() {
        // The memset fast path relies on this shape.
        let d = TransferDescriptor::strided(0x3040, 0x3000, 64, 64, 0, 8);
        assert_eq!(d.src_row(0), d.src_row(7));
        assert_eq!(d.dst_row(7), 0x3040 + 7 * 64);
    }
}
