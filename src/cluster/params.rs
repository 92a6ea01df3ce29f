//! Architectural parameters for the cluster memory system.
//!
//! These constants describe the fixed address map and the sizing of the
//! streaming hardware. They are compile-time properties of the platform,
//! not tunables; runtime-configurable values (scratchpad capacity, replica
//! count) live in [`crate::config`].

/// Base address of replica 0's scratchpad window.
///
/// Scratchpad windows sit in the low 32-bit region of the address space;
/// anything outside a window resolves to the backing store.
pub const SCRATCHPAD_BASE: u64 = 0x1000_0000;

/// Address-space stride between consecutive replica windows (1 MiB).
///
/// The scratchpad itself is smaller than the window; the gap is unmapped.
pub const REPLICA_STRIDE: u64 = 0x0010_0000;

/// Default scratchpad capacity per cluster replica (128 KiB).
pub const DEFAULT_SCRATCHPAD_BYTES: usize = 128 * 1024;

/// Default number of cluster replicas.
pub const DEFAULT_REPLICAS: usize = 4;

/// Maximum number of replicas addressable by a multicast mask (one bit each).
pub const MAX_REPLICAS: usize = 8;

/// Default number of independent transfer channels.
pub const DEFAULT_DMA_CHANNELS: usize = 2;

/// Transfer-engine bus width in bytes. Also the minimum transfer
/// granularity: sizes and strides must be multiples of this.
pub const DMA_BUS_BYTES: usize = 8;

/// Seed size for the replicating memset fast path.
///
/// Fills larger than this (and a multiple of it) are performed by seeding
/// the first chunk directly and replicating it with one 2-D transfer.
pub const MEMSET_SEED_BYTES: usize = 64;

/// Number of stream lanes per core.
pub const STREAM_LANES: usize = 4;

/// Maximum dimensions of an affine stream lane.
pub const MAX_STREAM_DIMS: usize = 4;

/// Required alignment for stream lane bases and strides.
pub const STREAM_ALIGN: usize = 8;

/// Stream element size in bytes (lanes move 64-bit values).
pub const STREAM_ELEM_BYTES: usize = 8;
