//! Streaming register lanes and the hardware repeat primitive.
//!
//! Each core has a small set of lanes. A lane, once configured and armed,
//! walks an index space over the scratchpad and feeds values to (or drains
//! values from) the compute loop through register-style operand slots;
//! the consuming loop does no address arithmetic at all.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 StreamUnit                     │
//! │  lane 0 ─ read  ─ affine  (bounds, strides)    │
//! │  lane 1 ─ write ─ affine                       │
//! │  lane 2 ─ read  ─ indexed (table, width)       │
//! │  lane 3 ─ unused                               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Two addressing modes, a tagged choice rather than one struct with
//! mode-dependent fields:
//!
//! - [`LaneAddressing::Affine`]: up to 4 dimensions, each a (count, byte
//!   stride) pair; iteration order is innermost-first (dimension 0 varies
//!   fastest); addresses are `base + Σ i_d * stride_d`.
//! - [`LaneAddressing::Indexed`]: gather/scatter through an index table of
//!   per-element byte offsets.
//!
//! Callers always pass *inclusive counts*; the count−1 normalisation the
//! lane hardware wants happens in exactly one place ([`LaneDim::new`]), and
//! the stored field is named after the normalised unit so call sites cannot
//! confuse the two.

pub mod lane;
pub mod repeat;
pub mod unit;

pub use lane::LaneWalker;
pub use repeat::RepeatConfig;
pub use unit::{ActiveStreams, StreamUnit};

pub use crate::cluster::params::{MAX_STREAM_DIMS, STREAM_ALIGN, STREAM_ELEM_BYTES, STREAM_LANES};

/// Whether a lane feeds the loop (read) or drains it (write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneRole {
    /// Lane supplies operands from memory.
    Read,
    /// Lane consumes results into memory.
    Write,
}

/// Width of one index-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// Entry size in bytes.
    #[inline]
    pub fn bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// One dimension of an affine lane.
///
/// Constructed from the inclusive element count; stored as count−1, the
/// form the walker iterates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneDim {
    bound_minus_one: u32,
    stride: i64,
}

impl LaneDim {
    /// A dimension of `count` elements with the given byte stride.
    pub fn new(count: u32, stride: i64) -> Self {
        assert!(count >= 1, "lane dimension needs at least one element");
        Self { bound_minus_one: count - 1, stride }
    }

    /// Element count (undoes the stored normalisation).
    #[inline]
    pub fn count(&self) -> u32 {
        self.bound_minus_one + 1
    }

    /// Last valid index of this dimension.
    #[inline]
    pub(crate) fn last_index(&self) -> u32 {
        self.bound_minus_one
    }

    /// Byte stride.
    #[inline]
    pub fn stride(&self) -> i64 {
        self.stride
    }
}

/// How a lane generates addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneAddressing {
    /// Affine multi-dimensional walk, dimension 0 innermost.
    Affine {
        /// Dimension configurations; entries past `dim_count` are unused.
        dims: [LaneDim; MAX_STREAM_DIMS],
        /// Number of active dimensions (1–4).
        dim_count: u8,
    },
    /// Gather/scatter through a table of per-element byte offsets.
    Indexed {
        /// Number of elements.
        count: u32,
        /// Width of one table entry.
        width: IndexWidth,
    },
}

impl LaneAddressing {
    fn affine(dims: &[LaneDim]) -> Self {
        assert!(
            !dims.is_empty() && dims.len() <= MAX_STREAM_DIMS,
            "affine lane supports 1 to {} dimensions",
            MAX_STREAM_DIMS
        );
        let mut all = [LaneDim::default(); MAX_STREAM_DIMS];
        all[..dims.len()].copy_from_slice(dims);
        Self::Affine { dims: all, dim_count: dims.len() as u8 }
    }

    /// 1-D affine lane: `count` elements, `stride` bytes apart.
    pub fn affine_1d(count: u32, stride: i64) -> Self {
        Self::affine(&[LaneDim::new(count, stride)])
    }

    /// 2-D affine lane, dimension 0 innermost.
    pub fn affine_2d(c0: u32, s0: i64, c1: u32, s1: i64) -> Self {
        Self::affine(&[LaneDim::new(c0, s0), LaneDim::new(c1, s1)])
    }

    /// 3-D affine lane, dimension 0 innermost.
    #[allow(clippy::too_many_arguments)]
    pub fn affine_3d(c0: u32, s0: i64, c1: u32, s1: i64, c2: u32, s2: i64) -> Self {
        Self::affine(&[LaneDim::new(c0, s0), LaneDim::new(c1, s1), LaneDim::new(c2, s2)])
    }

    /// 4-D affine lane, dimension 0 innermost.
    #[allow(clippy::too_many_arguments)]
    pub fn affine_4d(
        c0: u32, s0: i64,
        c1: u32, s1: i64,
        c2: u32, s2: i64,
        c3: u32, s3: i64,
    ) -> Self {
        Self::affine(&[
            LaneDim::new(c0, s0),
            LaneDim::new(c1, s1),
            LaneDim::new(c2, s2),
            LaneDim::new(c3, s3),
        ])
    }

    /// Indexed lane of `count` elements with the given table-entry width.
    pub fn indexed(count: u32, width: IndexWidth) -> Self {
        assert!(count >= 1, "indexed lane needs at least one element");
        Self::Indexed { count, width }
    }

    /// Total elements the lane visits (before the repeat factor).
    pub fn element_count(&self) -> u64 {
        match self {
            Self::Affine { dims, dim_count } => dims[..*dim_count as usize]
                .iter()
                .map(|d| d.count() as u64)
                .product(),
            Self::Indexed { count, .. } => *count as u64,
        }
    }
}

/// Full configuration of one lane.
#[derive(Debug, Clone, Copy)]
pub struct LaneConfig {
    /// Address generation.
    pub addressing: LaneAddressing,
    /// Read or write.
    pub role: LaneRole,
    /// Each element is yielded/consumed this many times before the lane
    /// advances (1 = no repetition).
    pub repeat: u32,
}

impl LaneConfig {
    /// A read lane.
    pub fn reader(addressing: LaneAddressing) -> Self {
        Self { addressing, role: LaneRole::Read, repeat: 1 }
    }

    /// A write lane.
    pub fn writer(addressing: LaneAddressing) -> Self {
        Self { addressing, role: LaneRole::Write, repeat: 1 }
    }

    /// Set the repeat factor.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        assert!(repeat >= 1, "repeat factor must be at least 1");
        self.repeat = repeat;
        self
    }

    /// Total values moved through the lane.
    pub fn value_count(&self) -> u64 {
        self.addressing.element_count() * self.repeat as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_normalisation() {
        let dim = LaneDim::new(16, 8);
        assert_eq!(dim.count(), 16);
        assert_eq!(dim.last_index(), 15);
    }

    #[test]
    #[should_panic(expected = "at least one element")]
    fn test_zero_count_dim_panics() {
        LaneDim::new(0, 8);
    }

    #[test]
    fn test_element_counts() {
        assert_eq!(LaneAddressing::affine_1d(64, 8).element_count(), 64);
        assert_eq!(LaneAddressing::affine_2d(4, 8, 3, 32).element_count(), 12);
        assert_eq!(LaneAddressing::indexed(10, IndexWidth::U16).element_count(), 10);
    }

    #[test]
    fn test_repeat_multiplies_value_count() {
        let cfg = LaneConfig::reader(LaneAddressing::affine_1d(8, 8)).with_repeat(3);
        assert_eq!(cfg.value_count(), 24);
    }

    #[test]
    #[should_panic(expected = "1 to 4 dimensions")]
    fn test_too_many_dims_panics() {
        let d = LaneDim::new(2, 8);
        LaneAddressing::affine(&[d, d, d, d, d]);
    }
}
