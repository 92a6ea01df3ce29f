//! Lane address walker.
//!
//! For an affine lane the sequence of scratchpad offsets is
//! `base + Σ i_d * stride_d` with dimension 0 varying fastest:
//!
//! ```text
//! bounds (4, 2), strides (8, 64), base 0x100:
//! 0x100 0x108 0x110 0x118   (i1 = 0)
//! 0x140 0x148 0x150 0x158   (i1 = 1)
//! ```
//!
//! For an indexed lane the offsets come from a table of per-element byte
//! offsets added to the base. A repeat factor of R yields each offset R
//! times before the lane advances.

use crate::cluster::Scratchpad;

use super::{LaneAddressing, LaneConfig};

/// Walks the address sequence of one armed lane.
#[derive(Debug, Clone)]
pub struct LaneWalker {
    config: LaneConfig,
    /// Scratchpad byte offset the lane is bound to.
    base: u32,
    /// Index-table base for indexed lanes.
    table_base: Option<u32>,
    /// Per-dimension counters (affine) or element index in `counters[0]`
    /// (indexed).
    counters: [u32; 4],
    /// Repeats already emitted for the current element.
    emitted: u32,
    finished: bool,
}

impl LaneWalker {
    /// Bind a configured lane to a base offset.
    pub fn new(config: LaneConfig, base: u32) -> Self {
        debug_assert!(
            !matches!(config.addressing, LaneAddressing::Indexed { .. }),
            "indexed lanes are armed with a table"
        );
        Self { config, base, table_base: None, counters: [0; 4], emitted: 0, finished: false }
    }

    /// Bind an indexed lane to a base offset and its index table.
    pub fn new_indexed(config: LaneConfig, base: u32, table_base: u32) -> Self {
        debug_assert!(
            matches!(config.addressing, LaneAddressing::Indexed { .. }),
            "affine lanes take no table"
        );
        Self {
            config,
            base,
            table_base: Some(table_base),
            counters: [0; 4],
            emitted: 0,
            finished: false,
        }
    }

    /// The lane configuration.
    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// True once every value has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Values remaining.
    pub fn remaining(&self) -> u64 {
        if self.finished {
            return 0;
        }
        let per_elem = self.config.repeat as u64;
        let visited = self.elements_visited() * per_elem + self.emitted as u64;
        self.config.value_count() - visited
    }

    fn elements_visited(&self) -> u64 {
        match self.config.addressing {
            LaneAddressing::Affine { dims, dim_count } => {
                let mut scale = 1u64;
                let mut visited = 0u64;
                for d in 0..dim_count as usize {
                    visited += self.counters[d] as u64 * scale;
                    scale *= dims[d].count() as u64;
                }
                visited
            }
            LaneAddressing::Indexed { .. } => self.counters[0] as u64,
        }
    }

    /// Scratchpad offset of the current element.
    fn current_offset(&self, spm: &Scratchpad) -> u32 {
        match self.config.addressing {
            LaneAddressing::Affine { dims, dim_count } => {
                let mut offset = self.base as i64;
                for d in 0..dim_count as usize {
                    offset += self.counters[d] as i64 * dims[d].stride();
                }
                debug_assert!(offset >= 0, "lane walked below scratchpad base");
                offset as u32
            }
            LaneAddressing::Indexed { width, .. } => {
                let table = self.table_base.expect("indexed lane armed without a table");
                let entry = table + self.counters[0] * width.bytes() as u32;
                self.base + spm.read_index(entry, width.bytes())
            }
        }
    }

    /// Advance to the next element, innermost dimension first.
    fn advance_element(&mut self) {
        match self.config.addressing {
            LaneAddressing::Affine { dims, dim_count } => {
                for d in 0..dim_count as usize {
                    if self.counters[d] < dims[d].last_index() {
                        self.counters[d] += 1;
                        return;
                    }
                    self.counters[d] = 0;
                }
                self.finished = true;
            }
            LaneAddressing::Indexed { count, .. } => {
                self.counters[0] += 1;
                if self.counters[0] == count {
                    self.finished = true;
                }
            }
        }
    }

    /// Yield the next scratchpad offset, or `None` when the lane is drained.
    ///
    /// The scratchpad is needed only by indexed lanes (table reads); affine
    /// lanes ignore it.
    pub fn next_offset(&mut self, spm: &Scratchpad) -> Option<u32> {
        if self.finished {
            return None;
        }
        let offset = self.current_offset(spm);
        self.emitted += 1;
        if self.emitted == self.config.repeat {
            self.emitted = 0;
            self.advance_element();
        }
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{IndexWidth, LaneConfig};

    fn spm() -> Scratchpad {
        Scratchpad::new(4096)
    }

    fn collect(mut walker: LaneWalker, spm: &Scratchpad) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(o) = walker.next_offset(spm) {
            out.push(o);
        }
        out
    }

    #[test]
    fn test_1d_sequence() {
        let cfg = LaneConfig::reader(LaneAddressing::affine_1d(4, 8));
        let offsets = collect(LaneWalker::new(cfg, 0x100), &spm());
        assert_eq!(offsets, vec![0x100, 0x108, 0x110, 0x118]);
    }

    #[test]
    fn test_2d_innermost_first() {
        // bounds (b0, b1) with strides (s0, s1): the visited sequence is
        // [base + i1*s1 + i0*s0 for i1 in 0..b1 for i0 in 0..b0].
        let cfg = LaneConfig::reader(LaneAddressing::affine_2d(4, 8, 2, 64));
        let offsets = collect(LaneWalker::new(cfg, 0x100), &spm());

        let mut expected = Vec::new();
        for i1 in 0u32..2 {
            for i0 in 0u32..4 {
                expected.push(0x100 + i1 * 64 + i0 * 8);
            }
        }
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_3d_and_4d_order() {
        let cfg3 = LaneConfig::reader(LaneAddressing::affine_3d(2, 8, 2, 32, 2, 128));
        let offsets = collect(LaneWalker::new(cfg3, 0), &spm());
        assert_eq!(offsets, vec![0, 8, 32, 40, 128, 136, 160, 168]);

        let cfg4 = LaneConfig::reader(LaneAddressing::affine_4d(2, 8, 1, 0, 2, 64, 2, 512));
        let offsets = collect(LaneWalker::new(cfg4, 0), &spm());
        assert_eq!(offsets, vec![0, 8, 64, 72, 512, 520, 576, 584]);
    }

    #[test]
    fn test_inclusive_count_is_not_off_by_one() {
        // A bound of 3 visits exactly 3 elements, never 2 or 4.
        let cfg = LaneConfig::reader(LaneAddressing::affine_1d(3, 16));
        let offsets = collect(LaneWalker::new(cfg, 0), &spm());
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets, vec![0, 16, 32]);
    }

    #[test]
    fn test_repeat_factor() {
        let cfg = LaneConfig::reader(LaneAddressing::affine_1d(3, 8)).with_repeat(2);
        let offsets = collect(LaneWalker::new(cfg, 0), &spm());
        assert_eq!(offsets, vec![0, 0, 8, 8, 16, 16]);
    }

    #[test]
    fn test_negative_stride() {
        let cfg = LaneConfig::reader(LaneAddressing::affine_1d(3, -8));
        let offsets = collect(LaneWalker::new(cfg, 0x20), &spm());
        assert_eq!(offsets, vec![0x20, 0x18, 0x10]);
    }

    #[test]
    fn test_indexed_gather() {
        let mut spm = spm();
        // Table of u16 byte offsets at 0x200: gather elements 3, 0, 2.
        spm.write_bytes(0x200, &24u16.to_le_bytes());
        spm.write_bytes(0x202, &0u16.to_le_bytes());
        spm.write_bytes(0x204, &16u16.to_le_bytes());

        let cfg = LaneConfig::reader(LaneAddressing::indexed(3, IndexWidth::U16));
        let walker = LaneWalker::new_indexed(cfg, 0x100, 0x200);
        assert_eq!(collect(walker, &spm), vec![0x118, 0x100, 0x110]);
    }

    #[test]
    fn test_remaining_counts_down() {
        let cfg = LaneConfig::reader(LaneAddressing::affine_2d(2, 8, 2, 32)).with_repeat(2);
        let mut walker = LaneWalker::new(cfg, 0);
        let spm = spm();
        assert_eq!(walker.remaining(), 8);
        walker.next_offset(&spm);
        assert_eq!(walker.remaining(), 7);
        for _ in 0..7 {
            walker.next_offset(&spm);
        }
        assert_eq!(walker.remaining(), 0);
        assert!(walker.is_finished());
        assert_eq!(walker.next_offset(&spm), None);
    }
}
