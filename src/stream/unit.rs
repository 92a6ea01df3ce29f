//! The per-core stream unit: lanes, arming, and the enable bracket.
//!
//! Lifecycle of a compute block:
//!
//! ```ignore
//! unit.configure_lane(0, LaneConfig::reader(LaneAddressing::affine_1d(64, 8)));
//! unit.configure_lane(1, LaneConfig::writer(LaneAddressing::affine_1d(64, 8)));
//! unit.arm(0, in_slot);
//! unit.arm(1, out_slot);
//! {
//!     let mut streams = unit.enable(&mut spm);
//!     for _ in 0..64 {
//!         let x = streams.read(0);
//!         streams.write(1, x);
//!     }
//! } // guard drop: fence + disable
//! ```
//!
//! Lane traffic is legal only through the [`ActiveStreams`] guard returned
//! by [`StreamUnit::enable`]; outside the bracket the lane registers hold
//! undefined values. Write lanes buffer their stores and commit them at the
//! fence; the guard runs the fence on every exit path, so a slot handed to
//! the transfer engine after the bracket is never half-written.

use smallvec::SmallVec;

use crate::cluster::params::{STREAM_ALIGN, STREAM_LANES};
use crate::cluster::Scratchpad;

use super::lane::LaneWalker;
use super::{LaneConfig, LaneRole};

/// Buffered store of a write lane.
type PendingStore = (u32, f64);

#[derive(Debug, Default)]
struct Lane {
    config: Option<LaneConfig>,
    armed: Option<LaneWalker>,
    writes: SmallVec<[PendingStore; 16]>,
}

/// The per-core streaming register unit.
#[derive(Debug, Default)]
pub struct StreamUnit {
    lanes: [Lane; STREAM_LANES],
}

impl StreamUnit {
    /// A unit with all lanes unconfigured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a lane's configuration. Reconfiguring discards a previous
    /// armed binding.
    pub fn configure_lane(&mut self, lane: usize, config: LaneConfig) {
        assert!(lane < STREAM_LANES, "lane {} out of range", lane);
        let slot = &mut self.lanes[lane];
        slot.config = Some(config);
        slot.armed = None;
    }

    /// Bind a configured affine lane to a scratchpad base offset for the
    /// next compute block. Re-arming discards the previous binding.
    pub fn arm(&mut self, lane: usize, base: u32) {
        assert!(lane < STREAM_LANES, "lane {} out of range", lane);
        debug_assert!(base as usize % STREAM_ALIGN == 0, "unaligned lane base 0x{:x}", base);
        let slot = &mut self.lanes[lane];
        let config = slot.config.expect("arming an unconfigured lane");
        slot.armed = Some(LaneWalker::new(config, base));
        slot.writes.clear();
    }

    /// Bind a configured indexed lane to a base offset and its index table.
    pub fn arm_indexed(&mut self, lane: usize, base: u32, table_base: u32) {
        assert!(lane < STREAM_LANES, "lane {} out of range", lane);
        debug_assert!(base as usize % STREAM_ALIGN == 0, "unaligned lane base 0x{:x}", base);
        let slot = &mut self.lanes[lane];
        let config = slot.config.expect("arming an unconfigured lane");
        slot.armed = Some(LaneWalker::new_indexed(config, base, table_base));
        slot.writes.clear();
    }

    /// True if the lane currently holds an armed binding.
    pub fn is_armed(&self, lane: usize) -> bool {
        self.lanes[lane].armed.is_some()
    }

    /// Open the enable bracket. Lane reads/writes happen through the
    /// returned guard; dropping it fences and disables the unit.
    pub fn enable<'a>(&'a mut self, spm: &'a mut Scratchpad) -> ActiveStreams<'a> {
        log::trace!("stream unit enabled");
        ActiveStreams { unit: self, spm }
    }
}

/// The enabled stream unit: the only handle through which lane traffic is
/// legal.
pub struct ActiveStreams<'a> {
    unit: &'a mut StreamUnit,
    spm: &'a mut Scratchpad,
}

impl ActiveStreams<'_> {
    /// Pop the next value from a read lane.
    ///
    /// Panics if the lane is not an armed read lane or is exhausted;
    /// both are kernel configuration errors with no safe recovery.
    pub fn read(&mut self, lane: usize) -> f64 {
        let slot = &mut self.unit.lanes[lane];
        let walker = slot.armed.as_mut().expect("reading a lane that is not armed");
        assert!(
            walker.config().role == LaneRole::Read,
            "lane {} is configured for writing",
            lane
        );
        let offset = walker
            .next_offset(self.spm)
            .unwrap_or_else(|| panic!("read lane {} exhausted", lane));
        self.spm.read_f64(offset)
    }

    /// Push the next value into a write lane. The store is buffered until
    /// the fence.
    pub fn write(&mut self, lane: usize, value: f64) {
        let slot = &mut self.unit.lanes[lane];
        let walker = slot.armed.as_mut().expect("writing a lane that is not armed");
        assert!(
            walker.config().role == LaneRole::Write,
            "lane {} is configured for reading",
            lane
        );
        let offset = walker
            .next_offset(self.spm)
            .unwrap_or_else(|| panic!("write lane {} exhausted", lane));
        slot.writes.push((offset, value));
    }

    /// Drain all outstanding lane stores to the scratchpad.
    ///
    /// Must happen (and does happen, at the latest on drop) before the
    /// written slot is handed to the transfer engine or another role.
    pub fn fence(&mut self) {
        for lane in &mut self.unit.lanes {
            for (offset, value) in lane.writes.drain(..) {
                self.spm.write_f64(offset, value);
            }
        }
    }
}

impl Drop for ActiveStreams<'_> {
    fn drop(&mut self) {
        self.fence();
        // Disable: armed bindings are consumed by the bracket.
        for lane in &mut self.unit.lanes {
            lane.armed = None;
        }
        log::trace!("stream unit disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::LaneAddressing;

    #[test]
    fn test_read_write_through_lanes() {
        let mut spm = Scratchpad::new(1024);
        for i in 0..8u32 {
            spm.write_f64(i * 8, i as f64);
        }

        let mut unit = StreamUnit::new();
        unit.configure_lane(0, LaneConfig::reader(LaneAddressing::affine_1d(8, 8)));
        unit.configure_lane(1, LaneConfig::writer(LaneAddressing::affine_1d(8, 8)));
        unit.arm(0, 0);
        unit.arm(1, 256);

        {
            let mut streams = unit.enable(&mut spm);
            for _ in 0..8 {
                let x = streams.read(0);
                streams.write(1, x * 2.0);
            }
        }

        for i in 0..8u32 {
            assert_eq!(spm.read_f64(256 + i * 8), i as f64 * 2.0);
        }
    }

    #[test]
    fn test_writes_not_visible_before_fence() {
        let mut spm = Scratchpad::new(1024);
        let mut unit = StreamUnit::new();
        unit.configure_lane(0, LaneConfig::writer(LaneAddressing::affine_1d(4, 8)));
        unit.arm(0, 0);

        let mut streams = unit.enable(&mut spm);
        streams.write(0, 1.5);
        streams.write(0, 2.5);
        // Buffered: nothing committed yet.
        assert_eq!(streams.spm.read_f64(0), 0.0);

        streams.fence();
        assert_eq!(streams.spm.read_f64(0), 1.5);
        assert_eq!(streams.spm.read_f64(8), 2.5);
    }

    #[test]
    fn test_drop_fences_outstanding_writes() {
        let mut spm = Scratchpad::new(1024);
        let mut unit = StreamUnit::new();
        unit.configure_lane(2, LaneConfig::writer(LaneAddressing::affine_1d(2, 8)));
        unit.arm(2, 64);

        {
            let mut streams = unit.enable(&mut spm);
            streams.write(2, 9.0);
            // No explicit fence: the bracket's exit must commit it.
        }
        assert_eq!(spm.read_f64(64), 9.0);
        assert!(!unit.is_armed(2), "binding survives the bracket");
    }

    #[test]
    fn test_rearming_resets_the_walk() {
        let mut spm = Scratchpad::new(1024);
        spm.write_f64(0, 5.0);
        spm.write_f64(8, 6.0);

        let mut unit = StreamUnit::new();
        unit.configure_lane(0, LaneConfig::reader(LaneAddressing::affine_1d(2, 8)));

        unit.arm(0, 0);
        {
            let mut streams = unit.enable(&mut spm);
            assert_eq!(streams.read(0), 5.0);
        }
        // Second block starts from the base again.
        unit.arm(0, 0);
        {
            let mut streams = unit.enable(&mut spm);
            assert_eq!(streams.read(0), 5.0);
            assert_eq!(streams.read(0), 6.0);
        }
    }

    #[test]
    #[should_panic(expected = "configured for writing")]
    fn test_reading_a_write_lane_panics() {
        let mut spm = Scratchpad::new(256);
        let mut unit = StreamUnit::new();
        unit.configure_lane(0, LaneConfig::writer(LaneAddressing::affine_1d(2, 8)));
        unit.arm(0, 0);
        let mut streams = unit.enable(&mut spm);
        streams.read(0);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_overrunning_a_lane_panics() {
        let mut spm = Scratchpad::new(256);
        let mut unit = StreamUnit::new();
        unit.configure_lane(0, LaneConfig::reader(LaneAddressing::affine_1d(1, 8)));
        unit.arm(0, 0);
        let mut streams = unit.enable(&mut spm);
        streams.read(0);
        streams.read(0);
    }
}
