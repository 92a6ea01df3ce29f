//! The pipeline scheduler: one global iteration at a time.
//!
//! The scheduler owns the role tokens, the buffer rings and the barrier,
//! and drives a [`StreamKernel`] through the fill / steady-state / drain
//! phases. Within one global iteration the stage order is fixed (load,
//! compute, store, drain the channel, arrive at the barrier) and a stage
//! simply skips the iteration when its phase window is closed.
//!
//! The barrier is the only handshake: both roles arrive exactly once per
//! iteration, and the resulting generation counter is the global iteration
//! number the phase arithmetic runs on.

use crate::cluster::params::STREAM_ALIGN;
use crate::cluster::{ClusterBarrier, ClusterMemory, ScratchpadAllocator};
use crate::dma::TransferEngine;
use crate::stream::StreamUnit;

use super::phase::{slot_for_stage, stages_disjoint, total_iterations, SlotState};
use super::{ComputeCtx, LoadCtx, RoleSet, StoreCtx, StreamKernel};

/// Pipeline depth: the store stage runs two iterations behind the load
/// stage.
pub const PIPELINE_DEPTH: usize = 2;

const LOAD_STAGE: usize = 0;
const COMPUTE_STAGE: usize = 1;
const STORE_STAGE: usize = 2;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Work items processed.
    pub work_items: u64,
    /// Global iterations executed (work items plus fill/drain overhead).
    pub iterations: u64,
}

/// Drives the three-stage protocol over one replica's scratchpad.
#[derive(Debug)]
pub struct PipelineScheduler {
    roles: RoleSet,
    barrier: ClusterBarrier,
    /// Replica whose scratchpad holds the rings.
    replica: usize,
    /// Transfer channel used by the load and store stages.
    channel: usize,
    batch_bytes: u32,
    buffer_count: usize,
    /// Scratchpad offsets of the input-ring slots.
    in_slots: Vec<u32>,
    /// Scratchpad offsets of the output-ring slots.
    out_slots: Vec<u32>,
}

impl PipelineScheduler {
    /// Lay out both rings in the replica's scratchpad and take ownership
    /// of the cluster's role tokens.
    pub fn new(
        roles: RoleSet,
        alloc: &mut ScratchpadAllocator,
        replica: usize,
        channel: usize,
        batch_bytes: u32,
        buffer_count: usize,
    ) -> Self {
        assert!(buffer_count >= 2, "a ring shared by two stages needs at least 2 slots");
        assert!(
            batch_bytes as usize % STREAM_ALIGN == 0,
            "batch size must be a multiple of the stream alignment"
        );
        let in_slots = alloc.alloc_slots(batch_bytes as usize, buffer_count);
        let out_slots = alloc.alloc_slots(batch_bytes as usize, buffer_count);
        log::debug!(
            "pipeline rings: {} x {} B in at 0x{:x}, out at 0x{:x}",
            buffer_count,
            batch_bytes,
            in_slots[0],
            out_slots[0]
        );
        Self {
            roles,
            // One arrival per role per iteration.
            barrier: ClusterBarrier::new(2),
            replica,
            channel,
            batch_bytes,
            buffer_count,
            in_slots,
            out_slots,
        }
    }

    /// Ring depth.
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Run the kernel over `work_items` batches to completion.
    pub fn run<K: StreamKernel>(
        &mut self,
        kernel: &mut K,
        work_items: u64,
        mem: &mut ClusterMemory,
        engine: &mut TransferEngine,
        unit: &mut StreamUnit,
    ) -> RunReport {
        debug_assert_eq!(kernel.batch_bytes(), self.batch_bytes);
        debug_assert_eq!(
            stages_disjoint(&[LOAD_STAGE, COMPUTE_STAGE], work_items, self.buffer_count),
            Ok(()),
            "input ring too shallow"
        );
        debug_assert_eq!(
            stages_disjoint(&[COMPUTE_STAGE, STORE_STAGE], work_items, self.buffer_count),
            Ok(()),
            "output ring too shallow"
        );

        let iterations = total_iterations(work_items, PIPELINE_DEPTH);
        log::debug!(
            "pipeline run: {} items, {} slots per ring, {} iterations",
            work_items,
            self.buffer_count,
            iterations
        );

        for iteration in 0..iterations {
            self.step(kernel, iteration, work_items, mem, engine, unit);
        }
        debug_assert!(!engine.busy(self.channel));

        RunReport { work_items, iterations }
    }

    /// One global iteration: each stage in order, then drain and barrier.
    fn step<K: StreamKernel>(
        &mut self,
        kernel: &mut K,
        iteration: u64,
        work_items: u64,
        mem: &mut ClusterMemory,
        engine: &mut TransferEngine,
        unit: &mut StreamUnit,
    ) {
        let map = mem.map();

        if let SlotState::Active(slot) =
            slot_for_stage(LOAD_STAGE, iteration, work_items, self.buffer_count)
        {
            let item = iteration - LOAD_STAGE as u64;
            let slot_addr = map.scratchpad_addr(self.replica, self.in_slots[slot]);
            let mut ctx = LoadCtx::new(
                &mut self.roles.transfer,
                engine,
                self.channel,
                slot_addr,
                self.batch_bytes,
            );
            kernel.load(&mut ctx, item);
        }

        if let SlotState::Active(slot) =
            slot_for_stage(COMPUTE_STAGE, iteration, work_items, self.buffer_count)
        {
            let item = iteration - COMPUTE_STAGE as u64;
            let mut ctx = ComputeCtx::new(
                &mut self.roles.compute,
                unit,
                mem.scratchpad_mut(self.replica),
                self.in_slots[slot],
                self.out_slots[slot],
                self.batch_bytes,
            );
            kernel.compute(&mut ctx, item);
        }

        if let SlotState::Active(slot) =
            slot_for_stage(STORE_STAGE, iteration, work_items, self.buffer_count)
        {
            let item = iteration - STORE_STAGE as u64;
            let slot_addr = map.scratchpad_addr(self.replica, self.out_slots[slot]);
            let mut ctx = StoreCtx::new(
                &mut self.roles.transfer,
                engine,
                self.channel,
                slot_addr,
                self.batch_bytes,
            );
            kernel.store(&mut ctx, item);
        }

        // All in-flight work retires before anyone crosses the barrier.
        engine.wait_all(self.channel, mem);

        // One arrival per role; only the second trips the barrier.
        let early = self.barrier.arrive();
        debug_assert!(early.is_none());
        let generation = self.barrier.arrive().expect("both roles arrived");
        debug_assert_eq!(generation, iteration + 1);
        log::trace!("iteration {} complete", iteration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{LaneAddressing, LaneConfig};

    /// Streams each batch through the lanes unchanged.
    struct IdentityKernel {
        src: u64,
        dst: u64,
        batch_bytes: u32,
    }

    impl StreamKernel for IdentityKernel {
        fn batch_bytes(&self) -> u32 {
            self.batch_bytes
        }

        fn load(&mut self, ctx: &mut LoadCtx<'_>, item: u64) {
            ctx.copy_in(self.src + item * self.batch_bytes as u64);
        }

        fn compute(&mut self, ctx: &mut ComputeCtx<'_>, _item: u64) {
            let elems = ctx.batch_elems();
            let (in_slot, out_slot) = (ctx.in_slot(), ctx.out_slot());
            ctx.unit()
                .configure_lane(0, LaneConfig::reader(LaneAddressing::affine_1d(elems, 8)));
            ctx.unit()
                .configure_lane(1, LaneConfig::writer(LaneAddressing::affine_1d(elems, 8)));
            ctx.unit().arm(0, in_slot);
            ctx.unit().arm(1, out_slot);
            let mut streams = ctx.enable();
            for _ in 0..elems {
                let x = streams.read(0);
                streams.write(1, x);
            }
        }

        fn store(&mut self, ctx: &mut StoreCtx<'_>, item: u64) {
            ctx.copy_out(self.dst + item * self.batch_bytes as u64);
        }
    }

    fn run_identity(batch_bytes: u32, work_items: u64, buffer_count: usize) -> RunReport {
        let mut mem = ClusterMemory::new(1, 64 * 1024);
        let mut engine = TransferEngine::new(1);
        let mut unit = StreamUnit::new();
        let mut alloc = ScratchpadAllocator::new(64 * 1024);

        let src = 0x4000_0000u64;
        let dst = 0x5000_0000u64;
        let total = batch_bytes as u64 * work_items;
        let pattern: Vec<u8> = (0..total).map(|i| (i % 251) as u8 ^ 0x5A).collect();
        mem.backing_mut().write_bytes(src, &pattern);

        let mut kernel = IdentityKernel { src, dst, batch_bytes };
        let mut scheduler =
            PipelineScheduler::new(RoleSet::mint(), &mut alloc, 0, 0, batch_bytes, buffer_count);
        let report = scheduler.run(&mut kernel, work_items, &mut mem, &mut engine, &mut unit);

        let mut out = vec![0u8; total as usize];
        mem.backing().read_bytes(dst, &mut out);
        assert_eq!(out, pattern, "pipeline output differs from input");
        report
    }

    #[test]
    fn test_identity_pipeline_double_buffered() {
        let report = run_identity(64, 20, 2);
        assert_eq!(report.iterations, 20 + PIPELINE_DEPTH as u64);
    }

    #[test]
    fn test_identity_pipeline_triple_buffered() {
        let report = run_identity(64, 20, 3);
        assert_eq!(report.iterations, 20 + PIPELINE_DEPTH as u64);
    }

    #[test]
    fn test_single_item_fills_and_drains() {
        let report = run_identity(64, 1, 2);
        assert_eq!(report.iterations, 3);
    }

    #[test]
    fn test_barrier_generation_matches_iterations() {
        let mut mem = ClusterMemory::new(1, 16 * 1024);
        let mut engine = TransferEngine::new(1);
        let mut unit = StreamUnit::new();
        let mut alloc = ScratchpadAllocator::new(16 * 1024);
        mem.backing_mut().write_bytes(0x4000_0000, &[1u8; 64 * 4]);

        let mut kernel = IdentityKernel { src: 0x4000_0000, dst: 0x5000_0000, batch_bytes: 64 };
        let mut scheduler = PipelineScheduler::new(RoleSet::mint(), &mut alloc, 0, 0, 64, 2);
        let report = scheduler.run(&mut kernel, 4, &mut mem, &mut engine, &mut unit);
        assert_eq!(scheduler.barrier.generation(), report.iterations);
    }

    #[test]
    #[should_panic(expected = "at least 2 slots")]
    fn test_single_slot_ring_rejected() {
        let mut alloc = ScratchpadAllocator::new(4096);
        PipelineScheduler::new(RoleSet::mint(), &mut alloc, 0, 0, 64, 1);
    }
}
