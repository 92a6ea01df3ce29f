//! Three-stage streaming pipeline over the cluster.
//!
//! # Architecture
//!
//! ```text
//!             input ring (N slots)        output ring (N slots)
//!            ┌────┬────┬────┐            ┌────┬────┬────┐
//!  backing ─▶│ s0 │ s1 │ s2 │─▶ compute ─▶│ s0 │ s1 │ s2 │─▶ backing
//!   (load)   └────┴────┴────┘  (streams)  └────┴────┴────┘  (store)
//!             stages {0, 1}                stages {1, 2}
//! ```
//!
//! Stage 0 copies batch `i` into its input-ring slot, stage 1 streams the
//! batch loaded one iteration earlier through the compute kernel into its
//! output-ring slot, stage 2 copies the batch computed one iteration
//! earlier back out. Each ring is shared by two adjacent stages, so a ring
//! of two slots already keeps producer and consumer apart; the slot a
//! stage holds is a pure function of the global iteration ([`phase`]).
//!
//! Every iteration ends with all channel work drained and one barrier
//! arrival per role; the barrier generation *is* the global iteration, and
//! no other synchronisation exists between the roles.
//!
//! # Roles
//!
//! Engine access and stream-unit access are segregated by capability
//! token: [`LoadCtx`] and [`StoreCtx`] can only be built from the
//! [`TransferRole`], [`ComputeCtx`] only from the [`ComputeRole`]. The
//! tokens are minted as one [`RoleSet`] and moved into the scheduler, so
//! a kernel stage calling outside its role does not compile.

pub mod phase;
pub mod scheduler;

pub use phase::{slot_for_stage, stages_disjoint, total_iterations, SlotCollision, SlotState};
pub use scheduler::{PipelineScheduler, RunReport};

use crate::cluster::Scratchpad;
use crate::dma::{TransferEngine, TransferId};
use crate::stream::{ActiveStreams, StreamUnit};

/// Capability to drive the transfer engine (load and store stages).
#[derive(Debug)]
pub struct TransferRole {
    _private: (),
}

/// Capability to drive the stream unit (compute stage).
#[derive(Debug)]
pub struct ComputeRole {
    _private: (),
}

/// The full set of role tokens for one cluster.
///
/// Minted once and moved into the scheduler; the tokens are neither
/// cloneable nor constructible elsewhere.
#[derive(Debug)]
pub struct RoleSet {
    pub transfer: TransferRole,
    pub compute: ComputeRole,
}

impl RoleSet {
    pub fn mint() -> Self {
        Self { transfer: TransferRole { _private: () }, compute: ComputeRole { _private: () } }
    }
}

/// A user kernel plugged into the pipeline.
///
/// The three methods correspond to the three stages; each receives the
/// work-item index and a context scoped to its role's capabilities.
pub trait StreamKernel {
    /// Bytes in one input batch and one output batch (a multiple of the
    /// stream element size).
    fn batch_bytes(&self) -> u32;

    /// Stage 0: issue the transfer(s) bringing work item `item` into the
    /// input slot.
    fn load(&mut self, ctx: &mut LoadCtx<'_>, item: u64);

    /// Stage 1: stream the input slot through the computation into the
    /// output slot.
    fn compute(&mut self, ctx: &mut ComputeCtx<'_>, item: u64);

    /// Stage 2: issue the transfer(s) draining work item `item` from the
    /// output slot.
    fn store(&mut self, ctx: &mut StoreCtx<'_>, item: u64);
}

/// Load-stage context: the input slot and the means to fill it.
pub struct LoadCtx<'a> {
    engine: &'a mut TransferEngine,
    channel: usize,
    slot_addr: u64,
    batch_bytes: u32,
}

impl<'a> LoadCtx<'a> {
    pub(crate) fn new(
        _role: &'a mut TransferRole,
        engine: &'a mut TransferEngine,
        channel: usize,
        slot_addr: u64,
        batch_bytes: u32,
    ) -> Self {
        Self { engine, channel, slot_addr, batch_bytes }
    }

    /// Cluster address of the stage's input-ring slot.
    pub fn slot_addr(&self) -> u64 {
        self.slot_addr
    }

    /// Bytes of one batch.
    pub fn batch_bytes(&self) -> u32 {
        self.batch_bytes
    }

    /// Copy one whole batch from `src` into the slot.
    pub fn copy_in(&mut self, src: u64) -> TransferId {
        self.engine.start_1d(self.slot_addr, src, self.batch_bytes, self.channel)
    }

    /// Gather a batch of `rows` rows into the slot, packing them densely.
    pub fn copy_in_2d(&mut self, src: u64, row_size: u32, src_stride: i64, rows: u32) -> TransferId {
        self.engine.start_2d(
            self.slot_addr,
            src,
            row_size,
            row_size as i64,
            src_stride,
            rows,
            self.channel,
        )
    }
}

/// Store-stage context: the output slot and the means to drain it.
pub struct StoreCtx<'a> {
    engine: &'a mut TransferEngine,
    channel: usize,
    slot_addr: u64,
    batch_bytes: u32,
}

impl<'a> StoreCtx<'a> {
    pub(crate) fn new(
        _role: &'a mut TransferRole,
        engine: &'a mut TransferEngine,
        channel: usize,
        slot_addr: u64,
        batch_bytes: u32,
    ) -> Self {
        Self { engine, channel, slot_addr, batch_bytes }
    }

    /// Cluster address of the stage's output-ring slot.
    pub fn slot_addr(&self) -> u64 {
        self.slot_addr
    }

    /// Bytes of one batch.
    pub fn batch_bytes(&self) -> u32 {
        self.batch_bytes
    }

    /// Copy one whole batch from the slot out to `dst`.
    pub fn copy_out(&mut self, dst: u64) -> TransferId {
        self.engine.start_1d(dst, self.slot_addr, self.batch_bytes, self.channel)
    }

    /// Scatter the slot's batch as `rows` rows with a destination stride.
    pub fn copy_out_2d(&mut self, dst: u64, row_size: u32, dst_stride: i64, rows: u32) -> TransferId {
        self.engine.start_2d(
            dst,
            self.slot_addr,
            row_size,
            dst_stride,
            row_size as i64,
            rows,
            self.channel,
        )
    }
}

/// Compute-stage context: the stream unit over the replica's scratchpad,
/// with the iteration's input and output slot offsets.
pub struct ComputeCtx<'a> {
    unit: &'a mut StreamUnit,
    spm: &'a mut Scratchpad,
    in_slot: u32,
    out_slot: u32,
    batch_bytes: u32,
}

impl<'a> ComputeCtx<'a> {
    pub(crate) fn new(
        _role: &'a mut ComputeRole,
        unit: &'a mut StreamUnit,
        spm: &'a mut Scratchpad,
        in_slot: u32,
        out_slot: u32,
        batch_bytes: u32,
    ) -> Self {
        Self { unit, spm, in_slot, out_slot, batch_bytes }
    }

    /// Scratchpad offset of this iteration's input slot.
    pub fn in_slot(&self) -> u32 {
        self.in_slot
    }

    /// Scratchpad offset of this iteration's output slot.
    pub fn out_slot(&self) -> u32 {
        self.out_slot
    }

    /// Stream elements in one batch.
    pub fn batch_elems(&self) -> u32 {
        self.batch_bytes / crate::stream::STREAM_ELEM_BYTES as u32
    }

    /// The stream unit, for lane configuration and arming.
    pub fn unit(&mut self) -> &mut StreamUnit {
        self.unit
    }

    /// The replica's scratchpad, for index tables and spill data.
    pub fn scratchpad(&mut self) -> &mut Scratchpad {
        self.spm
    }

    /// Open the stream-unit enable bracket over the scratchpad.
    pub fn enable(&mut self) -> ActiveStreams<'_> {
        self.unit.enable(self.spm)
    }
}
