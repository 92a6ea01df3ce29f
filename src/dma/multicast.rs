//! Scoped multicast submission.
//!
//! On the original hardware the multicast destination mask is a global
//! side-channel register: it must be cleared after use or it silently
//! replicates unrelated subsequent transfers. Here the mask exists only
//! inside a borrow-scoped wrapper: submissions made through the scope carry
//! the mask in their descriptor, submissions made after the scope ends
//! cannot see it, on any exit path. There is no engine-global mask state to
//! forget to clear.

use crate::cluster::ReplicaMask;

use super::engine::TransferEngine;
use super::{TransferDescriptor, TransferId};

/// A multicast submission scope over a transfer engine.
///
/// Obtained from [`TransferEngine::multicast`]; while it lives, the engine
/// is exclusively borrowed, so plain (non-replicating) submissions cannot
/// interleave with the scope's.
#[derive(Debug)]
pub struct MulticastScope<'e> {
    engine: &'e mut TransferEngine,
    mask: ReplicaMask,
}

impl<'e> MulticastScope<'e> {
    pub(crate) fn new(engine: &'e mut TransferEngine, mask: ReplicaMask) -> Self {
        debug_assert!(!mask.is_empty(), "multicast scope with an empty mask is a no-op");
        log::trace!("multicast scope open, mask=0b{:08b}", mask.bits());
        Self { engine, mask }
    }

    /// The replica selection of this scope.
    pub fn mask(&self) -> ReplicaMask {
        self.mask
    }

    /// Queue a contiguous 1-D copy replicated to the scope's replicas.
    pub fn start_1d(&mut self, dst: u64, src: u64, size: u32, channel: usize) -> TransferId {
        self.engine.submit(
            channel,
            TransferDescriptor::contiguous(dst, src, size).with_replicas(self.mask),
        )
    }

    /// Queue a 2-D strided copy replicated to the scope's replicas.
    #[allow(clippy::too_many_arguments)]
    pub fn start_2d(
        &mut self,
        dst: u64,
        src: u64,
        row_size: u32,
        dst_stride: i64,
        src_stride: i64,
        rows: u32,
        channel: usize,
    ) -> TransferId {
        self.engine.submit(
            channel,
            TransferDescriptor::strided(dst, src, row_size, dst_stride, src_stride, rows)
                .with_replicas(self.mask),
        )
    }
}
