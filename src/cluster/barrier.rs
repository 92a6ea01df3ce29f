//! Cluster-wide barrier and the shared iteration counter.
//!
//! The barrier is the only cross-role handshake in the pipeline protocol:
//! no per-buffer lock, no message passing. Every core arrives once per
//! scheduling iteration; when the last party arrives the generation counter
//! advances, and that generation *is* the shared iteration counter from
//! which every role derives its activation window and buffer slot.
//!
//! In the hosted model cores are executed sequentially by the scheduler, so
//! arrival never blocks; the counting still enforces that each iteration
//! sees exactly one arrival per party.

/// Counting barrier with a generation counter.
#[derive(Debug)]
pub struct ClusterBarrier {
    parties: usize,
    arrived: usize,
    generation: u64,
}

impl ClusterBarrier {
    /// Create a barrier for `parties` cores.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "barrier needs at least one party");
        Self { parties, arrived: 0, generation: 0 }
    }

    /// Arrive at the barrier.
    ///
    /// Returns `Some(new_generation)` for the party that completes the
    /// iteration, `None` for the others.
    pub fn arrive(&mut self) -> Option<u64> {
        self.arrived += 1;
        debug_assert!(
            self.arrived <= self.parties,
            "barrier over-arrival: {} parties, {} arrivals",
            self.parties, self.arrived
        );
        if self.arrived == self.parties {
            self.arrived = 0;
            self.generation += 1;
            log::trace!("barrier: iteration {} complete", self.generation);
            Some(self.generation)
        } else {
            None
        }
    }

    /// Completed iterations so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of parties.
    pub fn parties(&self) -> usize {
        self.parties
    }
}
