//! Hardware-repeat loop issue.
//!
//! A repeat block re-issues a short sequence of operations for a number of
//! logical iterations without per-iteration loop control. With a stagger of
//! S, consecutive groups of S logical iterations are interleaved at the
//! operation level: each staggered operation is issued once per logical
//! iteration within the group, while unstaggered operations (those outside
//! the stagger window) are issued once per group. This breaks the
//! result-to-operand dependency chain of reductions without software
//! unrolling.
//!
//! ```text
//! 3 ops (a b c), 4 iterations, stagger 2, stagger window {a, b}:
//!   group 0: a0 a1 b0 b1 c
//!   group 1: a2 a3 b2 b3 c
//! ```
//!
//! The run driver is iterator-shaped rather than instruction-shaped: the
//! body closure receives (operation index, logical iteration) pairs in
//! hardware issue order, so kernels and tests observe exactly the sequence
//! the repeat unit would produce.

/// Configuration of one repeat block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatConfig {
    /// Operations in the repeated sequence.
    op_count: u32,
    /// Logical iterations of the whole sequence.
    iterations: u32,
    /// Interleave group size (1 = plain repetition).
    stagger: u32,
    /// Which operations participate in staggering; bit i covers operation
    /// i. Ignored when `stagger` is 1.
    stagger_mask: u32,
}

impl RepeatConfig {
    /// A plain repeat block: `op_count` operations issued `iterations`
    /// times, no interleaving.
    pub fn new(op_count: u32, iterations: u32) -> Self {
        assert!(op_count >= 1, "repeat block needs at least one operation");
        assert!(iterations >= 1, "repeat block needs at least one iteration");
        Self { op_count, iterations, stagger: 1, stagger_mask: 0 }
    }

    /// Interleave groups of `stagger` logical iterations over the
    /// operations selected by `stagger_mask`.
    ///
    /// The iteration count must divide evenly into stagger groups.
    pub fn with_stagger(mut self, stagger: u32, stagger_mask: u32) -> Self {
        assert!(stagger >= 1, "stagger must be at least 1");
        assert!(
            self.iterations % stagger == 0,
            "iterations ({}) must be a multiple of the stagger ({})",
            self.iterations,
            stagger
        );
        self.stagger = stagger;
        self.stagger_mask = stagger_mask;
        self
    }

    /// Operations in the repeated sequence.
    pub fn op_count(&self) -> u32 {
        self.op_count
    }

    /// Logical iterations.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Total operation issues the block produces.
    pub fn issue_count(&self) -> u64 {
        let groups = (self.iterations / self.stagger) as u64;
        let mut per_group = 0u64;
        for op in 0..self.op_count {
            per_group += if self.is_staggered(op) { self.stagger as u64 } else { 1 };
        }
        groups * per_group
    }

    fn is_staggered(&self, op: u32) -> bool {
        self.stagger > 1 && self.stagger_mask & (1 << op) != 0
    }

    /// Drive `body` with (operation, logical iteration) pairs in hardware
    /// issue order.
    pub fn run<F>(&self, mut body: F)
    where
        F: FnMut(u32, u32),
    {
        log::trace!(
            "repeat block: {} ops x {} iterations, stagger {}",
            self.op_count,
            self.iterations,
            self.stagger
        );
        let groups = self.iterations / self.stagger;
        for group in 0..groups {
            let first_iter = group * self.stagger;
            for op in 0..self.op_count {
                if self.is_staggered(op) {
                    for lane in 0..self.stagger {
                        body(op, first_iter + lane);
                    }
                } else {
                    body(op, first_iter);
                }
            }
        }
    }
}
