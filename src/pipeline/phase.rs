//! Pipeline phase arithmetic.
//!
//! With a pipeline of stages 0..D over K work items and a ring of N buffer
//! slots, stage `s` processes work item `i - s` during global iteration
//! `i`, using slot `(i - s) % N`. The window in which a stage is active and
//! the slot it holds are pure functions of `(stage, iteration)`; nothing is
//! stored or updated per iteration, so drift between stages is impossible
//! by construction.
//!
//! ```text
//! K = 4 work items, N = 2 slots:
//! iteration   0    1    2    3    4    5
//! stage 0    w0@0 w1@1 w2@0 w3@1  -    -
//! stage 1     -   w0@0 w1@1 w2@0 w3@1  -
//! stage 2     -    -   w0@0 w1@1 w2@0 w3@1
//! ```
//!
//! Whether a ring is deep enough for the stages that share it is checked by
//! simulating the whole run and looking for two stages holding the same
//! slot in the same iteration, not by a closed-form depth inequality; the
//! simulation result names the colliding iteration and stages, so a failed
//! check is a diagnostic rather than a boolean.

/// What a stage is doing in a given global iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// The stage's window has not opened yet or is already past.
    Inactive,
    /// The stage holds this ring slot.
    Active(usize),
}

impl SlotState {
    /// The held slot, if any.
    pub fn slot(&self) -> Option<usize> {
        match self {
            Self::Inactive => None,
            Self::Active(slot) => Some(*slot),
        }
    }
}

/// Stage `stage`'s state in global iteration `iteration`, for `work_items`
/// total items over a ring of `buffer_count` slots.
pub fn slot_for_stage(
    stage: usize,
    iteration: u64,
    work_items: u64,
    buffer_count: usize,
) -> SlotState {
    debug_assert!(buffer_count >= 1, "ring needs at least one slot");
    let s = stage as u64;
    if iteration < s || iteration >= work_items + s {
        return SlotState::Inactive;
    }
    SlotState::Active(((iteration - s) % buffer_count as u64) as usize)
}

/// Global iterations needed to drain a pipeline of the given depth over
/// `work_items` items: the last stage finishes item `work_items - 1` in
/// iteration `work_items - 1 + depth`.
pub fn total_iterations(work_items: u64, depth: usize) -> u64 {
    work_items + depth as u64
}

/// Two stages holding the same ring slot in the same iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCollision {
    pub iteration: u64,
    pub slot: usize,
    pub stages: (usize, usize),
}

/// Check that the stages sharing one ring never hold the same slot at the
/// same time over a whole run.
pub fn stages_disjoint(
    stages: &[usize],
    work_items: u64,
    buffer_count: usize,
) -> Result<(), SlotCollision> {
    let depth = stages.iter().copied().max().unwrap_or(0);
    for iteration in 0..total_iterations(work_items, depth) {
        for (i, &a) in stages.iter().enumerate() {
            for &b in &stages[i + 1..] {
                let (sa, sb) = (
                    slot_for_stage(a, iteration, work_items, buffer_count),
                    slot_for_stage(b, iteration, work_items, buffer_count),
                );
                if let (SlotState::Active(slot_a), SlotState::Active(slot_b)) = (sa, sb) {
                    if slot_a == slot_b {
                        return Err(SlotCollision {
                            iteration,
                            slot: slot_a,
                            stages: (a, b),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_windows() {
        // Stage 1 over 3 items: active exactly in iterations 1..4.
        assert_eq!(slot_for_stage(1, 0, 3, 2), SlotState::Inactive);
        assert_eq!(slot_for_stage(1, 1, 3, 2), SlotState::Active(0));
        assert_eq!(slot_for_stage(1, 2, 3, 2), SlotState::Active(1));
        assert_eq!(slot_for_stage(1, 3, 3, 2), SlotState::Active(0));
        assert_eq!(slot_for_stage(1, 4, 3, 2), SlotState::Inactive);
    }

    #[test]
    fn test_adjacent_stages_never_share_a_slot() {
        // Producer one iteration ahead of consumer: any ring of 2+ slots
        // keeps them apart.
        for buffers in 2..=4 {
            assert_eq!(stages_disjoint(&[0, 1], 100, buffers), Ok(()));
        }
    }

    #[test]
    fn test_single_slot_ring_collides() {
        let err = stages_disjoint(&[0, 1], 10, 1).unwrap_err();
        assert_eq!(err.slot, 0);
        assert_eq!(err.stages, (0, 1));
        // First iteration where both stages are active.
        assert_eq!(err.iteration, 1);
    }

    #[test]
    fn test_ring_shallower_than_span_collides() {
        // Stages 0 and 2 share a ring: distance 2, so 2 slots collide and
        // 3 do not.
        assert!(stages_disjoint(&[0, 2], 50, 2).is_err());
        assert_eq!(stages_disjoint(&[0, 2], 50, 3), Ok(()));
    }

    #[test]
    fn test_three_stages_on_one_ring() {
        assert!(stages_disjoint(&[0, 1, 2], 20, 2).is_err());
        assert!(stages_disjoint(&[0, 1, 2], 20, 3).is_ok());
    }

    #[test]
    fn test_total_iterations() {
        assert_eq!(total_iterations(10, 2), 12);
        assert_eq!(total_iterations(1, 0), 1);
    }

    #[test]
    fn test_slot_follows_work_item_not_iteration() {
        // Every stage sees work item i in slot i % N: handoff works
        // because the slot is a function of the item, not the stage.
        for item in 0u64..8 {
            for stage in 0..3usize {
                let state = slot_for_stage(stage, item + stage as u64, 8, 3);
                assert_eq!(state, SlotState::Active((item % 3) as usize));
            }
        }
    }
}
