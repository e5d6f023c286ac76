//! Checkpoint scheduling.
//!
//! Converts policy fractions into the iteration indices where a switch
//! decision is mandatory. Iterations in between run without one.

use serde::Serialize;

/// Slack absorbed before rounding up, so 0.1 * 30 lands on 3 and not 4.
const ROUNDING_SLACK: f64 = 1e-9;

/// Sorted, de-duplicated checkpoint indices for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointSchedule {
    indices: Vec<u32>,
}

impl CheckpointSchedule {
    /// Computes the schedule for `max_iterations`.
    ///
    /// Each fraction is rounded up to the next whole iteration, clamped to
    /// `[1, max_iterations]`; duplicates collapse and the final iteration is
    /// always included.
    #[must_use]
    pub fn compute(max_iterations: u32, fractions: &[f64]) -> Self {
        let max_iterations = max_iterations.max(1);
        let mut indices: Vec<u32> = fractions
            .iter()
            .filter(|f| f.is_finite() && **f > 0.0)
            .map(|f| {
                let raw = (f * f64::from(max_iterations) - ROUNDING_SLACK).ceil();
                (raw.max(1.0) as u32).min(max_iterations)
            })
            .collect();
        indices.push(max_iterations);
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// Returns `true` if `iteration` is a checkpoint.
    #[must_use]
    pub fn contains(&self, iteration: u32) -> bool {
        self.indices.binary_search(&iteration).is_ok()
    }

    /// The checkpoint indices in ascending order.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}
