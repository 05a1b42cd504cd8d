//! Interview phase from graph size.
//!
//! Only the node count decides the phase. Orphan count plays no part: a
//! sparse graph must still be able to reach `late`.

use ladder_common::{Phase, PhaseThresholds};

pub fn determine_phase(node_count: usize, early_max: usize, mid_max: usize) -> Phase {
    if node_count < early_max {
        Phase::Early
    } else if node_count < mid_max {
        Phase::Mid
    } else {
        Phase::Late
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDetector {
    thresholds: PhaseThresholds,
}

impl PhaseDetector {
    pub fn new(thresholds: PhaseThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(&self, node_count: usize) -> Phase {
        determine_phase(node_count, self.thresholds.early_max, self.thresholds.mid_max)
    }

    /// Share of the way to `late`, in [0, 1].
    pub fn progress(&self, node_count: usize) -> f64 {
        if self.thresholds.mid_max == 0 {
            return 1.0;
        }
        (node_count as f64 / self.thresholds.mid_max as f64).clamp(0.0, 1.0)
    }
}
