use crate::pipeline::stage::{BuiltinStage, StageGroup};

/// Validated built-in stages in execution order.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Stages flattened group by group in [`StageGroup::ORDER`]
    pub stages: Vec<BuiltinStage>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Stage count per group, indexed by [`StageGroup::rank`]
    pub group_counts: [usize; StageGroup::ORDER.len()],

    /// Total number of built-in stages
    pub total_stages: usize,

    /// Derived value axes with a built-in producer
    pub produced_axes: usize,

    /// Derived value axes nothing in the plan writes
    pub unproduced_axes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Number of stages in one group.
    pub fn group_count(&self, group: StageGroup) -> usize {
        self.stats.group_counts[group.rank()]
    }
}
