//! Stage abstraction for the ingress pipeline.
//!
//! Two-layer design:
//! - **`PipelineStage` trait**: for stages supplied from outside the crate
//!   (action or interaction layers hooking into the seams).
//! - **`BuiltinStage` enum**: for the built-in stage catalogue. Dispatch is
//!   a `match`, with no dynamic dispatch on the hot path.
//!
//! `AnyStage` wraps either variant so the executor can run both uniformly.

use crate::config::ExecutionSettings;
use crate::dataset::{Dataset, DatasetProxy, StepFunction};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stages::{
    Accumulate1D, EnumToFloat, Latest1D, MaxValue1D, MaxValue2D, Processor1D, Processor2D,
    Processor3D, Two1DsTo2D, Vec2ToMagnitude,
};
use std::fmt;

/// Trait for externally supplied stages.
///
/// `map` may only declare lengths through the proxy's shape operations;
/// `execute` reads input slices (and previous values) and writes output
/// slices.
pub trait PipelineStage: Send + Sync {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Declare output lengths for this tick.
    fn map(&self, proxy: &mut DatasetProxy<'_>);

    /// Compute output values for this tick.
    fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()>;
}

/// Read-only hook called after every successful tick.
pub trait TickObserver: Send {
    fn on_tick(&mut self, tick: u64, dataset: &Dataset);
}

/// Where an external stage runs relative to the built-in groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seam {
    /// Map and Execute before every built-in stage.
    BeforeMap,
    /// Map after the built-in Map pass (before AoS→SoA), Execute after the
    /// built-in Execute pass.
    AfterMap,
}

/// Built-in stage groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageGroup {
    EnumToFloat,
    Two1DsTo2D,
    Vec2ToMagnitude,
    Processor1D,
    Processor2D,
    Processor3D,
    Accumulate1D,
    Latest1D,
    MaxValue1D,
    MaxValue2D,
}

impl StageGroup {
    /// Execution order. Later groups consume axes produced by earlier ones.
    pub const ORDER: [StageGroup; 10] = [
        StageGroup::EnumToFloat,
        StageGroup::Two1DsTo2D,
        StageGroup::Vec2ToMagnitude,
        StageGroup::Processor1D,
        StageGroup::Processor2D,
        StageGroup::Processor3D,
        StageGroup::Accumulate1D,
        StageGroup::Latest1D,
        StageGroup::MaxValue1D,
        StageGroup::MaxValue2D,
    ];

    /// Position in [`StageGroup::ORDER`].
    pub fn rank(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            StageGroup::EnumToFloat => "EnumToFloat",
            StageGroup::Two1DsTo2D => "Two1DsTo2D",
            StageGroup::Vec2ToMagnitude => "Vec2ToMagnitude",
            StageGroup::Processor1D => "Processor1D",
            StageGroup::Processor2D => "Processor2D",
            StageGroup::Processor3D => "Processor3D",
            StageGroup::Accumulate1D => "Accumulate1D",
            StageGroup::Latest1D => "Latest1D",
            StageGroup::MaxValue1D => "MaxValue1D",
            StageGroup::MaxValue2D => "MaxValue2D",
        }
    }
}

impl fmt::Display for StageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage sizes its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Destination shares the source timestamp axis.
    NToN,
    /// Destination owns a timestamp axis sized `max(n, min_length)`.
    MaxNAndX { min_length: usize },
    /// Destination owns a timestamp axis holding two merged timelines.
    NPlusM,
}

/// Static description of a stage's axis usage, for plan validation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageWiring {
    pub reads: Vec<StepFunction>,
    pub writes: Vec<StepFunction>,
    pub shape: Shape,
}

/// Enum dispatch for built-in stages.
#[derive(Debug, Clone)]
pub enum BuiltinStage {
    EnumToFloat(EnumToFloat),
    Two1DsTo2D(Two1DsTo2D),
    Vec2ToMagnitude(Vec2ToMagnitude),
    Processor1D(Processor1D),
    Processor2D(Processor2D),
    Processor3D(Processor3D),
    Accumulate1D(Accumulate1D),
    Latest1D(Latest1D),
    MaxValue1D(MaxValue1D),
    MaxValue2D(MaxValue2D),
}

impl BuiltinStage {
    pub fn group(&self) -> StageGroup {
        match self {
            BuiltinStage::EnumToFloat(_) => StageGroup::EnumToFloat,
            BuiltinStage::Two1DsTo2D(_) => StageGroup::Two1DsTo2D,
            BuiltinStage::Vec2ToMagnitude(_) => StageGroup::Vec2ToMagnitude,
            BuiltinStage::Processor1D(_) => StageGroup::Processor1D,
            BuiltinStage::Processor2D(_) => StageGroup::Processor2D,
            BuiltinStage::Processor3D(_) => StageGroup::Processor3D,
            BuiltinStage::Accumulate1D(_) => StageGroup::Accumulate1D,
            BuiltinStage::Latest1D(_) => StageGroup::Latest1D,
            BuiltinStage::MaxValue1D(_) => StageGroup::MaxValue1D,
            BuiltinStage::MaxValue2D(_) => StageGroup::MaxValue2D,
        }
    }

    pub fn name(&self) -> &str {
        self.group().name()
    }

    pub fn wiring(&self) -> StageWiring {
        match self {
            BuiltinStage::EnumToFloat(s) => s.wiring(),
            BuiltinStage::Two1DsTo2D(s) => s.wiring(),
            BuiltinStage::Vec2ToMagnitude(s) => s.wiring(),
            BuiltinStage::Processor1D(s) => s.wiring(),
            BuiltinStage::Processor2D(s) => s.wiring(),
            BuiltinStage::Processor3D(s) => s.wiring(),
            BuiltinStage::Accumulate1D(s) => s.wiring(),
            BuiltinStage::Latest1D(s) => s.wiring(),
            BuiltinStage::MaxValue1D(s) => s.wiring(),
            BuiltinStage::MaxValue2D(s) => s.wiring(),
        }
    }

    /// Parameter checks beyond wiring. Only the processors carry any.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BuiltinStage::Processor1D(s) => s.validate(),
            BuiltinStage::Processor2D(s) => s.validate(),
            BuiltinStage::Processor3D(s) => s.validate(),
            _ => Ok(()),
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        match self {
            BuiltinStage::EnumToFloat(s) => s.map(proxy),
            BuiltinStage::Two1DsTo2D(s) => s.map(proxy),
            BuiltinStage::Vec2ToMagnitude(s) => s.map(proxy),
            BuiltinStage::Processor1D(s) => s.map(proxy),
            BuiltinStage::Processor2D(s) => s.map(proxy),
            BuiltinStage::Processor3D(s) => s.map(proxy),
            BuiltinStage::Accumulate1D(s) => s.map(proxy),
            BuiltinStage::Latest1D(s) => s.map(proxy),
            BuiltinStage::MaxValue1D(s) => s.map(proxy),
            BuiltinStage::MaxValue2D(s) => s.map(proxy),
        }
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        match self {
            BuiltinStage::EnumToFloat(s) => s.execute(proxy, settings),
            BuiltinStage::Two1DsTo2D(s) => s.execute(proxy),
            BuiltinStage::Vec2ToMagnitude(s) => s.execute(proxy, settings),
            BuiltinStage::Processor1D(s) => s.execute(proxy, settings),
            BuiltinStage::Processor2D(s) => s.execute(proxy, settings),
            BuiltinStage::Processor3D(s) => s.execute(proxy, settings),
            BuiltinStage::Accumulate1D(s) => s.execute(proxy),
            BuiltinStage::Latest1D(s) => s.execute(proxy),
            BuiltinStage::MaxValue1D(s) => s.execute(proxy),
            BuiltinStage::MaxValue2D(s) => s.execute(proxy),
        }
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or an
/// external stage (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    External(Box<dyn PipelineStage>),
}

impl AnyStage {
    pub fn name(&self) -> &str {
        match self {
            AnyStage::Builtin(s) => s.name(),
            AnyStage::External(s) => s.name(),
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        match self {
            AnyStage::Builtin(s) => s.map(proxy),
            AnyStage::External(s) => s.map(proxy),
        }
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        match self {
            AnyStage::Builtin(s) => s.execute(proxy, settings),
            AnyStage::External(s) => s.execute(proxy),
        }
    }
}

impl fmt::Debug for AnyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyStage::Builtin(s) => f.debug_tuple("Builtin").field(s).finish(),
            AnyStage::External(s) => f.debug_tuple("External").field(&s.name()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_matches_rank() {
        for (i, group) in StageGroup::ORDER.iter().enumerate() {
            assert_eq!(group.rank(), i);
        }
        assert!(StageGroup::Vec2ToMagnitude < StageGroup::Accumulate1D);
    }

    #[test]
    fn test_group_names() {
        assert_eq!(StageGroup::Two1DsTo2D.to_string(), "Two1DsTo2D");
        assert_eq!(StageGroup::MaxValue2D.name(), "MaxValue2D");
    }
}
