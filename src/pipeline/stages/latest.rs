//! Latest1D: collapse a tick to its most recent sample.

use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{Shape, StageWiring};
use serde::{Deserialize, Serialize};

/// Exactly one output sample per tick: the last source sample, or the
/// source's previous value when it was quiet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Latest1D {
    pub src: StepFunction1D,
    pub dst: StepFunction1D,
}

impl Latest1D {
    pub fn new(src: StepFunction1D, dst: StepFunction1D) -> Self {
        Self { src, dst }
    }

    pub fn name(&self) -> &str {
        "Latest1D"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::MaxNAndX { min_length: 1 },
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_max_n_and_x(self.src, self.dst, 1);
        proxy.shrink_size_to(self.dst, 1);
    }

    pub fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let (ts, value) = match (
            proxy.timestamps(self.src).last(),
            proxy.values_x(self.src).last(),
        ) {
            (Some(&ts), Some(&value)) => (ts, value),
            _ => (
                proxy.previous_timestamp(self.src),
                proxy.previous_value_x(self.src),
            ),
        };

        let dst_ts = proxy.timestamp_axis_of(self.dst);
        let ([times], [values]) = proxy.split_columns([dst_ts], [self.dst.x])?;
        times[0] = ts;
        values[0] = value;
        Ok(())
    }
}
