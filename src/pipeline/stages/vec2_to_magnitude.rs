//! Vec2ToMagnitude: length of a 2-vector.

use crate::config::ExecutionSettings;
use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D, StepFunction2D};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{Shape, StageWiring};
use crate::pipeline::stages::map_2d_to_1d;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vec2ToMagnitude {
    pub src: StepFunction2D,
    pub dst: StepFunction1D,
}

impl Vec2ToMagnitude {
    pub fn new(src: StepFunction2D, dst: StepFunction1D) -> Self {
        Self { src, dst }
    }

    pub fn name(&self) -> &str {
        "Vec2ToMagnitude"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NToN,
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        let [x, y, dst] = proxy.split_values([self.src.x, self.src.y, self.dst.x])?;
        map_2d_to_1d(settings, [&*x, &*y], dst, f32::hypot);
        Ok(())
    }
}
