//! EnumToFloat: lookup-table quantization of discrete device states.
//!
//! Device enums (hat switch directions, gear selectors, tri-state buttons)
//! arrive as whole numbers stored in floats. This stage rounds each sample,
//! offsets it by `base` and looks the result up in `lut`. Anything outside
//! the table maps to `fallback`.

use crate::config::ExecutionSettings;
use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{Shape, StageWiring};
use crate::pipeline::stages::map_1d;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumToFloat {
    pub src: StepFunction1D,
    pub dst: StepFunction1D,

    /// Output value for enum values `base`, `base + 1`, ...
    pub lut: Vec<f32>,

    #[serde(default)]
    pub base: i32,

    /// Output for values outside the table.
    #[serde(default)]
    pub fallback: f32,
}

impl EnumToFloat {
    pub fn new(src: StepFunction1D, dst: StepFunction1D, lut: Vec<f32>) -> Self {
        Self {
            src,
            dst,
            lut,
            base: 0,
            fallback: 0.0,
        }
    }

    pub fn with_base(mut self, base: i32) -> Self {
        self.base = base;
        self
    }

    pub fn with_fallback(mut self, fallback: f32) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn name(&self) -> &str {
        "EnumToFloat"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NToN,
        }
    }

    /// Table value for one raw sample.
    pub fn lookup(&self, raw: f32) -> f32 {
        if !raw.is_finite() {
            return self.fallback;
        }
        let index = raw.round() as i64 - i64::from(self.base);
        usize::try_from(index)
            .ok()
            .and_then(|i| self.lut.get(i))
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        let [src, dst] = proxy.split_values([self.src.x, self.dst.x])?;
        map_1d(settings, src, dst, |raw| self.lookup(raw));
        Ok(())
    }
}
