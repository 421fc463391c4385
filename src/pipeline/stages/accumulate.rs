//! Accumulate1D: running sum of a relative axis.
//!
//! Relative controls (mouse deltas, scroll wheels, encoders) report
//! movement, not position. The destination holds the running total and
//! continues from the previous tick's total. On a quiet tick it emits one
//! sample repeating the previous total so consumers always see the current
//! position.

use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{Shape, StageWiring};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulate1D {
    pub src: StepFunction1D,
    pub dst: StepFunction1D,
}

impl Accumulate1D {
    pub fn new(src: StepFunction1D, dst: StepFunction1D) -> Self {
        Self { src, dst }
    }

    pub fn name(&self) -> &str {
        "Accumulate1D"
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
    }

    pub fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let mut sum = proxy.previous_value_x(self.dst);
        let previous_ts = proxy.previous_timestamp(self.src);
        let src_ts = proxy.timestamp_axis_of(self.src);
        let dst_ts = proxy.timestamp_axis_of(self.dst);

        let ([times_in, times_out], [deltas, totals]) =
            proxy.split_columns([src_ts, dst_ts], [self.src.x, self.dst.x])?;

        if deltas.is_empty() {
            times_out[0] = previous_ts;
            totals[0] = sum;
            return Ok(());
        }

        times_out.copy_from_slice(times_in);
        for (total, delta) in totals.iter_mut().zip(deltas.iter()) {
            sum += *delta;
            *total = sum;
        }
        Ok(())
    }
}
