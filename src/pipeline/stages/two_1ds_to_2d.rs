//! Two1DsTo2D: compose two scalar axes into one 2-vector.
//!
//! The X and Y sources arrive on independent timelines (a stick reports
//! each axis as its own control). The destination timeline is the merge of
//! both; every output sample carries the latest X and the latest Y known
//! at that instant. Before a source's first sample in a tick, its previous
//! value stands in.

use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D, StepFunction2D};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{Shape, StageWiring};
use crate::pipeline::stages::{merge_timelines, MergeSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Two1DsTo2D {
    pub src_x: StepFunction1D,
    pub src_y: StepFunction1D,
    pub dst: StepFunction2D,
}

impl Two1DsTo2D {
    pub fn new(src_x: StepFunction1D, src_y: StepFunction1D, dst: StepFunction2D) -> Self {
        Self { src_x, src_y, dst }
    }

    pub fn name(&self) -> &str {
        "Two1DsTo2D"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src_x.step_function(), self.src_y.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NPlusM,
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_and_m_to_n_plus_m(self.src_x, self.src_y, self.dst);
    }

    pub fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let mut x = proxy.previous_value_x(self.src_x);
        let mut y = proxy.previous_value_x(self.src_y);
        let ts_x = proxy.timestamp_axis_of(self.src_x);
        let ts_y = proxy.timestamp_axis_of(self.src_y);
        let ts_dst = proxy.timestamp_axis_of(self.dst);

        let ([times_x, times_y, times_out], [xs, ys, out_x, out_y]) = proxy.split_columns(
            [ts_x, ts_y, ts_dst],
            [self.src_x.x, self.src_y.x, self.dst.x, self.dst.y],
        )?;

        merge_timelines(times_x, times_y, times_out, |k, side| {
            match side {
                MergeSide::First(i) => x = xs[i],
                MergeSide::Second(j) => y = ys[j],
            }
            out_x[k] = x;
            out_y[k] = y;
        });

        tracing::trace!(
            "Two1DsTo2D merged {} + {} samples",
            times_x.len(),
            times_y.len()
        );
        Ok(())
    }
}
