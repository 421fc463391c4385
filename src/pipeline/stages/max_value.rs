//! MaxValue1D / MaxValue2D: resolve two bindings of the same control.
//!
//! When two devices drive one control (left stick and d-pad both steering),
//! the destination follows the merged timeline of both and reports whichever
//! source currently has the larger magnitude. Ties go to the first source.

use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D, StepFunction2D};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{Shape, StageWiring};
use crate::pipeline::stages::{merge_timelines, MergeSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxValue1D {
    pub src1: StepFunction1D,
    pub src2: StepFunction1D,
    pub dst: StepFunction1D,
}

impl MaxValue1D {
    pub fn new(src1: StepFunction1D, src2: StepFunction1D, dst: StepFunction1D) -> Self {
        Self { src1, src2, dst }
    }

    pub fn name(&self) -> &str {
        "MaxValue1D"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src1.step_function(), self.src2.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NPlusM,
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_and_m_to_n_plus_m(self.src1, self.src2, self.dst);
    }

    pub fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let mut a = proxy.previous_value_x(self.src1);
        let mut b = proxy.previous_value_x(self.src2);
        let ts1 = proxy.timestamp_axis_of(self.src1);
        let ts2 = proxy.timestamp_axis_of(self.src2);
        let ts_dst = proxy.timestamp_axis_of(self.dst);

        let ([times1, times2, times_out], [xs1, xs2, out]) = proxy
            .split_columns([ts1, ts2, ts_dst], [self.src1.x, self.src2.x, self.dst.x])?;

        merge_timelines(times1, times2, times_out, |k, side| {
            match side {
                MergeSide::First(i) => a = xs1[i],
                MergeSide::Second(j) => b = xs2[j],
            }
            out[k] = pick_larger(a, b);
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxValue2D {
    pub src1: StepFunction2D,
    pub src2: StepFunction2D,
    pub dst: StepFunction2D,
}

impl MaxValue2D {
    pub fn new(src1: StepFunction2D, src2: StepFunction2D, dst: StepFunction2D) -> Self {
        Self { src1, src2, dst }
    }

    pub fn name(&self) -> &str {
        "MaxValue2D"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src1.step_function(), self.src2.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NPlusM,
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_and_m_to_n_plus_m(self.src1, self.src2, self.dst);
    }

    pub fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let mut a = [
            proxy.previous_value_x(self.src1),
            proxy.previous_value_y(self.src1),
        ];
        let mut b = [
            proxy.previous_value_x(self.src2),
            proxy.previous_value_y(self.src2),
        ];
        let ts1 = proxy.timestamp_axis_of(self.src1);
        let ts2 = proxy.timestamp_axis_of(self.src2);
        let ts_dst = proxy.timestamp_axis_of(self.dst);

        let ([times1, times2, times_out], [x1, y1, x2, y2, out_x, out_y]) = proxy.split_columns(
            [ts1, ts2, ts_dst],
            [
                self.src1.x,
                self.src1.y,
                self.src2.x,
                self.src2.y,
                self.dst.x,
                self.dst.y,
            ],
        )?;

        merge_timelines(times1, times2, times_out, |k, side| {
            match side {
                MergeSide::First(i) => a = [x1[i], y1[i]],
                MergeSide::Second(j) => b = [x2[j], y2[j]],
            }
            let [x, y] = pick_larger_vec(a, b);
            out_x[k] = x;
            out_y[k] = y;
        });
        Ok(())
    }
}

/// `a` unless `b` is strictly larger in magnitude. NaN never wins.
pub fn pick_larger(a: f32, b: f32) -> f32 {
    if b.abs() > a.abs() || a.is_nan() && !b.is_nan() {
        b
    } else {
        a
    }
}

pub fn pick_larger_vec(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    let ma = a[0].hypot(a[1]);
    let mb = b[0].hypot(b[1]);
    if mb > ma || ma.is_nan() && !mb.is_nan() {
        b
    } else {
        a
    }
}
