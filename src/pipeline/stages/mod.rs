//! Built-in stage implementations and their shared kernels.
//!
//! Stateless per-sample stages (enum lookup, magnitude, processors) run
//! their loops through the `map_*` kernels below, which switch to rayon
//! chunked iteration once a slice reaches `parallel_min_len`. Stateful
//! stages (merges, accumulation, latest) walk their timelines serially.

pub mod accumulate;
pub mod enum_to_float;
pub mod latest;
pub mod max_value;
pub mod processor;
pub mod two_1ds_to_2d;
pub mod vec2_to_magnitude;

pub use accumulate::Accumulate1D;
pub use enum_to_float::EnumToFloat;
pub use latest::Latest1D;
pub use max_value::{MaxValue1D, MaxValue2D};
pub use processor::{Curve, Processor1D, Processor2D, Processor3D, ValueRange};
pub use two_1ds_to_2d::Two1DsTo2D;
pub use vec2_to_magnitude::Vec2ToMagnitude;

use crate::config::ExecutionSettings;
use crate::error::Result;
use crate::pipeline::stage::{BuiltinStage, StageGroup};
use crate::scripting::ScriptEngine;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Smallest rayon chunk handed to one task.
const MIN_CHUNK: usize = 64;

/// Largest rayon chunk handed to one task.
const MAX_CHUNK: usize = 4096;

// ==================== Stage groups ====================

/// Configured stage instances, one list per built-in group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageGroups {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_to_float: Vec<EnumToFloat>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub two_1ds_to_2d: Vec<Two1DsTo2D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vec2_to_magnitude: Vec<Vec2ToMagnitude>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processor_1d: Vec<Processor1D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processor_2d: Vec<Processor2D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processor_3d: Vec<Processor3D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accumulate_1d: Vec<Accumulate1D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latest_1d: Vec<Latest1D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max_value_1d: Vec<MaxValue1D>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max_value_2d: Vec<MaxValue2D>,
}

impl StageGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of configured stages in one group.
    pub fn group_len(&self, group: StageGroup) -> usize {
        match group {
            StageGroup::EnumToFloat => self.enum_to_float.len(),
            StageGroup::Two1DsTo2D => self.two_1ds_to_2d.len(),
            StageGroup::Vec2ToMagnitude => self.vec2_to_magnitude.len(),
            StageGroup::Processor1D => self.processor_1d.len(),
            StageGroup::Processor2D => self.processor_2d.len(),
            StageGroup::Processor3D => self.processor_3d.len(),
            StageGroup::Accumulate1D => self.accumulate_1d.len(),
            StageGroup::Latest1D => self.latest_1d.len(),
            StageGroup::MaxValue1D => self.max_value_1d.len(),
            StageGroup::MaxValue2D => self.max_value_2d.len(),
        }
    }

    /// Total number of configured stages.
    pub fn len(&self) -> usize {
        StageGroup::ORDER.iter().map(|&g| self.group_len(g)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compile every script curve. Returns the number of scripts compiled.
    pub fn compile_scripts(&mut self, engine: &ScriptEngine) -> Result<usize> {
        let mut compiled = 0;
        for (i, stage) in self.processor_1d.iter_mut().enumerate() {
            if stage.compile_script(engine, i)? {
                compiled += 1;
            }
        }
        Ok(compiled)
    }

    /// Flatten into execution order.
    pub fn into_ordered(self) -> Vec<BuiltinStage> {
        let mut stages = Vec::with_capacity(self.len());
        stages.extend(self.enum_to_float.into_iter().map(BuiltinStage::EnumToFloat));
        stages.extend(self.two_1ds_to_2d.into_iter().map(BuiltinStage::Two1DsTo2D));
        stages.extend(self.vec2_to_magnitude.into_iter().map(BuiltinStage::Vec2ToMagnitude));
        stages.extend(self.processor_1d.into_iter().map(BuiltinStage::Processor1D));
        stages.extend(self.processor_2d.into_iter().map(BuiltinStage::Processor2D));
        stages.extend(self.processor_3d.into_iter().map(BuiltinStage::Processor3D));
        stages.extend(self.accumulate_1d.into_iter().map(BuiltinStage::Accumulate1D));
        stages.extend(self.latest_1d.into_iter().map(BuiltinStage::Latest1D));
        stages.extend(self.max_value_1d.into_iter().map(BuiltinStage::MaxValue1D));
        stages.extend(self.max_value_2d.into_iter().map(BuiltinStage::MaxValue2D));
        stages
    }
}

// ==================== Per-sample kernels ====================

/// Chunk size for a slice of `len` elements.
///
/// Targets four chunks per rayon thread, clamped to `[64, 4096]`.
pub fn optimal_chunk_size(len: usize) -> usize {
    let threads = rayon::current_num_threads().max(1);
    (len / (threads * 4)).clamp(MIN_CHUNK, MAX_CHUNK)
}

/// `dst[i] = f(src[i])`.
pub(crate) fn map_1d<F>(settings: &ExecutionSettings, src: &[f32], dst: &mut [f32], f: F)
where
    F: Fn(f32) -> f32 + Sync,
{
    crate::invariant!(
        src.len() == dst.len(),
        "map_1d over {} inputs and {} outputs",
        src.len(),
        dst.len()
    );

    if settings.use_parallel(dst.len()) {
        let chunk = optimal_chunk_size(dst.len());
        dst.par_chunks_mut(chunk)
            .zip(src.par_chunks(chunk))
            .for_each(|(d, s)| {
                for (d, s) in d.iter_mut().zip(s) {
                    *d = f(*s);
                }
            });
    } else {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = f(*s);
        }
    }
}

/// `dst[i] = f(x[i], y[i])`.
pub(crate) fn map_2d_to_1d<F>(
    settings: &ExecutionSettings,
    [x, y]: [&[f32]; 2],
    dst: &mut [f32],
    f: F,
) where
    F: Fn(f32, f32) -> f32 + Sync,
{
    crate::invariant!(
        x.len() == dst.len() && y.len() == dst.len(),
        "map_2d_to_1d over {}/{} inputs and {} outputs",
        x.len(),
        y.len(),
        dst.len()
    );

    if settings.use_parallel(dst.len()) {
        let chunk = optimal_chunk_size(dst.len());
        dst.par_chunks_mut(chunk)
            .zip(x.par_chunks(chunk))
            .zip(y.par_chunks(chunk))
            .for_each(|((d, x), y)| {
                for i in 0..d.len() {
                    d[i] = f(x[i], y[i]);
                }
            });
    } else {
        for i in 0..dst.len() {
            dst[i] = f(x[i], y[i]);
        }
    }
}

/// `(dx[i], dy[i]) = f([sx[i], sy[i]])`.
pub(crate) fn map_2d<F>(
    settings: &ExecutionSettings,
    [sx, sy]: [&[f32]; 2],
    [dx, dy]: [&mut [f32]; 2],
    f: F,
) where
    F: Fn([f32; 2]) -> [f32; 2] + Sync,
{
    let len = dx.len();
    crate::invariant!(
        sx.len() == len && sy.len() == len && dy.len() == len,
        "map_2d over mismatched slices"
    );

    let apply = |dx: &mut [f32], dy: &mut [f32], sx: &[f32], sy: &[f32]| {
        for i in 0..dx.len() {
            let [x, y] = f([sx[i], sy[i]]);
            dx[i] = x;
            dy[i] = y;
        }
    };

    if settings.use_parallel(len) {
        let chunk = optimal_chunk_size(len);
        dx.par_chunks_mut(chunk)
            .zip(dy.par_chunks_mut(chunk))
            .zip(sx.par_chunks(chunk))
            .zip(sy.par_chunks(chunk))
            .for_each(|(((dx, dy), sx), sy)| apply(dx, dy, sx, sy));
    } else {
        apply(dx, dy, sx, sy);
    }
}

/// `(dx[i], dy[i], dz[i]) = f([sx[i], sy[i], sz[i]])`.
pub(crate) fn map_3d<F>(
    settings: &ExecutionSettings,
    [sx, sy, sz]: [&[f32]; 3],
    [dx, dy, dz]: [&mut [f32]; 3],
    f: F,
) where
    F: Fn([f32; 3]) -> [f32; 3] + Sync,
{
    let len = dx.len();
    crate::invariant!(
        sx.len() == len && sy.len() == len && sz.len() == len && dy.len() == len && dz.len() == len,
        "map_3d over mismatched slices"
    );

    let apply = |dx: &mut [f32], dy: &mut [f32], dz: &mut [f32], sx: &[f32], sy: &[f32], sz: &[f32]| {
        for i in 0..dx.len() {
            let [x, y, z] = f([sx[i], sy[i], sz[i]]);
            dx[i] = x;
            dy[i] = y;
            dz[i] = z;
        }
    };

    if settings.use_parallel(len) {
        let chunk = optimal_chunk_size(len);
        dx.par_chunks_mut(chunk)
            .zip(dy.par_chunks_mut(chunk))
            .zip(dz.par_chunks_mut(chunk))
            .zip(sx.par_chunks(chunk))
            .zip(sy.par_chunks(chunk))
            .zip(sz.par_chunks(chunk))
            .for_each(|(((((dx, dy), dz), sx), sy), sz)| apply(dx, dy, dz, sx, sy, sz));
    } else {
        apply(dx, dy, dz, sx, sy, sz);
    }
}

// ==================== Timeline merge ====================

/// Which source produced a merged sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeSide {
    First(usize),
    Second(usize),
}

/// Merge two timestamp-ordered timelines into `out`.
///
/// `visit(k, side)` is called for every output position in order; on equal
/// timestamps the first timeline wins.
pub(crate) fn merge_timelines<F>(first: &[u64], second: &[u64], out: &mut [u64], mut visit: F)
where
    F: FnMut(usize, MergeSide),
{
    crate::invariant!(
        out.len() == first.len() + second.len(),
        "merging {} + {} samples into {} slots",
        first.len(),
        second.len(),
        out.len()
    );

    let (mut i, mut j) = (0, 0);
    for (k, slot) in out.iter_mut().enumerate() {
        let take_first = j == second.len() || (i < first.len() && first[i] <= second[j]);
        if take_first {
            *slot = first[i];
            visit(k, MergeSide::First(i));
            i += 1;
        } else {
            *slot = second[j];
            visit(k, MergeSide::Second(j));
            j += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{StepFunction1D, StepFunction2D};
    use crate::pipeline::id::ValueAxisId;

    #[test]
    fn test_chunk_size_bounds() {
        assert_eq!(optimal_chunk_size(0), MIN_CHUNK);
        assert_eq!(optimal_chunk_size(usize::MAX / 2), MAX_CHUNK);
    }

    #[test]
    fn test_map_1d_serial_and_parallel_agree() {
        let src: Vec<f32> = (0..10_000).map(|i| i as f32).collect();
        let mut serial = vec![0.0; src.len()];
        let mut parallel = vec![0.0; src.len()];

        map_1d(&ExecutionSettings::serial(), &src, &mut serial, |v| v * 0.5 + 1.0);
        let settings = ExecutionSettings {
            parallel_min_len: 1,
            ..Default::default()
        };
        map_1d(&settings, &src, &mut parallel, |v| v * 0.5 + 1.0);

        assert_eq!(serial, parallel);
        assert_eq!(serial[10], 6.0);
    }

    #[test]
    fn test_map_2d_parallel() {
        let sx: Vec<f32> = (0..5000).map(|i| i as f32).collect();
        let sy: Vec<f32> = (0..5000).map(|i| -(i as f32)).collect();
        let mut dx = vec![0.0; 5000];
        let mut dy = vec![0.0; 5000];
        let settings = ExecutionSettings {
            parallel_min_len: 1,
            ..Default::default()
        };
        map_2d(&settings, [&sx, &sy], [&mut dx, &mut dy], |[x, y]| [y, x]);
        assert_eq!(dx[42], -42.0);
        assert_eq!(dy[42], 42.0);
    }

    #[test]
    fn test_merge_prefers_first_on_ties() {
        let mut out = [0u64; 5];
        let mut sides = Vec::new();
        merge_timelines(&[10, 20, 30], &[20, 25], &mut out, |_, side| sides.push(side));
        assert_eq!(out, [10, 20, 20, 25, 30]);
        assert_eq!(
            sides,
            vec![
                MergeSide::First(0),
                MergeSide::First(1),
                MergeSide::Second(0),
                MergeSide::Second(1),
                MergeSide::First(2),
            ]
        );
    }

    #[test]
    fn test_merge_with_empty_side() {
        let mut out = [0u64; 2];
        let mut count = 0;
        merge_timelines(&[], &[1, 2], &mut out, |_, side| {
            assert!(matches!(side, MergeSide::Second(_)));
            count += 1;
        });
        assert_eq!(count, 2);
        merge_timelines(&[], &[], &mut [], |_, _| unreachable!());
    }

    #[test]
    fn test_groups_flatten_in_order() {
        let a = StepFunction1D::new(ValueAxisId(0));
        let b = StepFunction1D::new(ValueAxisId(1));
        let mut groups = StageGroups::new();
        groups.latest_1d.push(Latest1D::new(a, b));
        groups.two_1ds_to_2d.push(Two1DsTo2D::new(
            a,
            b,
            StepFunction2D::new(ValueAxisId(2), ValueAxisId(3)),
        ));
        groups.enum_to_float.push(EnumToFloat::new(a, b, vec![0.0, 1.0]));
        assert_eq!(groups.len(), 3);

        let order: Vec<StageGroup> = groups.into_ordered().iter().map(|s| s.group()).collect();
        assert_eq!(
            order,
            vec![StageGroup::EnumToFloat, StageGroup::Two1DsTo2D, StageGroup::Latest1D]
        );
    }
}
