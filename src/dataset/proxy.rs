//! Per-tick stage view over a [`Dataset`].
//!
//! A `DatasetProxy` borrows the dataset mutably for one tick. During Map,
//! stages declare derived lengths with the shape operations; during
//! Execute they carve disjoint mutable slices out of the buffers. Reads go
//! through `Deref<Target = Dataset>`.

use super::buffer::split_disjoint_mut;
use super::step_function::AsStepFunction;
use super::Dataset;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::{TimestampAxisId, ValueAxisId};
use bytemuck::Pod;
use std::ops::Deref;

/// Mutable, tick-scoped view handed to every stage call.
pub struct DatasetProxy<'a> {
    dataset: &'a mut Dataset,
}

impl<'a> DatasetProxy<'a> {
    pub(super) fn new(dataset: &'a mut Dataset) -> Self {
        Self { dataset }
    }

    /// Shorter-lived proxy for passing into a single stage call.
    pub fn reborrow(&mut self) -> DatasetProxy<'_> {
        DatasetProxy {
            dataset: &mut *self.dataset,
        }
    }

    // ==================== Shape operations (Map phase) ====================

    /// Parallel remap: `dst` shares `src`'s timestamp axis and so its length.
    pub fn map_n_to_n<S: AsStepFunction, D: AsStepFunction>(&mut self, src: S, dst: D) -> usize {
        self.dataset.sanity_check(src);
        self.dataset.sanity_check(dst);
        let src_ts = self.dataset.timestamp_axis_of(src);
        let dst_ts = self.dataset.timestamp_axis_of(dst);
        crate::invariant!(
            src_ts == dst_ts,
            "map_n_to_n needs a shared timestamp axis, got {} and {}",
            src_ts,
            dst_ts
        );

        let axis = &self.dataset.tables.timestamps[src_ts.index()];
        crate::invariant!(
            axis.length <= axis.max_length,
            "{} has length {} above its max length {}",
            src_ts,
            axis.length,
            axis.max_length
        );
        axis.length
    }

    /// Size `dst`'s own timestamp axis to `max(src.length, min_length)`.
    pub fn map_n_to_max_n_and_x<S: AsStepFunction, D: AsStepFunction>(
        &mut self,
        src: S,
        dst: D,
        min_length: usize,
    ) -> usize {
        self.dataset.sanity_check(src);
        self.dataset.sanity_check(dst);
        let src_ts = self.dataset.timestamp_axis_of(src);
        let dst_ts = self.dataset.timestamp_axis_of(dst);
        crate::invariant!(
            src_ts != dst_ts,
            "map_n_to_max_n_and_x needs distinct timestamp axes, both are {}",
            src_ts
        );

        let length = self.dataset.tables.timestamps[src_ts.index()]
            .length
            .max(min_length);
        let axis = &mut self.dataset.tables.timestamps[dst_ts.index()];
        axis.length = length;
        axis.max_length = length;
        length
    }

    /// Size `dst`'s timestamp axis to hold both source timelines.
    ///
    /// Returns the two source lengths.
    pub fn map_n_and_m_to_n_plus_m<S1, S2, D>(&mut self, src1: S1, src2: S2, dst: D) -> (usize, usize)
    where
        S1: AsStepFunction,
        S2: AsStepFunction,
        D: AsStepFunction,
    {
        self.dataset.sanity_check(src1);
        self.dataset.sanity_check(src2);
        self.dataset.sanity_check(dst);
        let ts1 = self.dataset.timestamp_axis_of(src1);
        let ts2 = self.dataset.timestamp_axis_of(src2);
        let dst_ts = self.dataset.timestamp_axis_of(dst);
        crate::invariant!(
            dst_ts != ts1 && dst_ts != ts2,
            "merge destination {} must not share a source timestamp axis ({}, {})",
            dst_ts,
            ts1,
            ts2
        );

        let a = self.dataset.tables.timestamps[ts1.index()];
        let b = self.dataset.tables.timestamps[ts2.index()];
        let axis = &mut self.dataset.tables.timestamps[dst_ts.index()];
        axis.length = a.length + b.length;
        axis.max_length = a.max_length + b.max_length;
        (a.length, b.length)
    }

    /// Truncate `sf`'s timestamp axis, length and max length both. Never grows.
    pub fn shrink_size_to<S: AsStepFunction>(&mut self, sf: S, new_length: usize) {
        self.dataset.sanity_check(sf);
        let ts = self.dataset.timestamp_axis_of(sf);
        let axis = &mut self.dataset.tables.timestamps[ts.index()];
        crate::invariant!(
            new_length <= axis.length && new_length <= axis.max_length,
            "shrink_size_to({}) on {} with length {} and max length {}",
            new_length,
            ts,
            axis.length,
            axis.max_length
        );
        axis.length = new_length;
        axis.max_length = new_length;
    }

    // ==================== Write access (Execute phase) ====================

    /// Disjoint mutable slices of several value axes.
    ///
    /// Source axes may be included and read through the returned slice.
    pub fn split_values<const N: usize>(
        &mut self,
        axes: [ValueAxisId; N],
    ) -> PipelineResult<[&mut [f32]; N]> {
        let ranges = axes.map(|a| self.dataset.value_range(a));
        split_disjoint_mut(self.dataset.values.as_mut_slice(), ranges)
    }

    /// Timestamp and value slices at once, for stages that synthesize
    /// their own timeline.
    #[allow(clippy::type_complexity)]
    pub fn split_columns<const T: usize, const V: usize>(
        &mut self,
        timestamp_axes: [TimestampAxisId; T],
        value_axes: [ValueAxisId; V],
    ) -> PipelineResult<([&mut [u64]; T], [&mut [f32]; V])> {
        let ts_ranges = timestamp_axes.map(|a| self.dataset.timestamp_range(a));
        let value_ranges = value_axes.map(|a| self.dataset.value_range(a));
        let timestamps = split_disjoint_mut(self.dataset.timestamps.as_mut_slice(), ts_ranges)?;
        let values = split_disjoint_mut(self.dataset.values.as_mut_slice(), value_ranges)?;
        Ok((timestamps, values))
    }

    pub fn timestamps_mut<S: AsStepFunction>(&mut self, sf: S) -> &mut [u64] {
        self.dataset.sanity_check(sf);
        let range = self.dataset.timestamp_range(self.dataset.timestamp_axis_of(sf));
        self.dataset.timestamps.slice_mut(range)
    }

    pub fn values_x_mut<S: AsStepFunction>(&mut self, sf: S) -> &mut [f32] {
        self.channel_mut(sf, 0)
    }

    pub fn values_y_mut<S: AsStepFunction>(&mut self, sf: S) -> &mut [f32] {
        self.channel_mut(sf, 1)
    }

    pub fn values_z_mut<S: AsStepFunction>(&mut self, sf: S) -> &mut [f32] {
        self.channel_mut(sf, 2)
    }

    /// Raw bytes of an opaque axis this tick.
    pub fn values_opaque_mut<S: AsStepFunction>(&mut self, sf: S) -> &mut [u8] {
        let desc = sf.step_function();
        crate::invariant!(desc.is_opaque(), "values_opaque_mut on {}", desc);
        self.dataset.sanity_check(desc);
        let range = self.dataset.opaque_range(desc.opaque);
        self.dataset.opaque.slice_mut(range)
    }

    /// Overwrite record `index` of an opaque axis with `value`.
    pub fn write_opaque_as<T: Pod, S: AsStepFunction>(&mut self, sf: S, index: usize, value: &T) {
        let stride = std::mem::size_of::<T>();
        let desc = sf.step_function();
        crate::invariant!(
            desc.stride as usize == stride,
            "writing {}-byte {} to {}",
            stride,
            std::any::type_name::<T>(),
            desc
        );
        let bytes = self.values_opaque_mut(desc);
        bytes[index * stride..(index + 1) * stride].copy_from_slice(bytemuck::bytes_of(value));
    }

    fn channel_mut<S: AsStepFunction>(&mut self, sf: S, channel: usize) -> &mut [f32] {
        let desc = sf.step_function();
        crate::invariant!(
            usize::from(desc.dimensions) > channel,
            "writing channel {} of {}-dimensional step function {}",
            channel,
            desc.dimensions,
            desc
        );
        self.dataset.sanity_check(desc);
        let range = self.dataset.value_range(desc.channels[channel]);
        self.dataset.values.slice_mut(range)
    }
}

impl Deref for DatasetProxy<'_> {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        self.dataset
    }
}
