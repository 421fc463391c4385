//! Columnar per-tick dataset.
//!
//! The [`Dataset`] owns the axis tables and three backing buffers
//! (timestamps, float values, opaque bytes). Every tick it:
//!
//! 1. records each axis' last value as its previous value and counts the
//!    incoming samples per timestamp axis ([`Dataset::calculate_ingress_lengths`]),
//! 2. lets stages declare derived lengths through a [`DatasetProxy`],
//! 3. lays every axis out contiguously by prefix sum and scatters the
//!    samples into place ([`Dataset::aos_to_soa`]).
//!
//! ```text
//! timestamps: [ ts axis 0 ][ ts axis 1 ][ ts axis 2 ] ...
//! values:     [ value 0 (len of ts 0) ][ value 1 (len of its ts) ] ...
//! opaque:     [ opaque 0 (len * stride bytes) ] ...
//! ```
//!
//! Reads go through step functions and are sliced at
//! `[start_offset, start_offset + length)` of the owning timestamp axis.

pub mod axis;
pub mod buffer;
pub mod proxy;
pub mod step_function;

pub use axis::{AxisTables, AxisTotals, OpaqueAxis, TimestampAxis, ValueAxis};
pub use buffer::{split_disjoint_mut, ColumnBuffer};
pub use proxy::DatasetProxy;
pub use step_function::{
    AsStepFunction, Quat, StepFunction, StepFunction1D, StepFunction2D, StepFunction3D,
    StepFunctionInt, StepFunctionOpaque, StepFunctionQuaternion, StepFunctionTyped,
};

use crate::config::{AxisLayout, CapacityLimits};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{OpaqueAxisId, TimestampAxisId, ValueAxisId};
use crate::pipeline::sample::DemuxedBatch;
use bytemuck::Pod;
use std::ops::Range;

/// Sole owner of all axis tables and columnar buffers.
#[derive(Debug, Clone)]
pub struct Dataset {
    tables: AxisTables,
    timestamps: ColumnBuffer<u64>,
    values: ColumnBuffer<f32>,
    opaque: ColumnBuffer<u8>,
    max_samples_per_tick: usize,
    /// Scratch row for timestamp order validation, one slot per timestamp axis.
    last_ingress_timestamp: Vec<Option<u64>>,
    /// Offsets and lengths describe in-bounds slices of the buffers.
    consistent: bool,
    /// Between `calculate_ingress_lengths` and `commit_tick`/`discard_tick`.
    tick_open: bool,
}

impl Dataset {
    /// Build the axis tables for `layout`.
    pub fn new(layout: &AxisLayout, limits: &CapacityLimits) -> PipelineResult<Self> {
        let timestamp_count = layout.timestamp_axes as usize;
        let mut timestamps = vec![TimestampAxis::default(); timestamp_count];
        let mut ingress_members = vec![0usize; timestamp_count];

        let mut values = Vec::with_capacity(layout.values.len());
        for (i, cfg) in layout.values.iter().enumerate() {
            let ts = cfg.timestamp_axis;
            if ts.index() >= timestamp_count {
                return Err(PipelineError::Config(format!(
                    "value axis {} references timestamp axis {} but only {} exist",
                    i, ts.0, timestamp_count
                )));
            }
            if !cfg.derived {
                ingress_members[ts.index()] += 1;
                timestamps[ts.index()].ingress = true;
            }
            values.push(ValueAxis {
                timestamp_axis: ts,
                start_offset: 0,
                write_cursor: 0,
                previous: cfg.initial_previous,
                ingress: !cfg.derived,
            });
        }

        let mut opaque = Vec::with_capacity(layout.opaque.len());
        let mut previous_bytes = 0usize;
        for (i, cfg) in layout.opaque.iter().enumerate() {
            let ts = cfg.timestamp_axis;
            if ts.index() >= timestamp_count {
                return Err(PipelineError::Config(format!(
                    "opaque axis {} references timestamp axis {} but only {} exist",
                    i, ts.0, timestamp_count
                )));
            }
            if cfg.stride == 0 {
                return Err(PipelineError::Config(format!(
                    "opaque axis {} has a zero stride",
                    i
                )));
            }
            if !cfg.derived {
                ingress_members[ts.index()] += 1;
                timestamps[ts.index()].ingress = true;
            }
            let stride = cfg.stride as usize;
            opaque.push(OpaqueAxis {
                timestamp_axis: ts,
                stride,
                start_offset: 0,
                write_cursor: 0,
                previous_offset: previous_bytes,
                ingress: !cfg.derived,
            });
            previous_bytes += stride;
        }

        if let Some((ts, count)) = ingress_members
            .iter()
            .enumerate()
            .find(|(_, &count)| count > 1)
        {
            return Err(PipelineError::Wiring(format!(
                "timestamp axis {} has {} ingress axes; at most one may receive demuxed samples",
                ts, count
            )));
        }

        tracing::debug!(
            "Dataset layout: {} timestamp axes, {} value axes, {} opaque axes",
            timestamp_count,
            values.len(),
            opaque.len()
        );

        Ok(Self {
            tables: AxisTables {
                timestamps,
                values,
                opaque,
                opaque_previous: vec![0; previous_bytes],
            },
            timestamps: ColumnBuffer::new("timestamps", limits.max_timestamps),
            values: ColumnBuffer::new("values", limits.max_values),
            opaque: ColumnBuffer::new("opaque", limits.max_opaque_bytes),
            max_samples_per_tick: limits.max_samples_per_tick,
            last_ingress_timestamp: vec![None; timestamp_count],
            consistent: true,
            tick_open: false,
        })
    }

    // ── Tick phases ──

    /// Check a batch before any per-tick state is touched.
    ///
    /// Rejects batches over the per-tick sample limit, samples routed to
    /// unknown or derived axes, opaque records whose size differs from the
    /// axis stride and, when `check_order` is set, samples whose timestamp
    /// goes backwards on their axis.
    pub fn validate_batch(&mut self, batch: &DemuxedBatch, check_order: bool) -> PipelineResult<()> {
        if batch.len() > self.max_samples_per_tick {
            return Err(PipelineError::Capacity {
                buffer: "samples",
                requested: batch.len(),
                limit: self.max_samples_per_tick,
            });
        }

        if check_order {
            self.last_ingress_timestamp.fill(None);
        }

        for (index, sample) in batch.samples.iter().enumerate() {
            let axis = self.tables.values.get(sample.axis.index()).ok_or_else(|| {
                PipelineError::MalformedSample {
                    index,
                    message: format!("unknown value axis {}", sample.axis.0),
                }
            })?;
            if !axis.ingress {
                return Err(PipelineError::MalformedSample {
                    index,
                    message: format!(
                        "value axis {} is derived and cannot receive samples",
                        sample.axis.0
                    ),
                });
            }
            if check_order {
                check_order_on(
                    &mut self.last_ingress_timestamp,
                    axis.timestamp_axis,
                    sample.timestamp,
                    index,
                )?;
            }
        }

        let value_count = batch.samples.len();
        for (i, sample) in batch.opaque.iter().enumerate() {
            let index = value_count + i;
            let axis = self.tables.opaque.get(sample.axis.index()).ok_or_else(|| {
                PipelineError::MalformedSample {
                    index,
                    message: format!("unknown opaque axis {}", sample.axis.0),
                }
            })?;
            if !axis.ingress {
                return Err(PipelineError::MalformedSample {
                    index,
                    message: format!(
                        "opaque axis {} is derived and cannot receive samples",
                        sample.axis.0
                    ),
                });
            }
            if sample.blob_len as usize != axis.stride {
                return Err(PipelineError::MalformedSample {
                    index,
                    message: format!(
                        "opaque record of {} bytes on axis {} with stride {}",
                        sample.blob_len, sample.axis.0, axis.stride
                    ),
                });
            }
            if batch.opaque_bytes(sample).is_none() {
                return Err(PipelineError::MalformedSample {
                    index,
                    message: format!(
                        "record bytes {:?} lie outside the {}-byte batch blob",
                        sample.blob_range(),
                        batch.blob.len()
                    ),
                });
            }
            if check_order {
                check_order_on(
                    &mut self.last_ingress_timestamp,
                    axis.timestamp_axis,
                    sample.timestamp,
                    index,
                )?;
            }
        }

        Ok(())
    }

    /// Carry last values over and count this tick's samples per timestamp axis.
    ///
    /// `batch` must have passed [`Dataset::validate_batch`].
    pub fn calculate_ingress_lengths(&mut self, batch: &DemuxedBatch) {
        // Previous values must be captured before lengths are reset.
        self.capture_previous_values();
        self.consistent = false;
        self.tick_open = true;
        self.tables.clear_lengths();

        for sample in &batch.samples {
            let ts = self.tables.values[sample.axis.index()].timestamp_axis;
            let axis = &mut self.tables.timestamps[ts.index()];
            axis.length += 1;
            axis.max_length += 1;
        }
        for sample in &batch.opaque {
            let ts = self.tables.opaque[sample.axis.index()].timestamp_axis;
            let axis = &mut self.tables.timestamps[ts.index()];
            axis.length += 1;
            axis.max_length += 1;
        }
    }

    /// Lay the axes out contiguously and scatter `batch` into the buffers.
    ///
    /// Samples are written in their batch order, so that order becomes the
    /// in-buffer order of each axis. Fails without writing anything when
    /// the computed totals exceed a buffer limit.
    pub fn aos_to_soa(&mut self, batch: &DemuxedBatch) -> PipelineResult<()> {
        self.timestamps.clear();
        self.values.clear();
        self.opaque.clear();

        let totals = self.tables.assign_start_offsets();
        self.timestamps.resize_to_fit(totals.timestamps)?;
        self.values.resize_to_fit(totals.values)?;
        self.opaque.resize_to_fit(totals.opaque_bytes)?;
        self.tables.reset_write_cursors();

        let timestamps = self.timestamps.as_mut_slice();
        let values = self.values.as_mut_slice();
        let opaque = self.opaque.as_mut_slice();

        for sample in &batch.samples {
            let value_axis = &mut self.tables.values[sample.axis.index()];
            let ts_axis = &mut self.tables.timestamps[value_axis.timestamp_axis.index()];
            crate::invariant!(
                ts_axis.write_cursor < ts_axis.start_offset + ts_axis.length,
                "timestamp axis {} overflowed its {} slots; was an ingress axis resized during Map?",
                value_axis.timestamp_axis,
                ts_axis.length
            );

            values[value_axis.write_cursor] = sample.value;
            value_axis.write_cursor += 1;
            timestamps[ts_axis.write_cursor] = sample.timestamp;
            ts_axis.write_cursor += 1;
        }

        for sample in &batch.opaque {
            let opaque_axis = &mut self.tables.opaque[sample.axis.index()];
            let ts_axis = &mut self.tables.timestamps[opaque_axis.timestamp_axis.index()];
            crate::invariant!(
                ts_axis.write_cursor < ts_axis.start_offset + ts_axis.length,
                "timestamp axis {} overflowed its {} slots; was an ingress axis resized during Map?",
                opaque_axis.timestamp_axis,
                ts_axis.length
            );

            let cursor = opaque_axis.write_cursor;
            opaque[cursor..cursor + opaque_axis.stride]
                .copy_from_slice(&batch.blob[sample.blob_range()]);
            opaque_axis.write_cursor += opaque_axis.stride;
            timestamps[ts_axis.write_cursor] = sample.timestamp;
            ts_axis.write_cursor += 1;
        }

        // Second pass over the lengths: the layout must be unchanged and
        // every ingress axis filled exactly.
        let restored = self.tables.assign_start_offsets();
        crate::invariant!(
            restored == totals,
            "axis totals changed during conversion: {:?} vs {:?}",
            restored,
            totals
        );
        for (i, axis) in self.tables.timestamps.iter().enumerate() {
            crate::invariant!(
                !axis.ingress || axis.write_cursor == axis.start_offset + axis.length,
                "ingress timestamp axis {} filled {} of {} slots",
                i,
                axis.write_cursor - axis.start_offset,
                axis.length
            );
        }

        self.consistent = true;
        Ok(())
    }

    /// Drop every slice of the current tick.
    ///
    /// Previous values keep what the last completed tick left, so the next
    /// tick carries over as if this one had no samples at all.
    pub fn discard_tick(&mut self) {
        // A tick rejected before it opened leaves the last committed tick in
        // the buffers; keep its last values before dropping it.
        if !self.tick_open {
            self.capture_previous_values();
        }
        self.tick_open = false;
        self.tables.clear_lengths();
        self.tables.assign_start_offsets();
        self.tables.reset_write_cursors();
        self.timestamps.clear();
        self.values.clear();
        self.opaque.clear();
        self.consistent = true;
    }

    /// Mark the current tick complete. Its values become the carry-over
    /// source should a later tick be rejected before it opens.
    pub fn commit_tick(&mut self) {
        self.tick_open = false;
    }

    /// Record each axis' last value of the buffered tick as its previous
    /// value. Axes without samples keep theirs.
    fn capture_previous_values(&mut self) {
        if !self.consistent {
            return;
        }

        let timestamps = self.timestamps.as_slice();
        for axis in &mut self.tables.timestamps {
            if axis.length > 0 {
                axis.previous = timestamps[axis.start_offset + axis.length - 1];
            }
        }

        let values = self.values.as_slice();
        for axis in &mut self.tables.values {
            let length = self.tables.timestamps[axis.timestamp_axis.index()].length;
            if length > 0 {
                axis.previous = values[axis.start_offset + length - 1];
            }
        }

        let opaque = self.opaque.as_slice();
        for axis in &self.tables.opaque {
            let length = self.tables.timestamps[axis.timestamp_axis.index()].length;
            if length > 0 {
                let last = axis.start_offset + (length - 1) * axis.stride;
                self.tables.opaque_previous
                    [axis.previous_offset..axis.previous_offset + axis.stride]
                    .copy_from_slice(&opaque[last..last + axis.stride]);
            }
        }
    }

    /// Create the per-tick stage view.
    pub fn proxy(&mut self) -> DatasetProxy<'_> {
        DatasetProxy::new(self)
    }

    // ── Invariants ──

    /// Assert that all channels of `sf` share one timestamp axis.
    pub fn sanity_check<S: AsStepFunction>(&self, sf: S) {
        let sf = sf.step_function();
        crate::invariant!(sf.dimensions <= 3, "step function with {} dimensions", sf.dimensions);

        if sf.is_opaque() {
            let axis = self.opaque_row(sf.opaque);
            crate::invariant!(
                axis.stride == sf.stride as usize,
                "step function {} expects stride {} but opaque axis {} has stride {}",
                sf,
                sf.stride,
                sf.opaque.0,
                axis.stride
            );
            return;
        }

        let ts = self.value_row(sf.x()).timestamp_axis;
        for &axis in &sf.value_axes()[1..] {
            let other = self.value_row(axis).timestamp_axis;
            crate::invariant!(
                other == ts,
                "step function {} mixes timestamp axes {} and {}",
                sf,
                ts,
                other
            );
        }
    }

    // ── Read accessors ──

    /// Timestamp axis the channels of `sf` are aligned to.
    pub fn timestamp_axis_of<S: AsStepFunction>(&self, sf: S) -> TimestampAxisId {
        let sf = sf.step_function();
        if sf.is_opaque() {
            self.opaque_row(sf.opaque).timestamp_axis
        } else {
            self.value_row(sf.x()).timestamp_axis
        }
    }

    /// Samples of `sf` this tick.
    pub fn length<S: AsStepFunction>(&self, sf: S) -> usize {
        self.sanity_check(sf);
        self.tables.timestamps[self.timestamp_axis_of(sf).index()].length
    }

    pub fn max_length<S: AsStepFunction>(&self, sf: S) -> usize {
        self.sanity_check(sf);
        self.tables.timestamps[self.timestamp_axis_of(sf).index()].max_length
    }

    pub fn timestamps<S: AsStepFunction>(&self, sf: S) -> &[u64] {
        self.sanity_check(sf);
        let range = self.timestamp_range(self.timestamp_axis_of(sf));
        self.timestamps.slice(range)
    }

    pub fn previous_timestamp<S: AsStepFunction>(&self, sf: S) -> u64 {
        self.sanity_check(sf);
        self.tables.timestamps[self.timestamp_axis_of(sf).index()].previous
    }

    pub fn values_x<S: AsStepFunction>(&self, sf: S) -> &[f32] {
        self.channel_values(sf, 0)
    }

    pub fn values_y<S: AsStepFunction>(&self, sf: S) -> &[f32] {
        self.channel_values(sf, 1)
    }

    pub fn values_z<S: AsStepFunction>(&self, sf: S) -> &[f32] {
        self.channel_values(sf, 2)
    }

    pub fn previous_value_x<S: AsStepFunction>(&self, sf: S) -> f32 {
        self.channel_previous(sf, 0)
    }

    pub fn previous_value_y<S: AsStepFunction>(&self, sf: S) -> f32 {
        self.channel_previous(sf, 1)
    }

    pub fn previous_value_z<S: AsStepFunction>(&self, sf: S) -> f32 {
        self.channel_previous(sf, 2)
    }

    /// Raw record bytes of an opaque step function (`length * stride` bytes).
    pub fn values_opaque<S: AsStepFunction>(&self, sf: S) -> &[u8] {
        let desc = sf.step_function();
        crate::invariant!(desc.is_opaque(), "values_opaque on {}", desc);
        self.sanity_check(desc);
        self.opaque.slice(self.opaque_range(desc.opaque))
    }

    /// Records of an opaque step function decoded as `T`.
    pub fn values_opaque_as<T: Pod, S: AsStepFunction>(
        &self,
        sf: S,
    ) -> impl ExactSizeIterator<Item = T> + '_ {
        let desc = sf.step_function();
        assert_record_type::<T>(desc.stride);
        self.values_opaque(desc)
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
    }

    /// Last record of the most recent tick that had samples (zeroed before the first).
    pub fn previous_value_opaque<S: AsStepFunction>(&self, sf: S) -> &[u8] {
        let desc = sf.step_function();
        crate::invariant!(desc.is_opaque(), "previous_value_opaque on {}", desc);
        self.sanity_check(desc);
        let axis = self.opaque_row(desc.opaque);
        &self.tables.opaque_previous[axis.previous_offset..axis.previous_offset + axis.stride]
    }

    pub fn previous_value_opaque_as<T: Pod, S: AsStepFunction>(&self, sf: S) -> T {
        let desc = sf.step_function();
        assert_record_type::<T>(desc.stride);
        bytemuck::pod_read_unaligned(self.previous_value_opaque(desc))
    }

    // ── Table inspection ──

    pub fn timestamp_axis_count(&self) -> usize {
        self.tables.timestamps.len()
    }

    pub fn value_axis_count(&self) -> usize {
        self.tables.values.len()
    }

    pub fn opaque_axis_count(&self) -> usize {
        self.tables.opaque.len()
    }

    pub fn timestamp_axis(&self, id: TimestampAxisId) -> &TimestampAxis {
        &self.tables.timestamps[id.index()]
    }

    pub fn value_axis(&self, id: ValueAxisId) -> &ValueAxis {
        self.value_row(id)
    }

    pub fn opaque_axis(&self, id: OpaqueAxisId) -> &OpaqueAxis {
        self.opaque_row(id)
    }

    /// Entries used in the timestamp buffer this tick.
    pub fn total_timestamps(&self) -> usize {
        self.timestamps.len()
    }

    pub fn total_values(&self) -> usize {
        self.values.len()
    }

    pub fn total_opaque_bytes(&self) -> usize {
        self.opaque.len()
    }

    /// Whether offsets and lengths currently describe the buffers.
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    // ── Internals shared with the proxy ──

    fn value_row(&self, id: ValueAxisId) -> &ValueAxis {
        crate::invariant!(
            id.index() < self.tables.values.len(),
            "unknown value axis {}",
            id
        );
        &self.tables.values[id.index()]
    }

    fn opaque_row(&self, id: OpaqueAxisId) -> &OpaqueAxis {
        crate::invariant!(
            id.index() < self.tables.opaque.len(),
            "unknown opaque axis {}",
            id
        );
        &self.tables.opaque[id.index()]
    }

    pub(crate) fn timestamp_range(&self, id: TimestampAxisId) -> Range<usize> {
        self.tables.timestamps[id.index()].range()
    }

    pub(crate) fn value_range(&self, id: ValueAxisId) -> Range<usize> {
        let axis = self.value_row(id);
        let length = self.tables.value_length(axis);
        axis.start_offset..axis.start_offset + length
    }

    pub(crate) fn opaque_range(&self, id: OpaqueAxisId) -> Range<usize> {
        let axis = self.opaque_row(id);
        let length = self.tables.timestamps[axis.timestamp_axis.index()].length;
        axis.start_offset..axis.start_offset + length * axis.stride
    }

    fn channel_values<S: AsStepFunction>(&self, sf: S, channel: usize) -> &[f32] {
        let desc = sf.step_function();
        crate::invariant!(
            usize::from(desc.dimensions) > channel,
            "reading channel {} of {}-dimensional step function {}",
            channel_name(channel),
            desc.dimensions,
            desc
        );
        self.sanity_check(desc);
        self.values.slice(self.value_range(desc.channels[channel]))
    }

    fn channel_previous<S: AsStepFunction>(&self, sf: S, channel: usize) -> f32 {
        let desc = sf.step_function();
        crate::invariant!(
            usize::from(desc.dimensions) > channel,
            "reading previous {} of {}-dimensional step function {}",
            channel_name(channel),
            desc.dimensions,
            desc
        );
        self.sanity_check(desc);
        self.value_row(desc.channels[channel]).previous
    }
}

fn check_order_on(
    last: &mut [Option<u64>],
    ts: TimestampAxisId,
    timestamp: u64,
    index: usize,
) -> PipelineResult<()> {
    let slot = &mut last[ts.index()];
    if let Some(previous) = *slot {
        if timestamp < previous {
            return Err(PipelineError::MalformedSample {
                index,
                message: format!(
                    "timestamp {} precedes {} on timestamp axis {}",
                    timestamp, previous, ts.0
                ),
            });
        }
    }
    *slot = Some(timestamp);
    Ok(())
}

fn assert_record_type<T>(stride: u32) {
    crate::invariant!(
        std::mem::size_of::<T>() == stride as usize && stride > 0,
        "record type {} is {} bytes but the step function stride is {}",
        std::any::type_name::<T>(),
        std::mem::size_of::<T>(),
        stride
    );
}

fn channel_name(channel: usize) -> &'static str {
    match channel {
        0 => "X",
        1 => "Y",
        _ => "Z",
    }
}
