//! Axis tables.
//!
//! One row per axis, indexed by the matching id newtype. Rows are created
//! once from the axis layout; only lengths, offsets, cursors and previous
//! values change from tick to tick.

use crate::pipeline::id::TimestampAxisId;

/// Per-tick bookkeeping for one timestamp axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimestampAxis {
    /// Samples on this axis this tick.
    pub length: usize,
    /// Upper bound reserved this tick.
    pub max_length: usize,
    /// Start of this axis' slice in the timestamp buffer.
    pub start_offset: usize,
    /// Next write position while scattering samples.
    pub write_cursor: usize,
    /// Last timestamp of the most recent tick that had samples.
    pub previous: u64,
    /// An ingress value or opaque axis is aligned to this axis.
    pub ingress: bool,
}

impl TimestampAxis {
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start_offset..self.start_offset + self.length
    }
}

/// A float channel aligned to one timestamp axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueAxis {
    pub timestamp_axis: TimestampAxisId,
    pub start_offset: usize,
    pub write_cursor: usize,
    /// Last value of the most recent tick that had samples.
    pub previous: f32,
    /// Receives demuxed samples; otherwise written by stages.
    pub ingress: bool,
}

/// A fixed-stride binary channel aligned to one timestamp axis.
///
/// Offsets are in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpaqueAxis {
    pub timestamp_axis: TimestampAxisId,
    pub stride: usize,
    pub start_offset: usize,
    pub write_cursor: usize,
    /// Byte offset of this axis' slot in the previous-value arena.
    pub previous_offset: usize,
    pub ingress: bool,
}

/// Running prefix sums, handed back by the offset passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisTotals {
    pub timestamps: usize,
    pub values: usize,
    pub opaque_bytes: usize,
}

/// All axis rows of a dataset.
#[derive(Debug, Clone, Default)]
pub struct AxisTables {
    pub timestamps: Vec<TimestampAxis>,
    pub values: Vec<ValueAxis>,
    pub opaque: Vec<OpaqueAxis>,
    /// `stride` bytes per opaque axis, holding its previous record.
    pub opaque_previous: Vec<u8>,
}

impl AxisTables {
    /// Assign every axis a start offset equal to the running total of the
    /// lengths of the axes before it. Value and opaque axes contribute the
    /// length of their timestamp axis.
    pub fn assign_start_offsets(&mut self) -> AxisTotals {
        let mut totals = AxisTotals::default();

        for axis in &mut self.timestamps {
            axis.start_offset = totals.timestamps;
            totals.timestamps += axis.length;
        }

        for axis in &mut self.values {
            axis.start_offset = totals.values;
            totals.values += self.timestamps[axis.timestamp_axis.index()].length;
        }

        for axis in &mut self.opaque {
            axis.start_offset = totals.opaque_bytes;
            totals.opaque_bytes += self.timestamps[axis.timestamp_axis.index()].length * axis.stride;
        }

        totals
    }

    /// Point every write cursor at its axis' start offset.
    pub fn reset_write_cursors(&mut self) {
        for axis in &mut self.timestamps {
            axis.write_cursor = axis.start_offset;
        }
        for axis in &mut self.values {
            axis.write_cursor = axis.start_offset;
        }
        for axis in &mut self.opaque {
            axis.write_cursor = axis.start_offset;
        }
    }

    /// Length of a value axis this tick (its timestamp axis' length).
    #[inline]
    pub fn value_length(&self, axis: &ValueAxis) -> usize {
        self.timestamps[axis.timestamp_axis.index()].length
    }

    /// Zero every length, keeping offsets and previous values.
    pub fn clear_lengths(&mut self) {
        for axis in &mut self.timestamps {
            axis.length = 0;
            axis.max_length = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> AxisTables {
        let ts = |length| TimestampAxis {
            length,
            max_length: length,
            ..Default::default()
        };
        let value = |t: u32| ValueAxis {
            timestamp_axis: TimestampAxisId(t),
            start_offset: 0,
            write_cursor: 0,
            previous: 0.0,
            ingress: true,
        };
        AxisTables {
            timestamps: vec![ts(2), ts(0), ts(3)],
            values: vec![value(0), value(2), value(2), value(1)],
            opaque: vec![OpaqueAxis {
                timestamp_axis: TimestampAxisId(1),
                stride: 16,
                start_offset: 0,
                write_cursor: 0,
                previous_offset: 0,
                ingress: true,
            }],
            opaque_previous: vec![0; 16],
        }
    }

    #[test]
    fn test_prefix_sums() {
        let mut tables = tables();
        let totals = tables.assign_start_offsets();

        let starts: Vec<usize> = tables.timestamps.iter().map(|a| a.start_offset).collect();
        assert_eq!(starts, vec![0, 2, 2]);
        let starts: Vec<usize> = tables.values.iter().map(|a| a.start_offset).collect();
        assert_eq!(starts, vec![0, 2, 5, 8]);
        assert_eq!(
            totals,
            AxisTotals {
                timestamps: 5,
                values: 8,
                opaque_bytes: 0,
            }
        );
    }

    #[test]
    fn test_cursor_reset_and_clear() {
        let mut tables = tables();
        tables.assign_start_offsets();
        tables.reset_write_cursors();
        assert_eq!(tables.values[2].write_cursor, 5);

        tables.clear_lengths();
        assert!(tables.timestamps.iter().all(|a| a.length == 0 && a.max_length == 0));
        assert_eq!(tables.values[2].start_offset, 5);
    }
}
