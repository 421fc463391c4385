//! Test data builders for layouts and batches

use inputflow::config::AxisLayout;
use inputflow::pipeline::{
    encode_opaque_record, encode_value_record, DemuxedBatch, OpaqueAxisId, TimestampAxisId,
    ValueAxisId,
};

/// Builder for axis layouts with named axes
#[derive(Default)]
pub struct LayoutBuilder {
    layout: AxisLayout,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(&mut self) -> TimestampAxisId {
        self.layout.add_timestamp_axis()
    }

    pub fn ingress(&mut self, name: &str, ts: TimestampAxisId) -> ValueAxisId {
        let id = self.layout.add_ingress_value(ts);
        self.layout.name_value(id, name);
        id
    }

    pub fn derived(&mut self, name: &str, ts: TimestampAxisId) -> ValueAxisId {
        let id = self.layout.add_derived_value(ts);
        self.layout.name_value(id, name);
        id
    }

    pub fn opaque(&mut self, name: &str, ts: TimestampAxisId, stride: u32) -> OpaqueAxisId {
        let id = self.layout.add_ingress_opaque(ts, stride);
        self.layout.opaque[id.index()].name = Some(name.to_string());
        id
    }

    pub fn previous(&mut self, axis: ValueAxisId, value: f32) -> &mut Self {
        self.layout.set_initial_previous(axis, value);
        self
    }

    pub fn build(self) -> AxisLayout {
        self.layout
    }
}

/// Builder for one tick of samples, as a batch or as raw record bytes
#[derive(Default)]
pub struct BatchBuilder {
    values: Vec<(u64, ValueAxisId, f32)>,
    opaque: Vec<(u64, OpaqueAxisId, Vec<u8>)>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, ts: u64, axis: ValueAxisId, value: f32) -> Self {
        self.values.push((ts, axis, value));
        self
    }

    /// Several samples of one axis
    pub fn series(mut self, axis: ValueAxisId, samples: &[(u64, f32)]) -> Self {
        for &(ts, v) in samples {
            self.values.push((ts, axis, v));
        }
        self
    }

    pub fn opaque(mut self, ts: u64, axis: OpaqueAxisId, bytes: &[u8]) -> Self {
        self.opaque.push((ts, axis, bytes.to_vec()));
        self
    }

    pub fn build(&self) -> DemuxedBatch {
        let mut batch = DemuxedBatch::new();
        for &(ts, axis, v) in &self.values {
            batch.push_value(ts, axis, v);
        }
        for (ts, axis, bytes) in &self.opaque {
            batch.push_opaque(*ts, *axis, bytes);
        }
        batch
    }

    /// Record stream understood by `RecordDemuxer`
    pub fn raw(&self) -> Vec<u8> {
        let mut raw = Vec::new();
        for &(ts, axis, v) in &self.values {
            encode_value_record(&mut raw, axis, ts, v);
        }
        for (ts, axis, bytes) in &self.opaque {
            encode_opaque_record(&mut raw, *axis, *ts, bytes).unwrap();
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder() {
        let mut b = LayoutBuilder::new();
        let t0 = b.timestamp();
        let a = b.ingress("a", t0);
        b.previous(a, 2.0);
        let layout = b.build();
        assert_eq!(layout.value_axis_by_name("a"), Some(a));
        assert_eq!(layout.values[0].initial_previous, 2.0);
    }

    #[test]
    fn test_batch_builder() {
        let batch = BatchBuilder::new()
            .series(ValueAxisId(0), &[(1, 1.0), (2, 2.0)])
            .opaque(3, OpaqueAxisId(0), &[9])
            .build();
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.opaque.len(), 1);
    }
}
