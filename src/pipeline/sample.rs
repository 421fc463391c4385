//! Demuxed samples: the per-tick input of the dataset.
//!
//! A `DemuxedBatch` is owned by the pipeline and reused every tick. After
//! the first few ticks its vectors have grown to the working-set size and
//! no further heap allocation happens on the hot path.

use crate::pipeline::id::{OpaqueAxisId, ValueAxisId};

/// One float sample routed to a value axis.
#[derive(Clone, Copy, PartialEq)]
#[repr(C)]
pub struct DemuxedSample {
    /// Nanoseconds since startup.
    pub timestamp: u64,
    pub axis: ValueAxisId,
    pub value: f32,
}

impl DemuxedSample {
    pub fn new(timestamp: u64, axis: ValueAxisId, value: f32) -> Self {
        Self {
            timestamp,
            axis,
            value,
        }
    }
}

impl std::fmt::Debug for DemuxedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemuxedSample")
            .field("timestamp", &self.timestamp)
            .field("axis", &self.axis)
            .field("value", &self.value)
            .finish()
    }
}

/// One fixed-stride record routed to an opaque axis. The bytes live in
/// the owning batch's blob at `blob_offset..blob_offset + blob_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueSample {
    pub timestamp: u64,
    pub axis: OpaqueAxisId,
    pub blob_offset: u32,
    pub blob_len: u32,
}

impl OpaqueSample {
    #[inline]
    pub fn blob_range(&self) -> std::ops::Range<usize> {
        let start = self.blob_offset as usize;
        start..start + self.blob_len as usize
    }
}

/// All samples produced by one demux pass.
///
/// Order within `samples` (and within `opaque`) is arrival order and
/// becomes the in-buffer order of each axis.
#[derive(Debug, Clone, Default)]
pub struct DemuxedBatch {
    pub samples: Vec<DemuxedSample>,
    pub opaque: Vec<OpaqueSample>,
    pub blob: Vec<u8>,
}

impl DemuxedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear for reuse, keeping allocations.
    #[inline]
    pub fn clear(&mut self) {
        self.samples.clear();
        self.opaque.clear();
        self.blob.clear();
    }

    #[inline]
    pub fn push_value(&mut self, timestamp: u64, axis: ValueAxisId, value: f32) {
        self.samples.push(DemuxedSample::new(timestamp, axis, value));
    }

    /// Append an opaque record, copying `bytes` into the batch blob.
    pub fn push_opaque(&mut self, timestamp: u64, axis: OpaqueAxisId, bytes: &[u8]) {
        let blob_offset = self.blob.len() as u32;
        self.blob.extend_from_slice(bytes);
        self.opaque.push(OpaqueSample {
            timestamp,
            axis,
            blob_offset,
            blob_len: bytes.len() as u32,
        });
    }

    /// Total number of samples, value and opaque.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len() + self.opaque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.opaque.is_empty()
    }

    /// Bytes of an opaque sample, if its range lies inside the blob.
    pub fn opaque_bytes(&self, sample: &OpaqueSample) -> Option<&[u8]> {
        self.blob.get(sample.blob_range())
    }
}
