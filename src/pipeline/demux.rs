//! Demultiplexer seam: raw device bytes → [`DemuxedBatch`].
//!
//! Real device decoding lives outside this crate. [`RecordDemuxer`] is a
//! reference implementation over a packed little-endian record stream,
//! used by trace replay and tests:
//!
//! ```text
//! value:  tag=1 u8 | axis u32 | timestamp u64 | value f32
//! opaque: tag=2 u8 | axis u32 | timestamp u64 | len u16 | bytes[len]
//! ```

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{OpaqueAxisId, ValueAxisId};
use crate::pipeline::sample::DemuxedBatch;

/// Record tag for a float sample
pub const TAG_VALUE: u8 = 1;

/// Record tag for an opaque sample
pub const TAG_OPAQUE: u8 = 2;

/// Turns one tick's raw event bytes into demuxed samples.
///
/// `out` is cleared by the pipeline before every call.
#[cfg_attr(test, mockall::automock)]
pub trait Demuxer: Send {
    fn demux(&mut self, raw: &[u8], out: &mut DemuxedBatch) -> PipelineResult<()>;
}

/// Decoder for the packed record stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordDemuxer;

impl RecordDemuxer {
    pub fn new() -> Self {
        Self
    }
}

impl Demuxer for RecordDemuxer {
    fn demux(&mut self, raw: &[u8], out: &mut DemuxedBatch) -> PipelineResult<()> {
        let mut reader = Reader { raw, pos: 0 };

        while !reader.is_empty() {
            let start = reader.pos;
            let tag = reader.u8()?;
            match tag {
                TAG_VALUE => {
                    let axis = ValueAxisId(reader.u32()?);
                    let timestamp = reader.u64()?;
                    let value = f32::from_bits(reader.u32()?);
                    out.push_value(timestamp, axis, value);
                }
                TAG_OPAQUE => {
                    let axis = OpaqueAxisId(reader.u32()?);
                    let timestamp = reader.u64()?;
                    let len = reader.u16()? as usize;
                    let bytes = reader.take(len)?;
                    out.push_opaque(timestamp, axis, bytes);
                }
                other => {
                    return Err(PipelineError::Demux(format!(
                        "unknown record tag {} at byte {}",
                        other, start
                    )));
                }
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.raw.len()
    }

    fn take(&mut self, n: usize) -> PipelineResult<&'a [u8]> {
        let end = self.pos + n;
        let bytes = self.raw.get(self.pos..end).ok_or_else(|| {
            PipelineError::Demux(format!(
                "truncated record: need {} bytes at byte {}, stream has {}",
                n,
                self.pos,
                self.raw.len()
            ))
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> PipelineResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> PipelineResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> PipelineResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> PipelineResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> PipelineResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

/// Append one value record to `out`.
pub fn encode_value_record(out: &mut Vec<u8>, axis: ValueAxisId, timestamp: u64, value: f32) {
    out.push(TAG_VALUE);
    out.extend_from_slice(&axis.0.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append one opaque record to `out`.
pub fn encode_opaque_record(
    out: &mut Vec<u8>,
    axis: OpaqueAxisId,
    timestamp: u64,
    bytes: &[u8],
) -> PipelineResult<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        PipelineError::Demux(format!(
            "opaque record of {} bytes exceeds the {}-byte record limit",
            bytes.len(),
            u16::MAX
        ))
    })?;
    out.push(TAG_OPAQUE);
    out.extend_from_slice(&axis.0.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Seconds since startup → nanosecond timestamp. Negative times clamp to 0.
pub fn seconds_to_timestamp(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1e9).round() as u64
}
