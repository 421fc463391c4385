//! Trace player: feeds a recorded [`InputTrace`] through a pipeline.
//!
//! Axis references are resolved against the pipeline's [`AxisLayout`] once,
//! when the player is created, and every tick is encoded into the
//! [`RecordDemuxer`](crate::pipeline::RecordDemuxer) byte stream up front.
//! Playback then hands the exact bytes a device would have sent to
//! [`IngressPipeline::run_tick`].

use crate::config::AxisLayout;
use crate::error::{InputFlowError, Result};
use crate::pipeline::demux::{encode_opaque_record, encode_value_record, seconds_to_timestamp};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::executor::{IngressPipeline, TickStats};
use crate::pipeline::id::{OpaqueAxisId, ValueAxisId};

use super::types::{AxisRef, InputTrace, TraceTick};

/// Outcome of a full playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub ticks: usize,
    pub rejected: usize,
    pub samples: usize,
}

/// Replays an input trace tick by tick
#[derive(Debug)]
pub struct TracePlayer {
    name: String,
    /// Encoded record stream of every tick
    frames: Vec<Vec<u8>>,
    position: usize,
}

impl TracePlayer {
    /// Resolve `trace` against `layout` and encode every tick.
    pub fn new(trace: &InputTrace, layout: &AxisLayout) -> Result<Self> {
        let frames = trace
            .ticks
            .iter()
            .enumerate()
            .map(|(i, tick)| {
                encode_tick(tick, layout)
                    .map_err(|e| e.with_context(format!("Trace '{}' tick {}", trace.name, i)))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Prepared trace '{}' for playback ({} ticks, {} bytes)",
            trace.name,
            frames.len(),
            frames.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Self {
            name: trace.name.clone(),
            frames,
            position: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of ticks
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the next tick to play
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether every tick has been played
    pub fn is_finished(&self) -> bool {
        self.position >= self.frames.len()
    }

    /// Playback progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.frames.is_empty() {
            1.0
        } else {
            self.position as f64 / self.frames.len() as f64
        }
    }

    /// Start over from the first tick
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Encoded bytes of the next tick, advancing the player
    pub fn next_frame(&mut self) -> Option<&[u8]> {
        let frame = self.frames.get(self.position)?;
        self.position += 1;
        Some(frame)
    }

    /// Run the next tick through `pipeline`.
    ///
    /// Returns `None` once the trace is exhausted. A rejected tick is
    /// reported as `Some(Err(_))` and playback may continue.
    pub fn step(&mut self, pipeline: &mut IngressPipeline) -> Option<PipelineResult<TickStats>> {
        let frame = self.frames.get(self.position)?;
        self.position += 1;
        Some(pipeline.run_tick(frame))
    }

    /// Play every remaining tick, continuing past rejected ones.
    pub fn play(&mut self, pipeline: &mut IngressPipeline) -> PlaybackSummary {
        let mut summary = PlaybackSummary::default();
        while let Some(result) = self.step(pipeline) {
            summary.ticks += 1;
            match result {
                Ok(stats) => summary.samples += stats.samples + stats.opaque_samples,
                Err(_) => summary.rejected += 1,
            }
        }

        tracing::info!(
            "Played trace '{}': {} ticks, {} rejected, {} samples",
            self.name,
            summary.ticks,
            summary.rejected,
            summary.samples
        );
        summary
    }
}

fn encode_tick(tick: &TraceTick, layout: &AxisLayout) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    for sample in &tick.values {
        let axis = resolve_value(&sample.axis, layout)?;
        encode_value_record(&mut raw, axis, seconds_to_timestamp(sample.time_secs), sample.value);
    }
    for record in &tick.opaque {
        let axis = resolve_opaque(&record.axis, layout)?;
        encode_opaque_record(
            &mut raw,
            axis,
            seconds_to_timestamp(record.time_secs),
            &record.bytes,
        )?;
    }
    Ok(raw)
}

/// Resolve a trace reference to any value axis, ingress or derived.
pub fn resolve_value_any(axis: &AxisRef, layout: &AxisLayout) -> Result<ValueAxisId> {
    let id = match axis {
        AxisRef::Index(i) => ValueAxisId(*i),
        AxisRef::Name(name) => layout
            .value_axis_by_name(name)
            .ok_or_else(|| InputFlowError::Trace(format!("unknown value axis {}", axis)))?,
    };
    if id.index() >= layout.values.len() {
        return Err(InputFlowError::Trace(format!(
            "value axis {} out of range ({} value axes)",
            axis,
            layout.values.len()
        )));
    }
    Ok(id)
}

/// Resolve a trace reference to an ingress value axis.
pub fn resolve_value(axis: &AxisRef, layout: &AxisLayout) -> Result<ValueAxisId> {
    let id = resolve_value_any(axis, layout)?;
    if layout.values[id.index()].derived {
        return Err(InputFlowError::Trace(format!(
            "value axis {} is derived and cannot receive samples",
            axis
        )));
    }
    Ok(id)
}

/// Resolve a trace reference to an ingress opaque axis.
pub fn resolve_opaque(axis: &AxisRef, layout: &AxisLayout) -> Result<OpaqueAxisId> {
    let id = match axis {
        AxisRef::Index(i) => OpaqueAxisId(*i),
        AxisRef::Name(name) => layout
            .opaque_axis_by_name(name)
            .ok_or_else(|| InputFlowError::Trace(format!("unknown opaque axis {}", axis)))?,
    };
    match layout.opaque.get(id.index()) {
        None => Err(InputFlowError::Trace(format!(
            "opaque axis {} out of range ({} opaque axes)",
            axis,
            layout.opaque.len()
        ))),
        Some(cfg) if cfg.derived => Err(InputFlowError::Trace(format!(
            "opaque axis {} is derived and cannot receive samples",
            axis
        ))),
        Some(_) => Ok(id),
    }
}
