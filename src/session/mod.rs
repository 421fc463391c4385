//! Input traces and output recordings
//!
//! This module lets a pipeline run without a device attached:
//!
//! - [`InputTrace`]: a JSON file of per-tick samples, with axes referenced
//!   by name or index
//! - [`TracePlayer`]: encodes a trace into the record stream understood by
//!   [`RecordDemuxer`](crate::pipeline::RecordDemuxer) and runs it tick by
//!   tick
//! - [`OutputRecorder`]: a tick observer that captures selected value axes
//!   into an [`OutputRecording`] for later comparison

pub mod player;
pub mod recorder;
pub mod types;

pub use player::{PlaybackSummary, TracePlayer};
pub use recorder::{OutputRecorder, RecordingHandle};
pub use types::{
    AxisRef, InputTrace, OutputRecording, RecordedAxis, RecordedTick, TraceOpaque, TraceTick,
    TraceValue,
};
