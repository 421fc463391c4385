//! Ingress dataflow engine.
//!
//! Raw device bytes become per-axis columnar sequences once per tick:
//!
//! ```text
//! raw bytes ─► Demuxer ─► DemuxedBatch ─► validate ─► lengths ─► Map ─► AoS→SoA ─► Execute ─► observers
//!                                                                 │                  │
//!                                                   BeforeMap ─ built-in groups ─ AfterMap
//! ```
//!
//! # Design
//!
//! - **Enum dispatch on the hot path**: `BuiltinStage` for the built-in catalogue,
//!   trait objects only for external stages at the seams.
//! - **Static validation**: `PipelineCompiler` checks the whole axis wiring once,
//!   so tick-time failures come from the sample stream alone.
//! - **No allocation per tick** once buffers and the reused batch have grown.
//! - **All or nothing**: a failed tick is discarded and never exposed.

pub mod compiled_plan;
pub mod compiler;
pub mod demux;
pub mod error;
pub mod executor;
pub mod id;
pub mod sample;
pub mod stage;
pub mod stages;

pub use compiled_plan::{CompiledPlan, PlanStats};
pub use compiler::PipelineCompiler;
pub use demux::{
    encode_opaque_record, encode_value_record, seconds_to_timestamp, Demuxer, RecordDemuxer,
};
pub use error::{PipelineError, PipelineResult};
pub use executor::{IngressPipeline, IngressPipelineBuilder, TickStats};
pub use id::{OpaqueAxisId, StageId, TimestampAxisId, ValueAxisId};
pub use sample::{DemuxedBatch, DemuxedSample, OpaqueSample};
pub use stage::{
    AnyStage, BuiltinStage, PipelineStage, Seam, Shape, StageGroup, StageWiring, TickObserver,
};
pub use stages::StageGroups;
