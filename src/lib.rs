//! # inputflow: columnar ingress dataflow for device input
//!
//! Every tick, a device reports a batch of timestamped samples (button
//! presses, stick axes, touch records) interleaved in one stream. inputflow
//! turns that stream into per-axis columns and runs a fixed chain of
//! built-in stages over them: composing sticks, shaping response curves,
//! accumulating deltas, picking the latest or the larger of two inputs.
//!
//! ## Architecture
//!
//! - **Dataset**: columnar storage for one tick plus the previous value of
//!   every axis, carried across ticks
//! - **Pipeline**: demux → validate → Map (declare lengths) → AoS→SoA →
//!   Execute (fill values), with a failed tick discarded in full
//! - **Stages**: built-in stage groups in a fixed order, plus external
//!   stages at the `BeforeMap` / `AfterMap` seams
//! - **Scripting**: Rhai response curves for `Processor1D`
//! - **Session**: JSON input traces for replay and output recordings
//!
//! ## Example
//!
//! ```ignore
//! use inputflow::{config::PipelineConfig, pipeline::IngressPipeline};
//!
//! let config = PipelineConfig::load("gamepad.toml")?;
//! let mut pipeline = IngressPipeline::new(config)?;
//!
//! loop {
//!     let raw = device.read_tick();
//!     match pipeline.run_tick(&raw) {
//!         Ok(_) => consume(pipeline.output()?),
//!         Err(e) => tracing::warn!("dropped tick: {}", e),
//!     }
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
#[doc(hidden)]
pub mod invariant;
pub mod pipeline;
pub mod scripting;
pub mod session;

// Re-export commonly used types
pub use config::{AxisLayout, CapacityLimits, ExecutionSettings, PipelineConfig};
pub use dataset::{Dataset, DatasetProxy, StepFunction1D, StepFunction2D, StepFunction3D};
pub use error::{InputFlowError, Result, ResultExt};
pub use pipeline::{
    IngressPipeline, IngressPipelineBuilder, PipelineError, PipelineResult, PipelineStage, Seam,
    TickObserver,
};
pub use scripting::ScriptEngine;
pub use session::{InputTrace, OutputRecorder, OutputRecording, TracePlayer};
