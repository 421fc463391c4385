//! Pipeline-specific error types.
//!
//! Configuration and capacity problems are recoverable and surface here.
//! Wiring bugs detected while a tick is running (reading a channel a step
//! function does not have, mismatched timestamp axes) are contract
//! violations and go through [`crate::invariant`] instead.

use crate::pipeline::id::StageId;
use thiserror::Error;

/// Errors that can occur within the ingress pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Axis wiring error: {0}")]
    Wiring(String),

    #[error("Capacity exceeded for {buffer}: requested {requested}, limit is {limit}")]
    Capacity {
        buffer: &'static str,
        requested: usize,
        limit: usize,
    },

    #[error("Malformed sample #{index}: {message}")]
    MalformedSample { index: usize, message: String },

    #[error("Demux error: {0}")]
    Demux(String),

    #[error("Slice conflict: {0}")]
    SliceConflict(String),

    #[error("Stage {stage_id:?} ({name}) failed: {message}")]
    Stage {
        stage_id: StageId,
        name: String,
        message: String,
    },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Tick {0} was rejected and has no output")]
    TickRejected(u64),
}

impl PipelineError {
    /// Whether this error was raised by the per-tick sample stream rather
    /// than by static configuration.
    pub fn is_tick_local(&self) -> bool {
        !matches!(self, PipelineError::Config(_) | PipelineError::Wiring(_))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
