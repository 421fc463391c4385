//! Execution and capacity settings.
//!
//! These are part of the pipeline configuration but do not change the
//! dataflow itself; they bound how much work one tick may do and how
//! the work is scheduled.
//!
//! # Main Types
//!
//! - [`ExecutionSettings`] - Parallel dispatch threshold and input validation
//! - [`CapacityLimits`] - Hard upper bounds for the columnar buffers

use serde::{Deserialize, Serialize};

/// Default slice length at which stateless stages switch to parallel iteration
pub const DEFAULT_PARALLEL_MIN_LEN: usize = 4096;

/// Default maximum demuxed samples accepted in one tick
pub const DEFAULT_MAX_SAMPLES_PER_TICK: usize = 65_536;

/// Default maximum entries in the timestamp and value buffers
pub const DEFAULT_MAX_BUFFER_ENTRIES: usize = 1 << 20;

/// Default maximum bytes in the opaque buffer (16 MiB)
pub const DEFAULT_MAX_OPAQUE_BYTES: usize = 16 * 1024 * 1024;

/// How ticks are executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Slices at least this long are processed with rayon
    #[serde(default = "default_parallel_min_len")]
    pub parallel_min_len: usize,

    /// Reject ticks whose samples are not timestamp-ordered per axis
    #[serde(default = "default_true")]
    pub validate_timestamp_order: bool,
}

fn default_parallel_min_len() -> usize {
    DEFAULT_PARALLEL_MIN_LEN
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            parallel_min_len: DEFAULT_PARALLEL_MIN_LEN,
            validate_timestamp_order: true,
        }
    }
}

impl ExecutionSettings {
    /// Whether a slice of `len` elements should be processed in parallel
    #[inline]
    pub fn use_parallel(&self, len: usize) -> bool {
        self.parallel_min_len > 0 && len >= self.parallel_min_len
    }

    /// Settings that never parallelize (useful for deterministic tests)
    pub fn serial() -> Self {
        Self {
            parallel_min_len: 0,
            ..Default::default()
        }
    }
}

/// Upper bounds enforced on every tick.
///
/// Exceeding any of them rejects the tick; nothing is truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimits {
    #[serde(default = "default_max_samples_per_tick")]
    pub max_samples_per_tick: usize,

    #[serde(default = "default_max_buffer_entries")]
    pub max_timestamps: usize,

    #[serde(default = "default_max_buffer_entries")]
    pub max_values: usize,

    #[serde(default = "default_max_opaque_bytes")]
    pub max_opaque_bytes: usize,
}

fn default_max_samples_per_tick() -> usize {
    DEFAULT_MAX_SAMPLES_PER_TICK
}

fn default_max_buffer_entries() -> usize {
    DEFAULT_MAX_BUFFER_ENTRIES
}

fn default_max_opaque_bytes() -> usize {
    DEFAULT_MAX_OPAQUE_BYTES
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            max_samples_per_tick: DEFAULT_MAX_SAMPLES_PER_TICK,
            max_timestamps: DEFAULT_MAX_BUFFER_ENTRIES,
            max_values: DEFAULT_MAX_BUFFER_ENTRIES,
            max_opaque_bytes: DEFAULT_MAX_OPAQUE_BYTES,
        }
    }
}
