//! Session data types

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{InputFlowError, Result};
use crate::pipeline::id::ValueAxisId;

/// Reference to an axis inside a trace: its configured name or its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisRef {
    Index(u32),
    Name(String),
}

impl std::fmt::Display for AxisRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisRef::Index(i) => write!(f, "#{}", i),
            AxisRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

impl From<&str> for AxisRef {
    fn from(name: &str) -> Self {
        AxisRef::Name(name.to_string())
    }
}

impl From<u32> for AxisRef {
    fn from(index: u32) -> Self {
        AxisRef::Index(index)
    }
}

/// One float sample of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceValue {
    /// Seconds since device startup
    pub time_secs: f64,
    pub axis: AxisRef,
    pub value: f32,
}

/// One opaque record of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOpaque {
    pub time_secs: f64,
    pub axis: AxisRef,
    pub bytes: Vec<u8>,
}

/// Everything the device reported during one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceTick {
    #[serde(default)]
    pub values: Vec<TraceValue>,
    #[serde(default)]
    pub opaque: Vec<TraceOpaque>,
}

impl TraceTick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a float sample
    pub fn value(mut self, time_secs: f64, axis: impl Into<AxisRef>, value: f32) -> Self {
        self.values.push(TraceValue {
            time_secs,
            axis: axis.into(),
            value,
        });
        self
    }

    /// Add an opaque record
    pub fn opaque(mut self, time_secs: f64, axis: impl Into<AxisRef>, bytes: Vec<u8>) -> Self {
        self.opaque.push(TraceOpaque {
            time_secs,
            axis: axis.into(),
            bytes,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.opaque.is_empty()
    }
}

/// A recorded input session, replayed one tick at a time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputTrace {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ticks: Vec<TraceTick>,
}

impl InputTrace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticks: Vec::new(),
        }
    }

    /// Append a tick
    pub fn push(&mut self, tick: TraceTick) {
        self.ticks.push(tick);
    }

    /// Number of ticks
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Parse a trace from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| InputFlowError::Trace(format!("Failed to parse trace: {}", e)))
    }

    /// Save the trace as pretty JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| InputFlowError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a trace from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let trace = Self::from_json_str(&json)
            .map_err(|e| e.with_context(format!("Failed to load {:?}", path)))?;
        tracing::info!(
            "Loaded trace '{}' from {:?} ({} ticks)",
            trace.name,
            path,
            trace.len()
        );
        Ok(trace)
    }
}

/// Output of one value axis during one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAxis {
    pub axis: ValueAxisId,
    pub label: String,
    pub timestamps: Vec<u64>,
    pub values: Vec<f32>,
    /// Value carried over from the last tick that had samples
    pub previous: f32,
}

/// Output of one successful tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedTick {
    pub tick: u64,
    pub axes: Vec<RecordedAxis>,
}

/// Per-tick output of selected value axes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRecording {
    pub pipeline: String,
    pub ticks: Vec<RecordedTick>,
}

impl OutputRecording {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            ticks: Vec::new(),
        }
    }

    /// Number of recorded ticks
    pub fn frame_count(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// All values of one axis across the recording, in tick order
    pub fn values_of(&self, axis: ValueAxisId) -> Vec<f32> {
        self.ticks
            .iter()
            .flat_map(|t| t.axes.iter().filter(|a| a.axis == axis))
            .flat_map(|a| a.values.iter().copied())
            .collect()
    }

    /// Save the recording as pretty JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| InputFlowError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a recording from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| InputFlowError::Trace(format!("Failed to parse recording: {}", e)))
    }
}
