//! Configuration module for inputflow
//!
//! A [`PipelineConfig`] is the static, tick-invariant description of a
//! pipeline:
//! - the axis layout (how many timestamp axes exist, which value and opaque
//!   axes hang off each of them, and which axes receive demuxed samples)
//! - the stage instances of every built-in stage group and their axis wiring
//! - execution settings and capacity limits
//!
//! It is consumed once at pipeline construction and never mutated per tick.
//!
//! # Files
//!
//! Configurations are stored as TOML (`.toml`) or JSON (any other
//! extension).
//!
//! # Example
//!
//! ```toml
//! [axes]
//! timestamp_axes = 3
//!
//! [[axes.values]]
//! name = "stick.x"
//! timestamp_axis = 0
//!
//! [[axes.values]]
//! name = "stick.y"
//! timestamp_axis = 1
//!
//! [[axes.values]]
//! name = "stick.x.composed"
//! timestamp_axis = 2
//! derived = true
//!
//! [[axes.values]]
//! name = "stick.y.composed"
//! timestamp_axis = 2
//! derived = true
//!
//! [[stages.two_1ds_to_2d]]
//! src_x = 0
//! src_y = 1
//! dst = [2, 3]
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{InputFlowError, Result};
use crate::pipeline::id::{OpaqueAxisId, TimestampAxisId, ValueAxisId};
use crate::pipeline::stages::StageGroups;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current configuration format version
pub const CONFIG_VERSION: u32 = 1;

/// File extension that selects the TOML format
pub const TOML_EXTENSION: &str = "toml";

// ==================== Axis Layout ====================

/// One float channel in the layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAxisConfig {
    /// Name used by traces, recordings and the CLI
    #[serde(default)]
    pub name: Option<String>,

    /// Timestamp axis this channel is aligned to
    pub timestamp_axis: TimestampAxisId,

    /// Previous value reported before the axis ever receives a sample
    #[serde(default)]
    pub initial_previous: f32,

    /// Written by stages instead of the demultiplexer
    #[serde(default)]
    pub derived: bool,
}

/// One fixed-stride binary channel in the layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueAxisConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub timestamp_axis: TimestampAxisId,

    /// Record size in bytes
    pub stride: u32,

    #[serde(default)]
    pub derived: bool,
}

/// Axis tables of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisLayout {
    /// Number of timestamp axes
    pub timestamp_axes: u32,

    #[serde(default)]
    pub values: Vec<ValueAxisConfig>,

    #[serde(default)]
    pub opaque: Vec<OpaqueAxisConfig>,
}

impl AxisLayout {
    /// Create an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamp axis
    pub fn add_timestamp_axis(&mut self) -> TimestampAxisId {
        let id = TimestampAxisId(self.timestamp_axes);
        self.timestamp_axes += 1;
        id
    }

    /// Append a value axis that receives demuxed samples
    pub fn add_ingress_value(&mut self, timestamp_axis: TimestampAxisId) -> ValueAxisId {
        self.push_value(timestamp_axis, false)
    }

    /// Append a value axis written by a stage
    pub fn add_derived_value(&mut self, timestamp_axis: TimestampAxisId) -> ValueAxisId {
        self.push_value(timestamp_axis, true)
    }

    fn push_value(&mut self, timestamp_axis: TimestampAxisId, derived: bool) -> ValueAxisId {
        let id = ValueAxisId(self.values.len() as u32);
        self.values.push(ValueAxisConfig {
            name: None,
            timestamp_axis,
            initial_previous: 0.0,
            derived,
        });
        id
    }

    /// Append an opaque axis that receives demuxed records
    pub fn add_ingress_opaque(&mut self, timestamp_axis: TimestampAxisId, stride: u32) -> OpaqueAxisId {
        let id = OpaqueAxisId(self.opaque.len() as u32);
        self.opaque.push(OpaqueAxisConfig {
            name: None,
            timestamp_axis,
            stride,
            derived: false,
        });
        id
    }

    /// Give a value axis a name
    pub fn name_value(&mut self, axis: ValueAxisId, name: impl Into<String>) {
        if let Some(cfg) = self.values.get_mut(axis.index()) {
            cfg.name = Some(name.into());
        }
    }

    /// Set the previous value an axis reports before its first sample
    pub fn set_initial_previous(&mut self, axis: ValueAxisId, value: f32) {
        if let Some(cfg) = self.values.get_mut(axis.index()) {
            cfg.initial_previous = value;
        }
    }

    /// Look up a value axis by name
    pub fn value_axis_by_name(&self, name: &str) -> Option<ValueAxisId> {
        self.values
            .iter()
            .position(|v| v.name.as_deref() == Some(name))
            .map(|i| ValueAxisId(i as u32))
    }

    /// Look up an opaque axis by name
    pub fn opaque_axis_by_name(&self, name: &str) -> Option<OpaqueAxisId> {
        self.opaque
            .iter()
            .position(|v| v.name.as_deref() == Some(name))
            .map(|i| OpaqueAxisId(i as u32))
    }

    /// Display name of a value axis (`#index` when unnamed)
    pub fn value_axis_label(&self, axis: ValueAxisId) -> String {
        self.values
            .get(axis.index())
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| format!("#{}", axis.0))
    }

    /// Value axes that receive demuxed samples
    pub fn ingress_values(&self) -> impl Iterator<Item = ValueAxisId> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.derived)
            .map(|(i, _)| ValueAxisId(i as u32))
    }
}

// ==================== Pipeline Config ====================

/// Complete pipeline description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Human-readable pipeline name
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    pub axes: AxisLayout,

    #[serde(default)]
    pub stages: StageGroups,

    #[serde(default)]
    pub execution: ExecutionSettings,

    #[serde(default)]
    pub limits: CapacityLimits,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_pipeline_name() -> String {
    String::from("ingress")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(AxisLayout::default())
    }
}

impl PipelineConfig {
    /// Create a configuration with no stages
    pub fn new(axes: AxisLayout) -> Self {
        Self {
            version: CONFIG_VERSION,
            name: default_pipeline_name(),
            axes,
            stages: StageGroups::default(),
            execution: ExecutionSettings::default(),
            limits: CapacityLimits::default(),
        }
    }

    /// Parse a TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| InputFlowError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Parse a JSON configuration
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| InputFlowError::Config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Serialize as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| InputFlowError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Load a configuration file, choosing the format from its extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            InputFlowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = if is_toml(path) {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .map_err(|e| e.with_context(format!("Failed to load {:?}", path)))?;

        tracing::info!(
            "Loaded pipeline config '{}' from {:?} ({} timestamp axes, {} value axes, {} stages)",
            config.name,
            path,
            config.axes.timestamp_axes,
            config.axes.values.len(),
            config.stages.len()
        );
        Ok(config)
    }

    /// Save the configuration, choosing the format from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    InputFlowError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_toml(path) {
            self.to_toml_string()?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                InputFlowError::Serialization(format!("Failed to serialize config: {}", e))
            })?
        };

        std::fs::write(path, content).map_err(|e| {
            InputFlowError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(TOML_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STICK_TOML: &str = r#"
        name = "stick"

        [axes]
        timestamp_axes = 3

        [[axes.values]]
        name = "stick.x"
        timestamp_axis = 0

        [[axes.values]]
        name = "stick.y"
        timestamp_axis = 1
        initial_previous = 0.5

        [[axes.values]]
        timestamp_axis = 2
        derived = true

        [[axes.values]]
        timestamp_axis = 2
        derived = true

        [[stages.two_1ds_to_2d]]
        src_x = 0
        src_y = 1
        dst = [2, 3]
    "#;

    #[test]
    fn test_parse_toml() {
        let config = PipelineConfig::from_toml_str(STICK_TOML).unwrap();
        assert_eq!(config.name, "stick");
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.axes.timestamp_axes, 3);
        assert_eq!(config.axes.values[1].initial_previous, 0.5);
        assert!(config.axes.values[2].derived);
        assert_eq!(config.stages.len(), 1);
        assert_eq!(config.execution, ExecutionSettings::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::from_toml_str(STICK_TOML).unwrap();
        let text = config.to_toml_string().unwrap();
        let parsed = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.axes, config.axes);
        assert_eq!(parsed.stages.len(), 1);
    }

    #[test]
    fn test_missing_axes_is_config_error() {
        let err = PipelineConfig::from_toml_str("name = \"x\"").unwrap_err();
        assert!(matches!(err, InputFlowError::Config(_)));
    }

    #[test]
    fn test_layout_name_lookup() {
        let config = PipelineConfig::from_toml_str(STICK_TOML).unwrap();
        assert_eq!(config.axes.value_axis_by_name("stick.y"), Some(ValueAxisId(1)));
        assert_eq!(config.axes.value_axis_by_name("nope"), None);
        assert_eq!(config.axes.value_axis_label(ValueAxisId(2)), "#2");
        let ingress: Vec<_> = config.axes.ingress_values().collect();
        assert_eq!(ingress, vec![ValueAxisId(0), ValueAxisId(1)]);
    }

    #[test]
    fn test_layout_builder() {
        let mut layout = AxisLayout::new();
        let t0 = layout.add_timestamp_axis();
        let t1 = layout.add_timestamp_axis();
        let a = layout.add_ingress_value(t0);
        let b = layout.add_derived_value(t1);
        layout.name_value(a, "a");
        assert_eq!(layout.timestamp_axes, 2);
        assert_eq!(b, ValueAxisId(1));
        assert_eq!(layout.value_axis_by_name("a"), Some(a));
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::from_toml_str(STICK_TOML).unwrap();

        let toml_path = dir.path().join("nested").join("stick.toml");
        config.save(&toml_path).unwrap();
        let loaded = PipelineConfig::load(&toml_path).unwrap();
        assert_eq!(loaded.axes, config.axes);

        let json_path = dir.path().join("stick.json");
        config.save(&json_path).unwrap();
        let loaded = PipelineConfig::load(&json_path).unwrap();
        assert_eq!(loaded.name, "stick");
    }
}
