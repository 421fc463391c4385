//! Generic per-sample processors.
//!
//! # Processor1D
//!
//! Applied in this order:
//!
//! ```text
//! deadzone → curve → invert → scale/offset → clamp
//! ```
//!
//! The curve is linear, a sign-preserving power, or a Rhai script. Script
//! curves see `value` (the deadzoned sample) and `prev` (the deadzoned
//! sample before it, or the source's previous value for the first one), so
//! they run serially.
//!
//! # Processor2D / Processor3D
//!
//! Vector processors work on the magnitude:
//!
//! ```text
//! radial deadzone (< min_magnitude) → clamp to max_magnitude
//!   → divide by max_magnitude → normalize → scale/offset per component
//! ```

use crate::config::ExecutionSettings;
use crate::dataset::{AsStepFunction, DatasetProxy, StepFunction1D, StepFunction2D, StepFunction3D};
use crate::error::Result;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::stage::{Shape, StageWiring};
use crate::pipeline::stages::{map_1d, map_2d, map_3d};
use crate::scripting::{CompiledCurve, ScriptEngine};
use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Both bounds finite and `min <= max`.
    pub fn check(&self, what: &str) -> std::result::Result<(), String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(format!("{} [{}, {}] has a non-finite bound", what, self.min, self.max));
        }
        if self.min > self.max {
            return Err(format!("{} [{}, {}] has min above max", what, self.min, self.max));
        }
        Ok(())
    }
}

/// Response curve of a [`Processor1D`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Curve {
    #[default]
    Linear,
    /// `sign(v) * |v|^exponent`
    Power { exponent: f32 },
    /// Rhai expression or `fn curve(value, prev)`.
    Script { source: String },
}

fn default_scale() -> f32 {
    1.0
}

fn default_max_magnitude() -> f32 {
    1.0
}

fn default_scale_2d() -> [f32; 2] {
    [1.0; 2]
}

fn default_scale_3d() -> [f32; 3] {
    [1.0; 3]
}

/// Map `|v|` from `[min, max]` onto `[0, 1]`, keeping the sign.
pub fn apply_deadzone(v: f32, deadzone: ValueRange) -> f32 {
    let magnitude = v.abs();
    if magnitude < deadzone.min {
        return 0.0;
    }
    let span = deadzone.max - deadzone.min;
    if span <= 0.0 {
        return v.signum();
    }
    v.signum() * ((magnitude - deadzone.min) / span).min(1.0)
}

// ==================== Processor1D ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Processor1D {
    pub src: StepFunction1D,
    pub dst: StepFunction1D,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadzone: Option<ValueRange>,

    #[serde(default)]
    pub curve: Curve,

    #[serde(default)]
    pub invert: bool,

    #[serde(default = "default_scale")]
    pub scale: f32,

    #[serde(default)]
    pub offset: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp: Option<ValueRange>,

    /// Compiled form of a script curve.
    #[serde(skip)]
    compiled: Option<CompiledCurve>,
}

impl Processor1D {
    /// Identity processor.
    pub fn new(src: StepFunction1D, dst: StepFunction1D) -> Self {
        Self {
            src,
            dst,
            deadzone: None,
            curve: Curve::Linear,
            invert: false,
            scale: 1.0,
            offset: 0.0,
            clamp: None,
            compiled: None,
        }
    }

    pub fn with_deadzone(mut self, min: f32, max: f32) -> Self {
        self.deadzone = Some(ValueRange::new(min, max));
        self
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self.compiled = None;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn with_scale_offset(mut self, scale: f32, offset: f32) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_clamp(mut self, min: f32, max: f32) -> Self {
        self.clamp = Some(ValueRange::new(min, max));
        self
    }

    pub fn name(&self) -> &str {
        "Processor1D"
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NToN,
        }
    }

    /// Compile a script curve. Returns whether there was one.
    pub fn compile_script(&mut self, engine: &ScriptEngine, index: usize) -> Result<bool> {
        match &self.curve {
            Curve::Script { source } => {
                let name = format!("processor_1d[{}]", index);
                self.compiled = Some(engine.compile(&name, source)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn is_compiled(&self) -> bool {
        !matches!(self.curve, Curve::Script { .. }) || self.compiled.is_some()
    }

    /// Reject parameters the per-sample chain cannot handle.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(deadzone) = &self.deadzone {
            deadzone.check("deadzone")?;
        }
        if let Some(clamp) = &self.clamp {
            clamp.check("clamp")?;
        }
        if !self.scale.is_finite() || !self.offset.is_finite() {
            return Err(format!(
                "scale {} and offset {} must be finite",
                self.scale, self.offset
            ));
        }
        if let Curve::Power { exponent } = self.curve {
            if !exponent.is_finite() {
                return Err(format!("power curve exponent {} is not finite", exponent));
            }
        }
        Ok(())
    }

    fn before_curve(&self, v: f32) -> f32 {
        match self.deadzone {
            Some(deadzone) => apply_deadzone(v, deadzone),
            None => v,
        }
    }

    fn after_curve(&self, v: f32) -> f32 {
        let v = if self.invert { -v } else { v };
        let v = v * self.scale + self.offset;
        match self.clamp {
            Some(range) => v.clamp(range.min, range.max),
            None => v,
        }
    }

    /// Full chain for one sample with a non-script curve.
    pub fn process(&self, v: f32) -> f32 {
        let v = self.before_curve(v);
        let v = match self.curve {
            Curve::Power { exponent } => v.signum() * v.abs().powf(exponent),
            _ => v,
        };
        self.after_curve(v)
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        if !matches!(self.curve, Curve::Script { .. }) {
            let [src, dst] = proxy.split_values([self.src.x, self.dst.x])?;
            map_1d(settings, src, dst, |v| self.process(v));
            return Ok(());
        }

        let curve = self.compiled.as_ref().ok_or_else(|| {
            PipelineError::Script(format!(
                "script curve of {} -> {} was never compiled",
                self.src.x, self.dst.x
            ))
        })?;

        let mut prev = f64::from(self.before_curve(proxy.previous_value_x(self.src)));
        let [src, dst] = proxy.split_values([self.src.x, self.dst.x])?;
        for (out, &raw) in dst.iter_mut().zip(src.iter()) {
            let value = f64::from(self.before_curve(raw));
            let curved = curve
                .eval(value, prev)
                .map_err(|e| PipelineError::Script(e.to_string()))?;
            *out = self.after_curve(curved as f32);
            prev = value;
        }
        Ok(())
    }
}

// ==================== Vector processors ====================

#[derive(Debug, Clone, Copy)]
struct VectorShaping {
    min_magnitude: f32,
    max_magnitude: f32,
    clamp: bool,
    clamp_normalize: bool,
    normalize: bool,
}

impl VectorShaping {
    fn validate(&self) -> std::result::Result<(), String> {
        ValueRange::new(self.min_magnitude, self.max_magnitude).check("magnitude range")?;
        if self.min_magnitude < 0.0 {
            return Err(format!("min_magnitude {} is negative", self.min_magnitude));
        }
        Ok(())
    }

    fn apply<const N: usize>(&self, v: [f32; N], scale: [f32; N], offset: [f32; N]) -> [f32; N] {
        let mut magnitude = v.iter().map(|c| c * c).sum::<f32>().sqrt();
        let mut out = v;

        if magnitude < self.min_magnitude || magnitude == 0.0 {
            out = [0.0; N];
            magnitude = 0.0;
        }

        if self.clamp && self.max_magnitude > 0.0 && magnitude > self.max_magnitude {
            let k = self.max_magnitude / magnitude;
            out.iter_mut().for_each(|c| *c *= k);
            magnitude = self.max_magnitude;
        }

        if self.clamp_normalize && self.max_magnitude > 0.0 {
            out.iter_mut().for_each(|c| *c /= self.max_magnitude);
            magnitude /= self.max_magnitude;
        }

        if self.normalize && magnitude > 0.0 {
            out.iter_mut().for_each(|c| *c /= magnitude);
        }

        for i in 0..N {
            out[i] = out[i] * scale[i] + offset[i];
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor2D {
    pub src: StepFunction2D,
    pub dst: StepFunction2D,

    #[serde(default)]
    pub min_magnitude: f32,

    #[serde(default = "default_max_magnitude")]
    pub max_magnitude: f32,

    #[serde(default)]
    pub clamp: bool,

    /// Divide by `max_magnitude` after clamping.
    #[serde(default)]
    pub clamp_normalize: bool,

    /// Scale to unit length.
    #[serde(default)]
    pub normalize: bool,

    #[serde(default = "default_scale_2d")]
    pub scale: [f32; 2],

    #[serde(default)]
    pub offset: [f32; 2],
}

impl Processor2D {
    pub fn new(src: StepFunction2D, dst: StepFunction2D) -> Self {
        Self {
            src,
            dst,
            min_magnitude: 0.0,
            max_magnitude: 1.0,
            clamp: false,
            clamp_normalize: false,
            normalize: false,
            scale: [1.0; 2],
            offset: [0.0; 2],
        }
    }

    pub fn name(&self) -> &str {
        "Processor2D"
    }

    fn shaping(&self) -> VectorShaping {
        VectorShaping {
            min_magnitude: self.min_magnitude,
            max_magnitude: self.max_magnitude,
            clamp: self.clamp,
            clamp_normalize: self.clamp_normalize,
            normalize: self.normalize,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.shaping().validate()?;
        if self.scale.iter().chain(&self.offset).any(|c| !c.is_finite()) {
            return Err("scale and offset must be finite".to_string());
        }
        Ok(())
    }

    pub fn process(&self, v: [f32; 2]) -> [f32; 2] {
        self.shaping().apply(v, self.scale, self.offset)
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NToN,
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        let [sx, sy, dx, dy] =
            proxy.split_values([self.src.x, self.src.y, self.dst.x, self.dst.y])?;
        let shaping = self.shaping();
        map_2d(settings, [&*sx, &*sy], [dx, dy], |v| {
            shaping.apply(v, self.scale, self.offset)
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor3D {
    pub src: StepFunction3D,
    pub dst: StepFunction3D,

    #[serde(default)]
    pub min_magnitude: f32,

    #[serde(default = "default_max_magnitude")]
    pub max_magnitude: f32,

    #[serde(default)]
    pub clamp: bool,

    #[serde(default)]
    pub clamp_normalize: bool,

    #[serde(default)]
    pub normalize: bool,

    #[serde(default = "default_scale_3d")]
    pub scale: [f32; 3],

    #[serde(default)]
    pub offset: [f32; 3],
}

impl Processor3D {
    pub fn new(src: StepFunction3D, dst: StepFunction3D) -> Self {
        Self {
            src,
            dst,
            min_magnitude: 0.0,
            max_magnitude: 1.0,
            clamp: false,
            clamp_normalize: false,
            normalize: false,
            scale: [1.0; 3],
            offset: [0.0; 3],
        }
    }

    pub fn name(&self) -> &str {
        "Processor3D"
    }

    fn shaping(&self) -> VectorShaping {
        VectorShaping {
            min_magnitude: self.min_magnitude,
            max_magnitude: self.max_magnitude,
            clamp: self.clamp,
            clamp_normalize: self.clamp_normalize,
            normalize: self.normalize,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.shaping().validate()?;
        if self.scale.iter().chain(&self.offset).any(|c| !c.is_finite()) {
            return Err("scale and offset must be finite".to_string());
        }
        Ok(())
    }

    pub fn process(&self, v: [f32; 3]) -> [f32; 3] {
        self.shaping().apply(v, self.scale, self.offset)
    }

    pub fn wiring(&self) -> StageWiring {
        StageWiring {
            reads: vec![self.src.step_function()],
            writes: vec![self.dst.step_function()],
            shape: Shape::NToN,
        }
    }

    pub fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    pub fn execute(
        &self,
        proxy: &mut DatasetProxy<'_>,
        settings: &ExecutionSettings,
    ) -> PipelineResult<()> {
        let [sx, sy, sz, dx, dy, dz] = proxy.split_values([
            self.src.x, self.src.y, self.src.z, self.dst.x, self.dst.y, self.dst.z,
        ])?;
        let shaping = self.shaping();
        map_3d(settings, [&*sx, &*sy, &*sz], [dx, dy, dz], |v| {
            shaping.apply(v, self.scale, self.offset)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::ValueAxisId;

    fn one(axis: u32) -> StepFunction1D {
        StepFunction1D::new(ValueAxisId(axis))
    }

    fn two(x: u32, y: u32) -> StepFunction2D {
        StepFunction2D::new(ValueAxisId(x), ValueAxisId(y))
    }

    #[test]
    fn test_range_check() {
        assert!(ValueRange::new(-1.0, 1.0).check("clamp").is_ok());
        assert!(ValueRange::new(0.5, 0.5).check("clamp").is_ok());
        assert!(ValueRange::new(1.0, -1.0).check("clamp").is_err());
        assert!(ValueRange::new(f32::NAN, 1.0).check("clamp").is_err());
        assert!(ValueRange::new(0.0, f32::INFINITY).check("clamp").is_err());
    }

    #[test]
    fn test_processor_validation() {
        assert!(Processor1D::new(one(0), one(1)).validate().is_ok());

        let err = Processor1D::new(one(0), one(1))
            .with_clamp(1.0, -1.0)
            .validate()
            .unwrap_err();
        assert!(err.contains("clamp"));

        let err = Processor1D::new(one(0), one(1))
            .with_deadzone(0.9, 0.1)
            .validate()
            .unwrap_err();
        assert!(err.contains("deadzone"));

        let mut p = Processor2D::new(two(0, 1), two(2, 3));
        assert!(p.validate().is_ok());
        p.min_magnitude = 2.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_deadzone_rescales() {
        let dz = ValueRange::new(0.2, 0.8);
        assert_eq!(apply_deadzone(0.1, dz), 0.0);
        assert_eq!(apply_deadzone(-0.1, dz), 0.0);
        assert!((apply_deadzone(0.5, dz) - 0.5).abs() < 1e-6);
        assert_eq!(apply_deadzone(0.9, dz), 1.0);
        assert_eq!(apply_deadzone(-0.9, dz), -1.0);
    }

    #[test]
    fn test_processor_1d_chain_order() {
        let p = Processor1D::new(one(0), one(1))
            .with_deadzone(0.0, 1.0)
            .with_curve(Curve::Power { exponent: 2.0 })
            .inverted()
            .with_scale_offset(2.0, 0.5)
            .with_clamp(-1.0, 1.0);

        // 0.5 → 0.25 → -0.25 → 0.0
        assert_eq!(p.process(0.5), 0.0);
        // -1.0 → -1.0 → 1.0 → 2.5 → 1.0
        assert_eq!(p.process(-1.0), 1.0);
    }

    #[test]
    fn test_identity_processor() {
        let p = Processor1D::new(one(0), one(1));
        assert_eq!(p.process(0.3), 0.3);
        assert!(p.is_compiled());
    }

    #[test]
    fn test_script_curve_requires_compilation() {
        let p = Processor1D::new(one(0), one(1)).with_curve(Curve::Script {
            source: "value * 2.0".into(),
        });
        assert!(!p.is_compiled());

        let mut p = p;
        assert!(p.compile_script(&ScriptEngine::new(), 0).unwrap());
        assert!(p.is_compiled());
    }

    #[test]
    fn test_curve_toml_shapes() {
        let p: Processor1D = toml::from_str(
            r#"
            src = 0
            dst = 1
            curve = { kind = "power", exponent = 3.0 }
            deadzone = { min = 0.1, max = 0.9 }
            "#,
        )
        .unwrap();
        assert_eq!(p.curve, Curve::Power { exponent: 3.0 });
        assert_eq!(p.scale, 1.0);
        assert!(p.clamp.is_none());
    }

    #[test]
    fn test_vector_radial_deadzone_and_clamp() {
        let mut p = Processor2D::new(two(0, 1), two(2, 3));
        p.min_magnitude = 0.2;
        p.max_magnitude = 1.0;
        p.clamp = true;

        assert_eq!(p.process([0.1, 0.1]), [0.0, 0.0]);
        let clamped = p.process([3.0, 4.0]);
        assert!((clamped[0] - 0.6).abs() < 1e-6);
        assert!((clamped[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_vector_normalize_and_offset() {
        let mut p = Processor3D::new(
            StepFunction3D::new(ValueAxisId(0), ValueAxisId(1), ValueAxisId(2)),
            StepFunction3D::new(ValueAxisId(3), ValueAxisId(4), ValueAxisId(5)),
        );
        p.normalize = true;
        p.offset = [0.0, 0.0, 1.0];
        assert_eq!(p.process([0.0, 2.0, 0.0]), [0.0, 1.0, 1.0]);
        assert_eq!(p.process([0.0, 0.0, 0.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_clamp_normalize_divides_by_max() {
        let mut p = Processor2D::new(two(0, 1), two(2, 3));
        p.max_magnitude = 2.0;
        p.clamp = true;
        p.clamp_normalize = true;
        let out = p.process([0.0, 4.0]);
        assert_eq!(out, [0.0, 1.0]);
        let out = p.process([1.0, 0.0]);
        assert_eq!(out, [0.5, 0.0]);
    }
}
