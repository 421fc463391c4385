//! Step function descriptors.
//!
//! A step function names which axes compose a signal: up to three float
//! value axes sharing one timestamp axis, or a single opaque axis holding
//! fixed-stride binary records. Descriptors own no storage; they are
//! `Copy` handles resolved against a [`Dataset`](super::Dataset).

use crate::pipeline::id::{OpaqueAxisId, ValueAxisId};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Dynamic step function descriptor.
///
/// `dimensions == 0` means opaque; `1..=3` is the float vector rank.
/// Channels beyond `dimensions` hold `INVALID` ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepFunction {
    pub dimensions: u8,
    /// X, Y, Z value axes.
    pub channels: [ValueAxisId; 3],
    pub opaque: OpaqueAxisId,
    /// Record size in bytes for opaque step functions.
    pub stride: u32,
}

impl StepFunction {
    pub const fn one_d(x: ValueAxisId) -> Self {
        Self {
            dimensions: 1,
            channels: [x, ValueAxisId::INVALID, ValueAxisId::INVALID],
            opaque: OpaqueAxisId::INVALID,
            stride: 0,
        }
    }

    pub const fn two_d(x: ValueAxisId, y: ValueAxisId) -> Self {
        Self {
            dimensions: 2,
            channels: [x, y, ValueAxisId::INVALID],
            opaque: OpaqueAxisId::INVALID,
            stride: 0,
        }
    }

    pub const fn three_d(x: ValueAxisId, y: ValueAxisId, z: ValueAxisId) -> Self {
        Self {
            dimensions: 3,
            channels: [x, y, z],
            opaque: OpaqueAxisId::INVALID,
            stride: 0,
        }
    }

    pub const fn opaque(axis: OpaqueAxisId, stride: u32) -> Self {
        Self {
            dimensions: 0,
            channels: [ValueAxisId::INVALID; 3],
            opaque: axis,
            stride,
        }
    }

    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.dimensions == 0
    }

    #[inline]
    pub fn x(&self) -> ValueAxisId {
        self.channels[0]
    }

    #[inline]
    pub fn y(&self) -> ValueAxisId {
        self.channels[1]
    }

    #[inline]
    pub fn z(&self) -> ValueAxisId {
        self.channels[2]
    }

    /// Value axes in channel order (empty for opaque step functions).
    pub fn value_axes(&self) -> &[ValueAxisId] {
        &self.channels[..usize::from(self.dimensions.min(3))]
    }
}

impl fmt::Display for StepFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "opaque({}, stride {})", self.opaque.0, self.stride)
        } else {
            let axes: Vec<String> = self.value_axes().iter().map(|a| a.0.to_string()).collect();
            write!(f, "{}d[{}]", self.dimensions, axes.join(", "))
        }
    }
}

/// Conversion from a typed handle to the dynamic descriptor.
pub trait AsStepFunction: Copy {
    fn step_function(&self) -> StepFunction;
}

impl AsStepFunction for StepFunction {
    #[inline]
    fn step_function(&self) -> StepFunction {
        *self
    }
}

/// Scalar float signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepFunction1D {
    pub x: ValueAxisId,
}

impl StepFunction1D {
    pub const fn new(x: ValueAxisId) -> Self {
        Self { x }
    }
}

impl AsStepFunction for StepFunction1D {
    #[inline]
    fn step_function(&self) -> StepFunction {
        StepFunction::one_d(self.x)
    }
}

/// Two-channel float signal, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[ValueAxisId; 2]", into = "[ValueAxisId; 2]")]
pub struct StepFunction2D {
    pub x: ValueAxisId,
    pub y: ValueAxisId,
}

impl StepFunction2D {
    pub const fn new(x: ValueAxisId, y: ValueAxisId) -> Self {
        Self { x, y }
    }
}

impl From<[ValueAxisId; 2]> for StepFunction2D {
    fn from([x, y]: [ValueAxisId; 2]) -> Self {
        Self { x, y }
    }
}

impl From<StepFunction2D> for [ValueAxisId; 2] {
    fn from(sf: StepFunction2D) -> Self {
        [sf.x, sf.y]
    }
}

impl AsStepFunction for StepFunction2D {
    #[inline]
    fn step_function(&self) -> StepFunction {
        StepFunction::two_d(self.x, self.y)
    }
}

/// Three-channel float signal, serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[ValueAxisId; 3]", into = "[ValueAxisId; 3]")]
pub struct StepFunction3D {
    pub x: ValueAxisId,
    pub y: ValueAxisId,
    pub z: ValueAxisId,
}

impl StepFunction3D {
    pub const fn new(x: ValueAxisId, y: ValueAxisId, z: ValueAxisId) -> Self {
        Self { x, y, z }
    }
}

impl From<[ValueAxisId; 3]> for StepFunction3D {
    fn from([x, y, z]: [ValueAxisId; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<StepFunction3D> for [ValueAxisId; 3] {
    fn from(sf: StepFunction3D) -> Self {
        [sf.x, sf.y, sf.z]
    }
}

impl AsStepFunction for StepFunction3D {
    #[inline]
    fn step_function(&self) -> StepFunction {
        StepFunction::three_d(self.x, self.y, self.z)
    }
}

/// Opaque blob signal with a runtime stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepFunctionOpaque {
    pub axis: OpaqueAxisId,
    pub stride: u32,
}

impl StepFunctionOpaque {
    pub const fn new(axis: OpaqueAxisId, stride: u32) -> Self {
        Self { axis, stride }
    }
}

impl AsStepFunction for StepFunctionOpaque {
    #[inline]
    fn step_function(&self) -> StepFunction {
        StepFunction::opaque(self.axis, self.stride)
    }
}

/// Opaque signal whose records are values of `T`.
pub struct StepFunctionTyped<T> {
    pub axis: OpaqueAxisId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> StepFunctionTyped<T> {
    pub const fn new(axis: OpaqueAxisId) -> Self {
        Self {
            axis,
            _marker: PhantomData,
        }
    }

    pub const fn stride() -> u32 {
        std::mem::size_of::<T>() as u32
    }
}

// Manual impls: derives would require `T: Clone` etc.
impl<T> Clone for StepFunctionTyped<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StepFunctionTyped<T> {}

impl<T> fmt::Debug for StepFunctionTyped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFunctionTyped")
            .field("axis", &self.axis)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Pod> AsStepFunction for StepFunctionTyped<T> {
    #[inline]
    fn step_function(&self) -> StepFunction {
        StepFunction::opaque(self.axis, Self::stride())
    }
}

pub type StepFunctionInt = StepFunctionTyped<i32>;
pub type StepFunctionQuaternion = StepFunctionTyped<Quat>;

/// Rotation record stored on opaque axes (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_axes_follow_dimensions() {
        let sf = StepFunction::two_d(ValueAxisId(4), ValueAxisId(5));
        assert_eq!(sf.value_axes(), &[ValueAxisId(4), ValueAxisId(5)]);
        assert!(!sf.z().is_valid());

        let opaque = StepFunction::opaque(OpaqueAxisId(1), 16);
        assert!(opaque.is_opaque());
        assert!(opaque.value_axes().is_empty());
    }

    #[test]
    fn test_typed_handles_convert() {
        let sf = StepFunction3D::new(ValueAxisId(1), ValueAxisId(2), ValueAxisId(3)).step_function();
        assert_eq!(sf.dimensions, 3);
        assert_eq!(sf.z(), ValueAxisId(3));

        let quat = StepFunctionQuaternion::new(OpaqueAxisId(0)).step_function();
        assert_eq!(quat.stride, 16);
        assert_eq!(StepFunctionInt::stride(), 4);
    }

    #[test]
    fn test_serde_shapes() {
        let sf: StepFunction2D = serde_json::from_str("[3, 4]").unwrap();
        assert_eq!(sf, StepFunction2D::new(ValueAxisId(3), ValueAxisId(4)));
        assert_eq!(serde_json::to_string(&sf).unwrap(), "[3,4]");

        let one: StepFunction1D = serde_json::from_str("9").unwrap();
        assert_eq!(one.x, ValueAxisId(9));
    }

    #[test]
    fn test_display() {
        let sf = StepFunction::two_d(ValueAxisId(4), ValueAxisId(5));
        assert_eq!(sf.to_string(), "2d[4, 5]");
    }

    #[test]
    fn test_quat_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<Quat>(), 16);
        assert_eq!(&bytemuck::bytes_of(&Quat::IDENTITY)[12..16], &1.0f32.to_ne_bytes());
    }
}
