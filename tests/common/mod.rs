//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use inputflow::dataset::{Dataset, StepFunction1D};
use inputflow::pipeline::ValueAxisId;

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f32, b: f32, epsilon: f32) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Values of a one-dimensional axis this tick
pub fn values(dataset: &Dataset, axis: ValueAxisId) -> Vec<f32> {
    dataset.values_x(StepFunction1D::new(axis)).to_vec()
}

/// Timestamps of a one-dimensional axis this tick
pub fn timestamps(dataset: &Dataset, axis: ValueAxisId) -> Vec<u64> {
    dataset.timestamps(StepFunction1D::new(axis)).to_vec()
}

/// Previous value of a one-dimensional axis
pub fn previous(dataset: &Dataset, axis: ValueAxisId) -> f32 {
    dataset.previous_value_x(StepFunction1D::new(axis))
}
