//! Contract assertions for the ingress hot path.
//!
//! A violated invariant means the pipeline was wired incorrectly (for
//! example reading the Y channel of a one-dimensional step function), not
//! that the input data was bad. Such violations are fatal: they are logged
//! and then panic.
//!
//! The checks are active in every build profile. Enabling the
//! `unchecked-invariants` feature compiles them out; slice accesses stay
//! bounds-checked regardless.

use std::fmt;

/// Assert a contract invariant.
///
/// ```ignore
/// invariant!(sf.dimensions >= 2, "values_y on a {}-dimensional step function", sf.dimensions);
/// ```
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if cfg!(not(feature = "unchecked-invariants")) && !($cond) {
            $crate::invariant::violation(format_args!($($arg)+));
        }
    };
}

/// Report an invariant violation and abort the current tick by panicking.
#[cold]
#[inline(never)]
#[track_caller]
pub fn violation(args: fmt::Arguments<'_>) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!("Invariant violated at {}: {}", location, args);
    panic!("invariant violated: {}", args);
}

/// Whether contract checks are compiled into this build.
pub const fn enabled() -> bool {
    cfg!(not(feature = "unchecked-invariants"))
}
