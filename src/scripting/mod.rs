//! Rhai response curves for 1D processors.
//!
//! A processor whose curve is `{ kind = "script", source = "..." }` has its
//! source compiled once at pipeline construction. Two script shapes are
//! accepted:
//!
//! - a plain expression over `value` and `prev`:
//!   ```rhai
//!   sign(value) * value * value
//!   ```
//! - a `curve` function taking one or two parameters:
//!   ```rhai
//!   fn curve(value, prev) {
//!       smooth(value, prev, 0.5)
//!   }
//!   ```
//!
//! `value` is the deadzoned input sample and `prev` the deadzoned sample
//! before it. Scripts must return a number; integers are widened to float.
//!
//! ## Helper Functions
//!
//! - `clamp(x, min, max)`, `min(a, b)`, `max(a, b)`, `sign(x)`
//! - `lerp(a, b, t)`, `map_range(x, in_min, in_max, out_min, out_max)`
//! - `smoothstep(edge0, edge1, x)`
//! - `deadzone(x, min, max)` - rescale `|x|` from `[min, max]` onto `[0, 1]`
//! - `deadband(x, center, width)`
//! - `smooth(current, previous, alpha)` - exponential smoothing
//! - `expo(x, k)` - blend between linear (`k = 0`) and cubic (`k = 1`)
//! - `pow`, `sqrt`, `exp`, `ln`, `sin`, `cos`, `tan`, `atan2`, `floor`, `ceil`, `round`, `pi()`

mod engine;

pub use engine::{CompiledCurve, CurveEntry, ScriptEngine};

use crate::error::{InputFlowError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cache of compiled ASTs keyed by script source.
#[derive(Default)]
pub struct ScriptCache {
    cache: HashMap<String, AST>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get a cached AST or compile and cache it.
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<AST> {
        if let Some(ast) = self.cache.get(source) {
            return Ok(ast.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| InputFlowError::Script(format!("Compilation error: {}", e)))?;

        self.cache.insert(source.to_string(), ast.clone());
        Ok(ast)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Remove a specific script from the cache
    pub fn invalidate(&mut self, source: &str) {
        self.cache.remove(source);
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;

/// Built-in response curves.
pub mod builtins {
    /// Identity curve
    pub const LINEAR: &str = "value";

    /// Quadratic with the sign kept, finer control near center
    pub const SQUARED: &str = "sign(value) * value * value";

    /// Cubic
    pub const CUBIC: &str = "value * value * value";

    /// Half linear, half cubic
    pub const EXPO_50: &str = "expo(value, 0.5)";

    /// Smoothstep S-curve on `[-1, 1]`
    pub const S_CURVE: &str = r#"
fn curve(value) {
    sign(value) * smoothstep(0.0, 1.0, abs(value))
}
"#;

    /// Exponential smoothing against the previous sample
    pub const SMOOTH_50: &str = r#"
fn curve(value, prev) {
    smooth(value, prev, 0.5)
}
"#;

    /// All built-in curves with display names
    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Linear", LINEAR),
            ("Squared", SQUARED),
            ("Cubic", CUBIC),
            ("Expo 50%", EXPO_50),
            ("S-Curve", S_CURVE),
            ("Smooth 50%", SMOOTH_50),
        ]
    }
}
