//! Rhai engine setup and compiled curve evaluation.

use crate::error::{InputFlowError, Result};
use crate::scripting::{ScriptCache, SharedScriptCache};
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::{Arc, RwLock};

/// How a compiled curve is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveEntry {
    /// Top-level expression over `value` and `prev`.
    Expression,
    /// `fn curve(value)`
    Unary,
    /// `fn curve(value, prev)`
    Binary,
}

/// A compiled response curve, callable from any thread.
#[derive(Clone)]
pub struct CompiledCurve {
    engine: Arc<Engine>,
    ast: AST,
    source: String,
    name: String,
    entry: CurveEntry,
}

impl CompiledCurve {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> CurveEntry {
        self.entry
    }

    /// Evaluate the curve for one sample.
    pub fn eval(&self, value: f64, prev: f64) -> Result<f64> {
        // Function forms take their inputs as arguments; only the bare
        // expression reads them from scope.
        let result = match self.entry {
            CurveEntry::Unary => {
                self.engine
                    .call_fn::<Dynamic>(&mut Scope::new(), &self.ast, "curve", (value,))
            }
            CurveEntry::Binary => {
                self.engine
                    .call_fn::<Dynamic>(&mut Scope::new(), &self.ast, "curve", (value, prev))
            }
            CurveEntry::Expression => {
                let mut scope = Scope::new();
                scope.push("value", value);
                scope.push("prev", prev);
                self.engine
                    .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            }
        }
        .map_err(|e| {
            InputFlowError::Script(format!("Execution error in '{}': {}", self.name, e))
        })?;

        if let Ok(f) = result.as_float() {
            Ok(f)
        } else if let Ok(i) = result.as_int() {
            Ok(i as f64)
        } else {
            Err(InputFlowError::Script(format!(
                "Curve '{}' must return a numeric value, got {}",
                self.name,
                result.type_name()
            )))
        }
    }
}

impl std::fmt::Debug for CompiledCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledCurve")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("source", &self.source)
            .finish()
    }
}

/// Script engine shared by all processors of one pipeline.
pub struct ScriptEngine {
    engine: Arc<Engine>,
    cache: SharedScriptCache,
}

impl ScriptEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self {
            engine: Arc::new(engine),
            cache: Arc::new(RwLock::new(ScriptCache::new())),
        }
    }

    /// Configure safety limits and register helper functions.
    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("exp", |x: f64| x.exp());
        engine.register_fn("ln", |x: f64| x.ln());
        engine.register_fn("sin", |x: f64| x.sin());
        engine.register_fn("cos", |x: f64| x.cos());
        engine.register_fn("tan", |x: f64| x.tan());
        engine.register_fn("atan2", |y: f64, x: f64| y.atan2(x));
        engine.register_fn("floor", |x: f64| x.floor());
        engine.register_fn("ceil", |x: f64| x.ceil());
        engine.register_fn("round", |x: f64| x.round());

        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));
        engine.register_fn("min", |a: f64, b: f64| a.min(b));
        engine.register_fn("max", |a: f64, b: f64| a.max(b));
        engine.register_fn("pi", || std::f64::consts::PI);
        engine.register_fn("is_nan", |x: f64| x.is_nan());
        engine.register_fn("sign", |x: f64| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        });

        engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
        engine.register_fn(
            "map_range",
            |x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| {
                (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
            },
        );
        engine.register_fn("smoothstep", |edge0: f64, edge1: f64, x: f64| {
            let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        });

        // Rescale |x| from [min, max] onto [0, 1], keeping the sign
        engine.register_fn("deadzone", |x: f64, min: f64, max: f64| -> f64 {
            let magnitude = x.abs();
            if magnitude < min {
                0.0
            } else if max <= min {
                x.signum()
            } else {
                x.signum() * ((magnitude - min) / (max - min)).min(1.0)
            }
        });

        engine.register_fn("deadband", |x: f64, center: f64, width: f64| -> f64 {
            if (x - center).abs() < width / 2.0 {
                center
            } else {
                x
            }
        });

        engine.register_fn("smooth", |current: f64, previous: f64, alpha: f64| -> f64 {
            let alpha = alpha.clamp(0.0, 1.0);
            if previous.is_nan() {
                current
            } else {
                alpha * previous + (1.0 - alpha) * current
            }
        });

        engine.register_fn("expo", |x: f64, k: f64| -> f64 {
            let k = k.clamp(0.0, 1.0);
            (1.0 - k) * x + k * x * x * x
        });
    }

    /// Compile a curve, reusing the cached AST for identical sources.
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledCurve> {
        let ast = {
            let mut cache = self.cache.write().map_err(|e| {
                InputFlowError::Script(format!("Failed to acquire cache lock: {}", e))
            })?;
            cache.get_or_compile(&self.engine, source)?
        };

        let entry = Self::detect_entry(&ast).map_err(|arity| {
            InputFlowError::Script(format!(
                "'{}': fn curve takes {} parameters; expected 1 or 2",
                name, arity
            ))
        })?;

        tracing::debug!("Compiled curve '{}' ({:?})", name, entry);

        Ok(CompiledCurve {
            engine: self.engine.clone(),
            ast,
            source: source.to_string(),
            name: name.to_string(),
            entry,
        })
    }

    fn detect_entry(ast: &AST) -> std::result::Result<CurveEntry, usize> {
        let Some(arity) = ast
            .iter_functions()
            .find(|f| f.name == "curve")
            .map(|f| f.params.len())
        else {
            return Ok(CurveEntry::Expression);
        };

        match arity {
            1 => Ok(CurveEntry::Unary),
            2 => Ok(CurveEntry::Binary),
            n => Err(n),
        }
    }

    /// Compile and evaluate in one step.
    pub fn eval(&self, source: &str, value: f64, prev: f64) -> Result<f64> {
        self.compile("temp", source)?.eval(value, prev)
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| InputFlowError::Script(format!("Validation error: {}", e)))
    }

    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| InputFlowError::Script(format!("Failed to acquire cache lock: {}", e)))?;
        cache.clear();
        Ok(())
    }

    pub fn cache(&self) -> &SharedScriptCache {
        &self.cache
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_curve() {
        let engine = ScriptEngine::new();
        assert_eq!(engine.eval("value * 2.0", 0.25, 0.0).unwrap(), 0.5);
        assert_eq!(engine.eval("prev", 0.25, 0.75).unwrap(), 0.75);
    }

    #[test]
    fn test_function_curves() {
        let engine = ScriptEngine::new();

        let unary = engine.compile("unary", "fn curve(v) { v * v }").unwrap();
        assert_eq!(unary.entry(), CurveEntry::Unary);
        assert_eq!(unary.eval(0.5, 0.0).unwrap(), 0.25);

        let binary = engine
            .compile("binary", "fn curve(v, p) { (v + p) / 2.0 }")
            .unwrap();
        assert_eq!(binary.entry(), CurveEntry::Binary);
        assert_eq!(binary.eval(1.0, 0.0).unwrap(), 0.5);
    }

    #[test]
    fn test_function_curve_reads_arguments_only() {
        let engine = ScriptEngine::new();
        let curve = engine
            .compile("delta", "fn curve(value, prev) { value - prev }")
            .unwrap();
        for i in 0..100 {
            let v = f64::from(i) * 0.5;
            assert_eq!(curve.eval(v, 1.0).unwrap(), v - 1.0);
        }
    }

    #[test]
    fn test_bad_curve_arity() {
        let engine = ScriptEngine::new();
        let err = engine
            .compile("three", "fn curve(a, b, c) { a }")
            .unwrap_err();
        assert!(err.to_string().contains("expected 1 or 2"));
    }

    #[test]
    fn test_integer_result_is_widened() {
        let engine = ScriptEngine::new();
        assert_eq!(engine.eval("1", 0.0, 0.0).unwrap(), 1.0);
    }

    #[test]
    fn test_non_numeric_result() {
        let engine = ScriptEngine::new();
        let err = engine.eval("\"left\"", 0.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("numeric"));
    }

    #[test]
    fn test_operation_limit() {
        let engine = ScriptEngine::new();
        let err = engine
            .eval("let x = 0; loop { x += 1; }", 0.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, InputFlowError::Script(_)));
    }

    #[test]
    fn test_helpers() {
        let engine = ScriptEngine::new();
        assert_eq!(engine.eval("deadzone(value, 0.2, 0.8)", 0.1, 0.0).unwrap(), 0.0);
        assert!((engine.eval("deadzone(value, 0.2, 0.8)", -0.5, 0.0).unwrap() + 0.5).abs() < 1e-9);
        assert_eq!(engine.eval("smoothstep(0.0, 1.0, 0.5)", 0.0, 0.0).unwrap(), 0.5);
        assert_eq!(engine.eval("smooth(value, prev, 0.5)", 1.0, 0.0).unwrap(), 0.5);
        assert_eq!(engine.eval("clamp(value, -1.0, 1.0)", 3.0, 0.0).unwrap(), 1.0);
        assert_eq!(engine.eval("expo(value, 1.0)", 0.5, 0.0).unwrap(), 0.125);
    }

    #[test]
    fn test_validation_and_cache() {
        let engine = ScriptEngine::new();
        assert!(engine.validate("value * 2.0").is_ok());
        assert!(engine.validate("value * ").is_err());

        engine.compile("a", "value * 2.0").unwrap();
        engine.compile("b", "value * 2.0").unwrap();
        assert_eq!(engine.cache().read().unwrap().len(), 1);

        engine.clear_cache().unwrap();
        assert!(engine.cache().read().unwrap().is_empty());
    }

    #[test]
    fn test_compiled_curve_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledCurve>();
        assert_send_sync::<ScriptEngine>();
    }
}
