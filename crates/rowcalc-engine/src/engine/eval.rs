//! Rhai engine creation.
//!
//! Creates the Rhai scripting engine with the formula natives (operators,
//! reference lookups) and every spreadsheet function registered.

use rhai::Engine;
use std::sync::Arc;

use super::resolver::Resolver;
use crate::builtins::{Functions, register_functions, register_natives};

/// Nesting limits for translated formulas (expressions, function bodies).
/// Rhai's parser recurses once per level with large frames in debug builds;
/// these stay well inside a 2 MiB thread stack. Translated formulas only
/// nest through `IF` branches.
const MAX_EXPR_DEPTH: usize = 128;
const MAX_FUNCTION_EXPR_DEPTH: usize = 64;

/// Create a Rhai engine whose reference lookups go through `resolver`.
pub fn create_engine(resolver: Arc<Resolver>, functions: &Functions) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH);
    register_natives(&mut engine, resolver);
    register_functions(&mut engine, functions);
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{FileDataSource, builtin_functions};
    use crate::engine::resolver::{EmptyStore, OutOfBounds, SheetBounds};
    use rhai::Dynamic;

    fn engine() -> Engine {
        let resolver = Arc::new(Resolver::new(
            Arc::new(EmptyStore),
            SheetBounds::default(),
            OutOfBounds::Clamp,
        ));
        create_engine(resolver, &builtin_functions(Arc::new(FileDataSource)))
    }

    #[test]
    fn test_registered_natives_are_callable() {
        let engine = engine();
        let value = engine.eval::<Dynamic>("OP_ADD(1, 2)").unwrap();
        assert_eq!(
            crate::engine::convert::dynamic_to_value(&value),
            crate::engine::Value::Number(3.0)
        );
    }

    #[test]
    fn test_functions_take_argument_arrays() {
        let engine = engine();
        let value = engine.eval::<Dynamic>("SUM([ARG(1), ARG(2.5)])").unwrap();
        assert_eq!(
            crate::engine::convert::dynamic_to_value(&value),
            crate::engine::Value::Number(3.5)
        );
    }

    #[test]
    fn test_empty_reference_reads_as_empty() {
        let engine = engine();
        let value = engine.eval::<Dynamic>(r#"REF_CELL("Sheet1", 3, 3)"#).unwrap();
        assert!(crate::engine::convert::dynamic_to_value(&value).is_empty());
    }
}
