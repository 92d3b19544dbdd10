//! Built-in spreadsheet functions and the native helpers formulas run on.
//!
//! Conventions:
//! - Spreadsheet-facing names are ALL CAPS (e.g. `SUM`, `AVERAGE`).
//! - Every function, built-in or host supplied, is registered in Rhai under
//!   its key from [`function_key`] and takes one array of argument
//!   descriptors, so any arity reaches the Rust implementation.
//! - Operators and reference lookups are registered as `OP_*`, `REF_CELL`
//!   and `REF_RANGE` natives; formula text is translated into calls to them.
//! - If you add a built-in, add it to [`BUILTINS`].

mod functions;
mod import;
mod operators;

use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::convert::{
    dynamic_to_value, output_to_dynamic, raise, value_to_dynamic, value_to_native,
};
use crate::engine::{
    CellPosition, CellRange, CellRef, FormulaError, FunctionArgument, FunctionOutput, Hyperlink,
    Operator, Resolver, UnaryOp, Value,
};

pub use import::{DataSource, FileDataSource, parse_delimited_line};

/// A spreadsheet function as provided by the host or built in.
pub type FormulaFunction =
    Arc<dyn Fn(&[FunctionArgument]) -> Result<FunctionOutput, FormulaError> + Send + Sync>;

/// Functions by name. Names are matched case-insensitively.
pub type Functions = HashMap<String, FormulaFunction>;

pub struct Builtin {
    pub name: &'static str,
    pub description: &'static str,
    function: fn(&[FunctionArgument]) -> Result<FunctionOutput, FormulaError>,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "SUM",
        description: "Sum of numbers",
        function: functions::sum,
    },
    Builtin {
        name: "AVERAGE",
        description: "Arithmetic mean of numbers",
        function: functions::average,
    },
    Builtin {
        name: "COUNT",
        description: "Count of numeric values",
        function: functions::count,
    },
    Builtin {
        name: "COUNTA",
        description: "Count of non-empty values",
        function: functions::counta,
    },
    Builtin {
        name: "MIN",
        description: "Smallest number",
        function: functions::min,
    },
    Builtin {
        name: "MAX",
        description: "Largest number",
        function: functions::max,
    },
    Builtin {
        name: "ABS",
        description: "Absolute value",
        function: functions::abs,
    },
    Builtin {
        name: "ROUND",
        description: "Round to a number of digits",
        function: functions::round,
    },
    Builtin {
        name: "POWER",
        description: "Number raised to a power",
        function: functions::power,
    },
    Builtin {
        name: "SQRT",
        description: "Square root",
        function: functions::sqrt,
    },
    Builtin {
        name: "MOD",
        description: "Remainder with the sign of the divisor",
        function: functions::modulo,
    },
    Builtin {
        name: "AND",
        description: "TRUE when every argument is true",
        function: functions::and,
    },
    Builtin {
        name: "OR",
        description: "TRUE when any argument is true",
        function: functions::or,
    },
    Builtin {
        name: "NOT",
        description: "Logical negation",
        function: functions::not,
    },
    Builtin {
        name: "CONCATENATE",
        description: "Join text",
        function: functions::concatenate,
    },
    Builtin {
        name: "CONCAT",
        description: "Join text, ranges included",
        function: functions::concatenate,
    },
    Builtin {
        name: "LEN",
        description: "Number of characters",
        function: functions::len,
    },
    Builtin {
        name: "UPPER",
        description: "Text in upper case",
        function: functions::upper,
    },
    Builtin {
        name: "LOWER",
        description: "Text in lower case",
        function: functions::lower,
    },
    Builtin {
        name: "TRIM",
        description: "Text with extra spaces removed",
        function: functions::trim,
    },
    Builtin {
        name: "ISBLANK",
        description: "TRUE for an empty cell",
        function: functions::isblank,
    },
    Builtin {
        name: "HYPERLINK",
        description: "Link with an optional title",
        function: functions::hyperlink,
    },
    Builtin {
        name: "RAND",
        description: "Random number in [0, 1)",
        function: functions::rand,
    },
    Builtin {
        name: "RANDBETWEEN",
        description: "Random integer between two bounds",
        function: functions::randbetween,
    },
    Builtin {
        name: "TODAY",
        description: "Current date as a serial number",
        function: functions::today,
    },
    Builtin {
        name: "NOW",
        description: "Current date and time as a serial number",
        function: functions::now,
    },
];

/// Registry key of a function name: upper case, with characters Rhai does
/// not accept in identifiers replaced by `_` (`STDEV.S` becomes `STDEV_S`).
pub fn function_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// The built-in function table, `IMPORTDATA` reading through `data_source`.
pub fn builtin_functions(data_source: Arc<dyn DataSource>) -> Functions {
    let mut table: Functions = BUILTINS
        .iter()
        .map(|b| {
            let function = b.function;
            let f: FormulaFunction = Arc::new(function);
            (b.name.to_string(), f)
        })
        .collect();
    table.insert(
        "IMPORTDATA".to_string(),
        Arc::new(move |args: &[FunctionArgument]| import::importdata(data_source.as_ref(), args)),
    );
    table
}

fn call_function(function: &FormulaFunction, args: Array) -> Dynamic {
    let args: Vec<FunctionArgument> = args
        .into_iter()
        .map(|arg| match arg.clone().try_cast::<FunctionArgument>() {
            Some(arg) => arg,
            None => FunctionArgument::value(dynamic_to_value(&arg)),
        })
        .collect();
    match function(&args) {
        Ok(output) => output_to_dynamic(output),
        Err(error) => value_to_dynamic(Value::Error(error)),
    }
}

/// Register spreadsheet functions, each under its [`function_key`].
pub(crate) fn register_functions(engine: &mut Engine, functions: &Functions) {
    for (name, function) in functions {
        let function = Arc::clone(function);
        engine.register_fn(function_key(name), move |args: Array| -> Dynamic {
            call_function(&function, args)
        });
    }
}

fn binary(op: Operator, lhs: Dynamic, rhs: Dynamic) -> Dynamic {
    value_to_dynamic(operators::binary(
        op,
        &dynamic_to_value(&lhs),
        &dynamic_to_value(&rhs),
    ))
}

fn unary(op: UnaryOp, value: Dynamic) -> Dynamic {
    value_to_dynamic(operators::unary(op, &dynamic_to_value(&value)))
}

fn coord(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Register the natives translated formulas call: operators, argument
/// wrappers, array constants and reference lookups through `resolver`.
pub(crate) fn register_natives(engine: &mut Engine, resolver: Arc<Resolver>) {
    engine.register_type_with_name::<Value>("Value");
    engine.register_type_with_name::<FormulaError>("FormulaError");
    engine.register_type_with_name::<Hyperlink>("Hyperlink");
    engine.register_type_with_name::<FunctionArgument>("FunctionArgument");

    let ops = [
        ("OP_ADD", Operator::Add),
        ("OP_SUB", Operator::Sub),
        ("OP_MUL", Operator::Mul),
        ("OP_DIV", Operator::Div),
        ("OP_POW", Operator::Pow),
        ("OP_CONCAT", Operator::Concat),
        ("OP_EQ", Operator::Eq),
        ("OP_NE", Operator::Ne),
        ("OP_LT", Operator::Lt),
        ("OP_LE", Operator::Le),
        ("OP_GT", Operator::Gt),
        ("OP_GE", Operator::Ge),
    ];
    for (name, op) in ops {
        engine.register_fn(name, move |lhs: Dynamic, rhs: Dynamic| binary(op, lhs, rhs));
    }
    engine.register_fn("OP_NEG", |value: Dynamic| unary(UnaryOp::Neg, value));
    engine.register_fn("OP_PLUS", |value: Dynamic| unary(UnaryOp::Plus, value));
    engine.register_fn("OP_PERCENT", |value: Dynamic| {
        value_to_dynamic(operators::percent(&dynamic_to_value(&value)))
    });

    // IF condition. An error condition aborts with that error.
    engine.register_fn(
        "TRUTHY",
        |value: Dynamic| -> Result<bool, Box<EvalAltResult>> {
            let value = dynamic_to_value(&value);
            match &value {
                Value::Array(rows) => {
                    let first = rows.first().and_then(|r| r.first()).cloned().unwrap_or_default();
                    first.as_bool().map_err(raise)
                }
                other => other.as_bool().map_err(raise),
            }
        },
    );

    engine.register_fn("ARG", |value: Dynamic| {
        FunctionArgument::value(dynamic_to_value(&value))
    });
    engine.register_fn("ARG_CELL", |value: Dynamic| {
        FunctionArgument::cell(dynamic_to_value(&value))
    });
    engine.register_fn("ARG_RANGE", |value: Dynamic| {
        FunctionArgument::range(dynamic_to_value(&value))
    });
    // Plain value for script-defined functions.
    engine.register_fn(
        "VAL",
        |value: Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
            value_to_native(dynamic_to_value(&value))
        },
    );

    engine.register_fn("ARRAY", |rows: Array| -> Dynamic {
        let rows = rows
            .into_iter()
            .map(|row| match row.try_cast::<Array>() {
                Some(cells) => cells.iter().map(dynamic_to_value).collect(),
                None => Vec::new(),
            })
            .collect();
        value_to_dynamic(Value::Array(rows))
    });

    let cell_resolver = Arc::clone(&resolver);
    engine.register_fn(
        "REF_CELL",
        move |sheet: ImmutableString, row: i64, col: i64| -> Dynamic {
            let position = CellPosition::new(sheet.as_str(), coord(row), coord(col));
            value_to_dynamic(cell_resolver.resolve_cell(&position))
        },
    );

    let range_resolver = resolver;
    engine.register_fn(
        "REF_RANGE",
        move |sheet: ImmutableString, r1: i64, c1: i64, r2: i64, c2: i64| -> Dynamic {
            let range = CellRange::new(
                sheet.as_str(),
                CellRef::new(coord(r1), coord(c1)),
                CellRef::new(coord(r2), coord(c2)),
            );
            value_to_dynamic(Value::Array(range_resolver.resolve_range(&range)))
        },
    );
}
