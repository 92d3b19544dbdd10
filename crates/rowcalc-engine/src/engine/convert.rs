//! Conversions between formula values and Rhai's `Dynamic`.
//!
//! Inside the engine every formula value travels as a `Value` custom type.
//! Script-defined functions work with plain Rhai values instead, so results
//! coming back from them are converted here as well.

use rhai::{Array, Dynamic, EvalAltResult, ImmutableString, Position};

use super::value::{ErrorCode, FormulaError, FunctionArgument, FunctionOutput, Hyperlink, Value};

pub(crate) fn value_to_dynamic(value: Value) -> Dynamic {
    Dynamic::from(value)
}

pub(crate) fn output_to_dynamic(output: FunctionOutput) -> Dynamic {
    match output {
        FunctionOutput::Value(value) => Dynamic::from(value),
        FunctionOutput::Hyperlink(link) => Dynamic::from(link),
    }
}

/// Read any engine or script value as a formula value. Hyperlinks read as
/// their display text.
pub(crate) fn dynamic_to_value(value: &Dynamic) -> Value {
    if let Some(v) = value.clone().try_cast::<Value>() {
        return v;
    }
    if let Some(link) = value.clone().try_cast::<Hyperlink>() {
        return Value::Text(link.display_text().to_string());
    }
    if let Some(err) = value.clone().try_cast::<FormulaError>() {
        return Value::Error(err);
    }
    if let Some(arg) = value.clone().try_cast::<FunctionArgument>() {
        return arg.value;
    }
    if value.is_unit() {
        return Value::Empty;
    }
    if let Ok(n) = value.as_float() {
        return Value::number(n);
    }
    if let Ok(n) = value.as_int() {
        return Value::Number(n as f64);
    }
    if let Ok(b) = value.as_bool() {
        return Value::Boolean(b);
    }
    if let Ok(c) = value.as_char() {
        return Value::Text(c.to_string());
    }
    if let Some(s) = value.clone().try_cast::<ImmutableString>() {
        return Value::Text(s.to_string());
    }
    if let Some(items) = value.clone().try_cast::<Array>() {
        return array_to_value(&items);
    }
    Value::Error(FormulaError::new(
        ErrorCode::Value,
        format!("Unsupported value of type {}", value.type_name()),
    ))
}

// A flat array is one row; an array of arrays is a grid.
fn array_to_value(items: &Array) -> Value {
    if !items.is_empty() && items.iter().all(|item| item.is_array()) {
        let rows = items
            .iter()
            .map(|row| match row.clone().try_cast::<Array>() {
                Some(cells) => cells.iter().map(dynamic_to_value).collect(),
                None => Vec::new(),
            })
            .collect();
        return Value::Array(rows);
    }
    Value::Array(vec![items.iter().map(dynamic_to_value).collect()])
}

/// Top-level result of a formula, keeping a hyperlink as a hyperlink.
pub(crate) fn dynamic_to_output(value: Dynamic) -> FunctionOutput {
    match value.clone().try_cast::<Hyperlink>() {
        Some(link) => FunctionOutput::Hyperlink(link),
        None => FunctionOutput::Value(dynamic_to_value(&value)),
    }
}

/// Plain Rhai value for script-defined functions. Errors are raised since
/// scripts have no way to inspect them.
pub(crate) fn value_to_native(value: Value) -> Result<Dynamic, Box<EvalAltResult>> {
    Ok(match value {
        Value::Empty => Dynamic::UNIT,
        Value::Boolean(b) => Dynamic::from_bool(b),
        Value::Number(n) => Dynamic::from_float(n),
        Value::Text(s) => Dynamic::from(s),
        Value::Error(e) => return Err(raise(e)),
        Value::Array(rows) => {
            let mut out = Array::with_capacity(rows.len());
            for row in rows {
                let cells = row
                    .into_iter()
                    .map(value_to_native)
                    .collect::<Result<Array, _>>()?;
                out.push(Dynamic::from_array(cells));
            }
            Dynamic::from_array(out)
        }
    })
}

/// Abort evaluation with a formula error.
pub(crate) fn raise(error: FormulaError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(error), Position::NONE).into()
}

/// Turn an engine failure into a formula error. `is_known` tells whether a
/// function name exists, to tell arity mistakes from unknown names.
pub(crate) fn error_from_rhai(err: &EvalAltResult, is_known: &dyn Fn(&str) -> bool) -> FormulaError {
    match err {
        EvalAltResult::ErrorRuntime(payload, _) => match payload.clone().try_cast::<FormulaError>() {
            Some(formula_error) => formula_error,
            None => FormulaError::new(ErrorCode::Error, payload.to_string()),
        },
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => error_from_rhai(inner, is_known),
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            let name = signature
                .split(|c: char| c == '(' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            if is_known(name) {
                FormulaError::wrong_arguments()
            } else {
                FormulaError::new(ErrorCode::Name, format!("Unknown function: {name}"))
            }
        }
        EvalAltResult::ErrorArithmetic(message, _) => FormulaError::new(ErrorCode::Div0, message),
        EvalAltResult::ErrorParsing(parse_error, _) => {
            FormulaError::new(ErrorCode::Error, parse_error.to_string())
        }
        other => FormulaError::new(ErrorCode::Error, other.to_string()),
    }
}
