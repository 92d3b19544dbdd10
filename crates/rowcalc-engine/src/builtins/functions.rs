//! Built-in spreadsheet functions.
//!
//! Each function takes the resolved arguments and returns a value or a
//! formula error. Conventions follow common spreadsheet behaviour: numeric
//! aggregates only count numbers found in ranges, but coerce values that
//! are passed directly.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use rand::Rng;

use super::operators::arithmetic;
use crate::engine::{
    ErrorCode, FormulaError, FunctionArgument, FunctionOutput, Hyperlink, Operator, Value,
};

type FnResult = Result<FunctionOutput, FormulaError>;

fn arity(args: &[FunctionArgument], min: usize, max: usize) -> Result<(), FormulaError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(FormulaError::wrong_arguments())
    }
}

/// Values inside one argument, flattening ranges and arrays.
fn flatten(arg: &FunctionArgument) -> Box<dyn Iterator<Item = &Value> + '_> {
    match &arg.value {
        Value::Array(rows) => Box::new(rows.iter().flatten()),
        value => Box::new(std::iter::once(value)),
    }
}

/// Whether values come from a range, reference or array, where only real
/// numbers take part in numeric aggregates.
fn from_collection(arg: &FunctionArgument) -> bool {
    arg.is_reference() || arg.is_array || matches!(arg.value, Value::Array(_))
}

fn numbers(args: &[FunctionArgument]) -> Result<Vec<f64>, FormulaError> {
    let mut out = Vec::new();
    for arg in args {
        if from_collection(arg) {
            for value in flatten(arg) {
                match value {
                    Value::Number(n) => out.push(*n),
                    Value::Error(e) => return Err(e.clone()),
                    _ => {}
                }
            }
        } else {
            out.push(arg.value.as_number()?);
        }
    }
    Ok(out)
}

fn number_arg(args: &[FunctionArgument], index: usize) -> Result<f64, FormulaError> {
    args.get(index)
        .map(|a| a.value.as_number())
        .unwrap_or(Ok(0.0))
}

fn text_arg(args: &[FunctionArgument], index: usize) -> Result<String, FormulaError> {
    args.get(index)
        .map(|a| a.value.as_text())
        .unwrap_or_else(|| Ok(String::new()))
}

pub(crate) fn sum(args: &[FunctionArgument]) -> FnResult {
    Ok(numbers(args)?.iter().sum::<f64>().into())
}

pub(crate) fn average(args: &[FunctionArgument]) -> FnResult {
    let values = numbers(args)?;
    if values.is_empty() {
        return Err(FormulaError::new(ErrorCode::Div0, "AVERAGE has no numbers"));
    }
    Ok((values.iter().sum::<f64>() / values.len() as f64).into())
}

pub(crate) fn count(args: &[FunctionArgument]) -> FnResult {
    let mut total = 0usize;
    for arg in args {
        if from_collection(arg) {
            total += flatten(arg)
                .filter(|v| matches!(v, Value::Number(_)))
                .count();
        } else if !arg.value.is_empty() && arg.value.as_number().is_ok() {
            total += 1;
        }
    }
    Ok((total as f64).into())
}

pub(crate) fn counta(args: &[FunctionArgument]) -> FnResult {
    let total = args
        .iter()
        .flat_map(|arg| flatten(arg))
        .filter(|v| !v.is_empty())
        .count();
    Ok((total as f64).into())
}

pub(crate) fn min(args: &[FunctionArgument]) -> FnResult {
    let values = numbers(args)?;
    Ok(values.into_iter().reduce(f64::min).unwrap_or(0.0).into())
}

pub(crate) fn max(args: &[FunctionArgument]) -> FnResult {
    let values = numbers(args)?;
    Ok(values.into_iter().reduce(f64::max).unwrap_or(0.0).into())
}

pub(crate) fn abs(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    Ok(number_arg(args, 0)?.abs().into())
}

pub(crate) fn round(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 2)?;
    let n = number_arg(args, 0)?;
    let digits = number_arg(args, 1)?.trunc();
    let factor = 10f64.powf(digits);
    // Drop binary noise first so 2.345 rounds up like its decimal form.
    let scaled = n * factor;
    let scaled = format!("{:.9}", scaled).parse::<f64>().unwrap_or(scaled);
    Ok((scaled.round() / factor).into())
}

pub(crate) fn power(args: &[FunctionArgument]) -> FnResult {
    arity(args, 2, 2)?;
    arithmetic(Operator::Pow, number_arg(args, 0)?, number_arg(args, 1)?).map(Into::into)
}

pub(crate) fn sqrt(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    let n = number_arg(args, 0)?;
    if n < 0.0 {
        return Err(FormulaError::new(ErrorCode::Num, "SQRT of a negative number"));
    }
    Ok(n.sqrt().into())
}

pub(crate) fn modulo(args: &[FunctionArgument]) -> FnResult {
    arity(args, 2, 2)?;
    let a = number_arg(args, 0)?;
    let b = number_arg(args, 1)?;
    if b == 0.0 {
        return Err(FormulaError::from_code(ErrorCode::Div0));
    }
    Ok((a - b * (a / b).floor()).into())
}

fn booleans(args: &[FunctionArgument]) -> Result<Vec<bool>, FormulaError> {
    let mut out = Vec::new();
    for arg in args {
        if from_collection(arg) {
            for value in flatten(arg) {
                match value {
                    Value::Boolean(b) => out.push(*b),
                    Value::Number(n) => out.push(*n != 0.0),
                    Value::Error(e) => return Err(e.clone()),
                    _ => {}
                }
            }
        } else {
            out.push(arg.value.as_bool()?);
        }
    }
    if out.is_empty() {
        return Err(FormulaError::new(ErrorCode::Value, "No logical values"));
    }
    Ok(out)
}

pub(crate) fn and(args: &[FunctionArgument]) -> FnResult {
    Ok(booleans(args)?.into_iter().all(|b| b).into())
}

pub(crate) fn or(args: &[FunctionArgument]) -> FnResult {
    Ok(booleans(args)?.into_iter().any(|b| b).into())
}

pub(crate) fn not(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    Ok((!args[0].value.as_bool()?).into())
}

pub(crate) fn concatenate(args: &[FunctionArgument]) -> FnResult {
    let mut out = String::new();
    for value in args.iter().flat_map(|arg| flatten(arg)) {
        out.push_str(&value.as_text()?);
    }
    Ok(out.into())
}

pub(crate) fn len(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    Ok((text_arg(args, 0)?.chars().count() as f64).into())
}

pub(crate) fn upper(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    Ok(text_arg(args, 0)?.to_uppercase().into())
}

pub(crate) fn lower(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    Ok(text_arg(args, 0)?.to_lowercase().into())
}

/// Strips leading and trailing spaces and collapses inner runs to one.
pub(crate) fn trim(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    let text = text_arg(args, 0)?;
    Ok(text.split_whitespace().collect::<Vec<_>>().join(" ").into())
}

pub(crate) fn isblank(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 1)?;
    Ok(args[0].value.is_empty().into())
}

pub(crate) fn hyperlink(args: &[FunctionArgument]) -> FnResult {
    arity(args, 1, 2)?;
    let title = args.get(1).map(|a| &a.value);
    if let Some(Value::Error(_)) = title {
        return Err(FormulaError::new(ErrorCode::Value, "Invalid title"));
    }
    if let Value::Error(_) = args[0].value {
        return Err(FormulaError::new(ErrorCode::Value, "Invalid url"));
    }
    let url = args[0].value.as_text()?;
    let title = match title {
        Some(value) => Some(value.as_text()?).filter(|t| !t.is_empty()),
        None => None,
    };
    Ok(FunctionOutput::Hyperlink(Hyperlink { title, url }))
}

pub(crate) fn rand(args: &[FunctionArgument]) -> FnResult {
    arity(args, 0, 0)?;
    Ok(rand::thread_rng().r#gen::<f64>().into())
}

pub(crate) fn randbetween(args: &[FunctionArgument]) -> FnResult {
    arity(args, 2, 2)?;
    let low = number_arg(args, 0)?.ceil();
    let high = number_arg(args, 1)?.floor();
    if low > high {
        return Err(FormulaError::new(
            ErrorCode::Num,
            "RANDBETWEEN bottom is greater than top",
        ));
    }
    let n = rand::thread_rng().gen_range(low as i64..=high as i64);
    Ok((n as f64).into())
}

fn serial_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Days since 1899-12-30, the usual spreadsheet date serial.
pub(crate) fn date_serial(at: NaiveDateTime) -> f64 {
    let days = (at.date() - serial_epoch().date()).num_days() as f64;
    days + at.num_seconds_from_midnight() as f64 / 86_400.0
}

pub(crate) fn today(args: &[FunctionArgument]) -> FnResult {
    arity(args, 0, 0)?;
    Ok(date_serial(Local::now().date_naive().and_time(Default::default())).into())
}

pub(crate) fn now(args: &[FunctionArgument]) -> FnResult {
    arity(args, 0, 0)?;
    Ok(date_serial(Local::now().naive_local()).into())
}
