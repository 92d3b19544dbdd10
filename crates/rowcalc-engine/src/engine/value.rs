//! Values flowing through formulas, formula errors and function I/O types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::format::format_number;

/// Spreadsheet error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "#NULL!")]
    Null,
    #[serde(rename = "#DIV/0!")]
    Div0,
    #[serde(rename = "#VALUE!")]
    Value,
    #[serde(rename = "#REF!")]
    Ref,
    #[serde(rename = "#NAME?")]
    Name,
    #[serde(rename = "#NUM!")]
    Num,
    #[serde(rename = "#N/A")]
    NotAvailable,
    #[serde(rename = "#ERROR!")]
    Error,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::Null,
        ErrorCode::Div0,
        ErrorCode::Value,
        ErrorCode::Ref,
        ErrorCode::Name,
        ErrorCode::Num,
        ErrorCode::NotAvailable,
        ErrorCode::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Null => "#NULL!",
            ErrorCode::Div0 => "#DIV/0!",
            ErrorCode::Value => "#VALUE!",
            ErrorCode::Ref => "#REF!",
            ErrorCode::Name => "#NAME?",
            ErrorCode::Num => "#NUM!",
            ErrorCode::NotAvailable => "#N/A",
            ErrorCode::Error => "#ERROR!",
        }
    }

    /// Case-insensitive lookup of an error literal such as `#n/a`.
    pub fn parse(text: &str) -> Option<ErrorCode> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(text))
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Null => "Empty intersection",
            ErrorCode::Div0 => "Division by zero",
            ErrorCode::Value => "Wrong value type",
            ErrorCode::Ref => "Invalid reference",
            ErrorCode::Name => "Unknown name",
            ErrorCode::Num => "Invalid numeric value",
            ErrorCode::NotAvailable => "Value not available",
            ErrorCode::Error => "Formula error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed formula error. Formula errors are data: they end up in
/// [`ParseResult`](super::ParseResult), never as a failure of the evaluator.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{code} {message}")]
pub struct FormulaError {
    pub code: ErrorCode,
    pub message: String,
}

impl FormulaError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        FormulaError {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn wrong_arguments() -> Self {
        Self::new(ErrorCode::NotAvailable, "Wrong number of arguments")
    }
}

/// A resolved cell value or formula result.
///
/// `Empty` is a blank cell; it serializes as `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
    Error(FormulaError),
    Array(Vec<Vec<Value>>),
}

impl Value {
    /// Wrap a float, turning NaN and infinities into `#NUM!`.
    pub fn number(n: f64) -> Value {
        if n.is_finite() {
            Value::Number(n)
        } else {
            Value::Error(FormulaError::from_code(ErrorCode::Num))
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Coerce for arithmetic: blank is 0, booleans are 1/0, numeric text parses.
    pub fn as_number(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Empty => Ok(0.0),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Ok(*n),
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                FormulaError::new(ErrorCode::Value, format!("Expected a number, got \"{s}\""))
            }),
            Value::Error(e) => Err(e.clone()),
            Value::Array(_) => Err(FormulaError::new(
                ErrorCode::Value,
                "Expected a single value, got an array",
            )),
        }
    }

    pub fn as_text(&self) -> Result<String, FormulaError> {
        match self {
            Value::Empty => Ok(String::new()),
            Value::Boolean(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Value::Number(n) => Ok(format_number(*n)),
            Value::Text(s) => Ok(s.clone()),
            Value::Error(e) => Err(e.clone()),
            Value::Array(_) => Err(FormulaError::new(
                ErrorCode::Value,
                "Expected a single value, got an array",
            )),
        }
    }

    pub fn as_bool(&self) -> Result<bool, FormulaError> {
        match self {
            Value::Empty => Ok(false),
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
            Value::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
            Value::Text(s) => Err(FormulaError::new(
                ErrorCode::Value,
                format!("Expected a boolean, got \"{s}\""),
            )),
            Value::Error(e) => Err(e.clone()),
            Value::Array(_) => Err(FormulaError::new(
                ErrorCode::Value,
                "Expected a single value, got an array",
            )),
        }
    }
}

/// Numeric coercion for stored cell text: absent or blank is `0`,
/// unparsable text yields `None` instead of a NaN.
pub fn coerce_number(raw: Option<&str>) -> Option<f64> {
    match raw.map(str::trim) {
        None | Some("") => Some(0.0),
        Some(s) => s.parse::<f64>().ok().filter(|n| n.is_finite()),
    }
}

/// Cell data type tags, shared by stored cells and evaluation results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Formula,
    Number,
    Text,
    Boolean,
    Hyperlink,
    Error,
}

/// Rich result produced by link-style functions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub title: Option<String>,
    pub url: String,
}

impl Hyperlink {
    /// The text shown in the cell: the title, or the URL when no title is given.
    pub fn display_text(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.url)
    }
}

/// What a spreadsheet function returns.
#[derive(Clone, Debug, PartialEq)]
pub enum FunctionOutput {
    Value(Value),
    Hyperlink(Hyperlink),
}

impl From<Value> for FunctionOutput {
    fn from(value: Value) -> Self {
        FunctionOutput::Value(value)
    }
}

impl From<f64> for FunctionOutput {
    fn from(n: f64) -> Self {
        FunctionOutput::Value(Value::number(n))
    }
}

impl From<bool> for FunctionOutput {
    fn from(b: bool) -> Self {
        FunctionOutput::Value(Value::Boolean(b))
    }
}

impl From<String> for FunctionOutput {
    fn from(s: String) -> Self {
        FunctionOutput::Value(Value::Text(s))
    }
}

/// A resolved argument as seen by a spreadsheet function.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionArgument {
    pub value: Value,
    pub is_array: bool,
    pub is_range_ref: bool,
    pub is_cell_ref: bool,
}

impl FunctionArgument {
    pub fn value(value: Value) -> Self {
        FunctionArgument {
            is_array: matches!(value, Value::Array(_)),
            value,
            ..Default::default()
        }
    }

    pub fn cell(value: Value) -> Self {
        FunctionArgument {
            is_cell_ref: true,
            ..Self::value(value)
        }
    }

    pub fn range(value: Value) -> Self {
        FunctionArgument {
            is_range_ref: true,
            ..Self::value(value)
        }
    }

    /// Whether the argument came from a reference rather than a literal or expression.
    pub fn is_reference(&self) -> bool {
        self.is_cell_ref || self.is_range_ref
    }
}
