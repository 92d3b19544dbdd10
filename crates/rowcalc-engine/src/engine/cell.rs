//! Host-owned cell configuration.

use serde::{Deserialize, Serialize};

use super::value::{DataType, ErrorCode, Value};

/// Everything the host stores about one cell.
///
/// Literal cells carry `text` and `datatype`. Formula cells keep their
/// formula (with the leading `=`) in `text` plus the last evaluation outcome
/// in `result`/`result_type` or `error`/`error_message`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
}

impl CellConfig {
    /// Classify raw user input.
    ///
    /// `=` starts a formula, numeric text is a number, `TRUE`/`FALSE` are
    /// booleans, a double-quoted string is text with the quotes removed and
    /// blank input is an empty config.
    pub fn from_input(raw: &str) -> CellConfig {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellConfig::default();
        }
        if trimmed.starts_with('=') {
            return CellConfig::formula(trimmed);
        }
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            return CellConfig::with_text(&trimmed[1..trimmed.len() - 1], DataType::Text);
        }
        if trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
            return CellConfig::with_text(trimmed, DataType::Number);
        }
        if trimmed.eq_ignore_ascii_case("TRUE") || trimmed.eq_ignore_ascii_case("FALSE") {
            return CellConfig::with_text(&trimmed.to_ascii_uppercase(), DataType::Boolean);
        }
        CellConfig::with_text(raw, DataType::Text)
    }

    pub fn formula(text: &str) -> CellConfig {
        CellConfig::with_text(text, DataType::Formula)
    }

    fn with_text(text: &str, datatype: DataType) -> CellConfig {
        CellConfig {
            text: Some(text.to_string()),
            datatype: Some(datatype),
            ..Default::default()
        }
    }

    pub fn is_formula(&self) -> bool {
        self.datatype == Some(DataType::Formula)
            || (self.datatype.is_none()
                && self.text.as_deref().is_some_and(|t| t.starts_with('=')))
    }

    /// A cell with nothing the resolver could read from it.
    pub fn is_blank(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty)
            && self.result.is_none()
            && self.error.is_none()
    }

    /// Drop a previous evaluation outcome, keeping text and datatype.
    pub fn clear_result(&mut self) {
        self.result = None;
        self.result_type = None;
        self.error = None;
        self.error_message = None;
        self.hyperlink = None;
        self.color = None;
        self.underline = None;
    }
}
