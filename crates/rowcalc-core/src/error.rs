//! Error types for rowcalc core.

use rowcalc_engine::CalcError;
use thiserror::Error;

/// Errors that can occur while editing, loading or saving a workbook
#[derive(Error, Debug)]
pub enum RowcalcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("No file path set")]
    NoFilePath,

    #[error("CSV file is empty")]
    EmptyCsv,

    #[error(transparent)]
    Engine(#[from] CalcError),
}

pub type Result<T> = std::result::Result<T, RowcalcError>;
