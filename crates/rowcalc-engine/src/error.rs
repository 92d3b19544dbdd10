use thiserror::Error;

/// Failures of the engine's own API. Problems inside a formula are not
/// errors here: they are reported as formula errors in a `ParseResult`.
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Error in custom functions: {0}")]
    Compile(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}

pub type Result<T> = std::result::Result<T, CalcError>;
