//! Formula engine API.
//!
//! This module provides the computation core:
//!
//! - [`CellPosition`], [`CellRange`], [`Reference`] - Cell addressing (A1 notation)
//! - [`CellConfig`], [`CellsBySheet`] - Host cell data and the evaluation cache
//! - [`Resolver`], [`CellStore`] - Reference lookup against cache and host store
//! - [`FormulaEvaluator`] - Evaluate formulas and batches, report dependencies
//! - [`extract_dependencies`] - Token-level dependency extraction
//! - [`offset_formula_references`] - Shift references when filling formulas
//! - [`format_value`] - Format values for display

mod cache;
mod cell;
mod cell_ref;
pub(crate) mod convert;
mod deps;
mod eval;
mod evaluator;
mod fill;
mod format;
mod lexer;
mod parser;
mod resolver;
mod translate;
mod value;

pub use cache::CellsBySheet;
pub use cell::CellConfig;
pub use cell_ref::{
    CellPosition, CellRange, CellRef, MAX_COLUMN, MAX_ROW, Reference, SheetId, quote_sheet_name,
};
pub use deps::extract_dependencies;
pub use eval::create_engine;
pub use evaluator::{DEFAULT_HYPERLINK_COLOR, EvaluatorOptions, FormulaEvaluator, ParseResult};
pub use fill::offset_formula_references;
pub use format::{format_number, format_value};
pub use lexer::{LexError, Operator, RefAddress, RefToken, Token, TokenKind, tokenize};
pub use parser::{Expr, ParseError, UnaryOp, parse};
pub use resolver::{
    CellStore, DEFAULT_COLUMN_COUNT, DEFAULT_ROW_COUNT, EmptyStore, OutOfBounds, Resolver,
    SheetBounds, cell_value,
};
pub use value::{
    DataType, ErrorCode, FormulaError, FunctionArgument, FunctionOutput, Hyperlink, Value,
    coerce_number,
};
