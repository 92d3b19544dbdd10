//! Rowcalc formula engine.
//!
//! Evaluates spreadsheet formulas against a host-provided cell store:
//! references are resolved through a [`Resolver`](engine::Resolver) that
//! consults a per-batch evaluation cache before the store, formulas are
//! translated to Rhai and run with the spreadsheet functions in
//! [`builtins`], and results come back as [`ParseResult`](engine::ParseResult)s.

pub mod builtins;
pub mod engine;
pub mod error;

pub use error::{CalcError, Result};
