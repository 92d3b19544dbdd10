//! The formula evaluator: runs formulas and classifies their results.

use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::CellsBySheet;
use super::cell::CellConfig;
use super::cell_ref::{CellPosition, Reference};
use super::convert::{dynamic_to_output, error_from_rhai};
use super::deps::extract_dependencies;
use super::eval::create_engine;
use super::fill::offset_formula_references;
use super::parser::parse;
use super::resolver::{
    CellStore, DEFAULT_COLUMN_COUNT, DEFAULT_ROW_COUNT, OutOfBounds, Resolver, SheetBounds,
};
use super::translate::{Callee, translate};
use super::value::{DataType, ErrorCode, FormulaError, FunctionOutput, Value};
use crate::builtins::{DataSource, FileDataSource, Functions, builtin_functions, function_key};
use crate::error::{CalcError, Result};

/// Text color given to hyperlink results.
pub const DEFAULT_HYPERLINK_COLOR: &str = "#1155CC";

/// Outcome of evaluating one formula. Either `result` or `error` is set,
/// never both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
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

impl ParseResult {
    pub fn from_error(error: FormulaError) -> Self {
        ParseResult {
            result_type: Some(DataType::Error),
            error: Some(error.code),
            error_message: Some(error.message),
            ..Default::default()
        }
    }

    pub fn from_output(output: FunctionOutput) -> Self {
        match output {
            FunctionOutput::Hyperlink(link) => ParseResult {
                result: Some(Value::Text(link.display_text().to_string())),
                result_type: Some(DataType::Hyperlink),
                hyperlink: Some(link.url),
                color: Some(DEFAULT_HYPERLINK_COLOR.to_string()),
                underline: Some(true),
                ..Default::default()
            },
            FunctionOutput::Value(value) => Self::from_value(value),
        }
    }

    fn from_value(value: Value) -> Self {
        let result_type = match &value {
            Value::Error(e) => return Self::from_error(e.clone()),
            Value::Empty => return Self::from_value(Value::Number(0.0)),
            Value::Number(_) => Some(DataType::Number),
            Value::Text(_) => Some(DataType::Text),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Array(_) => None,
        };
        ParseResult {
            result: Some(value),
            result_type,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Store this outcome on a cell, replacing any previous outcome.
    pub fn apply_to(&self, cell: &mut CellConfig) {
        cell.clear_result();
        cell.result = self.result.clone();
        cell.result_type = self.result_type;
        cell.error = self.error;
        cell.error_message = self.error_message.clone();
        cell.hyperlink = self.hyperlink.clone();
        cell.color = self.color.clone();
        cell.underline = self.underline;
    }
}

pub struct EvaluatorOptions {
    pub row_count: usize,
    pub column_count: usize,
    pub out_of_bounds: OutOfBounds,
    /// Host functions. They replace built-ins of the same name.
    pub functions: Functions,
    /// Source for `IMPORTDATA`. Local files when unset.
    pub data_source: Option<Arc<dyn DataSource>>,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        EvaluatorOptions {
            row_count: DEFAULT_ROW_COUNT,
            column_count: DEFAULT_COLUMN_COUNT,
            out_of_bounds: OutOfBounds::default(),
            functions: Functions::new(),
            data_source: None,
        }
    }
}

/// Clears the evaluation cache when dropped, also while unwinding.
struct CacheGuard<'a> {
    resolver: &'a Resolver,
}

impl<'a> CacheGuard<'a> {
    fn prime(resolver: &'a Resolver, cells: CellsBySheet) -> Self {
        resolver.cache_values(cells);
        CacheGuard { resolver }
    }
}

impl Drop for CacheGuard<'_> {
    fn drop(&mut self) {
        self.resolver.clear_cache();
    }
}

pub struct FormulaEvaluator {
    engine: Engine,
    resolver: Arc<Resolver>,
    /// Registry keys of built-in and host functions.
    function_keys: BTreeSet<String>,
    custom_ast: Option<AST>,
    /// Script-defined function names by upper-cased name.
    script_functions: HashMap<String, String>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Evaluation panicked".to_string()
    }
}

impl FormulaEvaluator {
    pub fn new(store: Arc<dyn CellStore>, options: EvaluatorOptions) -> Self {
        let bounds = SheetBounds {
            row_count: options.row_count,
            column_count: options.column_count,
        };
        let resolver = Arc::new(Resolver::new(store, bounds, options.out_of_bounds));
        let data_source = options
            .data_source
            .unwrap_or_else(|| Arc::new(FileDataSource));

        let mut functions = builtin_functions(data_source);
        for (name, function) in options.functions {
            functions.insert(function_key(&name), function);
        }
        let engine = create_engine(Arc::clone(&resolver), &functions);
        let function_keys = functions.keys().map(|name| function_key(name)).collect();

        FormulaEvaluator {
            engine,
            resolver,
            function_keys,
            custom_ast: None,
            script_functions: HashMap::new(),
        }
    }

    /// Compile a Rhai script whose functions become callable from formulas,
    /// e.g. `fn double(x) { x * 2 }` makes `=DOUBLE(A1)` work. Replaces any
    /// previously loaded script.
    pub fn load_custom_functions(&mut self, script: &str) -> Result<()> {
        let ast = self
            .engine
            .compile(script)
            .map_err(|e| CalcError::Compile(e.to_string()))?
            .clone_functions_only();
        self.script_functions = ast
            .iter_functions()
            .map(|f| (f.name.to_uppercase(), f.name.to_string()))
            .collect();
        debug!(count = self.script_functions.len(), "loaded custom functions");
        self.custom_ast = Some(ast);
        Ok(())
    }

    fn callee(&self, name: &str) -> Callee {
        if let Some(script_name) = self.script_functions.get(&name.to_uppercase()) {
            return Callee::Script(script_name.clone());
        }
        let key = function_key(name);
        if self.function_keys.contains(&key) {
            Callee::Registered(key)
        } else {
            Callee::Unknown
        }
    }

    fn is_known(&self, name: &str) -> bool {
        self.function_keys.contains(name) || self.script_functions.values().any(|n| n == name)
    }

    /// Evaluate formula text (with or without the leading `=`) as if it were
    /// in the cell at `position`. Never fails: every problem is reported in
    /// the returned [`ParseResult`].
    pub fn evaluate(&self, text: &str, position: &CellPosition) -> ParseResult {
        let trimmed = text.trim();
        let formula = trimmed.strip_prefix('=').unwrap_or(trimmed);
        debug!(%position, formula, "evaluating");
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(formula, &position.sheet))) {
            Ok(Ok(output)) => ParseResult::from_output(output),
            Ok(Err(error)) => ParseResult::from_error(error),
            Err(payload) => {
                let message = panic_message(payload);
                warn!(%position, %message, "formula evaluation panicked");
                ParseResult::from_error(FormulaError::new(ErrorCode::Error, message))
            }
        }
    }

    fn run(&self, formula: &str, sheet: &str) -> std::result::Result<FunctionOutput, FormulaError> {
        let expr = parse(formula).map_err(|e| FormulaError::new(ErrorCode::Error, e.to_string()))?;
        let translation = translate(&expr, sheet, &|name| self.callee(name));

        let mut scope = Scope::new();
        for (i, literal) in translation.literals.into_iter().enumerate() {
            scope.push_constant_dynamic(format!("lit_{i}"), literal);
        }

        let result: std::result::Result<Dynamic, Box<EvalAltResult>> = match &self.custom_ast {
            Some(custom) => self
                .engine
                .compile_with_scope(&scope, &translation.script)
                .map_err(|e| Box::new(EvalAltResult::ErrorParsing(*e.0, e.1)))
                .and_then(|formula_ast| {
                    let merged = custom.merge(&formula_ast);
                    self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &merged)
                }),
            None => self
                .engine
                .eval_with_scope::<Dynamic>(&mut scope, &translation.script),
        };
        result
            .map(dynamic_to_output)
            .map_err(|err| error_from_rhai(&err, &|name| self.is_known(name)))
    }

    /// Single-cell convenience for [`calculate_batch`](Self::calculate_batch).
    pub fn calculate(&self, value: &str, position: &CellPosition) -> CellsBySheet {
        let changes = BTreeMap::from([((position.row, position.col), value.to_string())]);
        self.calculate_batch(&position.sheet, &changes, &[])
    }

    /// Evaluate a batch of edits to `sheet`.
    ///
    /// Every changed cell is visible to the batch's formulas before any of
    /// them runs. Formula cells among the changes and every position in
    /// `dependents` are evaluated; literal changes come back as their
    /// parsed config.
    pub fn calculate_batch(
        &self,
        sheet: &str,
        changes: &BTreeMap<(usize, usize), String>,
        dependents: &[CellPosition],
    ) -> CellsBySheet {
        let pending: CellsBySheet = changes
            .iter()
            .map(|((row, col), raw)| {
                (CellPosition::new(sheet, *row, *col), CellConfig::from_input(raw))
            })
            .collect();
        debug!(sheet, changes = pending.len(), dependents = dependents.len(), "calculating batch");
        self.evaluate_cells(pending, dependents)
    }

    /// Evaluate every formula in a freshly loaded workbook.
    pub fn initialize(&self, cells: &CellsBySheet) -> CellsBySheet {
        debug!(cells = cells.len(), "initializing");
        self.evaluate_cells(cells.clone(), &[])
    }

    fn evaluate_cells(&self, pending: CellsBySheet, dependents: &[CellPosition]) -> CellsBySheet {
        let positions: Vec<CellPosition> = pending.iter().map(|(position, _)| position).collect();
        let _guard = CacheGuard::prime(&self.resolver, pending);
        let primed = self.resolver.cache_snapshot();
        let mut results = CellsBySheet::new();
        for position in &positions {
            if let Some(cell) = primed.get_at(position) {
                results.insert_at(position, self.evaluate_cell(cell, position));
            }
        }
        for position in dependents {
            if results.get_at(position).is_some() {
                continue;
            }
            let Some(cell) = self.resolver.cell_config(position) else {
                continue;
            };
            if cell.is_formula() {
                results.insert_at(position, self.evaluate_cell(&cell, position));
            }
        }
        results
    }

    fn evaluate_cell(&self, cell: &CellConfig, position: &CellPosition) -> CellConfig {
        let mut out = cell.clone();
        if cell.is_formula() {
            let text = cell.text.as_deref().unwrap_or_default();
            self.evaluate(text, position).apply_to(&mut out);
        }
        out
    }

    /// References in `text`, qualified with `position`'s sheet when written
    /// without one.
    pub fn get_dependencies(&self, text: &str, position: &CellPosition) -> Vec<Reference> {
        extract_dependencies(text, &position.sheet)
    }

    pub fn update_row_column_count(&self, row_count: usize, column_count: usize) {
        self.resolver.set_bounds(SheetBounds {
            row_count,
            column_count,
        });
    }

    pub fn bounds(&self) -> SheetBounds {
        self.resolver.bounds()
    }

    /// Make pending cell values visible to lookups until
    /// [`clear_cached_values`](Self::clear_cached_values).
    pub fn cache_values(&self, cells: CellsBySheet) {
        self.resolver.cache_values(cells);
    }

    pub fn clear_cached_values(&self) {
        self.resolver.clear_cache();
    }

    pub fn cached_values(&self) -> CellsBySheet {
        self.resolver.cached()
    }

    pub fn set_store(&self, store: Arc<dyn CellStore>) {
        self.resolver.set_store(store);
    }

    /// Names usable in formulas, sorted.
    pub fn supported_functions(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.function_keys.clone();
        names.insert("IF".to_string());
        names.extend(self.script_functions.keys().cloned());
        names.into_iter().collect()
    }

    /// `formula` as it reads after being copied `delta_rows` down and
    /// `delta_cols` right.
    pub fn fill_formula(&self, formula: &str, delta_rows: i64, delta_cols: i64) -> String {
        offset_formula_references(formula, delta_rows, delta_cols)
    }
}
