use super::graph::Precedents;
use super::store::SheetStore;
use rowcalc_engine::engine::{
    CellPosition, EvaluatorOptions, FormulaEvaluator, ParseResult, Reference, SheetBounds,
    cell_value, format_value,
};
use std::path::PathBuf;
use std::sync::Arc;

/// UI-agnostic workbook: cells of every sheet plus the evaluator that
/// computes them.
pub struct Workbook {
    /// Cell storage, shared with the evaluator as its cell store
    pub(crate) store: SheetStore,
    pub(crate) evaluator: FormulaEvaluator,
    /// References read by each formula cell
    pub(crate) precedents: Precedents,
    /// Current file path
    pub file_path: Option<PathBuf>,
    /// Whether cells changed since the last load or save
    pub modified: bool,
}

impl Workbook {
    /// Create an empty workbook. Side-effect free: does not touch the filesystem.
    pub fn new(options: EvaluatorOptions) -> Self {
        let store = SheetStore::new();
        let evaluator = FormulaEvaluator::new(Arc::new(store.clone()), options);
        Workbook {
            store,
            evaluator,
            precedents: Precedents::new(),
            file_path: None,
            modified: false,
        }
    }

    pub fn store(&self) -> &SheetStore {
        &self.store
    }

    pub fn evaluator(&self) -> &FormulaEvaluator {
        &self.evaluator
    }

    pub fn bounds(&self) -> SheetBounds {
        self.evaluator.bounds()
    }

    /// Value of a cell as shown to the user. Errors show their code.
    pub fn display_value(&self, position: &CellPosition) -> String {
        self.store
            .get(position)
            .map(|cell| format_value(&cell_value(&cell)))
            .unwrap_or_default()
    }

    /// Evaluate a formula against the workbook without storing it.
    pub fn evaluate(&self, formula: &str, position: &CellPosition) -> ParseResult {
        self.evaluator.evaluate(formula, position)
    }

    pub fn dependencies(&self, formula: &str, position: &CellPosition) -> Vec<Reference> {
        self.evaluator.get_dependencies(formula, position)
    }

    /// Rebuild the precedents map from the store.
    /// Call this after cells are replaced wholesale.
    pub(crate) fn rebuild_precedents(&mut self) {
        self.precedents.clear();
        for (position, cell) in self.store.snapshot().iter() {
            if cell.is_formula() {
                let text = cell.text.as_deref().unwrap_or_default();
                let refs = self.evaluator.get_dependencies(text, &position);
                self.precedents.insert(position, refs);
            }
        }
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new(EvaluatorOptions::default())
    }
}
