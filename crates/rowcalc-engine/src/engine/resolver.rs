//! Reference resolution against the evaluation cache and the host store.
//!
//! Lookups consult the cache first so that cells changed in the current
//! batch are seen with their new content, then fall back to the host's
//! [`CellStore`].

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use super::cache::CellsBySheet;
use super::cell::CellConfig;
use super::cell_ref::{CellPosition, CellRange};
use super::value::{DataType, ErrorCode, FormulaError, Value, coerce_number};

pub const DEFAULT_ROW_COUNT: usize = 1000;
pub const DEFAULT_COLUMN_COUNT: usize = 100;

/// Read access to the host's cells.
pub trait CellStore: Send + Sync {
    fn get_value(&self, sheet: &str, row: usize, col: usize) -> Option<CellConfig>;

    /// First and last populated row of `sheet`. An empty sheet may return
    /// any pair with `min > max`.
    fn min_max_rows(&self, sheet: &str) -> (usize, usize);

    /// First and last populated column of one row.
    fn min_max_columns(&self, sheet: &str, row: usize) -> (usize, usize);
}

/// A store with no cells.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyStore;

impl CellStore for EmptyStore {
    fn get_value(&self, _sheet: &str, _row: usize, _col: usize) -> Option<CellConfig> {
        None
    }

    fn min_max_rows(&self, _sheet: &str) -> (usize, usize) {
        (1, 0)
    }

    fn min_max_columns(&self, _sheet: &str, _row: usize) -> (usize, usize) {
        (1, 0)
    }
}

/// What a single-cell reference beyond the sheet's bounds resolves to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfBounds {
    /// Read the nearest in-bounds cell.
    #[default]
    Clamp,
    /// Resolve to `#REF!`.
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SheetBounds {
    pub row_count: usize,
    pub column_count: usize,
}

impl Default for SheetBounds {
    fn default() -> Self {
        SheetBounds {
            row_count: DEFAULT_ROW_COUNT,
            column_count: DEFAULT_COLUMN_COUNT,
        }
    }
}

pub struct Resolver {
    store: RwLock<Arc<dyn CellStore>>,
    /// Copy-on-write: range lookups hold a snapshot, writers clone only
    /// while one is outstanding.
    cache: RwLock<Arc<CellsBySheet>>,
    bounds: RwLock<SheetBounds>,
    policy: OutOfBounds,
}

fn read<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T: ?Sized>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Resolver {
    pub fn new(store: Arc<dyn CellStore>, bounds: SheetBounds, policy: OutOfBounds) -> Self {
        Resolver {
            store: RwLock::new(store),
            cache: RwLock::new(Arc::new(CellsBySheet::new())),
            bounds: RwLock::new(bounds),
            policy,
        }
    }

    pub fn set_store(&self, store: Arc<dyn CellStore>) {
        *write(&self.store) = store;
    }

    pub fn bounds(&self) -> SheetBounds {
        *read(&self.bounds)
    }

    pub fn set_bounds(&self, bounds: SheetBounds) {
        *write(&self.bounds) = bounds;
    }

    pub fn cache_values(&self, cells: CellsBySheet) {
        Arc::make_mut(&mut *write(&self.cache)).merge(cells);
    }

    pub fn clear_cache(&self) {
        *write(&self.cache) = Arc::default();
    }

    pub fn cached(&self) -> CellsBySheet {
        CellsBySheet::clone(&read(&self.cache))
    }

    pub(crate) fn cache_snapshot(&self) -> Arc<CellsBySheet> {
        Arc::clone(&read(&self.cache))
    }

    // The store is cloned out of its lock so host callbacks may re-enter
    // the evaluator.
    fn store(&self) -> Arc<dyn CellStore> {
        Arc::clone(&read(&self.store))
    }

    fn lookup(&self, sheet: &str, row: usize, col: usize) -> Option<CellConfig> {
        lookup_in(&self.cache_snapshot(), self.store().as_ref(), sheet, row, col)
    }

    /// Raw config of a cell, pending edits first. No clamping.
    pub fn cell_config(&self, position: &CellPosition) -> Option<CellConfig> {
        self.lookup(&position.sheet, position.row, position.col)
    }

    /// Value of one cell. Absent cells are `Empty`.
    pub fn resolve_cell(&self, position: &CellPosition) -> Value {
        self.value_at(
            &self.cache_snapshot(),
            self.store().as_ref(),
            self.bounds(),
            &position.sheet,
            position.row,
            position.col,
        )
    }

    // Clamping and the out-of-bounds policy apply to every cell read,
    // whether it came from a single reference or a range.
    fn value_at(
        &self,
        cache: &CellsBySheet,
        store: &dyn CellStore,
        bounds: SheetBounds,
        sheet: &str,
        row: usize,
        col: usize,
    ) -> Value {
        let in_bounds =
            (1..=bounds.row_count).contains(&row) && (1..=bounds.column_count).contains(&col);
        if !in_bounds && self.policy == OutOfBounds::Error {
            let position = CellPosition::new(sheet, row, col);
            return Value::Error(FormulaError::new(
                ErrorCode::Ref,
                format!("Reference {position} is outside the sheet"),
            ));
        }
        let row = row.min(bounds.row_count).max(1);
        let col = col.min(bounds.column_count).max(1);
        lookup_in(cache, store, sheet, row, col)
            .map(|cell| cell_value(&cell))
            .unwrap_or_default()
    }

    /// Values of a range, row-major, truncated to the populated area of
    /// the sheet. Rows with nothing inside the range are left out, so a
    /// range entirely outside the populated area is `[]`. Each cell is
    /// then read like a single reference, so a populated cell beyond the
    /// sheet's bounds is clamped or becomes `#REF!` per [`OutOfBounds`].
    pub fn resolve_range(&self, range: &CellRange) -> Vec<Vec<Value>> {
        let range = range.normalized();
        let sheet = range.sheet.as_str();
        let store = self.store();
        let cache = self.cache_snapshot();
        let bounds = self.bounds();

        let (mut min_row, mut max_row) = store.min_max_rows(sheet);
        if let Some((lo, hi)) = cache.row_extent(sheet) {
            (min_row, max_row) = union((min_row, max_row), (lo, hi));
        }
        let first_row = range.from.row.max(min_row);
        let last_row = range.to.row.min(max_row);

        let mut rows = Vec::new();
        for row in first_row..=last_row {
            let (mut min_col, mut max_col) = store.min_max_columns(sheet, row);
            if let Some((lo, hi)) = cache.column_extent(sheet, row) {
                (min_col, max_col) = union((min_col, max_col), (lo, hi));
            }
            let first_col = range.from.col.max(min_col);
            let last_col = range.to.col.min(max_col);
            if first_col > last_col {
                continue;
            }
            let values = (first_col..=last_col)
                .map(|col| self.value_at(&cache, store.as_ref(), bounds, sheet, row, col))
                .collect();
            rows.push(values);
        }
        trace!(%range, rows = rows.len(), "resolved range");
        rows
    }
}

fn lookup_in(
    cache: &CellsBySheet,
    store: &dyn CellStore,
    sheet: &str,
    row: usize,
    col: usize,
) -> Option<CellConfig> {
    if let Some(cell) = cache.get(sheet, row, col) {
        trace!(sheet, row, col, "resolved from cache");
        return Some(cell.clone());
    }
    trace!(sheet, row, col, "resolved from store");
    store.get_value(sheet, row, col)
}

// An empty extent (`min > max`) contributes nothing.
fn union(a: (usize, usize), b: (usize, usize)) -> (usize, usize) {
    match (a.0 <= a.1, b.0 <= b.1) {
        (true, true) => (a.0.min(b.0), a.1.max(b.1)),
        (false, true) => b,
        _ => a,
    }
}

/// The value a cell contributes to formulas that reference it.
pub fn cell_value(cell: &CellConfig) -> Value {
    if cell.is_formula() || cell.result_type.is_some() {
        if let Some(code) = cell.error {
            let message = cell
                .error_message
                .clone()
                .unwrap_or_else(|| code.to_string());
            return Value::Error(FormulaError::new(code, message));
        }
        return match (&cell.result, cell.result_type) {
            (None, _) => Value::Empty,
            (Some(Value::Text(s)), Some(DataType::Number)) => match coerce_number(Some(s)) {
                Some(n) => Value::Number(n),
                None => Value::Text(s.clone()),
            },
            (Some(result), _) => result.clone(),
        };
    }

    let text = cell.text.as_deref().unwrap_or_default();
    match cell.datatype {
        Some(DataType::Number) => match coerce_number(cell.text.as_deref()) {
            Some(n) => Value::Number(n),
            None => Value::Text(text.to_string()),
        },
        Some(DataType::Boolean) => Value::Boolean(text.trim().eq_ignore_ascii_case("TRUE")),
        Some(DataType::Error) => Value::Error(match cell.error {
            Some(code) => FormulaError::new(
                code,
                cell.error_message.clone().unwrap_or_else(|| code.to_string()),
            ),
            None => ErrorCode::parse(text.trim())
                .map(FormulaError::from_code)
                .unwrap_or_else(|| FormulaError::new(ErrorCode::Error, text)),
        }),
        _ if text.is_empty() => Value::Empty,
        _ => Value::Text(text.to_string()),
    }
}
