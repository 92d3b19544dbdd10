use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rowcalc_engine::engine::{
    CellConfig, CellPosition, CellRange, CellRef, CellStore, CellsBySheet, DataType, ErrorCode,
    EvaluatorOptions, FormulaEvaluator, OutOfBounds, Reference, Resolver, SheetBounds, Value,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// In-memory host store.
#[derive(Default)]
struct MemoryStore {
    cells: RwLock<CellsBySheet>,
}

impl MemoryStore {
    fn with(cells: &[(&str, usize, usize, &str)]) -> Arc<Self> {
        let store = MemoryStore::default();
        for (sheet, row, col, input) in cells {
            store.set(sheet, *row, *col, CellConfig::from_input(input));
        }
        Arc::new(store)
    }

    fn set(&self, sheet: &str, row: usize, col: usize, cell: CellConfig) {
        self.cells.write().unwrap().insert(sheet, row, col, cell);
    }
}

impl CellStore for MemoryStore {
    fn get_value(&self, sheet: &str, row: usize, col: usize) -> Option<CellConfig> {
        self.cells.read().unwrap().get(sheet, row, col).cloned()
    }

    fn min_max_rows(&self, sheet: &str) -> (usize, usize) {
        self.cells.read().unwrap().row_extent(sheet).unwrap_or((1, 0))
    }

    fn min_max_columns(&self, sheet: &str, row: usize) -> (usize, usize) {
        self.cells
            .read()
            .unwrap()
            .column_extent(sheet, row)
            .unwrap_or((1, 0))
    }
}

fn evaluator(store: Arc<MemoryStore>) -> FormulaEvaluator {
    FormulaEvaluator::new(store, EvaluatorOptions::default())
}

fn pos(row: usize, col: usize) -> CellPosition {
    CellPosition::new("Sheet1", row, col)
}

fn grid() -> Arc<MemoryStore> {
    MemoryStore::with(&[
        ("Sheet1", 1, 1, "1"),
        ("Sheet1", 1, 2, "2"),
        ("Sheet1", 2, 1, "3"),
        ("Sheet1", 2, 2, "4"),
        ("Sheet1", 3, 1, "text"),
        ("Sheet2", 2, 2, "10"),
        ("Sheet2", 3, 2, "20"),
        ("Sheet2", 4, 2, "30"),
    ])
}

#[test]
fn literal_numeric_cell_resolves_to_number() {
    let e = evaluator(MemoryStore::with(&[("Sheet1", 1, 1, "42")]));
    let r = e.evaluate("=A1", &pos(1, 2));
    assert_eq!(r.result, Some(Value::Number(42.0)));
    assert_eq!(r.result_type, Some(DataType::Number));
}

#[test]
fn references_feed_functions() {
    let e = evaluator(grid());
    assert_eq!(e.evaluate("=SUM(A1:B2)", &pos(9, 9)).result, Some(Value::Number(10.0)));
    assert_eq!(
        e.evaluate("=SUM(A1:A3)", &pos(9, 9)).result,
        Some(Value::Number(4.0))
    );
    assert_eq!(
        e.evaluate("=AVERAGE(Sheet2!B2:B4)", &pos(9, 9)).result,
        Some(Value::Number(20.0))
    );
    assert_eq!(
        e.evaluate("=A1+A3", &pos(9, 9)).error,
        Some(ErrorCode::Value)
    );
    assert_eq!(
        e.evaluate("=CONCATENATE(A3, \"-\", B2)", &pos(9, 9)).result,
        Some(Value::Text("text-4".into()))
    );
}

#[test]
fn column_range_reads_whole_column() {
    let e = evaluator(grid());
    assert_eq!(e.evaluate("=SUM(A:A)", &pos(9, 9)).result, Some(Value::Number(4.0)));
    assert_eq!(e.evaluate("=COUNTA(A:B)", &pos(9, 9)).result, Some(Value::Number(5.0)));
}

#[test]
fn referenced_errors_propagate() {
    let store = MemoryStore::with(&[]);
    let mut failed = CellConfig::formula("=1/0");
    failed.error = Some(ErrorCode::Div0);
    failed.error_message = Some("Division by zero".into());
    failed.result_type = Some(DataType::Error);
    store.set("Sheet1", 1, 1, failed);
    let e = evaluator(store);
    let r = e.evaluate("=A1+1", &pos(1, 2));
    assert_eq!(r.error, Some(ErrorCode::Div0));
    assert_eq!(r.error_message.as_deref(), Some("Division by zero"));
}

#[test]
fn fully_out_of_bounds_range_is_empty() {
    let store = grid();
    let resolver = Resolver::new(store, SheetBounds::default(), OutOfBounds::Clamp);
    let range = CellRange::new("Sheet1", CellRef::new(100, 100), CellRef::new(200, 200));
    assert!(resolver.resolve_range(&range).is_empty());
}

#[test]
fn out_of_bounds_policy_error() {
    let options = EvaluatorOptions {
        out_of_bounds: OutOfBounds::Error,
        row_count: 10,
        column_count: 10,
        ..Default::default()
    };
    let e = FormulaEvaluator::new(grid(), options);
    assert_eq!(e.evaluate("=Z99", &pos(1, 1)).error, Some(ErrorCode::Ref));
}

#[test]
fn bounds_update_changes_clamping() {
    let e = evaluator(MemoryStore::with(&[("Sheet1", 5, 1, "7")]));
    e.update_row_column_count(5, 5);
    assert_eq!(e.evaluate("=A50", &pos(1, 2)).result, Some(Value::Number(7.0)));
    assert_eq!(e.bounds(), SheetBounds { row_count: 5, column_count: 5 });
}

#[test]
fn batch_sees_pending_values() {
    let e = evaluator(MemoryStore::with(&[]));
    let changes = BTreeMap::from([
        ((1, 1), "5".to_string()),
        ((2, 1), "=A1*2".to_string()),
    ]);
    let out = e.calculate_batch("Sheet1", &changes, &[]);
    let a2 = out.get("Sheet1", 2, 1).unwrap();
    assert_eq!(a2.result, Some(Value::Number(10.0)));
    assert_eq!(a2.text.as_deref(), Some("=A1*2"));
    // Literal changes are echoed back.
    assert_eq!(out.get("Sheet1", 1, 1), Some(&CellConfig::from_input("5")));
}

#[test]
fn cache_is_empty_after_batch() {
    let e = evaluator(MemoryStore::with(&[]));
    let changes = BTreeMap::from([((1, 1), "=1+1".to_string())]);
    e.calculate_batch("Sheet1", &changes, &[]);
    assert!(e.cached_values().is_empty());
}

#[test]
fn batch_evaluates_dependents_from_store() {
    let store = MemoryStore::with(&[("Sheet1", 1, 1, "1")]);
    store.set("Sheet1", 1, 2, CellConfig::formula("=A1*10"));
    let e = evaluator(store);
    let changes = BTreeMap::from([((1, 1), "3".to_string())]);
    let out = e.calculate_batch("Sheet1", &changes, &[pos(1, 2)]);
    assert_eq!(out.get("Sheet1", 1, 2).unwrap().result, Some(Value::Number(30.0)));
}

#[test]
fn calculate_single_change() {
    let e = evaluator(grid());
    let out = e.calculate("=B2*2", &pos(5, 5));
    assert_eq!(out.len(), 1);
    assert_eq!(out.get("Sheet1", 5, 5).unwrap().result, Some(Value::Number(8.0)));
}

#[test]
fn initialize_evaluates_every_formula() {
    let e = evaluator(MemoryStore::with(&[]));
    let cells: CellsBySheet = [
        (pos(1, 1), CellConfig::from_input("2")),
        (pos(1, 2), CellConfig::from_input("=A1^2")),
        (CellPosition::new("Other", 1, 1), CellConfig::from_input("=Sheet1!A1+1")),
    ]
    .into_iter()
    .collect();
    let out = e.initialize(&cells);
    assert_eq!(out.len(), 3);
    assert_eq!(out.get("Sheet1", 1, 2).unwrap().result, Some(Value::Number(4.0)));
    assert_eq!(out.get("Other", 1, 1).unwrap().result, Some(Value::Number(3.0)));
    assert!(e.cached_values().is_empty());
}

#[test]
fn initialize_large_workbook_with_ranges() {
    let e = evaluator(MemoryStore::with(&[]));
    let n = 4000;
    let mut cells = CellsBySheet::new();
    for row in 1..=n {
        cells.insert("Sheet1", row, 1, CellConfig::from_input(&row.to_string()));
        cells.insert("Sheet1", row, 2, CellConfig::from_input("=SUM(A1:A2)"));
    }
    let out = e.initialize(&cells);
    assert_eq!(out.len(), 2 * n);
    assert_eq!(out.get("Sheet1", n, 2).unwrap().result, Some(Value::Number(3.0)));
    assert!(e.cached_values().is_empty());
}

#[test]
fn long_chain_formula_evaluates() {
    let e = evaluator(grid());
    let formula = format!("={}", vec!["A1"; 1000].join("+"));
    assert_eq!(e.evaluate(&formula, &pos(9, 9)).result, Some(Value::Number(1000.0)));
}

#[test]
fn hyperlink_round_trip() {
    let e = evaluator(MemoryStore::with(&[]));
    let r = e.evaluate("=HYPERLINK(\"http://x\",\"Go\")", &pos(1, 1));
    assert_eq!(r.result, Some(Value::Text("Go".into())));
    assert_eq!(r.result_type, Some(DataType::Hyperlink));
    assert_eq!(r.hyperlink.as_deref(), Some("http://x"));
    assert_eq!(r.underline, Some(true));

    let mut cell = CellConfig::formula("=HYPERLINK(\"http://x\",\"Go\")");
    r.apply_to(&mut cell);
    let json = serde_json::to_value(&cell).unwrap();
    assert_eq!(json["hyperlink"], "http://x");
    assert_eq!(json["resultType"], "hyperlink");
}

#[test]
fn incomplete_formula_reports_error() {
    let e = evaluator(MemoryStore::with(&[]));
    let r = e.evaluate("=SUM(", &pos(1, 1));
    assert!(r.error.is_some());
    assert!(r.result.is_none());
}

#[test]
fn dependencies_in_textual_order() {
    let e = evaluator(MemoryStore::with(&[]));
    let deps = e.get_dependencies("=SUM(A1,Sheet2!B2:B4)", &pos(3, 3));
    assert_eq!(
        deps,
        vec![
            Reference::Cell(pos(1, 1)),
            Reference::Range(CellRange::new("Sheet2", CellRef::new(2, 2), CellRef::new(4, 2))),
        ]
    );
}

#[test]
fn store_can_be_swapped() {
    let e = evaluator(MemoryStore::with(&[("Sheet1", 1, 1, "1")]));
    e.set_store(MemoryStore::with(&[("Sheet1", 1, 1, "2")]));
    assert_eq!(e.evaluate("=A1", &pos(2, 2)).result, Some(Value::Number(2.0)));
}

#[test]
fn fill_formula_offsets_relative_references() {
    let e = evaluator(MemoryStore::with(&[]));
    assert_eq!(e.fill_formula("=SUM(A1:A3)*$B$1", 1, 0), "=SUM(A2:A4)*$B$1");
}

proptest! {
    #[test]
    fn descending_ranges_equal_normalized(
        r1 in 1usize..6, c1 in 1usize..6, r2 in 1usize..6, c2 in 1usize..6,
    ) {
        let resolver = Resolver::new(grid(), SheetBounds::default(), OutOfBounds::Clamp);
        let range = CellRange::new("Sheet1", CellRef::new(r1, c1), CellRef::new(r2, c2));
        prop_assert_eq!(
            resolver.resolve_range(&range),
            resolver.resolve_range(&range.normalized())
        );
    }

    #[test]
    fn evaluation_is_idempotent(a in -1000i32..1000, b in -1000i32..1000, op in 0usize..6) {
        let e = evaluator(grid());
        let ops = ["+", "-", "*", "/", "&", "<"];
        let formula = format!("={a}{}{b}+A1", ops[op]);
        prop_assert_eq!(e.evaluate(&formula, &pos(9, 9)), e.evaluate(&formula, &pos(9, 9)));
    }
}
