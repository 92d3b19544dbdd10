//! Formula graph: cycle detection and recalculation order.

use rowcalc_engine::engine::{CellPosition, Reference};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Formula cell -> references its formula reads.
pub type Precedents = HashMap<CellPosition, Vec<Reference>>;

/// Formula cells that `position` reads directly.
fn formula_precedents(position: &CellPosition, precedents: &Precedents) -> Vec<CellPosition> {
    let Some(refs) = precedents.get(position) else {
        return Vec::new();
    };
    precedents
        .keys()
        .filter(|cell| refs.iter().any(|r| r.contains(cell)))
        .cloned()
        .collect()
}

/// Detect circular dependencies starting from a cell.
/// Returns Some(cycle_path) if a cycle is found, None otherwise.
pub fn detect_cycle(start: &CellPosition, precedents: &Precedents) -> Option<Vec<CellPosition>> {
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    let mut path = Vec::new();

    if detect_cycle_dfs(start, precedents, &mut visiting, &mut done, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn detect_cycle_dfs(
    current: &CellPosition,
    precedents: &Precedents,
    visiting: &mut HashSet<CellPosition>,
    done: &mut HashSet<CellPosition>,
    path: &mut Vec<CellPosition>,
) -> bool {
    if visiting.contains(current) {
        path.push(current.clone());
        return true;
    }
    if done.contains(current) {
        return false;
    }

    visiting.insert(current.clone());
    path.push(current.clone());

    for dep in formula_precedents(current, precedents) {
        if detect_cycle_dfs(&dep, precedents, visiting, done, path) {
            return true;
        }
    }

    path.pop();
    visiting.remove(current);
    done.insert(current.clone());
    false
}

/// Every formula cell that reads any of `changed`, directly or through
/// other formulas.
pub fn transitive_dependents(
    changed: &[CellPosition],
    precedents: &Precedents,
) -> HashSet<CellPosition> {
    let mut found = HashSet::new();
    let mut to_process: Vec<CellPosition> = changed.to_vec();
    while let Some(cell) = to_process.pop() {
        for (formula, refs) in precedents {
            if !found.contains(formula) && refs.iter().any(|r| r.contains(&cell)) {
                found.insert(formula.clone());
                to_process.push(formula.clone());
            }
        }
    }
    found
}

/// Order `targets` into waves: every cell's in-set precedents sit in an
/// earlier wave. Cells on or behind a cycle cannot be ordered and are
/// returned separately.
pub fn recalc_waves(
    targets: &HashSet<CellPosition>,
    precedents: &Precedents,
) -> (Vec<Vec<CellPosition>>, Vec<CellPosition>) {
    let mut waiting: HashMap<&CellPosition, Vec<CellPosition>> = targets
        .iter()
        .map(|cell| {
            let inside: Vec<CellPosition> = formula_precedents(cell, precedents)
                .into_iter()
                .filter(|p| targets.contains(p))
                .collect();
            (cell, inside)
        })
        .collect();

    let mut finished: HashSet<CellPosition> = HashSet::new();
    let mut waves = Vec::new();
    loop {
        let ready: BTreeSet<CellPosition> = waiting
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| finished.contains(d)))
            .map(|(cell, _)| (*cell).clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        for cell in &ready {
            waiting.remove(cell);
        }
        finished.extend(ready.iter().cloned());
        waves.push(ready.into_iter().collect());
    }

    let mut stuck: Vec<CellPosition> = waiting.into_keys().cloned().collect();
    stuck.sort();
    (waves, stuck)
}
