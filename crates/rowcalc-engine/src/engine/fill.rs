use super::cell_ref::{MAX_COLUMN, MAX_ROW};
use super::lexer::{RefAddress, RefToken, TokenKind, tokenize_partial};

/// Offset all relative cell references in a formula by a row/column delta.
/// Used when a formula is filled or pasted into another cell.
///
/// Rules:
/// - `A1` offset by (+2 rows, +1 column) becomes `B3`
/// - `$`-anchored parts stay put: `$A1` becomes `$A3`
/// - range refs are offset on both ends: `SUM(A1:B2)` becomes `SUM(B3:C4)`
/// - refs that move outside the sheet become `#REF!`
/// - text that is not a formula is returned unchanged
pub fn offset_formula_references(formula: &str, delta_rows: i64, delta_cols: i64) -> String {
    let Some(offset) = formula.find('=').filter(|i| formula[..*i].trim().is_empty()) else {
        return formula.to_string();
    };
    let start = offset + 1;
    let body = &formula[start..];
    let (tokens, _) = tokenize_partial(body);

    let mut out = String::with_capacity(formula.len());
    out.push_str(&formula[..start]);
    let mut last = 0;
    for token in tokens {
        let TokenKind::Reference(reference) = token.kind else {
            continue;
        };
        out.push_str(&body[last..token.span.start]);
        match shift_reference(&reference, delta_rows, delta_cols) {
            Some(shifted) => out.push_str(&shifted.to_string()),
            None => out.push_str("#REF!"),
        }
        last = token.span.end;
    }
    out.push_str(&body[last..]);
    out
}

fn shift(value: usize, delta: i64, anchored: bool, max: usize) -> Option<usize> {
    if anchored {
        return Some(value);
    }
    let shifted = i64::try_from(value).ok()?.checked_add(delta)?;
    let shifted = usize::try_from(shifted).ok()?;
    (1..=max).contains(&shifted).then_some(shifted)
}

fn shift_address(address: &RefAddress, delta_rows: i64, delta_cols: i64) -> Option<RefAddress> {
    let row = match address.row {
        Some(row) => Some(shift(row, delta_rows, address.row_abs, MAX_ROW)?),
        None => None,
    };
    Some(RefAddress {
        row,
        col: shift(address.col, delta_cols, address.col_abs, MAX_COLUMN)?,
        ..*address
    })
}

fn shift_reference(reference: &RefToken, delta_rows: i64, delta_cols: i64) -> Option<RefToken> {
    Some(RefToken {
        sheet: reference.sheet.clone(),
        start: shift_address(&reference.start, delta_rows, delta_cols)?,
        end: match &reference.end {
            Some(end) => Some(shift_address(end, delta_rows, delta_cols)?),
            None => None,
        },
    })
}
