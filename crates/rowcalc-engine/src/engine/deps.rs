//! Dependency extraction from formula strings.
//!
//! Finds every cell or range reference a formula mentions without parsing
//! or running it. This is used by hosts to build their dependency graph.
//!
//! Handles:
//! - Cell and range references: `A1`, `B2:C5`, `A:C`
//! - Sheet qualifiers: `Sheet2!A1`, `'My Sheet'!B2:B4`
//! - Ignores references inside string literals
//! - Half-typed formulas: references before a syntax error are still found

use super::cell_ref::Reference;
use super::lexer::{TokenKind, tokenize_partial};

/// References in `formula`, in the order they appear. Unqualified references
/// belong to `default_sheet`. Text without a leading `=` has none.
pub fn extract_dependencies(formula: &str, default_sheet: &str) -> Vec<Reference> {
    let Some(body) = formula.trim_start().strip_prefix('=') else {
        return Vec::new();
    };
    let (tokens, _) = tokenize_partial(body);
    tokens
        .into_iter()
        .filter_map(|token| match token.kind {
            TokenKind::Reference(r) => Some(r.to_reference(default_sheet)),
            _ => None,
        })
        .collect()
}
