//! Formula AST to Rhai script.
//!
//! The generated script only contains calls to registered natives, integer
//! coordinates, `lit_N` variables and `t_N` temporaries. Literal values
//! (numbers, text, sheet names) are handed to Rhai through the scope, never
//! spliced into the text.
//!
//! Every operator application and function call is bound to its own `let`,
//! so the script's nesting depth does not grow with formula length. Only
//! `IF` branches nest, as blocks.
//!
//! ```text
//! SUM(A1:B2, 3) + 1   ->   let t_0 = SUM([ARG_RANGE(REF_RANGE(lit_0, 1, 1, 2, 2)), ARG(lit_1)]);
//!                          let t_1 = OP_ADD(t_0, lit_2);
//!                          t_1
//! ```

use rhai::Dynamic;

use super::cell_ref::Reference;
use super::convert::value_to_dynamic;
use super::lexer::Operator;
use super::parser::{Expr, UnaryOp};
use super::value::{ErrorCode, FormulaError, Value};

/// How a function name in a formula is dispatched.
pub(crate) enum Callee {
    /// A registered spreadsheet function, by registry key.
    Registered(String),
    /// A function defined in a loaded Rhai script, by its script name.
    Script(String),
    Unknown,
}

pub(crate) struct Translation {
    pub script: String,
    pub literals: Vec<Dynamic>,
}

pub(crate) fn translate(
    expr: &Expr,
    default_sheet: &str,
    lookup: &dyn Fn(&str) -> Callee,
) -> Translation {
    let mut translator = Translator {
        default_sheet,
        lookup,
        literals: Vec::new(),
        statements: Vec::new(),
        temps: 0,
    };
    let result = translator.emit(expr);
    let mut script = translator.statements.join("\n");
    if !script.is_empty() {
        script.push('\n');
    }
    script.push_str(&result);
    Translation {
        script,
        literals: translator.literals,
    }
}

fn op_name(op: Operator) -> &'static str {
    match op {
        Operator::Add => "OP_ADD",
        Operator::Sub => "OP_SUB",
        Operator::Mul => "OP_MUL",
        Operator::Div => "OP_DIV",
        Operator::Pow => "OP_POW",
        Operator::Concat => "OP_CONCAT",
        Operator::Eq => "OP_EQ",
        Operator::Ne => "OP_NE",
        Operator::Lt => "OP_LT",
        Operator::Le => "OP_LE",
        Operator::Gt => "OP_GT",
        Operator::Ge => "OP_GE",
    }
}

struct Translator<'a> {
    default_sheet: &'a str,
    lookup: &'a dyn Fn(&str) -> Callee,
    literals: Vec<Dynamic>,
    /// `let` statements of the block being emitted.
    statements: Vec<String>,
    temps: usize,
}

impl Translator<'_> {
    fn literal(&mut self, value: Dynamic) -> String {
        let name = format!("lit_{}", self.literals.len());
        self.literals.push(value);
        name
    }

    /// Bind `code` to a fresh temporary and return its name.
    fn bind(&mut self, code: String) -> String {
        let name = format!("t_{}", self.temps);
        self.temps += 1;
        self.statements.push(format!("let {name} = {code};"));
        name
    }

    /// Emit `expr` as a self-contained `{ ... }` block.
    fn block(&mut self, expr: &Expr) -> String {
        let outer = std::mem::take(&mut self.statements);
        let result = self.emit(expr);
        let body = std::mem::replace(&mut self.statements, outer);
        if body.is_empty() {
            format!("{{ {result} }}")
        } else {
            format!("{{ {} {result} }}", body.join(" "))
        }
    }

    fn value(&mut self, value: Value) -> String {
        self.literal(value_to_dynamic(value))
    }

    fn error(&mut self, error: FormulaError) -> String {
        self.value(Value::Error(error))
    }

    fn reference(&mut self, reference: &Reference) -> String {
        let sheet = self.literal(Dynamic::from(reference.sheet().to_string()));
        match reference {
            Reference::Cell(pos) => format!("REF_CELL({sheet}, {}, {})", pos.row, pos.col),
            Reference::Range(range) => format!(
                "REF_RANGE({sheet}, {}, {}, {}, {})",
                range.from.row, range.from.col, range.to.row, range.to.col
            ),
        }
    }

    fn emit(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Number(n) => self.value(Value::number(*n)),
            Expr::Text(s) => self.value(Value::Text(s.clone())),
            Expr::Boolean(b) => self.value(Value::Boolean(*b)),
            Expr::Error(code) => self.error(FormulaError::from_code(*code)),
            Expr::Reference(r) => {
                let reference = r.to_reference(self.default_sheet);
                self.reference(&reference)
            }
            Expr::Array(rows) => {
                let rows: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let cells: Vec<String> = row.iter().map(|e| self.emit(e)).collect();
                        format!("[{}]", cells.join(", "))
                    })
                    .collect();
                self.bind(format!("ARRAY([{}])", rows.join(", ")))
            }
            Expr::Call { name, args } => self.call(name, args),
            Expr::Unary { op, expr } => {
                let inner = self.emit(expr);
                match op {
                    UnaryOp::Neg => self.bind(format!("OP_NEG({inner})")),
                    UnaryOp::Plus => self.bind(format!("OP_PLUS({inner})")),
                }
            }
            Expr::Infix { first, rest } => {
                let mut acc = self.emit(first);
                for (op, operand) in rest {
                    let operand = self.emit(operand);
                    acc = self.bind(format!("{}({acc}, {operand})", op_name(*op)));
                }
                acc
            }
            Expr::Percent(inner) => {
                let inner = self.emit(inner);
                self.bind(format!("OP_PERCENT({inner})"))
            }
            Expr::Name(name) => {
                self.error(FormulaError::new(ErrorCode::Name, format!("Unknown name: {name}")))
            }
            Expr::Missing => "()".to_string(),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> String {
        if name.eq_ignore_ascii_case("IF") {
            return self.if_expression(args);
        }
        match (self.lookup)(name) {
            Callee::Registered(key) => {
                let args: Vec<String> = args.iter().map(|a| self.argument(a)).collect();
                self.bind(format!("{key}([{}])", args.join(", ")))
            }
            Callee::Script(script_name) => {
                let args: Vec<String> = args
                    .iter()
                    .map(|a| match a {
                        Expr::Missing => "()".to_string(),
                        other => format!("VAL({})", self.emit(other)),
                    })
                    .collect();
                self.bind(format!("{script_name}({})", args.join(", ")))
            }
            Callee::Unknown => self.error(FormulaError::new(
                ErrorCode::Name,
                format!("Unknown function: {}", name.to_uppercase()),
            )),
        }
    }

    /// Arguments keep track of whether they came from a cell or a range.
    fn argument(&mut self, arg: &Expr) -> String {
        match arg {
            Expr::Reference(r) => {
                let reference = r.to_reference(self.default_sheet);
                let inner = self.reference(&reference);
                match reference {
                    Reference::Cell(_) => format!("ARG_CELL({inner})"),
                    Reference::Range(_) => format!("ARG_RANGE({inner})"),
                }
            }
            other => format!("ARG({})", self.emit(other)),
        }
    }

    /// `IF` only evaluates the branch it takes.
    fn if_expression(&mut self, args: &[Expr]) -> String {
        match args {
            [cond, then] => {
                let cond = self.emit(cond);
                let then = self.block(then);
                let otherwise = self.value(Value::Boolean(false));
                self.bind(format!("if TRUTHY({cond}) {then} else {{ {otherwise} }}"))
            }
            [cond, then, otherwise] => {
                let cond = self.emit(cond);
                let then = self.block(then);
                let otherwise = self.block(otherwise);
                self.bind(format!("if TRUTHY({cond}) {then} else {otherwise}"))
            }
            _ => self.error(FormulaError::wrong_arguments()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::parse;
    use pretty_assertions::assert_eq;

    fn lookup(name: &str) -> Callee {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Callee::Registered("SUM".into()),
            "DOUBLE" => Callee::Script("double".into()),
            _ => Callee::Unknown,
        }
    }

    fn script(src: &str) -> Translation {
        translate(&parse(src).unwrap(), "Sheet1", &lookup)
    }

    #[test]
    fn test_operators_become_calls() {
        let t = script("1+2*3");
        assert_eq!(
            t.script,
            "let t_0 = OP_MUL(lit_1, lit_2);\nlet t_1 = OP_ADD(lit_0, t_0);\nt_1"
        );
        assert_eq!(t.literals.len(), 3);
    }

    #[test]
    fn test_references_and_arguments() {
        let t = script("SUM(A1:B2, C3, 4)");
        assert_eq!(
            t.script,
            "let t_0 = SUM([ARG_RANGE(REF_RANGE(lit_0, 1, 1, 2, 2)), ARG_CELL(REF_CELL(lit_1, 3, 3)), ARG(lit_2)]);\nt_0"
        );
        assert_eq!(t.literals[0].clone().into_string().unwrap(), "Sheet1");
    }

    #[test]
    fn test_text_is_never_spliced() {
        let t = script(r#""x"")); evil()""#);
        assert_eq!(t.script, "lit_0");
    }

    #[test]
    fn test_if_is_lazy_expression() {
        let t = script("IF(A1, 1)");
        assert_eq!(
            t.script,
            "let t_0 = if TRUTHY(REF_CELL(lit_0, 1, 1)) { lit_1 } else { lit_2 };\nt_0"
        );
    }

    #[test]
    fn test_if_branches_keep_their_statements() {
        let t = script("IF(A1, 1+2, 3)");
        assert_eq!(
            t.script,
            "let t_1 = if TRUTHY(REF_CELL(lit_0, 1, 1)) { let t_0 = OP_ADD(lit_1, lit_2); t_0 } else { lit_3 };\nt_1"
        );
    }

    #[test]
    fn test_long_chains_do_not_nest() {
        let formula = vec!["1"; 1000].join("+");
        let t = script(&formula);
        assert_eq!(t.script.lines().count(), 1000);
        assert!(t.script.lines().all(|line| line.matches('(').count() <= 1));
    }

    #[test]
    fn test_script_functions_get_plain_values() {
        let t = script("double(Sheet2!A1)");
        assert_eq!(t.script, "let t_0 = double(VAL(REF_CELL(lit_0, 1, 1)));\nt_0");
        assert_eq!(t.literals[0].clone().into_string().unwrap(), "Sheet2");
    }

    #[test]
    fn test_unknown_function_is_name_error_literal() {
        let t = script("NOPE(1)");
        assert_eq!(t.script, "lit_0");
        let value = t.literals[0].clone().try_cast::<Value>().unwrap();
        assert!(matches!(value, Value::Error(e) if e.code == ErrorCode::Name));
    }
}
