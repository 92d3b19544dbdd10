//! Formula parser.
//!
//! A Pratt parser over [`lexer`](super::lexer) tokens. Precedence, loosest
//! first: comparisons, `&`, `+ -`, `* /`, `^`, postfix `%`, prefix `- +`.
//! All binary operators are left-associative, `^` included. A run of
//! operators sharing one precedence level is kept flat in a single
//! [`Expr::Infix`] so long formulas like `A1+A2+...+A1000` do not nest.

use thiserror::Error;

use super::lexer::{LexError, Operator, RefToken, Token, TokenKind, tokenize};
use super::value::ErrorCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorCode),
    Reference(RefToken),
    /// Array constant, row-major.
    Array(Vec<Vec<Expr>>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `first op rest[0] op rest[1] ...`, folded left to right. Every
    /// operator in `rest` has the same precedence.
    Infix {
        first: Box<Expr>,
        rest: Vec<(Operator, Expr)>,
    },
    Percent(Box<Expr>),
    /// An identifier that is not a function call or a reference.
    Name(String),
    /// Omitted function argument, as in `ROUND(A1,)`.
    Missing,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message} at position {pos}")]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            pos: err.pos,
        }
    }
}

/// Deepest nesting of parentheses, calls, arrays and prefix operators.
const MAX_NESTING: usize = 128;

const PREFIX_BP: u8 = 12;
const PERCENT_BP: u8 = 11;

fn infix_binding_power(op: Operator) -> (u8, u8) {
    match op {
        Operator::Eq
        | Operator::Ne
        | Operator::Lt
        | Operator::Le
        | Operator::Gt
        | Operator::Ge => (1, 2),
        Operator::Concat => (3, 4),
        Operator::Add | Operator::Sub => (5, 6),
        Operator::Mul | Operator::Div => (7, 8),
        Operator::Pow => (9, 10),
    }
}

/// Parse formula text (without the leading `=`).
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: src.len(),
        depth: 0,
    };
    if parser.tokens.is_empty() {
        return Err(parser.error("Empty formula"));
    }
    let expr = parser.expr(0)?;
    if parser.peek().is_some() {
        return Err(parser.error("Unexpected token"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.index)?.kind.clone();
        self.index += 1;
        Some(token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|t| t.span.start)
            .unwrap_or(self.end)
    }

    fn error(&self, message: &str) -> ParseError {
        let message = if self.peek().is_none() && message == "Unexpected token" {
            "Unexpected end of formula"
        } else {
            message
        };
        ParseError {
            message: message.to_string(),
            pos: self.position(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.peek() == Some(kind) {
            self.index += 1;
            Ok(())
        } else if self.peek().is_none() {
            Err(self.error(&format!("Expected {what} but the formula ended")))
        } else {
            Err(self.error(&format!("Expected {what}")))
        }
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("Formula is too deeply nested"));
        }
        self.depth += 1;
        let expr = self.operation(min_bp);
        self.depth -= 1;
        expr
    }

    fn operation(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.prefix()?;
        loop {
            match self.peek() {
                Some(TokenKind::Percent) => {
                    if PERCENT_BP < min_bp {
                        break;
                    }
                    self.index += 1;
                    lhs = Expr::Percent(Box::new(lhs));
                }
                Some(TokenKind::Op(op)) => {
                    let op = *op;
                    let (l_bp, r_bp) = infix_binding_power(op);
                    if l_bp < min_bp {
                        break;
                    }
                    self.index += 1;
                    let rhs = self.expr(r_bp)?;
                    lhs = match lhs {
                        Expr::Infix { first, mut rest }
                            if rest
                                .first()
                                .is_some_and(|(prev, _)| infix_binding_power(*prev).0 == l_bp) =>
                        {
                            rest.push((op, rhs));
                            Expr::Infix { first, rest }
                        }
                        lhs => Expr::Infix {
                            first: Box::new(lhs),
                            rest: vec![(op, rhs)],
                        },
                    };
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ParseError> {
        let pos = self.position();
        let Some(token) = self.next() else {
            return Err(ParseError {
                message: "Unexpected end of formula".to_string(),
                pos,
            });
        };
        match token {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Text(s) => Ok(Expr::Text(s)),
            TokenKind::Boolean(b) => Ok(Expr::Boolean(b)),
            TokenKind::Error(code) => Ok(Expr::Error(code)),
            TokenKind::Reference(r) => Ok(Expr::Reference(r)),
            TokenKind::Name(name) => Ok(Expr::Name(name)),
            TokenKind::Op(Operator::Sub) => Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(self.expr(PREFIX_BP)?),
            }),
            TokenKind::Op(Operator::Add) => Ok(Expr::Unary {
                op: UnaryOp::Plus,
                expr: Box::new(self.expr(PREFIX_BP)?),
            }),
            TokenKind::LParen => {
                let inner = self.expr(0)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Function(name) => {
                self.expect(&TokenKind::LParen, "'('")?;
                let args = self.arguments()?;
                Ok(Expr::Call { name, args })
            }
            TokenKind::LBrace => self.array(),
            _ => Err(ParseError {
                message: "Unexpected token".to_string(),
                pos,
            }),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&TokenKind::RParen) {
            self.index += 1;
            return Ok(args);
        }
        loop {
            match self.peek() {
                Some(TokenKind::Comma | TokenKind::RParen) => args.push(Expr::Missing),
                _ => args.push(self.expr(0)?),
            }
            match self.next() {
                Some(TokenKind::Comma) => continue,
                Some(TokenKind::RParen) => return Ok(args),
                Some(_) => {
                    self.index -= 1;
                    return Err(self.error("Expected ',' or ')'"));
                }
                None => return Err(self.error("Expected ')' but the formula ended")),
            }
        }
    }

    fn array(&mut self) -> Result<Expr, ParseError> {
        let mut rows = vec![Vec::new()];
        loop {
            let element = self.expr(0)?;
            if let Some(row) = rows.last_mut() {
                row.push(element);
            }
            match self.next() {
                Some(TokenKind::Comma) => {}
                Some(TokenKind::Semicolon) => rows.push(Vec::new()),
                Some(TokenKind::RBrace) => break,
                Some(_) => {
                    self.index -= 1;
                    return Err(self.error("Expected ',', ';' or '}'"));
                }
                None => return Err(self.error("Expected '}' but the formula ended")),
            }
        }
        let width = rows[0].len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(self.error("Array rows must have the same length"));
        }
        Ok(Expr::Array(rows))
    }
}
