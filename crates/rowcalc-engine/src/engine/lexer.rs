//! Formula tokenizer.
//!
//! Turns formula text (without the leading `=`) into tokens carrying byte
//! spans. References are recognized here, including sheet qualifiers
//! (`Sheet2!A1`, `'My Sheet'!B2:C3`) and whole-column ranges (`A:C`), so the
//! dependency pass never needs a parse.

use std::fmt;
use std::ops::Range;
use thiserror::Error;

use super::cell_ref::{
    CellPosition, CellRange, CellRef, MAX_ROW, Reference, letters_to_col, quote_sheet_name,
};
use super::value::ErrorCode;

/// Binary operators, in source form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Pow => "^",
            Operator::Concat => "&",
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One end of a reference. `row` is `None` for whole-column addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefAddress {
    pub row: Option<usize>,
    pub col: usize,
    pub row_abs: bool,
    pub col_abs: bool,
}

impl RefAddress {
    fn parse(word: &str) -> Option<RefAddress> {
        if let Some((cell, col_abs, row_abs)) = CellRef::parse_a1(word) {
            return Some(RefAddress {
                row: Some(cell.row),
                col: cell.col,
                row_abs,
                col_abs,
            });
        }
        let (col_abs, letters) = match word.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, word),
        };
        if !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Some(RefAddress {
            row: None,
            col: letters_to_col(letters)?,
            row_abs: false,
            col_abs,
        })
    }
}

impl fmt::Display for RefAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col_abs {
            f.write_str("$")?;
        }
        f.write_str(&CellRef::col_to_letters(self.col))?;
        if let Some(row) = self.row {
            if self.row_abs {
                f.write_str("$")?;
            }
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

/// A reference as written in formula text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefToken {
    pub sheet: Option<String>,
    pub start: RefAddress,
    pub end: Option<RefAddress>,
}

impl RefToken {
    /// Resolve to a sheet-qualified reference. Whole-column ranges span rows
    /// `1..=MAX_ROW`.
    pub fn to_reference(&self, default_sheet: &str) -> Reference {
        let sheet = self.sheet.clone().unwrap_or_else(|| default_sheet.to_string());
        let start = CellRef::new(self.start.row.unwrap_or(1), self.start.col);
        match &self.end {
            None => Reference::Cell(CellPosition::new(sheet, start.row, start.col)),
            Some(end) => {
                let end = CellRef::new(end.row.unwrap_or(MAX_ROW), end.col);
                Reference::Range(CellRange::new(sheet, start, end))
            }
        }
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        write!(f, "{}", self.start)?;
        if let Some(end) = &self.end {
            write!(f, ":{end}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorCode),
    Reference(RefToken),
    /// A name immediately followed by `(`.
    Function(String),
    Name(String),
    Op(Operator),
    Percent,
    LParen,
    RParen,
    Comma,
    Semicolon,
    LBrace,
    RBrace,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message} at position {pos}")]
pub struct LexError {
    pub message: String,
    pub pos: usize,
}

/// Tokenize the whole input, failing on the first bad character.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    match tokenize_partial(src) {
        (tokens, None) => Ok(tokens),
        (_, Some(err)) => Err(err),
    }
}

/// Tokenize as far as possible. Returns the tokens read before the first
/// error along with that error, so half-typed formulas still yield their
/// leading references.
pub fn tokenize_partial(src: &str) -> (Vec<Token>, Option<LexError>) {
    let mut lexer = Lexer { src, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        match lexer.next_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => return (tokens, None),
            Err(err) => return (tokens, Some(err)),
        }
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>, pos: usize) -> LexError {
        LexError {
            message: message.into(),
            pos,
        }
    }

    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_word_char) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = match c {
            '0'..='9' => self.number(start)?,
            '.' if self.rest()[1..].starts_with(|d: char| d.is_ascii_digit()) => {
                self.number(start)?
            }
            '"' => self.string(start)?,
            '#' => self.error_literal(start)?,
            '\'' => self.quoted_sheet(start)?,
            c if is_word_start(c) => self.word()?,
            _ => {
                self.bump();
                match c {
                    '+' => TokenKind::Op(Operator::Add),
                    '-' => TokenKind::Op(Operator::Sub),
                    '*' => TokenKind::Op(Operator::Mul),
                    '/' => TokenKind::Op(Operator::Div),
                    '^' => TokenKind::Op(Operator::Pow),
                    '&' => TokenKind::Op(Operator::Concat),
                    '=' => TokenKind::Op(Operator::Eq),
                    '<' => match self.peek() {
                        Some('>') => {
                            self.bump();
                            TokenKind::Op(Operator::Ne)
                        }
                        Some('=') => {
                            self.bump();
                            TokenKind::Op(Operator::Le)
                        }
                        _ => TokenKind::Op(Operator::Lt),
                    },
                    '>' => match self.peek() {
                        Some('=') => {
                            self.bump();
                            TokenKind::Op(Operator::Ge)
                        }
                        _ => TokenKind::Op(Operator::Gt),
                    },
                    '%' => TokenKind::Percent,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semicolon,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    other => {
                        return Err(self.error(format!("Unexpected character '{other}'"), start));
                    }
                }
            }
        };

        Ok(Some(Token {
            kind,
            span: start..self.pos,
        }))
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, LexError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exp = self.rest()[1..].trim_start_matches(['+', '-']);
            if exp.starts_with(|c: char| c.is_ascii_digit()) {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("Invalid number '{text}'"), start))
    }

    fn string(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') if self.peek() == Some('"') => {
                    self.bump();
                    out.push('"');
                }
                Some('"') => return Ok(TokenKind::Text(out)),
                Some(c) => out.push(c),
                None => return Err(self.error("Unterminated string", start)),
            }
        }
    }

    fn error_literal(&mut self, start: usize) -> Result<TokenKind, LexError> {
        let rest = self.rest();
        let code = ErrorCode::ALL
            .into_iter()
            .filter(|code| {
                let lit = code.as_str();
                rest.len() >= lit.len()
                    && rest.is_char_boundary(lit.len())
                    && rest[..lit.len()].eq_ignore_ascii_case(lit)
            })
            .max_by_key(|code| code.as_str().len());
        match code {
            Some(code) => {
                self.pos += code.as_str().len();
                Ok(TokenKind::Error(code))
            }
            None => Err(self.error("Unknown error literal", start)),
        }
    }

    fn quoted_sheet(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.bump();
        let mut sheet = String::new();
        loop {
            match self.bump() {
                Some('\'') if self.peek() == Some('\'') => {
                    self.bump();
                    sheet.push('\'');
                }
                Some('\'') => break,
                Some(c) => sheet.push(c),
                None => return Err(self.error("Unterminated sheet name", start)),
            }
        }
        if self.peek() != Some('!') {
            return Err(self.error("Expected '!' after sheet name", self.pos));
        }
        self.bump();
        self.sheet_reference(sheet)
    }

    /// Reference following `Sheet!`.
    fn sheet_reference(&mut self, sheet: String) -> Result<TokenKind, LexError> {
        let word_start = self.pos;
        let word = self.read_word();
        match self.reference(Some(sheet), word) {
            Some(reference) => Ok(TokenKind::Reference(reference)),
            None => Err(self.error(format!("Invalid reference '{word}'"), word_start)),
        }
    }

    fn word(&mut self) -> Result<TokenKind, LexError> {
        let word = self.read_word();
        match self.peek() {
            Some('!') => {
                self.bump();
                return self.sheet_reference(word.to_string());
            }
            Some('(') => return Ok(TokenKind::Function(word.to_string())),
            _ => {}
        }
        if let Some(reference) = self.reference(None, word) {
            return Ok(TokenKind::Reference(reference));
        }
        if word.eq_ignore_ascii_case("TRUE") {
            return Ok(TokenKind::Boolean(true));
        }
        if word.eq_ignore_ascii_case("FALSE") {
            return Ok(TokenKind::Boolean(false));
        }
        Ok(TokenKind::Name(word.to_string()))
    }

    /// Build a reference from `word` and an optional `:end` that follows it.
    /// Consumes the `:end` part only when it forms a valid range.
    fn reference(&mut self, sheet: Option<String>, word: &str) -> Option<RefToken> {
        let start = RefAddress::parse(word)?;
        let mut token = RefToken {
            sheet,
            start,
            end: None,
        };
        if self.peek() == Some(':') {
            let checkpoint = self.pos;
            self.bump();
            let end = RefAddress::parse(self.read_word());
            match end {
                Some(end) if end.row.is_some() == start.row.is_some() => token.end = Some(end),
                _ => self.pos = checkpoint,
            }
        }
        // A bare column name is only a reference as part of `A:C`.
        if token.start.row.is_none() && token.end.is_none() {
            return None;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn cell(row: usize, col: usize) -> RefAddress {
        RefAddress {
            row: Some(row),
            col,
            row_abs: false,
            col_abs: false,
        }
    }

    #[test]
    fn test_tokenize_arithmetic() {
        assert_eq!(
            kinds("1 + 2.5*3e2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Op(Operator::Add),
                TokenKind::Number(2.5),
                TokenKind::Op(Operator::Mul),
                TokenKind::Number(300.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_comparisons() {
        assert_eq!(
            kinds("1<>2<=3>=4<5>6"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Op(Operator::Ne),
                TokenKind::Number(2.0),
                TokenKind::Op(Operator::Le),
                TokenKind::Number(3.0),
                TokenKind::Op(Operator::Ge),
                TokenKind::Number(4.0),
                TokenKind::Op(Operator::Lt),
                TokenKind::Number(5.0),
                TokenKind::Op(Operator::Gt),
                TokenKind::Number(6.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_string_with_escaped_quote() {
        assert_eq!(
            kinds(r#""say ""hi""""#),
            vec![TokenKind::Text("say \"hi\"".into())]
        );
    }

    #[test]
    fn test_tokenize_function_and_range() {
        assert_eq!(
            kinds("SUM(A1:B2)"),
            vec![
                TokenKind::Function("SUM".into()),
                TokenKind::LParen,
                TokenKind::Reference(RefToken {
                    sheet: None,
                    start: cell(1, 1),
                    end: Some(cell(2, 2)),
                }),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_function_name_that_looks_like_a_cell() {
        assert_eq!(kinds("LOG10(")[0], TokenKind::Function("LOG10".into()));
    }

    #[test]
    fn test_tokenize_sheet_qualified_references() {
        let tokens = kinds("Sheet2!B2 + 'My Sheet'!$A$1");
        assert_eq!(
            tokens[0],
            TokenKind::Reference(RefToken {
                sheet: Some("Sheet2".into()),
                start: cell(2, 2),
                end: None,
            })
        );
        assert_eq!(
            tokens[2],
            TokenKind::Reference(RefToken {
                sheet: Some("My Sheet".into()),
                start: RefAddress {
                    row: Some(1),
                    col: 1,
                    row_abs: true,
                    col_abs: true,
                },
                end: None,
            })
        );
    }

    #[test]
    fn test_column_range() {
        let tokens = kinds("A:C");
        let TokenKind::Reference(r) = &tokens[0] else {
            panic!("expected reference");
        };
        assert_eq!(
            r.to_reference("Sheet1"),
            Reference::Range(CellRange::new(
                "Sheet1",
                CellRef::new(1, 1),
                CellRef::new(MAX_ROW, 3)
            ))
        );
    }

    #[test]
    fn test_booleans_errors_and_names() {
        assert_eq!(
            kinds("true #n/a #DIV/0! foo"),
            vec![
                TokenKind::Boolean(true),
                TokenKind::Error(ErrorCode::NotAvailable),
                TokenKind::Error(ErrorCode::Div0),
                TokenKind::Name("foo".into()),
            ]
        );
    }

    #[test]
    fn test_spans_cover_source() {
        let tokens = tokenize("A1 + 10").unwrap();
        assert_eq!(tokens[0].span, 0..2);
        assert_eq!(tokens[2].span, 5..7);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(tokenize("\"abc").is_err());
    }

    #[test]
    fn test_partial_keeps_leading_tokens() {
        let (tokens, err) = tokenize_partial("A1 + \"oops");
        assert_eq!(tokens.len(), 2);
        assert!(err.is_some());
    }

    #[test]
    fn test_ref_token_display_keeps_anchors() {
        let tokens = kinds("'My Sheet'!$A1:B$2");
        let TokenKind::Reference(r) = &tokens[0] else {
            panic!("expected reference");
        };
        assert_eq!(r.to_string(), "'My Sheet'!$A1:B$2");
    }
}
