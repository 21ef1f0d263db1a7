//=============================================
// src/tokenizer.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript lexer
// Objective: Convert source text into a token stream in a single forward pass
//=============================================

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ScriptError, ScriptResult};

/// All token kinds produced by the lexer. Literal-bearing kinds carry their
/// decoded payload; keywords and symbols are bare variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Date(NaiveDateTime),
    True,
    False,
    Null,

    // Identifiers (lowercased, may contain dots)
    Identifier(String),

    // Keywords
    Var,
    Const,
    Print,
    Function,
    Return,
    Import,
    Typeof,
    If,
    Then,
    Else,
    For,
    Foreach,
    In,
    While,
    Do,
    Break,
    Continue,
    Screen,
    Sorted,

    // Type keywords
    TyByte,
    TyInt,
    TyLong,
    TyFloat,
    TyDouble,
    TyString,
    TyDate,
    TyBool,
    TyArray,
    TyBitmap,
    TyIntmap,
    TyMap,
    TyRecord,

    // Symbols
    Semicolon,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    // Operators
    Plus,
    Minus,
    StarOp,
    Slash,
    Percent,
    Caret,
    Equal,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Bang,
    And,
    Or,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "{}", n),
            TokenKind::Long(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::Double(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Date(d) => write!(f, "{}", d),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A token with its kind, raw lexeme, and source line. Immutable once
/// produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
        }
    }
}

fn keyword_table() -> HashMap<&'static str, TokenKind> {
    use TokenKind::*;
    let mut map = HashMap::new();
    map.insert("var", Var);
    map.insert("let", Var);
    map.insert("const", Const);
    map.insert("print", Print);
    map.insert("function", Function);
    map.insert("return", Return);
    map.insert("import", Import);
    map.insert("typeof", Typeof);
    map.insert("if", If);
    map.insert("then", Then);
    map.insert("else", Else);
    map.insert("for", For);
    map.insert("foreach", Foreach);
    map.insert("in", In);
    map.insert("while", While);
    map.insert("do", Do);
    map.insert("break", Break);
    map.insert("continue", Continue);
    map.insert("screen", Screen);
    map.insert("sorted", Sorted);
    map.insert("and", And);
    map.insert("or", Or);
    map.insert("mod", Percent);
    map.insert("true", True);
    map.insert("false", False);
    map.insert("null", Null);
    map.insert("byte", TyByte);
    map.insert("int", TyInt);
    map.insert("integer", TyInt);
    map.insert("long", TyLong);
    map.insert("float", TyFloat);
    map.insert("double", TyDouble);
    map.insert("string", TyString);
    map.insert("date", TyDate);
    map.insert("bool", TyBool);
    map.insert("boolean", TyBool);
    map.insert("array", TyArray);
    map.insert("bitmap", TyBitmap);
    map.insert("intmap", TyIntmap);
    map.insert("map", TyMap);
    map.insert("record", TyRecord);
    map
}

/// Single-pass lexer over EmberScript source. Produces tokens on demand via
/// [`Tokenizer::next_token`] (the iterator impl) or all at once via
/// [`Tokenizer::tokenize`]; no backtracking beyond one character of lookahead.
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    keywords: HashMap<&'static str, TokenKind>,
    finished: bool,
}

impl Tokenizer {
    pub fn new(source: &str) -> Self {
        Self {
            input: source.chars().collect(),
            position: 0,
            line: 1,
            keywords: keyword_table(),
            finished: false,
        }
    }

    /// Lex the entire source, failing on the first invalid character or
    /// unterminated string.
    pub fn tokenize(&mut self) -> ScriptResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> ScriptResult<Token> {
        self.skip_whitespace_and_comments();
        if self.is_at_end() {
            self.finished = true;
            return Ok(Token::new(TokenKind::Eof, "", self.line));
        }

        let c = self.peek();
        if c.is_ascii_digit() {
            return self.number();
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.identifier());
        }
        if c == '"' || c == '\'' {
            return self.string(c);
        }
        self.symbol()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_opt() {
                Some('\n') => {
                    self.line += 1;
                    self.position += 1;
                }
                Some(c) if c.is_whitespace() => self.position += 1,
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek_opt() {
                        if c == '\n' {
                            break;
                        }
                        self.position += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn symbol(&mut self) -> ScriptResult<Token> {
        use TokenKind::*;
        let line = self.line;
        let c = self.advance();
        let two = |this: &mut Self, next: char, double: TokenKind, single: TokenKind| {
            if this.peek_opt() == Some(next) {
                this.position += 1;
                double
            } else {
                single
            }
        };
        let kind = match c {
            ';' => Semicolon,
            ':' => Colon,
            ',' => Comma,
            '.' => Dot,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            '^' => Caret,
            '+' => two(self, '=', PlusEqual, Plus),
            '-' => two(self, '=', MinusEqual, Minus),
            '*' => two(self, '=', StarEqual, StarOp),
            '/' => two(self, '=', SlashEqual, Slash),
            '%' => two(self, '=', PercentEqual, Percent),
            '=' => two(self, '=', EqualEqual, Equal),
            '!' => two(self, '=', NotEqual, Bang),
            '<' => two(self, '=', LessEqual, Less),
            '>' => two(self, '=', GreaterEqual, Greater),
            '&' if self.peek_opt() == Some('&') => {
                self.position += 1;
                And
            }
            '|' if self.peek_opt() == Some('|') => {
                self.position += 1;
                Or
            }
            other => {
                return Err(ScriptError::Lex {
                    line,
                    message: format!("Unexpected character '{}'", other),
                });
            }
        };
        Ok(Token::new(kind, c.to_string(), line))
    }

    /// Scan an identifier, combining dotted segments into a single name.
    /// A dot followed by a keyword or type name is left for the parser so
    /// that member access like `arr.length` still works.
    fn identifier(&mut self) -> Token {
        let line = self.line;
        let mut text = self.ident_segment();
        while self.peek_opt() == Some('.') {
            let before_dot = self.position;
            self.position += 1;
            match self.peek_opt() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    let segment = self.ident_segment();
                    if self.keywords.contains_key(segment.as_str()) {
                        // Not part of the dotted name; rewind to the dot.
                        self.position = before_dot;
                        break;
                    }
                    text.push('.');
                    text.push_str(&segment);
                }
                _ => {
                    self.position = before_dot;
                    break;
                }
            }
        }
        if let Some(kind) = self.keywords.get(text.as_str()) {
            return Token::new(kind.clone(), text.clone(), line);
        }
        Token::new(TokenKind::Identifier(text.clone()), text, line)
    }

    fn ident_segment(&mut self) -> String {
        let start = self.position;
        while let Some(c) = self.peek_opt() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.position += 1;
            } else {
                break;
            }
        }
        self.input[start..self.position]
            .iter()
            .collect::<String>()
            .to_lowercase()
    }

    fn number(&mut self) -> ScriptResult<Token> {
        let line = self.line;
        let start = self.position;
        while self.peek_opt().is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
        }

        let mut is_decimal = false;
        if self.peek_opt() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_decimal = true;
            self.position += 1;
            while self.peek_opt().is_some_and(|c| c.is_ascii_digit()) {
                self.position += 1;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let suffix = match self.peek_opt() {
            Some(c @ ('l' | 'L' | 'f' | 'F' | 'd' | 'D')) => {
                self.position += 1;
                Some(c.to_ascii_lowercase())
            }
            _ => None,
        };

        let kind = match (is_decimal, suffix) {
            (_, Some('f')) => TokenKind::Float(text.parse::<f32>().map_err(|e| ScriptError::Lex {
                line,
                message: format!("Invalid float literal '{}': {}", text, e),
            })?),
            (_, Some('d')) | (true, None) => {
                TokenKind::Double(text.parse::<f64>().map_err(|e| ScriptError::Lex {
                    line,
                    message: format!("Invalid double literal '{}': {}", text, e),
                })?)
            }
            (_, Some('l')) => TokenKind::Long(text.parse::<i64>().map_err(|e| ScriptError::Lex {
                line,
                message: format!("Invalid long literal '{}': {}", text, e),
            })?),
            (false, None) => match text.parse::<i32>() {
                Ok(n) => TokenKind::Int(n),
                // Out-of-range integer literals widen to long.
                Err(_) => TokenKind::Long(text.parse::<i64>().map_err(|e| ScriptError::Lex {
                    line,
                    message: format!("Invalid integer literal '{}': {}", text, e),
                })?),
            },
            (_, Some(other)) => {
                return Err(ScriptError::Lex {
                    line,
                    message: format!("Unknown numeric suffix '{}'", other),
                });
            }
        };
        Ok(Token::new(kind, text, line))
    }

    /// Scan a quoted string. Both quote characters are accepted so import
    /// paths with separators and spaces tokenize verbatim. ISO date literals
    /// are promoted to date tokens.
    fn string(&mut self, quote: char) -> ScriptResult<Token> {
        let line = self.line;
        self.position += 1;
        let mut value = String::new();
        loop {
            let c = match self.peek_opt() {
                Some(c) => c,
                None => {
                    return Err(ScriptError::Lex {
                        line,
                        message: "Unterminated string".into(),
                    });
                }
            };
            self.position += 1;
            if c == quote {
                break;
            }
            match c {
                '\n' => {
                    self.line += 1;
                    value.push('\n');
                }
                '\\' => {
                    let escape = self.peek_opt().ok_or_else(|| ScriptError::Lex {
                        line,
                        message: "Unterminated string (after backslash)".into(),
                    })?;
                    self.position += 1;
                    match escape {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        '\'' => value.push('\''),
                        'u' => value.push(self.hex_escape(4, line)?),
                        'x' => value.push(self.hex_escape(2, line)?),
                        other => {
                            return Err(ScriptError::Lex {
                                line,
                                message: format!("Unknown escape '\\{}'", other),
                            });
                        }
                    }
                }
                other => value.push(other),
            }
        }

        if let Some(date) = parse_date_literal(&value) {
            return Ok(Token::new(TokenKind::Date(date), value, line));
        }
        Ok(Token::new(TokenKind::Str(value.clone()), value, line))
    }

    fn hex_escape(&mut self, digits: usize, line: usize) -> ScriptResult<char> {
        let mut code: u32 = 0;
        for _ in 0..digits {
            let c = self.peek_opt().ok_or_else(|| ScriptError::Lex {
                line,
                message: "Unterminated escape sequence".into(),
            })?;
            let digit = c.to_digit(16).ok_or_else(|| ScriptError::Lex {
                line,
                message: format!("Invalid hex escape digit '{}'", c),
            })?;
            self.position += 1;
            code = (code << 4) | digit;
        }
        char::from_u32(code).ok_or_else(|| ScriptError::Lex {
            line,
            message: format!("Escape \\u{:04x} is not a valid character", code),
        })
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> char {
        self.input[self.position]
    }

    fn peek_opt(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.input[self.position];
        self.position += 1;
        c
    }
}

impl Iterator for Tokenizer {
    type Item = ScriptResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}

/// Recognize `YYYY-MM-DD` and `YYYY-MM-DD HH:MM[:SS]` literals.
fn parse_date_literal(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if trimmed.len() < 10 || !trimmed.is_char_boundary(10) {
        return None;
    }
    let normalized = trimmed.replacen('T', " ", 1);
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

//=============================================
//            Tests
//=============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Tokenizer::new(source)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_declaration() {
        let tokens = kinds("var total: int = 41;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Var,
                TokenKind::Identifier("total".into()),
                TokenKind::Colon,
                TokenKind::TyInt,
                TokenKind::Equal,
                TokenKind::Int(41),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = kinds("VAR X = TRUE;");
        assert_eq!(tokens[0], TokenKind::Var);
        assert_eq!(tokens[1], TokenKind::Identifier("x".into()));
        assert_eq!(tokens[3], TokenKind::True);
    }

    #[test]
    fn dotted_identifier_is_one_token() {
        let tokens = kinds("string.upper(name)");
        assert_eq!(tokens[0], TokenKind::Identifier("string.upper".into()));
        assert_eq!(tokens[1], TokenKind::LParen);
    }

    #[test]
    fn dot_before_keyword_stays_separate() {
        // `items.length` must not fold `length`-style member names away;
        // the type keyword check covers names like `values.map`.
        let tokens = kinds("items.map");
        assert_eq!(tokens[0], TokenKind::Identifier("items".into()));
        assert_eq!(tokens[1], TokenKind::Dot);
        assert_eq!(tokens[2], TokenKind::TyMap);
    }

    #[test]
    fn numeric_literals_choose_width() {
        assert_eq!(kinds("5")[0], TokenKind::Int(5));
        assert_eq!(kinds("5l")[0], TokenKind::Long(5));
        assert_eq!(kinds("2.5")[0], TokenKind::Double(2.5));
        assert_eq!(kinds("2.5f")[0], TokenKind::Float(2.5));
        assert_eq!(kinds("2.5d")[0], TokenKind::Double(2.5));
        assert_eq!(kinds("4294967296")[0], TokenKind::Long(4294967296));
    }

    #[test]
    fn string_escapes_decode() {
        let tokens = kinds(r#""a\tbA""#);
        assert_eq!(tokens[0], TokenKind::Str("a\tbA".into()));
    }

    #[test]
    fn quoted_path_with_spaces_survives() {
        let tokens = kinds("import \"lib/my scripts/util.ebs\";");
        assert_eq!(tokens[0], TokenKind::Import);
        assert_eq!(
            tokens[1],
            TokenKind::Str("lib/my scripts/util.ebs".into())
        );
    }

    #[test]
    fn iso_string_becomes_date() {
        let tokens = kinds("\"2024-03-01\"");
        match &tokens[0] {
            TokenKind::Date(dt) => assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-03-01"),
            other => panic!("expected date, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = Tokenizer::new("var x = 1;\nvar s = \"oops")
            .tokenize()
            .expect_err("expected lex error");
        match err {
            ScriptError::Lex { line, .. } => assert_eq!(line, 2),
            other => panic!("expected lex error, got {:?}", other),
        }
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = kinds("// heading\nvar x = 1; // trailing");
        assert_eq!(tokens[0], TokenKind::Var);
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }
}
