//! Lexer for marker argument text.
//!
//! A [`Scanner`] consumes the argument portion of a single marker
//! comment (`+limits:Min=1,Max={2,3}` and the like). It produces
//! identifier, integer and string tokens, exposes single characters
//! as-is, and supports the cursor save/rewind that type inference
//! needs for non-destructive lookahead.

use std::fmt::{self, Display, Formatter};

/// Kind of token produced by [`Scanner::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier (`[A-Za-z_][A-Za-z0-9_]*`)
    Ident,
    /// A run of decimal digits
    Integer,
    /// A quoted string literal; the lexeme keeps its delimiters
    Str,
    /// Any other single character
    Char(char),
    /// End of input
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident => f.write_str("identifier"),
            TokenKind::Integer => f.write_str("integer"),
            TokenKind::Str => f.write_str("string"),
            TokenKind::Char(c) => write!(f, "'{c}'"),
            TokenKind::Eof => f.write_str("end of marker"),
        }
    }
}

/// Error while scanning or parsing marker argument text.
///
/// Carries the byte offset into the marker text; the collector maps it
/// back to a file position when it records the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset into the marker text
    pub offset: usize,
    /// Human-readable cause
    pub message: String,
}

impl SyntaxError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Positional lexer over a marker's argument text.
pub struct Scanner<'a> {
    source: &'a str,
    search_index: usize,
    token_start: usize,
    token_end: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            search_index: 0,
            token_start: 0,
            token_end: 0,
        }
    }

    /// The full input text.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Current byte offset of the cursor.
    pub fn search_index(&self) -> usize {
        self.search_index
    }

    /// Rewind (or advance) the cursor to an absolute byte offset.
    pub fn set_search_index(&mut self, index: usize) {
        self.search_index = index.min(self.source.len());
    }

    /// Byte offset where the current token starts.
    pub fn token_position(&self) -> usize {
        self.token_start
    }

    /// Lexeme of the most recently scanned token. Quoted strings keep
    /// their delimiters.
    pub fn token(&self) -> &'a str {
        &self.source[self.token_start..self.token_end]
    }

    /// Next character without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.source[self.search_index..].chars().next()
    }

    pub(crate) fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.search_index += c.len_utf8();
        }
    }

    /// Consume whitespace and return the next character unconsumed.
    /// `None` means end of input.
    pub fn skip_whitespace(&mut self) -> Option<char> {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                return Some(c);
            }
            self.advance();
        }
        None
    }

    /// Advance to the next token and classify it.
    pub fn scan(&mut self) -> TokenKind {
        let Some(c) = self.skip_whitespace() else {
            self.token_start = self.source.len();
            self.token_end = self.source.len();
            return TokenKind::Eof;
        };

        self.token_start = self.search_index;
        let kind = if c.is_alphabetic() || c == '_' {
            while let Some(c) = self.peek() {
                if !c.is_alphanumeric() && c != '_' {
                    break;
                }
                self.advance();
            }
            TokenKind::Ident
        } else if c.is_ascii_digit() {
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            TokenKind::Integer
        } else if matches!(c, '"' | '\'' | '`') {
            self.scan_string(c)
        } else {
            self.advance();
            TokenKind::Char(c)
        };
        self.token_end = self.search_index;
        kind
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        self.advance();
        while let Some(c) = self.peek() {
            self.advance();
            if c == quote {
                break;
            }
            // backslash escapes only inside interpreted literals
            if c == '\\' && quote != '`' {
                self.advance();
            }
        }
        TokenKind::Str
    }

    /// Scan a token and fail unless it matches `kind`. `description`
    /// names what the caller wanted, e.g. `Comma ','`.
    pub fn expect(&mut self, kind: TokenKind, description: &str) -> Result<(), SyntaxError> {
        let got = self.scan();
        if got == kind {
            return Ok(());
        }
        let shown = match got {
            TokenKind::Eof => "end of marker".to_string(),
            _ => format!("'{}'", self.token()),
        };
        Err(SyntaxError::new(
            self.token_start,
            format!("expected {description}, got {shown}"),
        ))
    }

    /// The remainder of the input, verbatim, consuming it.
    pub fn rest(&mut self) -> &'a str {
        let rest = &self.source[self.search_index..];
        self.search_index = self.source.len();
        rest
    }
}

/// Decode a quoted string lexeme (delimiters included).
///
/// Back-tick strings are raw; double- and single-quoted strings get
/// escape processing.
pub(crate) fn unquote(lexeme: &str) -> Result<String, String> {
    let mut chars = lexeme.chars();
    let Some(quote) = chars.next() else {
        return Err("empty string literal".to_string());
    };
    if !matches!(quote, '"' | '\'' | '`') {
        return Err(format!("invalid string literal {lexeme:?}"));
    }
    let body = chars.as_str();
    let Some(body) = body.strip_suffix(quote) else {
        return Err(format!("unterminated string literal {lexeme}"));
    };
    if quote == '`' {
        return Ok(body.to_string());
    }

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('`') => out.push('`'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let code = u8::from_str_radix(&hex, 16)
                    .map_err(|_| format!("invalid \\x escape in {lexeme}"))?;
                out.push(code as char);
            }
            Some('u') => {
                // both \uNNNN and \u{...} forms
                let code = if chars.clone().next() == Some('{') {
                    chars.next();
                    let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    u32::from_str_radix(&hex, 16)
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    u32::from_str_radix(&hex, 16)
                }
                .map_err(|_| format!("invalid \\u escape in {lexeme}"))?;
                let c = char::from_u32(code).ok_or(format!("invalid \\u escape in {lexeme}"))?;
                out.push(c);
            }
            Some(other) => return Err(format!("unknown escape \\{other} in {lexeme}")),
            None => return Err(format!("trailing backslash in {lexeme}")),
        }
    }
    Ok(out)
}
