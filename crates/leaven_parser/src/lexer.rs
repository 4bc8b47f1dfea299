//! Lexer for the leaven language

use std::sync::Arc;

use leaven_error::{Loc, SyntaxError};

/// The kind of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A numeric literal; the token text is the raw lexeme.
    Num,
    /// A braced string `%{ … }`; the token text is the inner value.
    Str,
    /// A quoted symbol `'name`; the token text is the name.
    Symbol,
    /// An identifier, including operator names like `++` or `|>`.
    Id,
    Comma,
    Dot,
    Colon,
    Equal,
    OpenParen,
    CloseParen,
    OpenCurly,
    CloseCurly,
    OpenSquare,
    CloseSquare,
    /// A `// …` line comment; filtered out before parsing.
    Comment,
    Eof,
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The text of the token.
    pub text: String,
    /// Where the token starts in its source unit.
    pub loc: Loc,
}

impl Token {
    /// Human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Num => format!("number `{}`", self.text),
            TokenKind::Str => "string".to_string(),
            TokenKind::Symbol => format!("symbol `'{}`", self.text),
            TokenKind::Id => format!("`{}`", self.text),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Equal => "`=`".to_string(),
            TokenKind::OpenParen => "`(`".to_string(),
            TokenKind::CloseParen => "`)`".to_string(),
            TokenKind::OpenCurly => "`{`".to_string(),
            TokenKind::CloseCurly => "`}`".to_string(),
            TokenKind::OpenSquare => "`[`".to_string(),
            TokenKind::CloseSquare => "`]`".to_string(),
            TokenKind::Comment => "comment".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

fn is_punctuation(c: char) -> bool {
    matches!(c, ',' | '.' | ':' | '=' | '(' | ')' | '{' | '}' | '[' | ']')
}

fn is_ident_head(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_tail(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters a `'symbol` name may contain.
fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ',')
}

/// Lexer for leaven source text.
///
/// Converts a string into a sequence of tokens, ending with an `Eof`
/// token. Comments are kept; the parser filters them out.
pub struct Lexer<'a> {
    /// The source text.
    source: &'a str,
    /// The name of the source unit, attached to every location.
    name: Arc<str>,
    /// The current byte position in the source text.
    position: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source unit.
    pub fn new(name: &str, source: &'a str) -> Self {
        Self { source, name: Arc::from(name), position: 0 }
    }

    /// Get the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    /// Get the character after the current one without advancing.
    fn peek_second(&self) -> Option<char> {
        self.source[self.position..].chars().nth(1)
    }

    /// Advance past the current character.
    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    /// The location of the current character.
    fn loc(&self) -> Loc {
        Loc::new(Arc::clone(&self.name), self.position)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    /// Tokenize a single punctuation character.
    fn tokenize_single_char(&mut self, kind: TokenKind) -> Token {
        let loc = self.loc();
        let c = self.peek().unwrap_or_default();
        self.advance();

        Token { kind, text: c.to_string(), loc }
    }

    /// Tokenize a `// …` comment, excluding the marker.
    fn tokenize_comment(&mut self) -> Token {
        let loc = self.loc();
        self.advance(); // Consume '/'
        self.advance(); // Consume '/'

        let start = self.position;
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }

        Token { kind: TokenKind::Comment, text: self.source[start..self.position].to_string(), loc }
    }

    /// Tokenize a `%{ … }` braced string, excluding the delimiters.
    fn tokenize_string(&mut self) -> Result<Token, SyntaxError> {
        let loc = self.loc();
        self.advance(); // Consume '%'
        self.advance(); // Consume '{'

        let start = self.position;
        loop {
            match self.peek() {
                Some('}') => break,
                Some(_) => self.advance(),
                None => return Err(SyntaxError::UnclosedString { loc }),
            }
        }

        let text = self.source[start..self.position].to_string();
        self.advance(); // Consume '}'

        Ok(Token { kind: TokenKind::Str, text, loc })
    }

    /// Tokenize a `'name` symbol, excluding the quote.
    fn tokenize_symbol(&mut self) -> Token {
        let loc = self.loc();
        self.advance(); // Consume '\''

        let start = self.position;
        while self.peek().is_some_and(is_symbol_char) {
            self.advance();
        }

        Token { kind: TokenKind::Symbol, text: self.source[start..self.position].to_string(), loc }
    }

    /// Tokenize a number: a digit followed by digits or dots. The lexeme
    /// must read as a floating-point literal.
    fn tokenize_number(&mut self) -> Result<Token, SyntaxError> {
        let loc = self.loc();
        let start = self.position;

        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.advance();
        }

        let lexeme = self.source[start..self.position].to_string();
        if lexeme.parse::<f64>().is_err() {
            return Err(SyntaxError::BadNum { lexeme, loc });
        }

        Ok(Token { kind: TokenKind::Num, text: lexeme, loc })
    }

    /// Tokenize an alphabetic identifier.
    fn tokenize_identifier(&mut self) -> Token {
        let loc = self.loc();
        let start = self.position;

        self.advance();
        while self.peek().is_some_and(is_ident_tail) {
            self.advance();
        }

        Token { kind: TokenKind::Id, text: self.source[start..self.position].to_string(), loc }
    }

    /// Tokenize a greedy run of characters no other rule claims. This is
    /// how operator names like `++`, `|>`, or `∈` enter the token
    /// stream: they become plain identifiers.
    fn tokenize_unknown_run(&mut self) -> Token {
        let loc = self.loc();
        let start = self.position;

        self.advance();
        while let Some(c) = self.peek() {
            let claimed = c.is_whitespace()
                || c.is_ascii_digit()
                || is_ident_head(c)
                || is_punctuation(c)
                || c == '\''
                || (c == '/' && self.peek_second() == Some('/'))
                || (c == '%' && self.peek_second() == Some('{'));
            if claimed {
                break;
            }
            self.advance();
        }

        Token { kind: TokenKind::Id, text: self.source[start..self.position].to_string(), loc }
    }

    /// Tokenize the entire source unit.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let Some(c) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, text: String::new(), loc: self.loc() });
                return Ok(tokens);
            };

            let token = match c {
                ',' => self.tokenize_single_char(TokenKind::Comma),
                '.' => self.tokenize_single_char(TokenKind::Dot),
                ':' => self.tokenize_single_char(TokenKind::Colon),
                '=' => self.tokenize_single_char(TokenKind::Equal),
                '(' => self.tokenize_single_char(TokenKind::OpenParen),
                ')' => self.tokenize_single_char(TokenKind::CloseParen),
                '{' => self.tokenize_single_char(TokenKind::OpenCurly),
                '}' => self.tokenize_single_char(TokenKind::CloseCurly),
                '[' => self.tokenize_single_char(TokenKind::OpenSquare),
                ']' => self.tokenize_single_char(TokenKind::CloseSquare),
                '/' if self.peek_second() == Some('/') => self.tokenize_comment(),
                '%' if self.peek_second() == Some('{') => self.tokenize_string()?,
                '\'' => self.tokenize_symbol(),
                c if c.is_ascii_digit() => self.tokenize_number()?,
                c if is_ident_head(c) => self.tokenize_identifier(),
                _ => self.tokenize_unknown_run(),
            };
            tokens.push(token);
        }
    }
}
