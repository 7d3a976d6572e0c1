//! Hand-rolled lexer (scanner) for the Monkey language.
//!
//! The [`Lexer`] consumes a source string and produces a flat `Vec<Token>`.
//! Tokens carry [`Span`] information for precise error reporting.
//!
//! # Error Handling
//!
//! Lexer errors are collected into an internal list rather than immediately
//! aborting. This lets the lexer report multiple problems in a single pass.
//! Call [`Lexer::scan`] (or the [`lex`] convenience wrapper) to get both the
//! token stream and the error list.

use crate::token::{keyword, Span, Token, TokenKind};

// ─────────────────────────────────────────────────────────────────────────────
// Lexer struct
// ─────────────────────────────────────────────────────────────────────────────

/// The Monkey lexical scanner.
///
/// Construct one with [`Lexer::new`] and then call [`Lexer::scan`] to obtain
/// the full token stream. The lexer itself is consumed after scanning.
pub struct Lexer<'src> {
    /// Iterator over `(byte_offset, char)` pairs.
    chars: std::str::CharIndices<'src>,
    /// The current character and its byte offset, or `None` at EOF.
    current: Option<(usize, char)>,
    /// The *next* character peeked without consuming (for `==` / `!=`).
    peeked: Option<(usize, char)>,
    /// Current source line (1-indexed).
    line: u32,
    /// Current source column in *characters* (1-indexed).
    col: u32,
    /// Byte offset of the character immediately after the most recently
    /// consumed one. Used to set `span.end` after consuming a token.
    pos: usize,
    /// Accumulated lex errors. Non-fatal; scanning continues after recording.
    errors: Vec<LexError>,
}

/// A non-fatal lexical error. Lexing continues after recording these so
/// the parser sees as many tokens as possible.
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.span, self.message)
    }
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(src: &'src str) -> Self {
        let mut chars = src.char_indices();
        let current = chars.next();
        let peeked = chars.next();
        Self {
            chars,
            current,
            peeked,
            line: 1,
            col: 1,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// Run the full scan, returning `(tokens, errors)`.
    ///
    /// `tokens` always ends with a [`TokenKind::Eof`] sentinel.
    /// `errors` is empty on a clean input.
    pub fn scan(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.current.is_none() {
                let span = Span::new(self.pos, self.pos, self.line, self.col);
                tokens.push(Token::new(TokenKind::Eof, span));
                break;
            }
            if let Some(tok) = self.next_token() {
                tokens.push(tok);
            }
        }
        (tokens, self.errors)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal scanning helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the current character without consuming it.
    #[inline]
    fn peek(&self) -> Option<char> {
        self.current.map(|(_, c)| c)
    }

    /// Return the next character without consuming either current or next.
    #[inline]
    fn peek2(&self) -> Option<char> {
        self.peeked.map(|(_, c)| c)
    }

    /// Consume the current character and advance the iterator.
    /// Updates line/column counters and `self.pos`.
    fn advance(&mut self) -> Option<char> {
        let result = self.current;
        self.current = self.peeked;
        self.peeked = self.chars.next();

        if let Some((offset, ch)) = result {
            self.pos = offset + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            Some(ch)
        } else {
            None
        }
    }

    /// Skip whitespace and `//` line comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Record a lex error at the given location.
    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(LexError {
            message: message.into(),
            span,
        });
    }

    /// Scan the next token. Returns `None` when the current character is
    /// illegal (an error is recorded and the character skipped).
    fn next_token(&mut self) -> Option<Token> {
        let (start, line, col) = match self.current {
            Some((offset, _)) => (offset, self.line, self.col),
            None => return None,
        };
        let span_from = |lexer: &Self| Span::new(start, lexer.pos, line, col);

        let c = self.advance()?;
        let kind = match c {
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '"' => return self.scan_string(start, line, col),
            c if c.is_ascii_digit() => return Some(self.scan_integer(c, start, line, col)),
            c if is_ident_start(c) => return Some(self.scan_identifier(c, start, line, col)),
            other => {
                let span = span_from(self);
                self.error(format!("unexpected character {other:?}"), span);
                return None;
            }
        };

        Some(Token::new(kind, span_from(self)))
    }

    /// Scan an integer literal. The first digit has already been consumed.
    fn scan_integer(&mut self, first: char, start: usize, line: u32, col: u32) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.advance();
        }
        let span = Span::new(start, self.pos, line, col);
        match text.parse::<i64>() {
            Ok(n) => Token::new(TokenKind::Int(n), span),
            Err(_) => {
                self.error(format!("integer literal {text} out of range"), span);
                Token::new(TokenKind::Int(0), span)
            }
        }
    }

    /// Scan an identifier or keyword. The first character has already been
    /// consumed.
    fn scan_identifier(&mut self, first: char, start: usize, line: u32, col: u32) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        let span = Span::new(start, self.pos, line, col);
        Token::new(keyword(&text), span)
    }

    /// Scan a string literal. The opening quote has already been consumed.
    ///
    /// Supported escapes: `\n`, `\t`, `\r`, `\"`, `\\`. An unterminated
    /// string records an error and yields the text scanned so far.
    fn scan_string(&mut self, start: usize, line: u32, col: u32) -> Option<Token> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => {
                        let span = Span::new(start, self.pos, line, col);
                        self.error(format!("unknown escape sequence \\{other}"), span);
                        text.push(other);
                    }
                    None => {
                        let span = Span::new(start, self.pos, line, col);
                        self.error("unterminated string literal", span);
                        return Some(Token::new(TokenKind::Str(text), span));
                    }
                },
                Some(c) => text.push(c),
                None => {
                    let span = Span::new(start, self.pos, line, col);
                    self.error("unterminated string literal", span);
                    return Some(Token::new(TokenKind::Str(text), span));
                }
            }
        }
        let span = Span::new(start, self.pos, line, col);
        Some(Token::new(TokenKind::Str(text), span))
    }
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ─────────────────────────────────────────────────────────────────────────────
// Convenience entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Lex `src` and return `(tokens, errors)`.
///
/// This is the primary entry point for the rest of the pipeline.
/// The returned `tokens` always end with `TokenKind::Eof`.
pub fn lex(src: &str) -> (Vec<Token>, Vec<LexError>) {
    Lexer::new(src).scan()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (toks, errs) = lex(src);
        assert!(errs.is_empty(), "unexpected lex errors: {errs:?}");
        toks.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_single_chars() {
        let k = kinds("( ) { } [ ] , ; :");
        assert_eq!(
            k,
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        let k = kinds("+ - * / == != < > ! =");
        assert_eq!(k[0], TokenKind::Plus);
        assert_eq!(k[1], TokenKind::Minus);
        assert_eq!(k[2], TokenKind::Star);
        assert_eq!(k[3], TokenKind::Slash);
        assert_eq!(k[4], TokenKind::Eq);
        assert_eq!(k[5], TokenKind::NotEq);
        assert_eq!(k[6], TokenKind::Lt);
        assert_eq!(k[7], TokenKind::Gt);
        assert_eq!(k[8], TokenKind::Bang);
        assert_eq!(k[9], TokenKind::Assign);
    }

    #[test]
    fn test_keywords() {
        let k = kinds("fn let true false if else return while break");
        assert_eq!(k[0], TokenKind::Function);
        assert_eq!(k[1], TokenKind::Let);
        assert_eq!(k[2], TokenKind::True);
        assert_eq!(k[3], TokenKind::False);
        assert_eq!(k[4], TokenKind::If);
        assert_eq!(k[5], TokenKind::Else);
        assert_eq!(k[6], TokenKind::Return);
        assert_eq!(k[7], TokenKind::While);
        assert_eq!(k[8], TokenKind::Break);
    }

    #[test]
    fn test_integer_literals() {
        let k = kinds("0 5 10 9999");
        assert_eq!(k[0], TokenKind::Int(0));
        assert_eq!(k[1], TokenKind::Int(5));
        assert_eq!(k[2], TokenKind::Int(10));
        assert_eq!(k[3], TokenKind::Int(9999));
    }

    #[test]
    fn test_identifiers() {
        let k = kinds("foo _bar add_two x1");
        assert_eq!(k[0], TokenKind::Ident("foo".into()));
        assert_eq!(k[1], TokenKind::Ident("_bar".into()));
        assert_eq!(k[2], TokenKind::Ident("add_two".into()));
        assert_eq!(k[3], TokenKind::Ident("x1".into()));
    }

    #[test]
    fn test_plain_string() {
        let k = kinds(r#""hello world""#);
        assert_eq!(k[0], TokenKind::Str("hello world".into()));
    }

    #[test]
    fn test_string_escapes() {
        let k = kinds(r#""a\nb\t\"c\\""#);
        assert_eq!(k[0], TokenKind::Str("a\nb\t\"c\\".into()));
    }

    #[test]
    fn test_unterminated_string_reports_error() {
        let (toks, errs) = lex(r#""oops"#);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("unterminated"));
        assert_eq!(toks[0].kind, TokenKind::Str("oops".into()));
    }

    #[test]
    fn test_line_comment() {
        let k = kinds("foo // this is a comment\nbar");
        assert_eq!(k[0], TokenKind::Ident("foo".into()));
        assert_eq!(k[1], TokenKind::Ident("bar".into()));
    }

    #[test]
    fn test_illegal_character_reports_error() {
        let (toks, errs) = lex("let § = 1;");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("unexpected character"));
        // The rest of the stream still lexes.
        assert_eq!(toks[0].kind, TokenKind::Let);
        assert_eq!(toks[1].kind, TokenKind::Assign);
    }

    #[test]
    fn test_full_statement() {
        let k = kinds("let add = fn(x, y) { x + y; };");
        assert_eq!(
            k,
            vec![
                TokenKind::Let,
                TokenKind::Ident("add".into()),
                TokenKind::Assign,
                TokenKind::Function,
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::Comma,
                TokenKind::Ident("y".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Ident("x".into()),
                TokenKind::Plus,
                TokenKind::Ident("y".into()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let (toks, _) = lex("let x = 42;");
        assert_eq!(toks[0].span.col, 1); // let
        assert_eq!(toks[1].span.col, 5); // x
        assert_eq!(toks[2].span.col, 7); // =
        assert_eq!(toks[3].span.col, 9); // 42
        assert_eq!(toks[0].span.line, 1);
    }
}
