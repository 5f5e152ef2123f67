use logos::Logos;

use crate::diagnostic::{SourceMap, Span};

/// Raw lexemes recognised by the logos automaton. `Scanner` lifts these into
/// `TokenKind`, which additionally carries the `Error` and `Eof` markers.
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
enum Raw {
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
    #[token(";")]
    Semicolon,
    #[token("/")]
    Slash,
    #[token("*")]
    Star,

    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token("<-")]
    LeftArrow,
    #[token("->")]
    RightArrow,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,
    #[regex(r#""[^"]*""#)]
    String,
    #[regex(r#""[^"]*"#)]
    UnterminatedString,
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("class")]
    Class,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("else")]
    Else,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("fn")]
    Fn,
    #[token("if")]
    If,
    #[token("null")]
    Null,
    #[token("or")]
    Or,
    #[token("print")]
    Print,
    #[token("return")]
    Return,
    #[token("super")]
    Super,
    #[token("this")]
    This,
    #[token("true")]
    True,
    #[token("var")]
    Var,
    #[token("while")]
    While,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    LeftArrow,
    RightArrow,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Break,
    Class,
    Const,
    Continue,
    Else,
    False,
    For,
    Fn,
    If,
    Null,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Error,
    Eof,
}

impl From<Raw> for TokenKind {
    fn from(raw: Raw) -> Self {
        match raw {
            Raw::LeftParen => TokenKind::LeftParen,
            Raw::RightParen => TokenKind::RightParen,
            Raw::LeftBrace => TokenKind::LeftBrace,
            Raw::RightBrace => TokenKind::RightBrace,
            Raw::Comma => TokenKind::Comma,
            Raw::Dot => TokenKind::Dot,
            Raw::Minus => TokenKind::Minus,
            Raw::Plus => TokenKind::Plus,
            Raw::Semicolon => TokenKind::Semicolon,
            Raw::Slash => TokenKind::Slash,
            Raw::Star => TokenKind::Star,
            Raw::Bang => TokenKind::Bang,
            Raw::BangEqual => TokenKind::BangEqual,
            Raw::Equal => TokenKind::Equal,
            Raw::EqualEqual => TokenKind::EqualEqual,
            Raw::Greater => TokenKind::Greater,
            Raw::GreaterEqual => TokenKind::GreaterEqual,
            Raw::Less => TokenKind::Less,
            Raw::LessEqual => TokenKind::LessEqual,
            Raw::LeftArrow => TokenKind::LeftArrow,
            Raw::RightArrow => TokenKind::RightArrow,
            Raw::Identifier => TokenKind::Identifier,
            Raw::String => TokenKind::String,
            Raw::UnterminatedString => TokenKind::Error,
            Raw::Number => TokenKind::Number,
            Raw::And => TokenKind::And,
            Raw::Break => TokenKind::Break,
            Raw::Class => TokenKind::Class,
            Raw::Const => TokenKind::Const,
            Raw::Continue => TokenKind::Continue,
            Raw::Else => TokenKind::Else,
            Raw::False => TokenKind::False,
            Raw::For => TokenKind::For,
            Raw::Fn => TokenKind::Fn,
            Raw::If => TokenKind::If,
            Raw::Null => TokenKind::Null,
            Raw::Or => TokenKind::Or,
            Raw::Print => TokenKind::Print,
            Raw::Return => TokenKind::Return,
            Raw::Super => TokenKind::Super,
            Raw::This => TokenKind::This,
            Raw::True => TokenKind::True,
            Raw::Var => TokenKind::Var,
            Raw::While => TokenKind::While,
        }
    }
}

/// One lexical token. For `TokenKind::Error` the lexeme holds the message
/// instead of source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub span: Span,
}

/// Lazy token stream over a source string. Yields `Eof` once at the end and
/// then stops.
pub struct Scanner<'src> {
    lexer: logos::Lexer<'src, Raw>,
    lines: SourceMap,
    finished: bool,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Scanner { lexer: Raw::lexer(source), lines: SourceMap::new(source), finished: false }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.lines.lookup(offset).0
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        let Some(result) = self.lexer.next() else {
            self.finished = true;
            let end = self.lexer.source().len();
            return Some(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                line: self.line_of(end),
                span: Span { start: end, end },
            });
        };

        let range = self.lexer.span();
        let span = Span { start: range.start, end: range.end };
        let line = self.line_of(range.start);
        let token = match result {
            Ok(Raw::UnterminatedString) => Token {
                kind: TokenKind::Error,
                lexeme: "unterminated string".to_string(),
                line,
                span,
            },
            Ok(raw) => Token { kind: raw.into(), lexeme: self.lexer.slice().to_string(), line, span },
            Err(()) => Token {
                kind: TokenKind::Error,
                lexeme: format!("unexpected character '{}'", self.lexer.slice()),
                line,
                span,
            },
        };
        Some(token)
    }
}

/// Scan a whole source string eagerly. The compiler pulls tokens lazily; this
/// is for tooling and tests.
pub fn scan(source: &str) -> Vec<Token> {
    Scanner::new(source).collect()
}
