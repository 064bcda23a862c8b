//! On-demand tokenizer for unit scripts.
//!
//! The lexer is pulled one token at a time by the parser. That lets the parser
//! hand the raw text after `parameters` to `serde_json` via
//! [`Lexer::take_json`] instead of tokenizing JSON itself.

use super::ast::Span;
use serde::de::DeserializeOwned;

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Numeric literal.
    Number(f32),
    /// Double-quoted string literal with escapes resolved.
    Str(String),
    /// Identifier (including contextual words like `parameters`).
    Ident(String),
    /// Reserved word.
    Keyword(Keyword),
    /// Punctuation or operator.
    Punct(Punct),
    /// End of input.
    Eof,
}

/// Reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Keyword {
    Unit,
    State,
    On,
    Process,
    Fn,
    Register,
    Let,
    Const,
    If,
    Else,
    While,
    For,
    In,
    Try,
    Catch,
    Return,
    Break,
    Continue,
    True,
    False,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "unit" => Self::Unit,
            "state" => Self::State,
            "on" => Self::On,
            "process" => Self::Process,
            "fn" => Self::Fn,
            "register" => Self::Register,
            "let" => Self::Let,
            "const" => Self::Const,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "for" => Self::For,
            "in" => Self::In,
            "try" => Self::Try,
            "catch" => Self::Catch,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }

    /// Source spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::State => "state",
            Self::On => "on",
            Self::Process => "process",
            Self::Fn => "fn",
            Self::Register => "register",
            Self::Let => "let",
            Self::Const => "const",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::For => "for",
            Self::In => "in",
            Self::Try => "try",
            Self::Catch => "catch",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::True => "true",
            Self::False => "false",
        }
    }
}

/// Punctuation and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Punct {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Question,
    Dot,
    DotDot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

impl Punct {
    /// Source spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::Colon => ":",
            Self::Question => "?",
            Self::Dot => ".",
            Self::DotDot => "..",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::PlusPlus => "++",
            Self::MinusMinus => "--",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
        }
    }
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Str(s) => write!(f, "string \"{s}\""),
            Self::Ident(s) => write!(f, "'{s}'"),
            Self::Keyword(k) => write!(f, "'{}'", k.as_str()),
            Self::Punct(p) => write!(f, "'{}'", p.as_str()),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind and payload.
    pub tok: Tok,
    /// Byte range in the source.
    pub span: Span,
}

/// Tokenizer error: byte offset and message.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    /// Byte offset of the offending input.
    pub offset: usize,
    /// Description.
    pub message: String,
}

/// Pull-based tokenizer over module source text.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer at the start of `src`.
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// The full source text.
    pub fn source(&self) -> &'a str {
        self.src
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.byte_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.byte_at(1) == Some(b'*') => {
                    let start = self.pos;
                    match self.src[self.pos + 2..].find("*/") {
                        Some(end) => self.pos += end + 4,
                        None => {
                            return Err(LexError {
                                offset: start,
                                message: "unterminated block comment".into(),
                            });
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Produces the next token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(b) = self.peek_byte() else {
            return Ok(Token {
                tok: Tok::Eof,
                span: Span::new(start, start),
            });
        };

        let tok = if b.is_ascii_digit() || (b == b'.' && self.byte_at(1).is_some_and(|c| c.is_ascii_digit())) {
            self.lex_number()?
        } else if b.is_ascii_alphabetic() || b == b'_' {
            while self
                .peek_byte()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.pos += 1;
            }
            let word = &self.src[start..self.pos];
            Keyword::from_word(word).map_or_else(|| Tok::Ident(word.to_string()), Tok::Keyword)
        } else if b == b'"' {
            self.lex_string()?
        } else {
            Tok::Punct(self.lex_punct()?)
        };

        Ok(Token {
            tok,
            span: Span::new(start, self.pos),
        })
    }

    fn lex_number(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        while self.peek_byte().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        // A fraction needs a digit after the dot so that `0..n` stays a range.
        if self.peek_byte() == Some(b'.') && self.byte_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            while self.peek_byte().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_byte(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.byte_at(1), Some(b'+' | b'-')));
            if self.byte_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek_byte().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f32>().map(Tok::Number).map_err(|_| LexError {
            offset: start,
            message: format!("invalid number '{text}'"),
        })
    }

    fn lex_string(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(Tok::Str(out));
                }
                '\\' => {
                    let escaped = match chars.next() {
                        Some((_, 'n')) => '\n',
                        Some((_, 't')) => '\t',
                        Some((_, '"')) => '"',
                        Some((_, '\\')) => '\\',
                        Some((j, other)) => {
                            return Err(LexError {
                                offset: self.pos + j,
                                message: format!("unknown escape '\\{other}'"),
                            });
                        }
                        None => break,
                    };
                    out.push(escaped);
                }
                '\n' => break,
                c => out.push(c),
            }
        }
        Err(LexError {
            offset: start,
            message: "unterminated string".into(),
        })
    }

    fn lex_punct(&mut self) -> Result<Punct, LexError> {
        let b = self.peek_byte().unwrap_or(0);
        let next = self.byte_at(1);
        let (punct, len) = match (b, next) {
            (b'.', Some(b'.')) => (Punct::DotDot, 2),
            (b'+', Some(b'+')) => (Punct::PlusPlus, 2),
            (b'-', Some(b'-')) => (Punct::MinusMinus, 2),
            (b'+', Some(b'=')) => (Punct::PlusAssign, 2),
            (b'-', Some(b'=')) => (Punct::MinusAssign, 2),
            (b'*', Some(b'=')) => (Punct::StarAssign, 2),
            (b'/', Some(b'=')) => (Punct::SlashAssign, 2),
            (b'=', Some(b'=')) => (Punct::EqEq, 2),
            (b'!', Some(b'=')) => (Punct::NotEq, 2),
            (b'<', Some(b'=')) => (Punct::Le, 2),
            (b'>', Some(b'=')) => (Punct::Ge, 2),
            (b'&', Some(b'&')) => (Punct::AndAnd, 2),
            (b'|', Some(b'|')) => (Punct::OrOr, 2),
            (b'{', _) => (Punct::LBrace, 1),
            (b'}', _) => (Punct::RBrace, 1),
            (b'(', _) => (Punct::LParen, 1),
            (b')', _) => (Punct::RParen, 1),
            (b'[', _) => (Punct::LBracket, 1),
            (b']', _) => (Punct::RBracket, 1),
            (b',', _) => (Punct::Comma, 1),
            (b';', _) => (Punct::Semi, 1),
            (b':', _) => (Punct::Colon, 1),
            (b'?', _) => (Punct::Question, 1),
            (b'.', _) => (Punct::Dot, 1),
            (b'+', _) => (Punct::Plus, 1),
            (b'-', _) => (Punct::Minus, 1),
            (b'*', _) => (Punct::Star, 1),
            (b'/', _) => (Punct::Slash, 1),
            (b'%', _) => (Punct::Percent, 1),
            (b'=', _) => (Punct::Assign, 1),
            (b'<', _) => (Punct::Lt, 1),
            (b'>', _) => (Punct::Gt, 1),
            (b'!', _) => (Punct::Bang, 1),
            _ => {
                let c = self.src[self.pos..].chars().next().unwrap_or('?');
                return Err(LexError {
                    offset: self.pos,
                    message: format!("unexpected character '{c}'"),
                });
            }
        };
        self.pos += len;
        Ok(punct)
    }

    /// Deserializes one JSON value starting at the next non-trivia byte and
    /// advances past it.
    pub fn take_json<T: DeserializeOwned>(&mut self) -> Result<(T, Span), LexError> {
        self.skip_trivia()?;
        let start = self.pos;
        let mut stream = serde_json::Deserializer::from_str(&self.src[start..]).into_iter::<T>();
        match stream.next() {
            Some(Ok(value)) => {
                self.pos = start + stream.byte_offset();
                Ok((value, Span::new(start, self.pos)))
            }
            Some(Err(err)) => Err(LexError {
                offset: start + json_error_offset(&self.src[start..], &err),
                message: format!("invalid JSON: {err}"),
            }),
            None => Err(LexError {
                offset: start,
                message: "expected a JSON value".into(),
            }),
        }
    }
}

/// Converts serde_json's 1-based line/column into a byte offset in `text`.
fn json_error_offset(text: &str, err: &serde_json::Error) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(err.line().saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + err.column().saturating_sub(1)).min(text.len())
}
