//! Offset-carrying tokenizer for the SQL dialect.

use fsq_common::{FsqError, Result};

/// Punctuation and operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Comma,
    LParen,
    RParen,
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Slash,
}

impl Symbol {
    pub fn as_str(self) -> &'static str {
        match self {
            Symbol::Comma => ",",
            Symbol::LParen => "(",
            Symbol::RParen => ")",
            Symbol::Star => "*",
            Symbol::Eq => "=",
            Symbol::NotEq => "!=",
            Symbol::Lt => "<",
            Symbol::LtEq => "<=",
            Symbol::Gt => ">",
            Symbol::GtEq => ">=",
            Symbol::Plus => "+",
            Symbol::Minus => "-",
            Symbol::Slash => "/",
        }
    }
}

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: identifier, keyword, or qualified name (`u.age`).
    Word(String),
    /// Quoted string literal, quotes stripped.
    StringLit(String),
    /// Numeric literal text, sign-free.
    Number(String),
    /// Punctuation or operator.
    Sym(Symbol),
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Builds a position-bearing parse error against the query text.
pub fn parse_error(sql: &str, offset: usize, message: impl Into<String>) -> FsqError {
    let start = offset.saturating_sub(12);
    let end = (offset + 12).min(sql.len());
    // Clamp to char boundaries so slicing can't panic on multibyte text.
    let start = (0..=start).rev().find(|i| sql.is_char_boundary(*i)).unwrap_or(0);
    let end = (end..=sql.len()).find(|i| sql.is_char_boundary(*i)).unwrap_or(sql.len());
    FsqError::Parse {
        message: message.into(),
        offset,
        snippet: sql[start..end].to_string(),
    }
}

/// Tokenizes a query. Words keep embedded dots so qualified columns
/// (`u.age`) arrive as one token; file paths are always quoted.
pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let offset = i;
        match c {
            '\'' | '"' => {
                let quote = c;
                let mut out = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < bytes.len() {
                    let ch = bytes[j] as char;
                    if ch == quote {
                        // Doubled quote escapes itself.
                        if j + 1 < bytes.len() && bytes[j + 1] as char == quote {
                            out.push(quote);
                            j += 2;
                            continue;
                        }
                        closed = true;
                        j += 1;
                        break;
                    }
                    out.push(ch);
                    j += 1;
                }
                if !closed {
                    return Err(parse_error(sql, offset, "unterminated string literal"));
                }
                tokens.push(Token {
                    kind: TokenKind::StringLit(out),
                    offset,
                });
                i = j;
            }
            '0'..='9' => {
                let mut j = i;
                while j < bytes.len()
                    && matches!(bytes[j] as char, '0'..='9' | '.' | 'e' | 'E')
                {
                    // `2e-5` keeps its exponent sign.
                    if matches!(bytes[j] as char, 'e' | 'E')
                        && j + 1 < bytes.len()
                        && matches!(bytes[j + 1] as char, '+' | '-')
                    {
                        j += 1;
                    }
                    j += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number(sql[i..j].to_string()),
                    offset,
                });
                i = j;
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::Comma), offset });
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::LParen), offset });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::RParen), offset });
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::Star), offset });
                i += 1;
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::Plus), offset });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::Minus), offset });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::Slash), offset });
                i += 1;
            }
            '=' => {
                tokens.push(Token { kind: TokenKind::Sym(Symbol::Eq), offset });
                i += 1;
            }
            '!' => {
                if i + 1 < bytes.len() && bytes[i + 1] as char == '=' {
                    tokens.push(Token { kind: TokenKind::Sym(Symbol::NotEq), offset });
                    i += 2;
                } else {
                    return Err(parse_error(sql, offset, "unexpected `!`"));
                }
            }
            '<' => {
                if i + 1 < bytes.len() && bytes[i + 1] as char == '=' {
                    tokens.push(Token { kind: TokenKind::Sym(Symbol::LtEq), offset });
                    i += 2;
                } else if i + 1 < bytes.len() && bytes[i + 1] as char == '>' {
                    // `<>` normalizes to `!=`.
                    tokens.push(Token { kind: TokenKind::Sym(Symbol::NotEq), offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Sym(Symbol::Lt), offset });
                    i += 1;
                }
            }
            '>' => {
                if i + 1 < bytes.len() && bytes[i + 1] as char == '=' {
                    tokens.push(Token { kind: TokenKind::Sym(Symbol::GtEq), offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Sym(Symbol::Gt), offset });
                    i += 1;
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i;
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_alphanumeric()
                        || matches!(bytes[j] as char, '_' | '.'))
                {
                    j += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word(sql[i..j].to_string()),
                    offset,
                });
                i = j;
            }
            other => {
                return Err(parse_error(sql, offset, format!("unexpected character `{other}`")));
            }
        }
    }
    Ok(tokens)
}
