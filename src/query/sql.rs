// File: src/query/sql.rs

//! Minimal SQL lexer
//!
//! Only as much SQL as routing needs: names, literals, parameters, and
//! punctuation, each tagged with its byte span and parenthesis depth.
//! Comments are dropped.

use crate::error::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Bare identifier or keyword
    Word,
    /// `"name"`, `` `name` `` or `[name]`, text holds the unquoted name
    QuotedIdent,
    /// `'text'`, text holds the unescaped contents
    Str,
    Number,
    /// `?`, `?NNN`, `:name`, `@name`, `$name`
    Param,
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Parenthesis depth; `(` and its matching `)` share the outer depth
    pub depth: usize,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

pub(crate) fn tokenize(sql: &str) -> ArchiveResult<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = match sql[i + 2..].find("*/") {
                Some(pos) => i + 2 + pos + 2,
                None => bytes.len(),
            };
            continue;
        }

        let start = i;
        let (kind, text) = match c {
            b'\'' => {
                let (text, end) = quoted(sql, i, b'\'')?;
                i = end;
                (TokenKind::Str, text)
            }
            b'"' | b'`' => {
                let (text, end) = quoted(sql, i, c)?;
                i = end;
                (TokenKind::QuotedIdent, text)
            }
            b'[' => {
                let close = sql[i + 1..].find(']').ok_or_else(|| {
                    ArchiveError::InvalidArgument(format!("unterminated identifier at byte {}", i))
                })?;
                let text = sql[i + 1..i + 1 + close].to_string();
                i = i + 1 + close + 1;
                (TokenKind::QuotedIdent, text)
            }
            b'(' => {
                tokens.push(Token {
                    kind: TokenKind::Punct('('),
                    text: "(".into(),
                    start,
                    end: start + 1,
                    depth,
                });
                depth += 1;
                i += 1;
                continue;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
                (TokenKind::Punct(')'), ")".into())
            }
            b'?' => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                (TokenKind::Param, sql[start..i].to_string())
            }
            b':' | b'@' | b'$' if bytes.get(i + 1).is_some_and(|b| is_word_byte(*b)) => {
                i += 1;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                (TokenKind::Param, sql[start..i].to_string())
            }
            c if c.is_ascii_digit()
                || (c == b'.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())) =>
            {
                i += 1;
                while i < bytes.len() {
                    let b = bytes[i];
                    let exponent_sign =
                        (b == b'+' || b == b'-') && matches!(bytes[i - 1], b'e' | b'E');
                    if b.is_ascii_alphanumeric() || b == b'.' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                (TokenKind::Number, sql[start..i].to_string())
            }
            c if is_word_start(c) => {
                i += 1;
                while i < bytes.len() && (is_word_byte(bytes[i]) || bytes[i] == b'$') {
                    i += 1;
                }
                (TokenKind::Word, sql[start..i].to_string())
            }
            _ => {
                // Any other ASCII byte is punctuation; multi-byte operators are
                // left as consecutive tokens
                i += 1;
                (TokenKind::Punct(c as char), (c as char).to_string())
            }
        };

        tokens.push(Token {
            kind,
            text,
            start,
            end: i,
            depth,
        });
    }

    Ok(tokens)
}

/// Index of the `)` closing the `(` at `open`
pub(crate) fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let depth = tokens.get(open)?.depth;
    tokens
        .iter()
        .enumerate()
        .skip(open + 1)
        .find(|(_, t)| t.depth == depth && t.is_punct(')'))
        .map(|(i, _)| i)
}

fn quoted(sql: &str, open: usize, quote: u8) -> ArchiveResult<(String, usize)> {
    let bytes = sql.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            let q = (quote as char).to_string();
            let text = sql[open + 1..i].replace(&q.repeat(2), &q);
            return Ok((text, i + 1));
        }
        i += 1;
    }
    Err(ArchiveError::InvalidArgument(format!(
        "unterminated quote starting at byte {}",
        open
    )))
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}
