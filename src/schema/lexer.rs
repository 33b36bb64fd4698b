use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Str(String),
    Number(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Assign,

    /// Any other operator or stray character.
    Op(String),

    /// Logical end of line (only emitted outside brackets).
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

impl LexError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for LexError {}

/// Tokenize app source leniently.
///
/// Unknown characters become [`TokenKind::Op`]; the only hard failure is an unterminated string
/// literal, after which nothing downstream can be trusted.
pub(crate) fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let mut depth = 0usize;

    while i < bytes.len() {
        let c = bytes[i];

        if c == b'\n' {
            if depth == 0 && !matches!(out.last(), None | Some(Token { kind: TokenKind::Newline, .. }))
            {
                out.push(Token {
                    kind: TokenKind::Newline,
                    span: Span { start: i, end: i + 1 },
                });
            }
            i += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        // Explicit line continuation.
        if c == b'\\' && matches!(bytes.get(i + 1), Some(b'\n') | Some(b'\r')) {
            i += 2;
            if bytes.get(i - 1) == Some(&b'\r') && bytes.get(i) == Some(&b'\n') {
                i += 1;
            }
            continue;
        }
        if c == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let start = i;

        // String literal, optionally prefixed with r/b (any case, any order).
        if let Some((prefix_len, raw)) = string_prefix(bytes, i) {
            let (value, end) = lex_string(input, i + prefix_len, raw)?;
            i = end;
            out.push(Token {
                kind: TokenKind::Str(value),
                span: Span { start, end: i },
            });
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            i += 1;
            while i < bytes.len() {
                let ch = bytes[i];
                let exp_sign = matches!(ch, b'+' | b'-') && matches!(bytes[i - 1], b'e' | b'E');
                if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'.' || exp_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            out.push(Token {
                kind: TokenKind::Number(input[start..i].to_owned()),
                span: Span { start, end: i },
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push(Token {
                kind: TokenKind::Ident(input[start..i].to_owned()),
                span: Span { start, end: i },
            });
            continue;
        }

        if i + 1 < bytes.len() {
            let two = &bytes[i..i + 2];
            let is_two = matches!(
                two,
                b"==" | b"!=" | b"<=" | b">=" | b"+=" | b"-=" | b"*=" | b"/=" | b"%=" | b"//" | b"**"
                    | b"->" | b"|=" | b"&=" | b"^=" | b"<<" | b">>"
            );
            if is_two {
                i += 2;
                out.push(Token {
                    kind: TokenKind::Op(input[start..i].to_owned()),
                    span: Span { start, end: i },
                });
                continue;
            }
        }

        let kind = match c {
            b'(' => {
                depth += 1;
                TokenKind::LParen
            }
            b'[' => {
                depth += 1;
                TokenKind::LBracket
            }
            b'{' => {
                depth += 1;
                TokenKind::LBrace
            }
            b')' => {
                depth = depth.saturating_sub(1);
                TokenKind::RParen
            }
            b']' => {
                depth = depth.saturating_sub(1);
                TokenKind::RBracket
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                TokenKind::RBrace
            }
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b':' => TokenKind::Colon,
            b'=' => TokenKind::Assign,
            _ => {
                // Keep multi-byte UTF-8 characters whole.
                let ch = input[i..].chars().next().unwrap_or('?');
                i += ch.len_utf8();
                out.push(Token {
                    kind: TokenKind::Op(ch.to_string()),
                    span: Span { start, end: i },
                });
                continue;
            }
        };
        i += 1;
        out.push(Token {
            kind,
            span: Span { start, end: i },
        });
    }

    out.push(Token {
        kind: TokenKind::Eof,
        span: Span {
            start: input.len(),
            end: input.len(),
        },
    });

    Ok(out)
}

/// Detect a string start at `i`: returns `(prefix_len, raw)`.
fn string_prefix(bytes: &[u8], i: usize) -> Option<(usize, bool)> {
    let mut j = i;
    let mut raw = false;
    while j < bytes.len() && j - i < 2 && matches!(bytes[j], b'r' | b'R' | b'b' | b'B') {
        raw |= matches!(bytes[j], b'r' | b'R');
        j += 1;
    }
    if j < bytes.len() && matches!(bytes[j], b'"' | b'\'') {
        // A prefix only counts when it is not the tail of a longer identifier.
        if j > i && i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
            return None;
        }
        return Some((j - i, raw));
    }
    None
}

/// Lex a string body starting at the opening quote. Returns the decoded value and end offset.
fn lex_string(input: &str, open: usize, raw: bool) -> Result<(String, usize), LexError> {
    let bytes = input.as_bytes();
    let quote = bytes[open];
    let triple = bytes.get(open + 1) == Some(&quote) && bytes.get(open + 2) == Some(&quote);
    let mut i = open + if triple { 3 } else { 1 };
    let mut out = String::new();

    loop {
        let Some(ch) = input[i..].chars().next() else {
            return Err(LexError::new(open, "unterminated string literal"));
        };
        let b = ch as u32;

        if b == u32::from(quote) {
            if !triple {
                return Ok((out, i + 1));
            }
            if bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                return Ok((out, i + 3));
            }
        }
        if ch == '\n' && !triple {
            return Err(LexError::new(open, "unterminated string literal"));
        }

        if ch == '\\' {
            let Some(next) = input[i + 1..].chars().next() else {
                return Err(LexError::new(open, "unterminated string literal"));
            };
            if raw {
                out.push('\\');
                out.push(next);
            } else {
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    '\n' => {}
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            i += 1 + next.len_utf8();
            continue;
        }

        out.push(ch);
        i += ch.len_utf8();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schema/lexer.rs"]
mod tests;
