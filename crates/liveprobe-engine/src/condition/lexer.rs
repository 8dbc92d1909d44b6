//! Tokenizer for condition expressions.

use liveprobe_core::ConditionError;

/// A lexical token with its byte offset.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Eof,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, ConditionError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let kind = match c {
            b'(' => single(&mut i, TokenKind::LParen),
            b')' => single(&mut i, TokenKind::RParen),
            b'[' => single(&mut i, TokenKind::LBracket),
            b']' => single(&mut i, TokenKind::RBracket),
            b'.' => single(&mut i, TokenKind::Dot),
            b'+' => single(&mut i, TokenKind::Plus),
            b'-' => single(&mut i, TokenKind::Minus),
            b'*' => single(&mut i, TokenKind::Star),
            b'/' => single(&mut i, TokenKind::Slash),
            b'%' => single(&mut i, TokenKind::Percent),
            b'=' if peek(bytes, i + 1) == Some(b'=') => double(&mut i, TokenKind::Eq),
            b'!' if peek(bytes, i + 1) == Some(b'=') => double(&mut i, TokenKind::Ne),
            b'!' => single(&mut i, TokenKind::Not),
            b'<' if peek(bytes, i + 1) == Some(b'=') => double(&mut i, TokenKind::Le),
            b'<' => single(&mut i, TokenKind::Lt),
            b'>' if peek(bytes, i + 1) == Some(b'=') => double(&mut i, TokenKind::Ge),
            b'>' => single(&mut i, TokenKind::Gt),
            b'&' if peek(bytes, i + 1) == Some(b'&') => double(&mut i, TokenKind::And),
            b'|' if peek(bytes, i + 1) == Some(b'|') => double(&mut i, TokenKind::Or),
            b'"' | b'\'' => lex_string(src, &mut i)?,
            b'0'..=b'9' => lex_number(src, &mut i)?,
            c if c == b'_' || c == b'@' || c == b'$' || c.is_ascii_alphabetic() => {
                lex_word(src, &mut i)
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(syntax(i, format!("unexpected character '{ch}'")));
            }
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: src.len(),
    });
    Ok(tokens)
}

pub(crate) fn syntax(position: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Syntax {
        position,
        message: message.into(),
    }
}

fn peek(bytes: &[u8], i: usize) -> Option<u8> {
    bytes.get(i).copied()
}

fn single(i: &mut usize, kind: TokenKind) -> TokenKind {
    *i += 1;
    kind
}

fn double(i: &mut usize, kind: TokenKind) -> TokenKind {
    *i += 2;
    kind
}

fn lex_word(src: &str, i: &mut usize) -> TokenKind {
    let bytes = src.as_bytes();
    let start = *i;
    while *i < bytes.len()
        && (bytes[*i].is_ascii_alphanumeric() || matches!(bytes[*i], b'_' | b'@' | b'$'))
    {
        *i += 1;
    }
    match &src[start..*i] {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        word => TokenKind::Ident(word.to_owned()),
    }
}

fn lex_number(src: &str, i: &mut usize) -> Result<TokenKind, ConditionError> {
    let bytes = src.as_bytes();
    let start = *i;
    while *i < bytes.len() && bytes[*i].is_ascii_digit() {
        *i += 1;
    }
    let mut is_float = false;
    if peek(bytes, *i) == Some(b'.') && peek(bytes, *i + 1).is_some_and(|b| b.is_ascii_digit()) {
        is_float = true;
        *i += 1;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
    }
    let text = &src[start..*i];
    if !is_float {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(TokenKind::Int(n));
        }
    }
    text.parse::<f64>()
        .map(TokenKind::Float)
        .map_err(|_| syntax(start, format!("invalid number '{text}'")))
}

fn lex_string(src: &str, i: &mut usize) -> Result<TokenKind, ConditionError> {
    let start = *i;
    let mut chars = src[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(syntax(start, "unterminated string"));
    };
    let mut out = String::new();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            c if c == quote => {
                *i = start + offset + c.len_utf8();
                return Ok(TokenKind::Str(out));
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(syntax(start, "unterminated string"))
}
