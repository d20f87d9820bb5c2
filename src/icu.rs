// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer and structural parser for ICU plural/select messages.
//!
//! The tokenizer is an explicit finite-state machine over the raw
//! message text. It never fails: malformed input simply produces a
//! token stream that [`parse_icu`] rejects with a descriptive error.
//! Inline XML elements embedded in category bodies (placeholders, tag
//! spans) are opaque text at this level; the per-format normalizers
//! parse them afterwards.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// The kind of an ICU token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    BraceOpen,
    BraceClose,
    Comma,
    Plural,
    Select,
}

/// One token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Token {
            kind,
            value: value.into(),
        }
    }
}

/// Whether an ICU message is a plural or a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcuType {
    Plural,
    Select,
}

impl fmt::Display for IcuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcuType::Plural => f.write_str("plural"),
            IcuType::Select => f.write_str("select"),
        }
    }
}

/// The structural parse of an ICU message.
///
/// Category bodies are kept as raw text. They may contain inline wire
/// markup and are handed to the format normalizer one level up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIcu {
    pub variable: String,
    pub icu_type: IcuType,
    /// `(category key, raw body)` pairs in source order.
    pub cases: Vec<(String, String)>,
}

/// Quick check whether a wire fragment looks like an ICU message.
///
/// Used by the normalizers to decide between the inline-markup path and
/// the ICU path before any real parsing happens.
pub fn looks_like_icu(fragment: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();

    let re = RE.get_or_init(|| {
        Regex::new(r"(?s)^\{\s*[^{},]+\s*,\s*(plural|select)\s*,").unwrap()
    });
    re.is_match(fragment.trim_start())
}

/// Tokenizer states. `InMessage` carries the current inner brace depth
/// so that `{nested}` text inside a category body does not close the
/// body prematurely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    Normal,
    InMessage(usize),
}

/// Split `input` into ICU tokens.
///
/// Escape sequences `''`, `'{'` and `'}'` are decoded into the current
/// text accumulator and never appear as separate tokens. A trailing
/// whitespace-only text buffer is dropped; any other buffer is flushed
/// as a final `Text` token.
///
/// # Examples
///
/// ```
/// use xliff_i18n_helpers::icu::{tokenize, TokenKind};
///
/// let tokens = tokenize("{n, plural, =0 {none}}");
/// let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
/// assert_eq!(
///     kinds,
///     vec![
///         TokenKind::BraceOpen,
///         TokenKind::Text,
///         TokenKind::Comma,
///         TokenKind::Plural,
///         TokenKind::Comma,
///         TokenKind::Text,
///         TokenKind::BraceOpen,
///         TokenKind::Text,
///         TokenKind::BraceClose,
///         TokenKind::BraceClose,
///     ]
/// );
/// ```
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut state = State::Default;
    let mut buffer = String::new();
    let mut chars = input.chars().peekable();

    // The type keyword is only legal at one position, right after
    // `{variable,`. Once it has been emitted, a category key that
    // happens to read `plural` or `select` stays plain text.
    let mut keyword_seen = false;

    // Flush the buffer as a structural token. Inside the ICU header the
    // keywords `plural` and `select` are recognized; everywhere else the
    // buffer is plain text.
    fn flush(tokens: &mut Vec<Token>, buffer: &mut String, state: State, keyword_seen: &mut bool) {
        if buffer.is_empty() {
            return;
        }
        let value = std::mem::take(buffer);
        let kind = match (state, *keyword_seen, value.trim()) {
            (State::Normal, false, "plural") => TokenKind::Plural,
            (State::Normal, false, "select") => TokenKind::Select,
            _ => TokenKind::Text,
        };
        match kind {
            TokenKind::Text => tokens.push(Token::new(kind, value)),
            _ => {
                *keyword_seen = true;
                tokens.push(Token::new(kind, value.trim().to_string()));
            }
        }
    }

    while let Some(ch) = chars.next() {
        // Escapes apply inside the ICU construct only; outside, a
        // single quote is ordinary text.
        if ch == '\'' && state != State::Default {
            match chars.peek() {
                Some('\'') => {
                    chars.next();
                    buffer.push('\'');
                    continue;
                }
                Some('{') | Some('}') => {
                    let escaped = chars.next().unwrap();
                    // The closing quote is optional in real-world data.
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                    }
                    buffer.push(escaped);
                    continue;
                }
                _ => {
                    buffer.push('\'');
                    continue;
                }
            }
        }

        match state {
            State::Default => {
                if ch == '{' {
                    flush(&mut tokens, &mut buffer, state, &mut keyword_seen);
                    tokens.push(Token::new(TokenKind::BraceOpen, "{"));
                    state = State::Normal;
                } else {
                    buffer.push(ch);
                }
            }
            State::Normal => match ch {
                '{' => {
                    flush(&mut tokens, &mut buffer, state, &mut keyword_seen);
                    tokens.push(Token::new(TokenKind::BraceOpen, "{"));
                    state = State::InMessage(1);
                }
                '}' => {
                    flush(&mut tokens, &mut buffer, state, &mut keyword_seen);
                    tokens.push(Token::new(TokenKind::BraceClose, "}"));
                    state = State::Default;
                    keyword_seen = false;
                }
                ',' => {
                    flush(&mut tokens, &mut buffer, state, &mut keyword_seen);
                    tokens.push(Token::new(TokenKind::Comma, ","));
                }
                _ => buffer.push(ch),
            },
            State::InMessage(depth) => match ch {
                '{' => {
                    buffer.push('{');
                    state = State::InMessage(depth + 1);
                }
                '}' => {
                    if depth == 1 {
                        flush(&mut tokens, &mut buffer, state, &mut keyword_seen);
                        tokens.push(Token::new(TokenKind::BraceClose, "}"));
                        state = State::Normal;
                    } else {
                        buffer.push('}');
                        state = State::InMessage(depth - 1);
                    }
                }
                _ => buffer.push(ch),
            },
        }
    }

    if !buffer.trim().is_empty() {
        flush(&mut tokens, &mut buffer, state, &mut keyword_seen);
    }

    tokens
}

/// Parse an ICU message string into its structure.
///
/// The grammar is `{ <variable> , (plural|select) , ( <key> { <body> } )+ }`.
/// Category keys must be unique; bodies may be empty.
///
/// # Examples
///
/// ```
/// use xliff_i18n_helpers::icu::{parse_icu, IcuType};
///
/// let icu = parse_icu("{count, plural, =0 {no items} other {items}}").unwrap();
/// assert_eq!(icu.variable, "count");
/// assert_eq!(icu.icu_type, IcuType::Plural);
/// assert_eq!(
///     icu.cases,
///     vec![
///         ("=0".to_string(), "no items".to_string()),
///         ("other".to_string(), "items".to_string()),
///     ]
/// );
/// ```
pub fn parse_icu(input: &str) -> Result<ParsedIcu, String> {
    let tokens = tokenize(input);
    let mut iter = tokens.into_iter().peekable();

    let expect = |token: Option<Token>, kind: TokenKind| -> Result<Token, String> {
        match token {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(format!(
                "expected {:?} but found {:?} ({:?})",
                kind, token.kind, token.value
            )),
            None => Err(format!("expected {kind:?} but found end of message")),
        }
    };

    expect(iter.next(), TokenKind::BraceOpen)?;
    let variable = expect(iter.next(), TokenKind::Text)?.value.trim().to_string();
    if variable.is_empty() {
        return Err("missing variable name".to_string());
    }
    expect(iter.next(), TokenKind::Comma)?;
    let icu_type = match iter.next() {
        Some(token) if token.kind == TokenKind::Plural => IcuType::Plural,
        Some(token) if token.kind == TokenKind::Select => IcuType::Select,
        Some(token) => {
            return Err(format!(
                "expected plural or select but found {:?}",
                token.value
            ))
        }
        None => return Err("expected plural or select but found end of message".to_string()),
    };
    expect(iter.next(), TokenKind::Comma)?;

    let mut cases: Vec<(String, String)> = Vec::new();
    loop {
        match iter.next() {
            Some(token) if token.kind == TokenKind::Text => {
                let key = token.value.trim().to_string();
                if key.is_empty() {
                    return Err("empty category key".to_string());
                }
                if cases.iter().any(|(existing, _)| existing == &key) {
                    return Err(format!("duplicate category key {key:?}"));
                }
                expect(iter.next(), TokenKind::BraceOpen)?;
                let body = match iter.peek() {
                    Some(token) if token.kind == TokenKind::Text => {
                        iter.next().map(|token| token.value).unwrap_or_default()
                    }
                    _ => String::new(),
                };
                expect(iter.next(), TokenKind::BraceClose)?;
                cases.push((key, body));
            }
            Some(token) if token.kind == TokenKind::BraceClose => break,
            Some(token) => {
                return Err(format!(
                    "expected category key or closing brace but found {:?}",
                    token.value
                ))
            }
            None => {
                return Err("unbalanced braces: message ended before closing brace".to_string())
            }
        }
    }

    if cases.is_empty() {
        return Err("an ICU message needs at least one category".to_string());
    }
    if iter.next().is_some() {
        return Err("unexpected content after closing brace".to_string());
    }

    Ok(ParsedIcu {
        variable,
        icu_type,
        cases,
    })
}

/// Escape `{`, `}` and `'` in a category body for serialization.
///
/// Applied only when the body literally contains one of the three
/// characters, so clean round trips stay byte-identical.
pub fn escape_icu_body(body: &str) -> String {
    if !body.contains(['{', '}', '\'']) {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len());
    for ch in body.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '{' => out.push_str("'{'"),
            '}' => out.push_str("'}'"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render an ICU message back to its text form.
///
/// Categories keep their source order; the variable and keys are passed
/// through verbatim.
pub fn render_icu(variable: &str, icu_type: IcuType, cases: &[(String, String)]) -> String {
    let rendered: Vec<String> = cases
        .iter()
        .map(|(key, body)| format!("{key} {{{}}}", escape_icu_body(body)))
        .collect();
    format!("{{{variable}, {icu_type}, {}}}", rendered.join(" "))
}
