//! Low-level lexer for `key=value` authentication header grammars.
//!
//! Header values are comma-separated lists of `key=value` pairs where the
//! value may be a quoted string containing commas, spaces and equals signs.
//! Challenge headers additionally interleave bare scheme tokens
//! (`Digest realm="x"`, `Negotiate dG9rZW4=`), which pair mode has no use for.

use crate::error::{Error, Result};

/// One lexeme from a header value.
///
/// `value` is `None` for a bare token with no `=`: a scheme leader in
/// challenge mode, or a dangling token pair-mode consumers should skip.
/// Quoted values keep their quotes; callers unquote with [`crate::utils::shave`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub key: &'a str,
    pub value: Option<&'a str>,
    /// The separator that ended a scheme leader (`' '` or `','`), if any.
    /// `None` when the leader ran to end of input.
    pub sep: Option<char>,
}

enum State {
    BeforeEq,
    AfterEq,
    AfterEqQuoted,
}

/// Scanner over one header value; an iterator of [`Token`]s.
pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    ischall: bool,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, ischall: bool) -> Tokenizer<'a> {
        Tokenizer { input, pos: 0, ischall, done: false }
    }

    /// Consume everything up to (and including) the next comma, returning the
    /// segment before it. Used for the unquoted base64 parameter that does not
    /// fit the auth-param grammar.
    pub fn take_until_comma(&mut self) -> &'a str {
        let rest = &self.input[self.pos..];
        match rest.find(',') {
            Some(idx) => {
                self.pos += idx + 1;
                &rest[..idx]
            }
            None => {
                self.pos = self.input.len();
                rest
            }
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Result<Token<'a>>> {
        if self.done || self.pos >= self.input.len() {
            return None;
        }

        let bytes = self.input.as_bytes();
        let mut state = State::BeforeEq;
        let mut key_start: Option<usize> = None;
        let mut key_end = 0;
        let mut value_start = 0;

        let mut i = self.pos;
        while i < bytes.len() {
            let c = bytes[i];
            match state {
                State::BeforeEq => {
                    if c == b'=' {
                        if key_start.is_none() {
                            self.done = true;
                            return Some(Err(Error::InvalidHeaderSyntax));
                        }
                        key_end = i;
                        value_start = i + 1;
                        state = State::AfterEq;
                    } else if (c == b' ' || c == b',') && self.ischall && key_start.is_some() {
                        let key = &self.input[key_start.unwrap()..i];
                        self.pos = i + 1;
                        return Some(Ok(Token { key, value: None, sep: Some(c as char) }));
                    } else if key_start.is_none() && !matches!(c, b' ' | b'\r' | b'\n' | b'\t') {
                        key_start = Some(i);
                    }
                }
                State::AfterEq => {
                    if c == b',' {
                        let key = &self.input[key_start.unwrap()..key_end];
                        let value = &self.input[value_start..i];
                        self.pos = i + 1;
                        return Some(Ok(Token { key, value: Some(value), sep: None }));
                    } else if c == b'"' {
                        state = State::AfterEqQuoted;
                    }
                }
                State::AfterEqQuoted => {
                    if c == b'"' {
                        state = State::AfterEq;
                    }
                }
            }
            i += 1;
        }

        // End of input.
        self.pos = self.input.len();
        match (state, key_start) {
            (State::BeforeEq, Some(start)) => {
                // A trailing bare token: scheme leader in challenge mode,
                // skippable in pair mode.
                Some(Ok(Token { key: &self.input[start..], value: None, sep: None }))
            }
            (State::BeforeEq, None) => None,
            (_, Some(start)) => Some(Ok(Token {
                key: &self.input[start..key_end],
                value: Some(&self.input[value_start..]),
                sep: None,
            })),
            (_, None) => None,
        }
    }
}
