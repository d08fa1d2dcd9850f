//! Tolerant source scanner
//!
//! Finds identifier tokens in cell source without understanding the full
//! host grammar. String literals (including triple-quoted and prefixed
//! forms), `#` comments and numeric literals are skipped. Unterminated
//! strings run to the end of input instead of failing: a half-typed cell
//! must still be scannable.

use crate::SEPARATOR;
use std::ops::Range;

/// String literal prefixes recognised before a quote (case-insensitive)
const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

/// An identifier token, optionally followed by `$ref`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NameToken {
    /// Byte span of the identifier
    pub(crate) name: Range<usize>,
    /// Byte span of the reference text after the separator
    pub(crate) reference: Option<Range<usize>>,
}

/// Character that may continue an identifier
#[inline]
pub(crate) fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

#[inline]
fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

/// Character allowed in reference text (short ids start with digits)
#[inline]
pub(crate) fn is_ref_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.pos < self.src.len() && pred(self.src[self.pos]) {
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) {
        self.skip_while(|b| b != b'\n');
    }

    /// `pos` is at the opening quote
    fn skip_string(&mut self) {
        let quote = self.src[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b == b'\\' {
                self.pos += 2;
                continue;
            }
            if b == quote {
                if !triple {
                    self.pos += 1;
                    return;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    return;
                }
            } else if b == b'\n' && !triple {
                // single-quoted strings cannot span lines
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
        self.pos = self.src.len();
    }

    /// Identifier run starting at `pos`; returns its span
    fn take_ident(&mut self) -> Range<usize> {
        let start = self.pos;
        self.pos += 1;
        self.skip_while(is_ident_continue);
        start..self.pos
    }

    /// Optional `$ref` directly after an identifier
    fn take_reference(&mut self) -> Option<Range<usize>> {
        if self.peek(0) != Some(SEPARATOR as u8) {
            return None;
        }
        let start = self.pos + 1;
        let mut end = start;
        while end < self.src.len() && is_ref_char(self.src[end]) {
            end += 1;
        }
        if end == start {
            return None;
        }
        self.pos = end;
        Some(start..end)
    }

    fn next_name(&mut self) -> Option<NameToken> {
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            match b {
                b'#' => self.skip_comment(),
                b'\'' | b'"' => self.skip_string(),
                b'0'..=b'9' => {
                    self.pos += 1;
                    self.skip_while(|c| is_ident_continue(c) || c == b'.');
                }
                b if is_ident_start(b) => {
                    let name = self.take_ident();
                    if self.at_string_prefix(&name) {
                        self.skip_string();
                        continue;
                    }
                    let reference = self.take_reference();
                    return Some(NameToken { name, reference });
                }
                _ => self.pos += 1,
            }
        }
        None
    }

    fn at_string_prefix(&self, name: &Range<usize>) -> bool {
        if !matches!(self.peek(0), Some(b'\'' | b'"')) {
            return false;
        }
        let text = &self.src[name.clone()];
        STRING_PREFIXES
            .iter()
            .any(|p| p.as_bytes().eq_ignore_ascii_case(text))
    }
}

/// Every identifier token in `source`, in order
pub(crate) fn scan(source: &str) -> Vec<NameToken> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_name() {
        tokens.push(token);
    }
    tracing::trace!(count = tokens.len(), "scanned identifier tokens");
    tokens
}
