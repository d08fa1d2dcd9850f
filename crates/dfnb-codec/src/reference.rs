//! Reference token parsing and rendering

use crate::scanner::scan;
use crate::SEPARATOR;
use dfnb_ident::{CellId, IdentifierRegistry};
use std::ops::Range;

/// Explicit `$ref` attached to an occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitRef {
    /// Reference text (short identifier or tag), without the separator
    pub text: String,
    /// Byte span of `text` in the source
    pub span: Range<usize>,
}

/// One identifier usage found in cell source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Bare variable name
    pub name: String,
    /// Byte span of the name
    pub span: Range<usize>,
    /// Explicit reference token, if present
    pub reference: Option<ExplicitRef>,
}

impl Occurrence {
    /// Byte offset of the name; the key [`rewrite`](crate::rewrite) matches on
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.span.start
    }

    /// Reference text, if any
    #[inline]
    #[must_use]
    pub fn reference_text(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.text.as_str())
    }

    /// End of the whole token (`name` or `name$ref`)
    #[inline]
    #[must_use]
    pub fn token_end(&self) -> usize {
        self.reference
            .as_ref()
            .map_or(self.span.end, |r| r.span.end)
    }
}

/// Scan `source` for every identifier usage
///
/// Names inside string literals and comments are not reported. Keywords and
/// builtins are reported like any other name: the execution report decides
/// which occurrences are real references.
#[must_use]
pub fn parse_references(source: &str) -> Vec<Occurrence> {
    scan(source)
        .into_iter()
        .map(|token| Occurrence {
            name: source[token.name.clone()].to_string(),
            reference: token.reference.map(|span| ExplicitRef {
                text: source[span.clone()].to_string(),
                span,
            }),
            span: token.name,
        })
        .collect()
}

/// `name` when `reference` is absent or empty, else `name$reference`
#[must_use]
pub fn render_reference(name: &str, reference: Option<&str>) -> String {
    match reference {
        Some(r) if !r.is_empty() => format!("{name}{SEPARATOR}{r}"),
        _ => name.to_string(),
    }
}

/// Remove every reference token, leaving bare names
///
/// Produces what an execution engine without reference support would see.
#[must_use]
pub fn strip_references(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for occurrence in parse_references(source) {
        if occurrence.reference.is_some() {
            out.push_str(&source[cursor..occurrence.span.end]);
            cursor = occurrence.token_end();
        }
    }
    out.push_str(&source[cursor..]);
    out
}

/// Resolve reference text to the cell it targets
///
/// Tags are consulted first, then short (or full) identifiers. Tags and short
/// forms never coincide, so the order only matters for malformed state.
#[must_use]
pub fn resolve_reference(
    text: &str,
    registry: &IdentifierRegistry,
    tag_holder: impl Fn(&str) -> Option<CellId>,
) -> Option<CellId> {
    tag_holder(text).or_else(|| registry.resolve(text))
}
