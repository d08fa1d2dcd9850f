//! Offset-keyed reference rewriting
//!
//! A substitution names an occurrence by the byte offset of its name, as
//! reported by [`parse_references`]. Only the suffix after that name (the
//! absent or present `$ref`) is replaced; every other byte is copied through.

use crate::error::CodecError;
use crate::reference::{parse_references, Occurrence};
use crate::scanner::is_ref_char;
use crate::SEPARATOR;
use std::collections::HashMap;

/// New reference for one occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Byte offset of the occurrence's name
    pub position: usize,
    /// Name expected at `position`
    pub name: String,
    /// Reference to attach; `None` leaves the name bare
    pub reference: Option<String>,
}

impl Substitution {
    /// Build a substitution
    #[must_use]
    pub fn new(position: usize, name: impl Into<String>, reference: Option<&str>) -> Self {
        Self {
            position,
            name: name.into(),
            reference: reference.map(str::to_string),
        }
    }

    /// Substitution that keeps an occurrence exactly as parsed
    #[must_use]
    pub fn unchanged(occurrence: &Occurrence) -> Self {
        Self::new(
            occurrence.position(),
            occurrence.name.clone(),
            occurrence.reference_text(),
        )
    }
}

/// Apply `substitutions` to `source`
///
/// # Errors
/// - [`CodecError::UnknownOccurrence`] if no name starts at a position
/// - [`CodecError::NameMismatch`] if the name there differs
/// - [`CodecError::DuplicateSubstitution`] if a position repeats
/// - [`CodecError::InvalidReference`] for reference text that would not re-parse
pub fn rewrite(source: &str, substitutions: &[Substitution]) -> Result<String, CodecError> {
    let occurrences: HashMap<usize, Occurrence> = parse_references(source)
        .into_iter()
        .map(|o| (o.position(), o))
        .collect();

    let mut ordered: Vec<&Substitution> = substitutions.iter().collect();
    ordered.sort_by_key(|s| s.position);
    if let Some(pair) = ordered.windows(2).find(|w| w[0].position == w[1].position) {
        return Err(CodecError::DuplicateSubstitution(pair[0].position));
    }

    let mut out = String::with_capacity(source.len() + substitutions.len() * 10);
    let mut cursor = 0;
    for sub in ordered {
        let occurrence = occurrences
            .get(&sub.position)
            .ok_or(CodecError::UnknownOccurrence(sub.position))?;
        if occurrence.name != sub.name {
            return Err(CodecError::NameMismatch {
                position: sub.position,
                expected: sub.name.clone(),
                found: occurrence.name.clone(),
            });
        }

        out.push_str(&source[cursor..occurrence.span.end]);
        match sub.reference.as_deref() {
            Some(reference) if !reference.is_empty() => {
                if !reference.bytes().all(is_ref_char) {
                    return Err(CodecError::InvalidReference(reference.to_string()));
                }
                out.push(SEPARATOR);
                out.push_str(reference);
            }
            _ => {}
        }
        cursor = occurrence.token_end();
    }
    out.push_str(&source[cursor..]);

    tracing::debug!(count = substitutions.len(), "rewrote reference tokens");
    Ok(out)
}
