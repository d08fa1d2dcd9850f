//! Human-readable cell tags

use crate::cell_id::CellId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Tag validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// Tag text cannot appear after a reference separator
    #[error("invalid tag '{0}': tags must be identifiers")]
    Invalid(String),

    /// Another live cell already holds this tag
    #[error("tag '{tag}' is already used by cell {holder}")]
    Collision {
        /// Requested tag
        tag: String,
        /// Cell that currently holds it
        holder: CellId,
    },

    /// Tag spells an existing identifier short form
    #[error("tag '{0}' would shadow a cell identifier")]
    ShadowsIdentifier(String),
}

/// User-assigned alias for a cell identifier
///
/// Always a non-empty identifier (`[A-Za-z_][A-Za-z0-9_]*`); the absence of a
/// tag is `Option<Tag>::None`, which the persisted form spells as `""`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Parse user input; blank input means "no tag"
    ///
    /// # Errors
    /// Returns [`TagError::Invalid`] for text that is not an identifier.
    pub fn parse(text: &str) -> Result<Option<Self>, TagError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if !is_identifier(trimmed) {
            return Err(TagError::Invalid(trimmed.to_string()));
        }
        Ok(Some(Self(trimmed.to_string())))
    }

    /// Tag text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Tag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)?.ok_or(TagError::Invalid(value))
    }
}

impl From<Tag> for String {
    fn from(value: Tag) -> Self {
        value.0
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
#[must_use]
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
