//! Cell and internal node identifiers

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

use crate::registry::IdentError;

/// Stable identifier of a notebook cell
///
/// Assigned once at creation, persisted with the cell and never reused.
/// Independent of the cell's display position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(pub Uuid);

impl CellId {
    /// Fresh random identifier
    ///
    /// Prefer [`IdentifierRegistry::new_identifier`](crate::IdentifierRegistry::new_identifier),
    /// which also reserves a short form.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Lowercase hex rendering without hyphens (32 chars)
    #[inline]
    #[must_use]
    pub fn hex(&self) -> String {
        self.0.simple().to_string()
    }

    /// First `len` hex chars (clamped to 32)
    #[must_use]
    pub fn prefix(&self, len: usize) -> String {
        let hex = self.hex();
        hex[..len.min(hex.len())].to_string()
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for CellId {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IdentError::InvalidIdentifier(s.to_string()))
    }
}

impl From<Uuid> for CellId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Sub-identifier produced during a cell's own execution
///
/// The execution engine names intermediate bindings inside a cell so that
/// other cells can target them directly. The core treats them as opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(pub String);

impl InternalId {
    /// Wrap an engine-issued identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw string form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InternalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InternalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
