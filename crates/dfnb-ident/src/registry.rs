//! Identifier registry with collision-free short forms
//!
//! Provides [`IdentifierRegistry`], which hands out new cell identifiers and
//! the canonical truncated form used inside reference tokens.

use crate::cell_id::CellId;
use std::collections::{HashMap, HashSet};

/// Default minimum length of a truncated identifier
pub const DEFAULT_SHORT_LEN: usize = 8;

/// Hex length of a full identifier
const FULL_LEN: usize = 32;

/// Identifier errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    /// Text is not a cell identifier
    #[error("invalid cell identifier: '{0}'")]
    InvalidIdentifier(String),

    /// No unused short form exists for this identifier
    #[error("no free short form for {0}")]
    ShortFormExhausted(CellId),
}

/// Registry of every identifier ever issued in one notebook
///
/// Short forms are the shortest prefix of the identifier's hex rendering,
/// at least `min_len` long, that no other identifier (live or retired) uses.
/// Once assigned a short form never changes, so existing reference tokens
/// stay valid. Retired identifiers keep their short form: a token naming a
/// deleted cell must keep resolving to that cell, never to a newcomer.
#[derive(Debug, Clone)]
pub struct IdentifierRegistry {
    min_len: usize,
    shorts: HashMap<CellId, String>,
    by_short: HashMap<String, CellId>,
    retired: HashSet<CellId>,
}

impl IdentifierRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(min_len: usize) -> Self {
        Self {
            min_len: min_len.clamp(1, FULL_LEN),
            shorts: HashMap::new(),
            by_short: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    /// Minimum short form length
    #[inline]
    #[must_use]
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Generate and register a previously unused identifier
    pub fn new_identifier(&mut self) -> CellId {
        self.new_identifier_avoiding(|_| false)
    }

    /// Generate an identifier whose short form avoids `taken`
    ///
    /// `taken` lets the caller reserve strings (typically live tags) that a
    /// short form must never spell.
    pub fn new_identifier_avoiding(&mut self, taken: impl Fn(&str) -> bool) -> CellId {
        loop {
            let id = CellId::new();
            if self.shorts.contains_key(&id) {
                continue;
            }
            if self.register_avoiding(id, &taken).is_ok() {
                return id;
            }
        }
    }

    /// Register an existing identifier (e.g. loaded from a saved notebook)
    ///
    /// Idempotent: a known identifier keeps its short form.
    ///
    /// # Errors
    /// Returns [`IdentError::ShortFormExhausted`] if every prefix is taken.
    pub fn register(&mut self, id: CellId) -> Result<&str, IdentError> {
        self.register_avoiding(id, |_| false)
    }

    /// Register an identifier, skipping short forms for which `taken` is true
    ///
    /// # Errors
    /// Returns [`IdentError::ShortFormExhausted`] if every prefix is taken.
    pub fn register_avoiding(
        &mut self,
        id: CellId,
        taken: impl Fn(&str) -> bool,
    ) -> Result<&str, IdentError> {
        if !self.shorts.contains_key(&id) {
            let hex = id.hex();
            let short = (self.min_len..=FULL_LEN)
                .map(|len| &hex[..len])
                .find(|candidate| !self.by_short.contains_key(*candidate) && !taken(*candidate))
                .ok_or(IdentError::ShortFormExhausted(id))?
                .to_string();

            self.by_short.insert(short.clone(), id);
            self.shorts.insert(id, short);
        }

        Ok(self.shorts[&id].as_str())
    }

    /// Canonical short form of a registered identifier
    #[inline]
    #[must_use]
    pub fn truncate(&self, id: CellId) -> Option<&str> {
        self.shorts.get(&id).map(String::as_str)
    }

    /// Resolve a short form (or a full hex/hyphenated identifier) to its cell
    ///
    /// A hex prefix of at least `min_len` chars that matches exactly one
    /// registered identifier also resolves, so tokens written under a
    /// different collision history still find their cell.
    #[must_use]
    pub fn resolve(&self, text: &str) -> Option<CellId> {
        if let Some(id) = self.by_short.get(text) {
            return Some(*id);
        }
        if let Some(id) = text
            .parse::<CellId>()
            .ok()
            .filter(|id| self.shorts.contains_key(id))
        {
            return Some(id);
        }
        if text.len() < self.min_len || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let lower = text.to_ascii_lowercase();
        let mut matches = self.shorts.keys().filter(|id| id.hex().starts_with(&lower));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(*id),
            _ => None,
        }
    }

    /// Whether `text` is the short form of some registered identifier
    #[inline]
    #[must_use]
    pub fn is_short_form(&self, text: &str) -> bool {
        self.by_short.contains_key(text)
    }

    /// Mark an identifier as belonging to a deleted cell
    ///
    /// The short form stays reserved.
    pub fn retire(&mut self, id: CellId) {
        if self.shorts.contains_key(&id) {
            self.retired.insert(id);
        }
    }

    /// Identifier is registered and not retired
    #[inline]
    #[must_use]
    pub fn is_live(&self, id: CellId) -> bool {
        self.shorts.contains_key(&id) && !self.retired.contains(&id)
    }

    /// Identifier belonged to a cell that has since been deleted
    #[inline]
    #[must_use]
    pub fn is_retired(&self, id: CellId) -> bool {
        self.retired.contains(&id)
    }

    /// Number of registered identifiers (live and retired)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.shorts.len()
    }

    /// Registry holds no identifiers
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shorts.is_empty()
    }
}

impl Default for IdentifierRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_LEN)
    }
}
