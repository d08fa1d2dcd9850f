//! Per-cell notebook state

use crate::status::CellStatus;
use dfnb_ident::{CellId, Tag};
use std::collections::BTreeSet;

/// One notebook cell as the core sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub(crate) id: CellId,
    /// Text currently shown to the user
    pub(crate) source: String,
    /// Display text the core last rendered; `None` until first execution
    pub(crate) rendered: Option<String>,
    /// Canonical annotated source from the last successful execution
    pub(crate) persistent_code: Option<String>,
    pub(crate) tag: Option<Tag>,
    pub(crate) status: CellStatus,
    pub(crate) upstream: Vec<CellId>,
    pub(crate) downstream: Vec<CellId>,
    /// Upstream cells whose pending edits marked this cell stale
    pub(crate) stale_from: BTreeSet<CellId>,
}

impl Cell {
    pub(crate) fn new(id: CellId, source: impl Into<String>) -> Self {
        let source = source.into();
        let status = if source.is_empty() {
            CellStatus::Empty
        } else {
            CellStatus::Editing
        };
        Self {
            id,
            source,
            rendered: None,
            persistent_code: None,
            tag: None,
            status,
            upstream: Vec::new(),
            downstream: Vec::new(),
            stale_from: BTreeSet::new(),
        }
    }

    /// Identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Displayed source
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Canonical annotated source, once the cell has run successfully
    #[inline]
    #[must_use]
    pub fn persistent_code(&self) -> Option<&str> {
        self.persistent_code.as_deref()
    }

    /// Tag, if any
    #[inline]
    #[must_use]
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Display status
    #[inline]
    #[must_use]
    pub fn status(&self) -> CellStatus {
        self.status
    }

    /// Recorded immediate upstream list
    #[inline]
    #[must_use]
    pub fn upstream(&self) -> &[CellId] {
        &self.upstream
    }

    /// Recorded immediate downstream list
    #[inline]
    #[must_use]
    pub fn downstream(&self) -> &[CellId] {
        &self.downstream
    }

    /// Text differs from what the core last rendered
    ///
    /// Such a cell is never text-patched; it has to execute again first.
    #[must_use]
    pub fn is_user_edited(&self) -> bool {
        match &self.rendered {
            Some(rendered) => *rendered != self.source,
            None => false,
        }
    }
}
