//! Graph nodes and edges

use dfnb_ident::{CellId, InternalId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything the last successful execution reported about one cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    /// Cell identifier
    pub cell: CellId,
    /// Sub-identifiers defined during the cell's own execution
    pub internal_ids: BTreeSet<InternalId>,
    /// Names visible to downstream cells
    pub exports: BTreeSet<String>,
    /// Free names read from other cells
    pub consumes: BTreeSet<String>,
}

impl DependencyNode {
    /// Node with no internal ids, exports or consumptions
    #[must_use]
    pub fn new(cell: CellId) -> Self {
        Self {
            cell,
            ..Self::default()
        }
    }

    /// Builder: exported names
    #[must_use]
    pub fn with_exports<I, S>(mut self, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exports = exports.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: consumed names
    #[must_use]
    pub fn with_consumes<I, S>(mut self, consumes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes = consumes.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: internal sub-identifiers
    #[must_use]
    pub fn with_internal_ids(mut self, ids: impl IntoIterator<Item = InternalId>) -> Self {
        self.internal_ids = ids.into_iter().collect();
        self
    }

    /// Whether this node exports `name`
    #[inline]
    #[must_use]
    pub fn exports(&self, name: &str) -> bool {
        self.exports.contains(name)
    }
}

/// One `(from, to, name)` dependency
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Producing cell
    pub from: CellId,
    /// Consuming cell
    pub to: CellId,
    /// Name the consumer reads
    pub name: String,
}
