//! Graph store errors

use dfnb_ident::CellId;

/// Dependency graph errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Cell has never executed (or was deleted)
    ///
    /// Recoverable: query callers treat it as an empty neighbour list.
    #[error("cell {0} is not in the dependency graph")]
    NotFound(CellId),

    /// A cell cannot depend on itself
    #[error("cell {0} cannot depend on itself")]
    SelfLoop(CellId),
}

impl GraphError {
    /// Cell the error is about
    #[inline]
    #[must_use]
    pub fn cell(&self) -> CellId {
        match self {
            Self::NotFound(cell) | Self::SelfLoop(cell) => *cell,
        }
    }
}
