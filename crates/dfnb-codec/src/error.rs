//! Codec errors

/// Errors from [`rewrite`](crate::rewrite)
///
/// Any error aborts the whole rewrite; the source is never partially patched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// No identifier occurrence starts at this byte offset
    #[error("no identifier occurrence at byte offset {0}")]
    UnknownOccurrence(usize),

    /// The occurrence at this offset spells a different name
    #[error("occurrence at byte offset {position} is '{found}', expected '{expected}'")]
    NameMismatch {
        /// Byte offset of the occurrence
        position: usize,
        /// Name the caller asked to rewrite
        expected: String,
        /// Name actually found in the source
        found: String,
    },

    /// Two substitutions target one occurrence
    #[error("more than one substitution for byte offset {0}")]
    DuplicateSubstitution(usize),

    /// Reference text cannot follow a separator
    #[error("invalid reference text '{0}'")]
    InvalidReference(String),
}
