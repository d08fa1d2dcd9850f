//! Error types for the notebook core
//!
//! Provides error handling for:
//! - Identifier, tag, graph and codec failures from the lower crates
//! - Illegal cell status transitions
//! - Execution engine failures
//! - Configuration and logging setup

use crate::report::RequestToken;
use crate::status::{CellStatus, StatusEvent};
use dfnb_codec::CodecError;
use dfnb_graph::GraphError;
use dfnb_ident::{CellId, IdentError, TagError};

/// Main notebook core error type
#[derive(Debug, thiserror::Error)]
pub enum DataflowError {
    /// Identifier registry failure
    #[error("identifier error: {0}")]
    Ident(#[from] IdentError),

    /// Tag rejected at the source
    #[error("tag rejected: {0}")]
    Tag(#[from] TagError),

    /// Dependency graph lookup or mutation failed
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Reference rewrite failed
    #[error("rewrite failed: {0}")]
    Codec(#[from] CodecError),

    /// Illegal status transition
    #[error("status error: {0}")]
    Status(#[from] StatusError),

    /// Execution engine failed to produce a report
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cell is not part of the notebook
    #[error("unknown cell {0}")]
    UnknownCell(CellId),

    /// Report for a request that has since been superseded
    #[error("stale report for cell {cell} (token {token})")]
    StaleReport {
        /// Cell the report is for
        cell: CellId,
        /// Token the report carried
        token: RequestToken,
    },
}

impl DataflowError {
    /// Whether the notebook stays consistent after this error
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Ident(IdentError::ShortFormExhausted(_)) | Self::Config(_)
        )
    }

    /// Whether the error should be shown to the user as a validation failure
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Tag(_) | Self::Engine(_) | Self::UnknownCell(_))
    }
}

/// Illegal cell status transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition: {event:?} in state {from:?}")]
pub struct StatusError {
    /// State the cell was in
    pub from: CellStatus,
    /// Event that was applied
    pub event: StatusEvent,
}

/// Execution engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Engine could not be reached or gave up
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Engine returned something that is not a report
    #[error("malformed report: {0}")]
    MalformedReport(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Log filter directive is invalid
    #[error("invalid log filter '{0}'")]
    LogFilter(String),

    /// A global subscriber is already installed
    #[error("logging already initialized")]
    LoggingInstalled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_errors_are_user_facing() {
        let err = DataflowError::from(TagError::Invalid("9x".into()));
        assert!(err.is_user_facing());
        assert!(err.is_recoverable());
    }

    #[test]
    fn exhausted_short_forms_are_not_recoverable() {
        let err = DataflowError::from(IdentError::ShortFormExhausted(CellId::new()));
        assert!(!err.is_recoverable());
        assert!(!err.is_user_facing());
    }

    #[test]
    fn graph_not_found_is_recoverable() {
        let err = DataflowError::from(GraphError::NotFound(CellId::new()));
        assert!(err.is_recoverable());
        assert!(err.to_string().starts_with("graph error"));
    }
}
