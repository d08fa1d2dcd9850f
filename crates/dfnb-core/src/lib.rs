//! Dataflow notebook core
//!
//! Tracks which cell produced every value another cell reads and keeps the
//! reference tokens in cell text (`name$ref`) consistent as cells are run,
//! tagged and deleted.
//!
//! # Architecture
//!
//! - [`Coordinator`]: single owner of a notebook's identifiers, graph and
//!   cell state; every lifecycle event goes through it
//! - [`ingest`]: applies [`ExecutionReport`]s from an [`ExecutionEngine`]
//! - [`propagate`]: re-renders displayed text after tag changes, deletions
//!   and new producers
//! - [`NotebookHandle`]: shared, lockable handle for async hosts
//!
//! Each cell keeps a persistent code in which every bound occurrence carries
//! its producer's short id. Displayed text is rendered from it: bare when the
//! producer is the only candidate for the name, otherwise with the
//! producer's tag or short id.
//!
//! # Example
//!
//! ```rust
//! use dfnb_core::{Binding, Coordinator, ExecutionReport, IngestOutcome, NodeRef};
//!
//! let mut notebook = Coordinator::new();
//! let first = notebook.create_cell("a=9");
//! let second = notebook.create_cell("b=a+9");
//!
//! let request = notebook.begin_execution(first).unwrap();
//! let mut report = ExecutionReport::ok(request.token, first);
//! report.exports = vec!["a".into()];
//! notebook.ingest_execution_report(report).unwrap();
//!
//! let request = notebook.begin_execution(second).unwrap();
//! let mut report = ExecutionReport::ok(request.token, second);
//! report.exports = vec!["b".into()];
//! report.upstream = vec![first];
//! report.bindings = vec![Binding { name: "a".into(), offset: 2, producer: NodeRef::Cell(first) }];
//! let outcome = notebook.ingest_execution_report(report).unwrap();
//!
//! assert!(matches!(outcome, IngestOutcome::Applied(_)));
//! assert_eq!(notebook.upstream_of(second), vec![first]);
//! assert_eq!(notebook.cell(second).unwrap().source(), "b=a+9");
//! ```

#![warn(missing_docs)]

pub mod cell;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod handle;
pub mod ingest;
pub mod logging;
pub mod metadata;
pub mod propagate;
pub mod replay;
pub mod report;
pub mod status;

mod render;

// Re-exports
pub use cell::Cell;
pub use config::{DataflowConfig, LoggingConfig};
pub use coordinator::{Coordinator, Mismatch};
pub use engine::ExecutionEngine;
pub use error::{ConfigError, DataflowError, EngineError, StatusError};
pub use handle::NotebookHandle;
pub use metadata::{DfMetadata, InputVars, SavedCell, SavedNotebook};
pub use propagate::{ConflictReason, PropagationReport, RewriteConflict, TextPatch};
pub use replay::{replay, ReplaySummary, Session, SessionEvent};
pub use report::{
    Binding, ExecutionReport, ExecutionRequest, ExecutionStatus, IngestOutcome, IngestSummary,
    Link, NeighborLists, NodeRef, RequestToken,
};
pub use status::{CellStatus, StatusEvent};

pub use dfnb_ident::{CellId, InternalId, Tag, TagError};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for hosts driving a notebook
    pub use crate::{
        CellId, CellStatus, Coordinator, DataflowConfig, DataflowError, ExecutionEngine,
        ExecutionReport, ExecutionRequest, IngestOutcome, NotebookHandle, PropagationReport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
