//! Execution engine seam
//!
//! The coordinator never evaluates code. Whatever runs cells (a kernel
//! process, a remote worker, a test double) implements [`ExecutionEngine`]
//! and returns one [`ExecutionReport`] per request.

use crate::error::EngineError;
use crate::report::{ExecutionReport, ExecutionRequest};

/// Runs one cell and reports what it read and defined
///
/// The report must echo the request's token and cell. Binding offsets refer
/// to [`ExecutionRequest::source`].
#[async_trait::async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Execute a single cell
    ///
    /// # Errors
    /// Returns [`EngineError`] when the engine cannot produce a report at
    /// all. User code raising an error is a successful call returning an
    /// error report.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport, EngineError>;
}
