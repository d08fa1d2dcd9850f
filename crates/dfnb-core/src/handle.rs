//! Shared notebook handle
//!
//! [`NotebookHandle`] wraps a [`Coordinator`] behind a lock so host callbacks
//! on different tasks can drive one notebook. The lock is never held across
//! an engine call: a newer request for the same cell can start while an
//! older one is still running, and the older report is then discarded.

use crate::config::DataflowConfig;
use crate::coordinator::Coordinator;
use crate::engine::ExecutionEngine;
use crate::error::DataflowError;
use crate::propagate::PropagationReport;
use crate::report::IngestOutcome;
use dfnb_ident::CellId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Cloneable handle to one notebook's coordinator
#[derive(Debug, Clone, Default)]
pub struct NotebookHandle {
    inner: Arc<RwLock<Coordinator>>,
}

impl NotebookHandle {
    /// Create a handle around an empty notebook
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle with custom configuration
    #[must_use]
    pub fn with_config(config: DataflowConfig) -> Self {
        Self::from_coordinator(Coordinator::with_config(config))
    }

    /// Wrap an existing coordinator
    #[must_use]
    pub fn from_coordinator(coordinator: Coordinator) -> Self {
        Self {
            inner: Arc::new(RwLock::new(coordinator)),
        }
    }

    /// Run `f` with shared access
    pub fn read<R>(&self, f: impl FnOnce(&Coordinator) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` with exclusive access
    pub fn write<R>(&self, f: impl FnOnce(&mut Coordinator) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Add a cell at the end of the notebook
    pub fn create_cell(&self, source: impl Into<String>) -> CellId {
        self.write(|c| c.create_cell(source))
    }

    /// Replace a cell's displayed text
    ///
    /// # Errors
    /// See [`Coordinator::edit_cell`].
    pub fn edit_cell(&self, cell: CellId, source: impl Into<String>) -> Result<(), DataflowError> {
        self.write(|c| c.edit_cell(cell, source))
    }

    /// Delete a cell
    ///
    /// # Errors
    /// See [`Coordinator::rewrite_for_deletion`].
    pub fn delete_cell(&self, cell: CellId) -> Result<PropagationReport, DataflowError> {
        self.write(|c| c.rewrite_for_deletion(cell))
    }

    /// Change a cell's tag
    ///
    /// # Errors
    /// See [`Coordinator::rewrite_for_tag_change`].
    pub fn set_tag(&self, cell: CellId, tag: &str) -> Result<PropagationReport, DataflowError> {
        self.write(|c| c.rewrite_for_tag_change(cell, tag))
    }

    /// Execute a cell on `engine` and ingest the result
    ///
    /// # Errors
    /// Returns [`DataflowError::UnknownCell`] if the cell does not exist when
    /// the request is built, or any error from
    /// [`Coordinator::ingest_execution_report`]. Engine failures are recorded
    /// on the cell and returned as [`IngestOutcome::Failed`].
    pub async fn execute<E>(&self, cell: CellId, engine: &E) -> Result<IngestOutcome, DataflowError>
    where
        E: ExecutionEngine + ?Sized,
    {
        let request = self.write(|c| {
            let request = c.begin_execution(cell)?;
            c.mark_running(cell, request.token)?;
            Ok::<_, DataflowError>(request)
        })?;
        let token = request.token;

        match engine.execute(request).await {
            Ok(report) => self.write(|c| c.ingest_execution_report(report)),
            Err(err) => {
                tracing::warn!(%cell, error = %err, "engine failed");
                self.write(|c| c.fail_execution(cell, token, err.to_string()))
            }
        }
    }
}
