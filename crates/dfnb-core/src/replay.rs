//! Recorded session replay
//!
//! A session is a JSON list of lifecycle events with pre-recorded execution
//! reports. Replaying it drives a [`Coordinator`] exactly as a live host
//! would, which makes it the fixture format for integration tests and the
//! input of the `dfnb replay` command.

use crate::coordinator::Coordinator;
use crate::error::DataflowError;
use crate::report::{ExecutionReport, IngestOutcome};
use dfnb_ident::CellId;
use serde::{Deserialize, Serialize};

/// One lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SessionEvent {
    /// New cell
    Create {
        /// Identifier to register
        cell: CellId,
        /// Initial text
        #[serde(default)]
        source: String,
    },
    /// User edit
    Edit {
        /// Edited cell
        cell: CellId,
        /// New text
        source: String,
    },
    /// Execution with a recorded report
    ///
    /// The report's token and cell are overwritten with the live request's.
    Execute {
        /// Executed cell
        cell: CellId,
        /// Recorded report
        report: ExecutionReport,
    },
    /// Cell deleted
    Delete {
        /// Deleted cell
        cell: CellId,
    },
    /// Tag changed; empty removes it
    Tag {
        /// Tagged cell
        cell: CellId,
        /// New tag text
        tag: String,
    },
}

/// Ordered list of events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Events in order
    pub events: Vec<SessionEvent>,
}

impl Session {
    /// Parse a session from JSON
    ///
    /// # Errors
    /// Returns the JSON error on malformed input.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Totals from one replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events applied
    pub applied: usize,
    /// Events rejected with a user-facing error, with the error text
    pub rejected: Vec<String>,
    /// References left in explicit form across all propagations
    pub conflicts: usize,
}

/// Replay `session` against `coordinator`
///
/// User-facing rejections (tag collisions, unknown cells) are collected in
/// [`ReplaySummary::rejected`] and replay continues.
///
/// # Errors
/// Returns the first error that is not user-facing.
pub fn replay(coordinator: &mut Coordinator, session: &Session) -> Result<ReplaySummary, DataflowError> {
    let mut summary = ReplaySummary::default();

    for (index, event) in session.events.iter().enumerate() {
        match apply(coordinator, event) {
            Ok(conflicts) => {
                summary.applied += 1;
                summary.conflicts += conflicts;
            }
            Err(err) if err.is_user_facing() => {
                tracing::info!(index, error = %err, "event rejected");
                summary.rejected.push(err.to_string());
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        applied = summary.applied,
        rejected = summary.rejected.len(),
        conflicts = summary.conflicts,
        "session replayed"
    );
    Ok(summary)
}

fn apply(coordinator: &mut Coordinator, event: &SessionEvent) -> Result<usize, DataflowError> {
    match event {
        SessionEvent::Create { cell, source } => {
            coordinator.insert_cell(*cell, source.clone())?;
            Ok(0)
        }
        SessionEvent::Edit { cell, source } => {
            coordinator.edit_cell(*cell, source.clone())?;
            Ok(0)
        }
        SessionEvent::Execute { cell, report } => {
            let request = coordinator.begin_execution(*cell)?;
            let report = ExecutionReport {
                token: request.token,
                cell: *cell,
                ..report.clone()
            };
            match coordinator.ingest_execution_report(report)? {
                IngestOutcome::Applied(summary) => Ok(summary.propagation.conflicts.len()),
                IngestOutcome::Failed { .. } | IngestOutcome::Discarded => Ok(0),
            }
        }
        SessionEvent::Delete { cell } => Ok(coordinator.rewrite_for_deletion(*cell)?.conflicts.len()),
        SessionEvent::Tag { cell, tag } => {
            Ok(coordinator.rewrite_for_tag_change(*cell, tag)?.conflicts.len())
        }
    }
}
