//! Cell status state machine
//!
//! Presentation state for each cell. The UI renders it; the core drives it
//! from lifecycle events so the UI never has to reconstruct it.

use crate::error::StatusError;
use serde::{Deserialize, Serialize};

/// Display status of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Never executed, unedited
    #[default]
    Empty,
    /// Never executed, text entered
    Editing,
    /// Execution requested
    Queued,
    /// Engine is running the cell
    Running,
    /// Last run succeeded; text unchanged since
    Succeeded,
    /// Last run succeeded; text or an upstream cell changed since
    SucceededEdited,
    /// Last run failed
    Failed,
    /// Last run failed; text changed since
    FailedEdited,
    /// Succeeded in a previous session
    SavedSucceeded,
    /// Succeeded in a previous session; edited since loading
    SavedSucceededEdited,
    /// Failed in a previous session
    SavedFailed,
    /// Failed in a previous session; edited since loading
    SavedFailedEdited,
}

/// Lifecycle events that move a cell between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// Text changed away from what last executed
    Edit,
    /// Text changed back to what last executed
    Revert,
    /// Execution requested
    Enqueue,
    /// Engine picked the request up
    ExecuteStart,
    /// Report with status ok ingested
    ExecuteSuccess,
    /// Report with status error ingested (or engine failure)
    ExecuteError,
    /// Notebook persisted
    Save,
    /// Notebook loaded from a saved file
    Load,
}

impl CellStatus {
    /// States reachable from `self` through one event
    #[must_use]
    pub fn allowed_transitions(self) -> Vec<(StatusEvent, CellStatus)> {
        use CellStatus::*;
        use StatusEvent::*;

        let mut next = match self {
            Empty => vec![(Edit, Editing), (Save, Empty), (Load, Empty)],
            Editing => vec![(Edit, Editing), (Revert, Empty), (Save, Editing), (Load, Editing)],
            Queued => vec![
                (Edit, Queued),
                (Revert, Queued),
                (ExecuteStart, Running),
                (ExecuteSuccess, Succeeded),
                (ExecuteError, Failed),
            ],
            Running => vec![
                (Edit, Running),
                (Revert, Running),
                (ExecuteStart, Running),
                (ExecuteSuccess, Succeeded),
                (ExecuteError, Failed),
            ],
            Succeeded => vec![(Edit, SucceededEdited), (Save, SavedSucceeded), (Load, SavedSucceeded)],
            SucceededEdited => vec![
                (Edit, SucceededEdited),
                (Revert, Succeeded),
                (Save, SavedSucceededEdited),
                (Load, SavedSucceededEdited),
            ],
            Failed => vec![(Edit, FailedEdited), (Save, SavedFailed), (Load, SavedFailed)],
            FailedEdited => vec![
                (Edit, FailedEdited),
                (Revert, Failed),
                (Save, SavedFailedEdited),
                (Load, SavedFailedEdited),
            ],
            SavedSucceeded => vec![
                (Edit, SavedSucceededEdited),
                (Save, SavedSucceeded),
                (Load, SavedSucceeded),
            ],
            SavedSucceededEdited => vec![
                (Edit, SavedSucceededEdited),
                (Revert, SavedSucceeded),
                (Save, SavedSucceededEdited),
                (Load, SavedSucceededEdited),
            ],
            SavedFailed => vec![(Edit, SavedFailedEdited), (Save, SavedFailed), (Load, SavedFailed)],
            SavedFailedEdited => vec![
                (Edit, SavedFailedEdited),
                (Revert, SavedFailed),
                (Save, SavedFailedEdited),
                (Load, SavedFailedEdited),
            ],
        };

        // A newer request supersedes whatever is in flight
        next.push((Enqueue, Queued));
        if !self.is_busy() {
            next.push((ExecuteStart, Running));
        }
        next
    }

    /// Apply an event
    ///
    /// # Errors
    /// Returns [`StatusError`] if the event is not allowed in this state.
    pub fn apply(self, event: StatusEvent) -> Result<CellStatus, StatusError> {
        self.allowed_transitions()
            .into_iter()
            .find_map(|(e, to)| (e == event).then_some(to))
            .ok_or(StatusError { from: self, event })
    }

    /// Queued or running
    #[inline]
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Last known run succeeded (this session or a saved one)
    #[inline]
    #[must_use]
    pub fn has_succeeded(self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::SucceededEdited
                | Self::SavedSucceeded
                | Self::SavedSucceededEdited
        )
    }

    /// Text or an upstream cell changed since the last run
    #[inline]
    #[must_use]
    pub fn is_edited(self) -> bool {
        matches!(
            self,
            Self::SucceededEdited
                | Self::FailedEdited
                | Self::SavedSucceededEdited
                | Self::SavedFailedEdited
        )
    }
}
