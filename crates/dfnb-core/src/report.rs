//! Execution requests and reports exchanged with the execution engine

use dfnb_ident::{CellId, InternalId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Correlates a report with the request that produced it
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestToken(pub u64);

impl Display for RequestToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the engine needs to run one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Must be echoed back in the report
    pub token: RequestToken,
    /// Cell being executed
    pub cell: CellId,
    /// Displayed source at request time; report offsets refer to this text
    pub source: String,
    /// Reference text (short id or tag) → cell, for explicit `$ref` tokens
    pub resolvable: BTreeMap<String, CellId>,
    /// Exported names of every live, successfully executed cell
    pub exports: BTreeMap<CellId, Vec<String>>,
}

/// Outcome of the cell's own code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Ran to completion
    Ok,
    /// Raised an error
    Error,
}

/// Identifier appearing in a report: a cell or one of its internal nodes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    /// A cell
    Cell(CellId),
    /// An internal sub-identifier
    Internal(InternalId),
}

impl From<CellId> for NodeRef {
    fn from(value: CellId) -> Self {
        Self::Cell(value)
    }
}

/// Producer → consumer link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Producing cell or internal node
    pub from: NodeRef,
    /// Consuming cell
    pub to: CellId,
}

/// One consumed occurrence and the value it read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Variable name
    pub name: String,
    /// Byte offset of the name in [`ExecutionRequest::source`]
    pub offset: usize,
    /// Producer of the value read
    pub producer: NodeRef,
}

/// Result of one execution, produced by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// Token from the request
    #[serde(default)]
    pub token: RequestToken,
    /// Executed cell
    pub cell: CellId,
    /// Outcome
    pub status: ExecutionStatus,
    /// Every cell the engine knows about
    #[serde(default)]
    pub cell_ids: Vec<CellId>,
    /// Internal ids per entry of `cell_ids`
    #[serde(default)]
    pub internal_ids: Vec<Vec<InternalId>>,
    /// Links into the executed cell
    #[serde(default)]
    pub links: Vec<Link>,
    /// Immediate upstream of the executed cell, in engine order
    #[serde(default)]
    pub upstream: Vec<CellId>,
    /// Immediate downstream of the executed cell
    #[serde(default)]
    pub downstream: Vec<CellId>,
    /// Internal ids defined by the executed cell
    #[serde(default)]
    pub internal_own: Vec<InternalId>,
    /// Other cells whose downstream lists changed, with their new lists
    #[serde(default)]
    pub refresh_downstream_for: BTreeMap<CellId, Vec<CellId>>,
    /// Names the executed cell exports
    #[serde(default)]
    pub exports: Vec<String>,
    /// Every consumed occurrence
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Error text when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReport {
    /// Successful report with no dependencies
    #[must_use]
    pub fn ok(token: RequestToken, cell: CellId) -> Self {
        Self {
            token,
            cell,
            status: ExecutionStatus::Ok,
            cell_ids: vec![cell],
            internal_ids: vec![Vec::new()],
            links: Vec::new(),
            upstream: Vec::new(),
            downstream: Vec::new(),
            internal_own: Vec::new(),
            refresh_downstream_for: BTreeMap::new(),
            exports: Vec::new(),
            bindings: Vec::new(),
            error: None,
        }
    }

    /// Failed report
    #[must_use]
    pub fn error(token: RequestToken, cell: CellId, message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            error: Some(message.into()),
            ..Self::ok(token, cell)
        }
    }

    /// Owning cell of a report identifier, using only the report's own tables
    #[must_use]
    pub fn owner_in_report(&self, node: &NodeRef) -> Option<CellId> {
        match node {
            NodeRef::Cell(cell) => Some(*cell),
            NodeRef::Internal(id) => {
                if self.internal_own.contains(id) {
                    return Some(self.cell);
                }
                self.cell_ids
                    .iter()
                    .zip(&self.internal_ids)
                    .find_map(|(cell, ids)| ids.contains(id).then_some(*cell))
            }
        }
    }
}

/// What happened to a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Report applied
    Applied(IngestSummary),
    /// Error report; only the cell's status changed
    Failed {
        /// Executed cell
        cell: CellId,
        /// Engine's error text
        message: Option<String>,
    },
    /// Superseded by a newer request; ignored
    Discarded,
}

/// Upstream and downstream lists shown for a cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborLists {
    /// Cell the lists belong to
    pub cell: CellId,
    /// Immediate producers
    pub upstream: Vec<CellId>,
    /// Immediate consumers
    pub downstream: Vec<CellId>,
}

/// Effects of an applied report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    /// Executed cell
    pub cell: CellId,
    /// Display lists for the cell and every upstream cell touched
    pub displays: Vec<NeighborLists>,
    /// Source rewrites across the notebook
    pub propagation: crate::propagate::PropagationReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_uses_camel_case_fields() {
        let cell = CellId::new();
        let json = serde_json::to_value(ExecutionReport::ok(RequestToken(3), cell)).unwrap();
        assert!(json.get("cellIds").is_some());
        assert!(json.get("refreshDownstreamFor").is_some());
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn node_refs_parse_cells_before_internal_ids() {
        let cell = CellId::new();
        let parsed: NodeRef = serde_json::from_str(&format!("\"{cell}\"")).unwrap();
        assert_eq!(parsed, NodeRef::Cell(cell));

        let parsed: NodeRef = serde_json::from_str("\"a1b2c3d4_x\"").unwrap();
        assert_eq!(parsed, NodeRef::Internal(InternalId::new("a1b2c3d4_x")));
    }

    #[test]
    fn internal_ids_resolve_through_report_tables() {
        let (cell, other) = (CellId::new(), CellId::new());
        let mut report = ExecutionReport::ok(RequestToken(1), cell);
        report.cell_ids = vec![cell, other];
        report.internal_ids = vec![vec![], vec![InternalId::new("o_1")]];
        report.internal_own = vec![InternalId::new("c_1")];

        assert_eq!(report.owner_in_report(&NodeRef::Internal("o_1".into())), Some(other));
        assert_eq!(report.owner_in_report(&NodeRef::Internal("c_1".into())), Some(cell));
        assert_eq!(report.owner_in_report(&NodeRef::Internal("zz".into())), None);
    }
}
