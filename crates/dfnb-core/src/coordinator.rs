//! Cell lifecycle coordinator
//!
//! Binds the identifier registry, dependency graph, codec and propagator to
//! notebook lifecycle events. The host calls into it from its own extension
//! points (cell created, edited, executed, deleted, tagged, loaded); the
//! coordinator never reaches into host objects.

use crate::cell::Cell;
use crate::config::DataflowConfig;
use crate::error::DataflowError;
use crate::metadata::{DfMetadata, SavedCell, SavedNotebook};
use crate::propagate::{PropagationReport, RewriteConflict};
use crate::render::RenderContext;
use crate::report::{ExecutionRequest, NeighborLists, RequestToken};
use crate::status::{CellStatus, StatusEvent};
use dfnb_codec::parse_references;
use dfnb_graph::{DependencyGraph, DependencyNode, GraphError};
use dfnb_ident::{CellId, IdentifierRegistry, Tag};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};

/// In-flight execution of one cell
#[derive(Debug, Clone)]
pub(crate) struct PendingExecution {
    pub(crate) token: RequestToken,
    /// Source the engine was given
    pub(crate) source: String,
}

/// Cell whose stored text disagrees with its persistent code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Cell
    pub cell: CellId,
    /// Text rendered from persistent code
    pub expected: String,
    /// Text stored with the cell
    pub found: String,
}

/// Single owner of one notebook's dataflow state
#[derive(Debug, Clone)]
pub struct Coordinator {
    pub(crate) config: DataflowConfig,
    pub(crate) registry: IdentifierRegistry,
    pub(crate) graph: DependencyGraph,
    /// Cells in display order
    pub(crate) cells: IndexMap<CellId, Cell>,
    /// tag → holder
    pub(crate) tag_index: HashMap<String, CellId>,
    pub(crate) pending: HashMap<CellId, PendingExecution>,
    next_token: u64,
}

impl Coordinator {
    /// Create an empty notebook with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DataflowConfig::default())
    }

    /// Create an empty notebook with custom configuration
    #[must_use]
    pub fn with_config(config: DataflowConfig) -> Self {
        Self {
            registry: IdentifierRegistry::new(config.short_id_len),
            config,
            graph: DependencyGraph::new(),
            cells: IndexMap::new(),
            tag_index: HashMap::new(),
            pending: HashMap::new(),
            next_token: 0,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DataflowConfig {
        &self.config
    }

    /// Identifier registry (read-only)
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &IdentifierRegistry {
        &self.registry
    }

    /// Dependency graph (read-only)
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Cell state
    #[inline]
    #[must_use]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    /// Cells in display order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Short form of a cell identifier
    #[inline]
    #[must_use]
    pub fn short_id(&self, id: CellId) -> Option<&str> {
        self.registry.truncate(id)
    }

    /// Cell holding `tag`
    #[inline]
    #[must_use]
    pub fn tag_holder(&self, tag: &str) -> Option<CellId> {
        self.tag_index.get(tag).copied()
    }

    pub(crate) fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            registry: &self.registry,
            graph: &self.graph,
            cells: &self.cells,
            tag_index: &self.tag_index,
        }
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell, DataflowError> {
        self.cells.get_mut(&id).ok_or(DataflowError::UnknownCell(id))
    }

    /// Add a cell at the end of the notebook
    pub fn create_cell(&mut self, source: impl Into<String>) -> CellId {
        let tags = &self.tag_index;
        let id = self
            .registry
            .new_identifier_avoiding(|short| tags.contains_key(short));
        self.cells.insert(id, Cell::new(id, source));
        tracing::info!(cell = %id, "cell created");
        id
    }

    /// Add a cell with a known identifier (replayed or pasted cells)
    ///
    /// # Errors
    /// Returns [`DataflowError::Ident`] if no short form is free, or
    /// [`DataflowError::UnknownCell`] if the identifier belonged to a
    /// deleted cell.
    pub fn insert_cell(&mut self, id: CellId, source: impl Into<String>) -> Result<(), DataflowError> {
        if self.registry.is_retired(id) {
            return Err(DataflowError::UnknownCell(id));
        }
        let tags = &self.tag_index;
        self.registry
            .register_avoiding(id, |short| tags.contains_key(short))?;
        if !self.cells.contains_key(&id) {
            self.cells.insert(id, Cell::new(id, source));
            tracing::info!(cell = %id, "cell inserted");
        }
        Ok(())
    }

    /// Replace a cell's displayed text (a user edit)
    ///
    /// Editing away from the last rendered text marks the cell and its
    /// successful immediate consumers as edited; editing back reverts both.
    ///
    /// # Errors
    /// Returns [`DataflowError::UnknownCell`].
    pub fn edit_cell(&mut self, id: CellId, source: impl Into<String>) -> Result<(), DataflowError> {
        let cell = self.cell_mut(id)?;
        cell.source = source.into();
        let edited = match &cell.rendered {
            Some(rendered) => *rendered != cell.source,
            None => !cell.source.is_empty(),
        };

        if edited {
            cell.status = cell.status.apply(StatusEvent::Edit)?;
        } else if let Ok(status) = cell.status.apply(StatusEvent::Revert) {
            cell.status = status;
        }
        tracing::debug!(cell = %id, edited, status = ?cell.status, "cell edited");

        for consumer in self.graph.downstream_of(id).unwrap_or_default() {
            let Some(downstream) = self.cells.get_mut(&consumer) else {
                continue;
            };
            if edited {
                downstream.stale_from.insert(id);
                if matches!(
                    downstream.status,
                    CellStatus::Succeeded | CellStatus::SavedSucceeded
                ) {
                    downstream.status = downstream.status.apply(StatusEvent::Edit)?;
                }
            } else if downstream.stale_from.remove(&id)
                && downstream.stale_from.is_empty()
                && !downstream.is_user_edited()
            {
                if let Ok(status) = downstream.status.apply(StatusEvent::Revert) {
                    downstream.status = status;
                }
            }
        }
        Ok(())
    }

    /// Start executing a cell
    ///
    /// Supersedes any request already in flight for the same cell.
    ///
    /// # Errors
    /// Returns [`DataflowError::UnknownCell`].
    pub fn begin_execution(&mut self, id: CellId) -> Result<ExecutionRequest, DataflowError> {
        let cell = self.cell_mut(id)?;
        cell.status = cell.status.apply(StatusEvent::Enqueue)?;
        let source = cell.source.clone();

        self.next_token += 1;
        let token = RequestToken(self.next_token);
        if let Some(previous) = self.pending.insert(
            id,
            PendingExecution {
                token,
                source: source.clone(),
            },
        ) {
            tracing::debug!(cell = %id, superseded = %previous.token, "request superseded");
        }

        let mut resolvable = BTreeMap::new();
        for cell in self.cells.values() {
            if let Some(short) = self.registry.truncate(cell.id) {
                resolvable.insert(short.to_string(), cell.id);
            }
            if let Some(tag) = &cell.tag {
                resolvable.insert(tag.as_str().to_string(), cell.id);
            }
        }
        let exports: BTreeMap<CellId, Vec<String>> = self
            .cells
            .keys()
            .filter_map(|cell| self.graph.node(*cell))
            .map(|node| (node.cell, node.exports.iter().cloned().collect()))
            .collect();

        tracing::info!(cell = %id, %token, "execution requested");
        Ok(ExecutionRequest {
            token,
            cell: id,
            source,
            resolvable,
            exports,
        })
    }

    /// The engine picked up a request
    ///
    /// # Errors
    /// Returns [`DataflowError::StaleReport`] if `token` is not the latest
    /// request for the cell.
    pub fn mark_running(&mut self, id: CellId, token: RequestToken) -> Result<(), DataflowError> {
        self.check_pending(id, token)?;
        let cell = self.cell_mut(id)?;
        cell.status = cell.status.apply(StatusEvent::ExecuteStart)?;
        Ok(())
    }

    pub(crate) fn check_pending(&self, id: CellId, token: RequestToken) -> Result<(), DataflowError> {
        match self.pending.get(&id) {
            Some(pending) if pending.token == token => Ok(()),
            _ => Err(DataflowError::StaleReport { cell: id, token }),
        }
    }

    /// Immediate producers of a cell; empty if it never executed
    #[must_use]
    pub fn upstream_of(&self, id: CellId) -> Vec<CellId> {
        self.graph.upstream_of(id).unwrap_or_else(not_found_is_empty)
    }

    /// Immediate consumers of a cell; empty if it never executed
    #[must_use]
    pub fn downstream_of(&self, id: CellId) -> Vec<CellId> {
        self.graph.downstream_of(id).unwrap_or_else(not_found_is_empty)
    }

    /// Upstream and downstream lists recorded for display
    #[must_use]
    pub fn display_lists(&self, id: CellId) -> Option<NeighborLists> {
        self.cells.get(&id).map(|cell| NeighborLists {
            cell: id,
            upstream: cell.upstream.clone(),
            downstream: cell.downstream.clone(),
        })
    }

    /// Persisted metadata block of a cell that has executed successfully
    #[must_use]
    pub fn metadata(&self, id: CellId) -> Option<DfMetadata> {
        let cell = self.cells.get(&id)?;
        let persistent = cell.persistent_code.as_deref()?;
        let input_vars = self
            .render_context()
            .render(id, persistent)
            .map(|r| r.input_vars)
            .unwrap_or_default();
        let output_vars = self
            .graph
            .node(id)
            .map(|node| node.exports.iter().cloned().collect())
            .unwrap_or_default();

        Some(DfMetadata {
            input_vars,
            output_vars,
            persistent_code: persistent.to_string(),
            tag: cell.tag.clone(),
        })
    }

    /// Snapshot the notebook for persistence
    ///
    /// Idle cells move to their saved states.
    pub fn save(&mut self) -> SavedNotebook {
        for cell in self.cells.values_mut() {
            if let Ok(status) = cell.status.apply(StatusEvent::Save) {
                cell.status = status;
            }
        }
        SavedNotebook {
            cells: self.snapshot(),
        }
    }

    /// Current cells in saved form, without changing status
    #[must_use]
    pub fn snapshot(&self) -> Vec<SavedCell> {
        self.cells
            .values()
            .map(|cell| SavedCell {
                id: cell.id,
                source: cell.source.clone(),
                status: cell.status,
                metadata: self.metadata(cell.id).or_else(|| {
                    cell.tag.as_ref().map(|tag| DfMetadata {
                        tag: Some(tag.clone()),
                        ..DfMetadata::default()
                    })
                }),
            })
            .collect()
    }

    /// Replace all state with a saved notebook
    ///
    /// Identifiers and tags are re-registered, nodes are rebuilt from
    /// `outputVars` and edges from the references in each persistent code,
    /// so the graph matches what the saved text encodes.
    ///
    /// # Errors
    /// Returns [`DataflowError::Ident`] if identifiers cannot be registered.
    pub fn load(&mut self, notebook: &SavedNotebook) -> Result<PropagationReport, DataflowError> {
        let config = self.config.clone();
        *self = Self::with_config(config);
        let mut report = PropagationReport::default();

        for saved in &notebook.cells {
            self.registry.register(saved.id)?;
            let mut cell = Cell::new(saved.id, saved.source.clone());
            cell.status = saved.status.apply(StatusEvent::Load).unwrap_or(if saved.metadata.is_some() {
                CellStatus::SavedFailed
            } else {
                CellStatus::Empty
            });
            self.cells.insert(saved.id, cell);
        }

        for saved in &notebook.cells {
            let Some(metadata) = &saved.metadata else {
                continue;
            };
            if let Some(tag) = &metadata.tag {
                self.load_tag(saved.id, tag);
            }
            if metadata.persistent_code.is_empty() && metadata.output_vars.is_empty() {
                continue;
            }
            let consumes: Vec<String> = parse_references(&metadata.persistent_code)
                .into_iter()
                .filter(|o| o.reference.is_some())
                .map(|o| o.name)
                .collect();
            self.graph.upsert_node(
                DependencyNode::new(saved.id)
                    .with_exports(metadata.output_vars.iter().cloned())
                    .with_consumes(consumes),
            );
            if let Some(cell) = self.cells.get_mut(&saved.id) {
                cell.persistent_code = Some(metadata.persistent_code.clone());
            }
        }

        self.rebuild_edges_from_persistent_code();

        let ids: Vec<CellId> = self.cells.keys().copied().collect();
        for id in &ids {
            let upstream = self.upstream_of(*id);
            let downstream = self.downstream_of(*id);
            let rendered = self.cells.get(id).and_then(|cell| {
                let persistent = cell.persistent_code.as_deref()?;
                self.render_context().render(*id, persistent).ok()
            });

            let Some(cell) = self.cells.get_mut(id) else {
                continue;
            };
            cell.upstream = upstream;
            cell.downstream = downstream;
            if let Some(rendered) = rendered {
                report.conflicts.extend(rendered.conflicts);
                cell.rendered = Some(rendered.display);
                if cell.is_user_edited() {
                    report.mark_needs_execution(*id);
                }
            }
        }

        tracing::info!(
            cells = self.cells.len(),
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "notebook loaded"
        );
        Ok(report)
    }

    fn load_tag(&mut self, id: CellId, tag: &Tag) {
        let collision = self.tag_index.get(tag.as_str()).is_some_and(|h| *h != id);
        if collision || self.registry.resolve(tag.as_str()).is_some() {
            tracing::warn!(cell = %id, %tag, "dropping saved tag");
            return;
        }
        self.tag_index.insert(tag.as_str().to_string(), id);
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.tag = Some(tag.clone());
        }
    }

    fn rebuild_edges_from_persistent_code(&mut self) {
        let mut edges = Vec::new();
        {
            let ctx = self.render_context();
            for cell in self.cells.values() {
                let Some(persistent) = cell.persistent_code.as_deref() else {
                    continue;
                };
                for occurrence in parse_references(persistent) {
                    let producer = occurrence.reference_text().and_then(|r| ctx.resolve(r));
                    if let Some(producer) = producer {
                        edges.push((producer, cell.id, occurrence.name));
                    }
                }
            }
        }
        for (from, to, name) in edges {
            if let Err(err) = self.graph.add_edge(from, to, &name) {
                tracing::debug!(error = %err, "skipped edge while loading");
            }
        }
    }

    /// Saved cells whose text disagrees with their persistent code
    ///
    /// Cells marked as edited are expected to disagree and are skipped.
    #[must_use]
    pub fn verify(&self) -> Vec<Mismatch> {
        self.cells
            .values()
            .filter(|cell| !cell.status.is_edited())
            .filter_map(|cell| {
                let expected = cell.rendered.as_ref()?;
                (*expected != cell.source).then(|| Mismatch {
                    cell: cell.id,
                    expected: expected.clone(),
                    found: cell.source.clone(),
                })
            })
            .collect()
    }

    /// Conflicts the current state would report if re-rendered
    #[must_use]
    pub fn conflicts(&self) -> Vec<RewriteConflict> {
        let ctx = self.render_context();
        self.cells
            .values()
            .filter_map(|cell| {
                let persistent = cell.persistent_code.as_deref()?;
                ctx.render(cell.id, persistent).ok()
            })
            .flat_map(|r| r.conflicts)
            .collect()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found_is_empty(err: GraphError) -> Vec<CellId> {
    tracing::trace!(error = %err, "treating unknown cell as having no neighbours");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_on_unexecuted_cells_are_empty() {
        let mut coordinator = Coordinator::new();
        let cell = coordinator.create_cell("a=1");

        assert!(coordinator.upstream_of(cell).is_empty());
        assert!(coordinator.downstream_of(cell).is_empty());
        assert!(coordinator.metadata(cell).is_none());
    }

    #[test]
    fn begin_execution_supersedes_previous_request() {
        let mut coordinator = Coordinator::new();
        let cell = coordinator.create_cell("a=1");

        let first = coordinator.begin_execution(cell).unwrap();
        let second = coordinator.begin_execution(cell).unwrap();
        assert_ne!(first.token, second.token);
        assert!(coordinator.check_pending(cell, first.token).is_err());
        assert!(coordinator.check_pending(cell, second.token).is_ok());
        assert_eq!(coordinator.cell(cell).unwrap().status(), CellStatus::Queued);
    }

    #[test]
    fn request_lists_short_ids_and_tags() {
        let mut coordinator = Coordinator::new();
        let tagged = coordinator.create_cell("a=1");
        coordinator.rewrite_for_tag_change(tagged, "source").unwrap();
        let cell = coordinator.create_cell("b=a");

        let request = coordinator.begin_execution(cell).unwrap();
        let short = coordinator.short_id(tagged).unwrap();
        assert_eq!(request.resolvable.get(short), Some(&tagged));
        assert_eq!(request.resolvable.get("source"), Some(&tagged));
        assert_eq!(request.source, "b=a");
    }

    #[test]
    fn mark_running_rejects_stale_token() {
        let mut coordinator = Coordinator::new();
        let cell = coordinator.create_cell("a=1");
        let stale = coordinator.begin_execution(cell).unwrap().token;
        let fresh = coordinator.begin_execution(cell).unwrap().token;

        assert!(matches!(
            coordinator.mark_running(cell, stale),
            Err(DataflowError::StaleReport { .. })
        ));
        coordinator.mark_running(cell, fresh).unwrap();
        assert_eq!(coordinator.cell(cell).unwrap().status(), CellStatus::Running);
    }

    #[test]
    fn insert_cell_rejects_retired_identifier() {
        let mut coordinator = Coordinator::new();
        let cell = coordinator.create_cell("a=1");
        coordinator.rewrite_for_deletion(cell).unwrap();

        assert!(coordinator.insert_cell(cell, "a=1").is_err());
    }
}
