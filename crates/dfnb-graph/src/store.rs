//! Dependency graph store
//!
//! A single owned graph of cell nodes. Edges run producer → consumer and are
//! weighted by the set of names read along them, so `(from, to, name)` is
//! unique by construction.

use crate::error::GraphError;
use crate::node::{DependencyNode, Edge};
use dfnb_ident::{CellId, InternalId};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Authoritative in-memory dependency graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<CellId, BTreeSet<String>>,
    nodes: HashMap<CellId, DependencyNode>,
    /// name → cells exporting it
    exporters: HashMap<String, BTreeSet<CellId>>,
    /// internal id → owning cell
    internal_owner: HashMap<InternalId, CellId>,
}

impl DependencyGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a cell's node data, keeping its edges
    ///
    /// Returns the previous node, if any.
    pub fn upsert_node(&mut self, node: DependencyNode) -> Option<DependencyNode> {
        let cell = node.cell;
        let previous = self.nodes.remove(&cell);
        if let Some(old) = &previous {
            self.unindex(old);
        }

        for name in &node.exports {
            self.exporters.entry(name.clone()).or_default().insert(cell);
        }
        for internal in &node.internal_ids {
            self.internal_owner.insert(internal.clone(), cell);
        }

        self.graph.add_node(cell);
        tracing::debug!(%cell, exports = node.exports.len(), "upserted node");
        self.nodes.insert(cell, node);
        previous
    }

    /// Add a `(from, to, name)` edge; returns `false` if it already existed
    ///
    /// # Errors
    /// - [`GraphError::NotFound`] if either cell has no node
    /// - [`GraphError::SelfLoop`] if `from == to`
    pub fn add_edge(&mut self, from: CellId, to: CellId, name: &str) -> Result<bool, GraphError> {
        self.check_endpoints(from, to)?;

        if let Some(names) = self.graph.edge_weight_mut(from, to) {
            return Ok(names.insert(name.to_string()));
        }
        self.graph
            .add_edge(from, to, BTreeSet::from([name.to_string()]));
        Ok(true)
    }

    /// Ensure `from` → `to` exists without naming what is read
    ///
    /// Used for links the execution engine reports without a name.
    ///
    /// # Errors
    /// Same as [`add_edge`](Self::add_edge).
    pub fn link(&mut self, from: CellId, to: CellId) -> Result<(), GraphError> {
        self.check_endpoints(from, to)?;
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, BTreeSet::new());
        }
        Ok(())
    }

    /// Drop every edge into `to`; no-op for unknown cells
    pub fn remove_edges_to(&mut self, to: CellId) {
        if !self.graph.contains_node(to) {
            return;
        }
        let producers: Vec<CellId> = self
            .graph
            .neighbors_directed(to, Direction::Incoming)
            .collect();
        for from in producers {
            self.graph.remove_edge(from, to);
        }
    }

    /// Remove a cell and every edge touching it; no-op for unknown cells
    pub fn remove_node(&mut self, cell: CellId) -> Option<DependencyNode> {
        let node = self.nodes.remove(&cell)?;
        self.unindex(&node);
        self.graph.remove_node(cell);
        tracing::debug!(%cell, "removed node");
        Some(node)
    }

    /// Immediate producers of `cell`
    ///
    /// # Errors
    /// Returns [`GraphError::NotFound`] if the cell has never executed.
    pub fn upstream_of(&self, cell: CellId) -> Result<Vec<CellId>, GraphError> {
        self.neighbors(cell, Direction::Incoming)
    }

    /// Immediate consumers of `cell`
    ///
    /// # Errors
    /// Returns [`GraphError::NotFound`] if the cell has never executed.
    pub fn downstream_of(&self, cell: CellId) -> Result<Vec<CellId>, GraphError> {
        self.neighbors(cell, Direction::Outgoing)
    }

    fn neighbors(&self, cell: CellId, direction: Direction) -> Result<Vec<CellId>, GraphError> {
        if !self.nodes.contains_key(&cell) {
            return Err(GraphError::NotFound(cell));
        }
        Ok(self.graph.neighbors_directed(cell, direction).collect())
    }

    /// Every ancestor of `cell`, nearest first
    ///
    /// # Errors
    /// Returns [`GraphError::NotFound`] if the cell has never executed.
    pub fn all_upstream_transitively(&self, cell: CellId) -> Result<Vec<CellId>, GraphError> {
        if !self.nodes.contains_key(&cell) {
            return Err(GraphError::NotFound(cell));
        }
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, cell);
        let mut ancestors = Vec::new();
        while let Some(next) = bfs.next(reversed) {
            if next != cell {
                ancestors.push(next);
            }
        }
        Ok(ancestors)
    }

    /// Every descendant of `cell`, nearest first
    ///
    /// # Errors
    /// Returns [`GraphError::NotFound`] if the cell has never executed.
    pub fn all_downstream_transitively(&self, cell: CellId) -> Result<Vec<CellId>, GraphError> {
        if !self.nodes.contains_key(&cell) {
            return Err(GraphError::NotFound(cell));
        }
        let mut bfs = Bfs::new(&self.graph, cell);
        let mut descendants = Vec::new();
        while let Some(next) = bfs.next(&self.graph) {
            if next != cell {
                descendants.push(next);
            }
        }
        Ok(descendants)
    }

    /// Names `to` reads from `from`
    #[must_use]
    pub fn edge_names(&self, from: CellId, to: CellId) -> Option<&BTreeSet<String>> {
        self.graph.edge_weight(from, to)
    }

    /// Whether any edge `from` → `to` exists
    #[inline]
    #[must_use]
    pub fn has_edge(&self, from: CellId, to: CellId) -> bool {
        self.graph.contains_edge(from, to)
    }

    /// Cells exporting `name`, in identifier order
    #[must_use]
    pub fn producers_of(&self, name: &str) -> Vec<CellId> {
        self.exporters
            .get(name)
            .map(|cells| cells.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Cell that defined an internal sub-identifier
    #[inline]
    #[must_use]
    pub fn owner_of_internal(&self, id: &InternalId) -> Option<CellId> {
        self.internal_owner.get(id).copied()
    }

    /// Node data of a cell
    #[inline]
    #[must_use]
    pub fn node(&self, cell: CellId) -> Option<&DependencyNode> {
        self.nodes.get(&cell)
    }

    /// Whether the cell has a node
    #[inline]
    #[must_use]
    pub fn contains(&self, cell: CellId) -> bool {
        self.nodes.contains_key(&cell)
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of `(from, to, name)` edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.all_edges().map(|(_, _, names)| names.len()).sum()
    }

    /// All edges, sorted
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .graph
            .all_edges()
            .flat_map(|(from, to, names)| {
                names.iter().map(move |name| Edge {
                    from,
                    to,
                    name: name.clone(),
                })
            })
            .collect();
        edges.sort();
        edges
    }

    fn check_endpoints(&self, from: CellId, to: CellId) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfLoop(from));
        }
        match [from, to].into_iter().find(|cell| !self.nodes.contains_key(cell)) {
            Some(missing) => Err(GraphError::NotFound(missing)),
            None => Ok(()),
        }
    }

    fn unindex(&mut self, node: &DependencyNode) {
        for name in &node.exports {
            if let Some(cells) = self.exporters.get_mut(name) {
                cells.remove(&node.cell);
                if cells.is_empty() {
                    self.exporters.remove(name);
                }
            }
        }
        for internal in &node.internal_ids {
            if self.internal_owner.get(internal) == Some(&node.cell) {
                self.internal_owner.remove(internal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(cell: CellId, exports: &[&str]) -> DependencyNode {
        DependencyNode::new(cell).with_exports(exports.iter().copied())
    }

    #[test]
    fn add_edge_dedupes_by_name() {
        let mut graph = DependencyGraph::new();
        let (a, b) = (CellId::new(), CellId::new());
        graph.upsert_node(node(a, &["x", "y"]));
        graph.upsert_node(node(b, &[]));

        assert!(graph.add_edge(a, b, "x").unwrap());
        assert!(!graph.add_edge(a, b, "x").unwrap());
        assert!(graph.add_edge(a, b, "y").unwrap());
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.upstream_of(b).unwrap(), vec![a]);
    }

    #[test]
    fn add_edge_requires_nodes() {
        let mut graph = DependencyGraph::new();
        let (a, b) = (CellId::new(), CellId::new());
        graph.upsert_node(node(a, &["x"]));

        assert_eq!(graph.add_edge(a, b, "x"), Err(GraphError::NotFound(b)));
        assert_eq!(graph.add_edge(a, a, "x"), Err(GraphError::SelfLoop(a)));
    }

    #[test]
    fn link_adds_unnamed_edge_once() {
        let mut graph = DependencyGraph::new();
        let (a, b) = (CellId::new(), CellId::new());
        graph.upsert_node(node(a, &["x"]));
        graph.upsert_node(node(b, &[]));

        graph.link(a, b).unwrap();
        graph.link(a, b).unwrap();
        assert!(graph.has_edge(a, b));
        assert_eq!(graph.edge_count(), 0);

        graph.add_edge(a, b, "x").unwrap();
        graph.link(a, b).unwrap();
        assert_eq!(graph.edge_names(a, b).unwrap().len(), 1);
    }

    #[test]
    fn upsert_reindexes_exports() {
        let mut graph = DependencyGraph::new();
        let a = CellId::new();
        graph.upsert_node(node(a, &["x"]));
        assert_eq!(graph.producers_of("x"), vec![a]);

        graph.upsert_node(node(a, &["y"]));
        assert!(graph.producers_of("x").is_empty());
        assert_eq!(graph.producers_of("y"), vec![a]);
    }

    #[test]
    fn internal_ids_map_to_owner() {
        let mut graph = DependencyGraph::new();
        let a = CellId::new();
        let internal = InternalId::new("a1b2c3d4_0");
        graph.upsert_node(DependencyNode::new(a).with_internal_ids([internal.clone()]));

        assert_eq!(graph.owner_of_internal(&internal), Some(a));
        graph.remove_node(a);
        assert_eq!(graph.owner_of_internal(&internal), None);
    }

    #[test]
    fn lookups_on_unknown_cell_signal_not_found() {
        let graph = DependencyGraph::new();
        let ghost = CellId::new();
        assert_eq!(graph.upstream_of(ghost), Err(GraphError::NotFound(ghost)));
        assert_eq!(graph.downstream_of(ghost), Err(GraphError::NotFound(ghost)));
    }
}
