//! Execution report ingestion
//!
//! Turns one engine report into graph mutations, a new persistent code for
//! the executed cell, updated display lists and a propagation pass over
//! every cell that might read a name the executed cell (re)defines.

use crate::coordinator::Coordinator;
use crate::error::DataflowError;
use crate::report::{
    ExecutionReport, ExecutionStatus, IngestOutcome, IngestSummary, NeighborLists, NodeRef,
    RequestToken,
};
use crate::status::StatusEvent;
use dfnb_codec::{rewrite, Substitution};
use dfnb_graph::DependencyNode;
use dfnb_ident::CellId;
use std::collections::BTreeSet;

/// Producer read by one bound occurrence
struct Read {
    producer: CellId,
    name: String,
}

impl Coordinator {
    /// Apply an execution report
    ///
    /// Reports whose token is not the latest request for the cell are
    /// dropped and return [`IngestOutcome::Discarded`]. Error reports only
    /// change the cell's status; the graph keeps the edges of the last
    /// successful run.
    ///
    /// # Errors
    /// Returns [`DataflowError::Codec`] if the report's binding offsets do not
    /// match the executed source. The cell is marked failed and nothing else
    /// changes.
    pub fn ingest_execution_report(
        &mut self,
        report: ExecutionReport,
    ) -> Result<IngestOutcome, DataflowError> {
        let cell = report.cell;
        if let Err(err) = self.check_pending(cell, report.token) {
            tracing::debug!(error = %err, "discarding report");
            return Ok(IngestOutcome::Discarded);
        }
        let Some(pending) = self.pending.remove(&cell) else {
            return Ok(IngestOutcome::Discarded);
        };

        if report.status == ExecutionStatus::Error {
            return self.record_failure(cell, report.error);
        }

        let reads = self.resolve_reads(&report);
        let persistent = match self.annotate(&pending.source, &report, &reads) {
            Ok(persistent) => persistent,
            Err(err) => {
                tracing::warn!(%cell, error = %err, "report does not match executed source");
                self.record_failure(cell, Some(err.to_string()))?;
                return Err(err);
            }
        };

        let old_exports = self
            .graph
            .node(cell)
            .map(|node| node.exports.clone())
            .unwrap_or_default();
        self.replace_node_and_edges(&report, &reads);
        let displays = self.update_display_lists(&report);

        {
            let state = self.cell_mut(cell)?;
            state.persistent_code = Some(persistent);
            state.rendered = Some(pending.source.clone());
            state.status = state.status.apply(StatusEvent::ExecuteSuccess)?;
            if state.source != pending.source {
                // edited while running
                state.status = state.status.apply(StatusEvent::Edit)?;
            }
            state.stale_from.clear();
        }
        for other in self.cells.values_mut() {
            other.stale_from.remove(&cell);
        }

        let names: BTreeSet<String> = old_exports
            .into_iter()
            .chain(report.exports.iter().cloned())
            .collect();
        let mut affected = BTreeSet::from([cell]);
        affected.extend(self.downstream_of(cell));
        for name in &names {
            for producer in self.graph.producers_of(name) {
                affected.extend(self.downstream_of(producer));
            }
        }
        let propagation = self.propagate(affected);

        tracing::info!(
            %cell,
            reads = reads.len(),
            patches = propagation.patches.len(),
            conflicts = propagation.conflicts.len(),
            "execution report applied"
        );
        Ok(IngestOutcome::Applied(IngestSummary {
            cell,
            displays,
            propagation,
        }))
    }

    /// The engine failed without producing a report
    ///
    /// # Errors
    /// Returns [`DataflowError::UnknownCell`] if the cell is gone.
    pub fn fail_execution(
        &mut self,
        cell: CellId,
        token: RequestToken,
        message: impl Into<String>,
    ) -> Result<IngestOutcome, DataflowError> {
        if self.check_pending(cell, token).is_err() {
            return Ok(IngestOutcome::Discarded);
        }
        self.pending.remove(&cell);
        self.record_failure(cell, Some(message.into()))
    }

    fn record_failure(
        &mut self,
        cell: CellId,
        message: Option<String>,
    ) -> Result<IngestOutcome, DataflowError> {
        let state = self.cell_mut(cell)?;
        state.status = state.status.apply(StatusEvent::ExecuteError)?;
        tracing::info!(%cell, error = message.as_deref().unwrap_or(""), "execution failed");
        Ok(IngestOutcome::Failed { cell, message })
    }

    /// Owning cell of a report identifier
    fn owner_of(&self, report: &ExecutionReport, node: &NodeRef) -> Option<CellId> {
        let owner = report.owner_in_report(node).or_else(|| match node {
            NodeRef::Internal(id) => self.graph.owner_of_internal(id),
            NodeRef::Cell(_) => None,
        })?;
        self.registry.is_live(owner).then_some(owner)
    }

    /// Bindings that read another cell's value, keyed by occurrence offset
    fn resolve_reads(&self, report: &ExecutionReport) -> Vec<(usize, Read)> {
        let mut seen = BTreeSet::new();
        let mut reads = Vec::new();
        for binding in &report.bindings {
            let Some(producer) = self.owner_of(report, &binding.producer) else {
                tracing::warn!(
                    cell = %report.cell,
                    name = %binding.name,
                    "binding producer is unknown"
                );
                continue;
            };
            if producer == report.cell || !seen.insert(binding.offset) {
                continue;
            }
            reads.push((
                binding.offset,
                Read {
                    producer,
                    name: binding.name.clone(),
                },
            ));
        }
        reads
    }

    /// Executed source with every read annotated by its producer's short id
    fn annotate(
        &self,
        source: &str,
        report: &ExecutionReport,
        reads: &[(usize, Read)],
    ) -> Result<String, DataflowError> {
        let substitutions: Vec<Substitution> = reads
            .iter()
            .filter_map(|(offset, read)| {
                let short = self.registry.truncate(read.producer)?;
                Some(Substitution::new(*offset, read.name.clone(), Some(short)))
            })
            .collect();
        tracing::debug!(cell = %report.cell, annotated = substitutions.len(), "built persistent code");
        Ok(rewrite(source, &substitutions)?)
    }

    /// Upsert the executed cell's node and replace every edge into it
    fn replace_node_and_edges(&mut self, report: &ExecutionReport, reads: &[(usize, Read)]) {
        let cell = report.cell;
        self.graph.upsert_node(
            DependencyNode::new(cell)
                .with_internal_ids(report.internal_own.iter().cloned())
                .with_exports(report.exports.iter().cloned())
                .with_consumes(reads.iter().map(|(_, r)| r.name.clone())),
        );
        self.graph.remove_edges_to(cell);

        for (_, read) in reads {
            if let Err(err) = self.graph.add_edge(read.producer, cell, &read.name) {
                tracing::warn!(error = %err, name = %read.name, "skipped binding edge");
            }
        }

        let linked = report
            .links
            .iter()
            .filter(|link| link.to == cell)
            .filter_map(|link| self.owner_of(report, &link.from));
        let linked: Vec<CellId> = linked.chain(report.upstream.iter().copied()).collect();
        for producer in linked {
            if producer == cell {
                continue;
            }
            if let Err(err) = self.graph.link(producer, cell) {
                tracing::debug!(error = %err, "skipped reported link");
            }
        }
    }

    /// Record display lists for the executed cell and its upstream cells
    fn update_display_lists(&mut self, report: &ExecutionReport) -> Vec<NeighborLists> {
        let cell = report.cell;
        let upstream = dedup(report.upstream.iter().copied().filter(|u| *u != cell));
        let mut touched = vec![cell];

        for (index, producer) in upstream.iter().enumerate() {
            let later = upstream[index + 1..]
                .iter()
                .copied()
                .filter(|other| self.graph.has_edge(*producer, *other));
            let Some(state) = self.cells.get(producer) else {
                continue;
            };
            let list = dedup(
                later
                    .chain(state.downstream.iter().copied().filter(|c| *c != cell))
                    .chain([cell]),
            );
            if let Some(state) = self.cells.get_mut(producer) {
                state.downstream = list;
                touched.push(*producer);
            }
        }

        for (other, downstream) in &report.refresh_downstream_for {
            if let Some(state) = self.cells.get_mut(other) {
                state.downstream = dedup(downstream.iter().copied());
                touched.push(*other);
            }
        }

        if let Some(state) = self.cells.get_mut(&cell) {
            state.upstream = upstream;
            state.downstream = dedup(report.downstream.iter().copied().filter(|d| *d != cell));
        }

        dedup(touched.into_iter())
            .into_iter()
            .filter_map(|id| self.display_lists(id))
            .collect()
    }
}

fn dedup(cells: impl Iterator<Item = CellId>) -> Vec<CellId> {
    let mut seen = BTreeSet::new();
    cells.filter(|cell| seen.insert(*cell)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Binding;
    use crate::status::CellStatus;

    fn run(
        coordinator: &mut Coordinator,
        cell: CellId,
        exports: &[&str],
        reads: &[(usize, &str, CellId)],
    ) -> IngestOutcome {
        let request = coordinator.begin_execution(cell).unwrap();
        let mut report = ExecutionReport::ok(request.token, cell);
        report.exports = exports.iter().map(|e| (*e).to_string()).collect();
        report.bindings = reads
            .iter()
            .map(|(offset, name, producer)| Binding {
                name: (*name).to_string(),
                offset: *offset,
                producer: NodeRef::Cell(*producer),
            })
            .collect();
        report.upstream = reads.iter().map(|(_, _, p)| *p).collect();
        coordinator.ingest_execution_report(report).unwrap()
    }

    #[test]
    fn stale_report_is_discarded() {
        let mut coordinator = Coordinator::new();
        let cell = coordinator.create_cell("a=1");
        let old = coordinator.begin_execution(cell).unwrap();
        let _new = coordinator.begin_execution(cell).unwrap();

        let outcome = coordinator
            .ingest_execution_report(ExecutionReport::ok(old.token, cell))
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Discarded);
        assert!(!coordinator.graph().contains(cell));
    }

    #[test]
    fn error_report_keeps_previous_edges() {
        let mut coordinator = Coordinator::new();
        let producer = coordinator.create_cell("a=9");
        let consumer = coordinator.create_cell("b=a+9");
        run(&mut coordinator, producer, &["a"], &[]);
        run(&mut coordinator, consumer, &["b"], &[(2, "a", producer)]);

        let request = coordinator.begin_execution(consumer).unwrap();
        let outcome = coordinator
            .ingest_execution_report(ExecutionReport::error(request.token, consumer, "boom"))
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Failed { .. }));
        assert_eq!(coordinator.cell(consumer).unwrap().status(), CellStatus::Failed);
        assert_eq!(coordinator.upstream_of(consumer), vec![producer]);
    }

    #[test]
    fn mismatched_offsets_fail_without_mutation() {
        let mut coordinator = Coordinator::new();
        let producer = coordinator.create_cell("a=9");
        let consumer = coordinator.create_cell("b=a+9");
        run(&mut coordinator, producer, &["a"], &[]);

        let request = coordinator.begin_execution(consumer).unwrap();
        let mut report = ExecutionReport::ok(request.token, consumer);
        report.bindings = vec![Binding {
            name: "a".into(),
            offset: 3,
            producer: NodeRef::Cell(producer),
        }];

        assert!(matches!(
            coordinator.ingest_execution_report(report),
            Err(DataflowError::Codec(_))
        ));
        assert!(!coordinator.graph().contains(consumer));
        assert_eq!(coordinator.cell(consumer).unwrap().status(), CellStatus::Failed);
    }

    #[test]
    fn upstream_cells_get_consumer_appended() {
        let mut coordinator = Coordinator::new();
        let p1 = coordinator.create_cell("a=1");
        let p2 = coordinator.create_cell("c=a");
        let consumer = coordinator.create_cell("b=a+c");
        run(&mut coordinator, p1, &["a"], &[]);
        run(&mut coordinator, p2, &["c"], &[(2, "a", p1)]);

        let outcome = run(&mut coordinator, consumer, &["b"], &[(2, "a", p1), (4, "c", p2)]);
        let IngestOutcome::Applied(summary) = outcome else {
            panic!("expected applied report");
        };

        assert_eq!(coordinator.cell(p1).unwrap().downstream(), &[p2, consumer]);
        assert_eq!(coordinator.cell(p2).unwrap().downstream(), &[consumer]);
        assert_eq!(coordinator.cell(consumer).unwrap().upstream(), &[p1, p2]);
        assert_eq!(summary.displays.len(), 3);
    }

    #[test]
    fn self_reads_are_not_annotated() {
        let mut coordinator = Coordinator::new();
        let cell = coordinator.create_cell("a=1");
        run(&mut coordinator, cell, &["a"], &[(0, "a", cell)]);

        assert_eq!(coordinator.cell(cell).unwrap().persistent_code(), Some("a=1"));
        assert!(coordinator.graph().edges().is_empty());
    }
}
