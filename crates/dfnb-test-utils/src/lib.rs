//! Testing utilities for the dfnb workspace
//!
//! [`ToyEngine`] executes a tiny assignment language (`name = expr` per line)
//! and produces execution reports the way a real kernel would, so tests can
//! drive a [`Coordinator`] end to end.

#![allow(missing_docs)]

use dfnb_codec::parse_references;
use dfnb_core::{
    Binding, Coordinator, EngineError, ExecutionEngine, ExecutionReport, ExecutionRequest,
    IngestOutcome, Link, NodeRef,
};
use dfnb_ident::{CellId, InternalId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Default)]
struct ToyState {
    /// Successful executions, most recent last
    history: Vec<CellId>,
    /// producer → cells that read from it
    consumers: BTreeMap<CellId, BTreeSet<CellId>>,
}

/// Deterministic in-process engine
///
/// A bare name reads from the most recently executed cell that exports it.
/// `name$ref` reads from the cell `ref` names. Reading a name nobody
/// exports makes the cell fail.
#[derive(Debug, Default)]
pub struct ToyEngine {
    state: Mutex<ToyState>,
}

impl ToyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a deleted cell from the engine's namespace
    pub fn forget(&self, cell: CellId) {
        let mut state = self.state.lock();
        state.history.retain(|c| *c != cell);
        state.consumers.remove(&cell);
        for readers in state.consumers.values_mut() {
            readers.remove(&cell);
        }
    }

    /// Cells in execution order, most recent last
    pub fn history(&self) -> Vec<CellId> {
        self.state.lock().history.clone()
    }

    /// Run one request synchronously
    pub fn evaluate(&self, request: &ExecutionRequest) -> ExecutionReport {
        let mut state = self.state.lock();
        let cell = request.cell;

        let mut locals = HashSet::new();
        let mut exports = Vec::new();
        let mut bindings = Vec::new();
        let mut upstream = Vec::new();

        let all = parse_references(&request.source);
        for line in lines(&request.source) {
            let occurrences: Vec<_> = all
                .iter()
                .filter(|o| o.span.start >= line.start && o.span.end <= line.end)
                .collect();
            let definition = occurrences.first().filter(|o| {
                let rest = request.source[o.token_end()..line.end].trim_start();
                rest.starts_with('=') && !rest.starts_with("==")
            });
            let reads = occurrences
                .iter()
                .skip(usize::from(definition.is_some()));

            for occurrence in reads {
                let producer = match occurrence.reference_text() {
                    Some(reference) => {
                        let Some(producer) = request.resolvable.get(reference).copied() else {
                            return failure(request, &format!("unknown reference ${reference}"));
                        };
                        let exported = request
                            .exports
                            .get(&producer)
                            .is_some_and(|names| names.contains(&occurrence.name));
                        if !exported && producer != cell {
                            return failure(
                                request,
                                &format!("NameError: {} not defined in ${reference}", occurrence.name),
                            );
                        }
                        producer
                    }
                    None if locals.contains(&occurrence.name) => continue,
                    None => {
                        let latest = state.history.iter().rev().find(|c| {
                            **c != cell
                                && request
                                    .exports
                                    .get(*c)
                                    .is_some_and(|names| names.contains(&occurrence.name))
                        });
                        let Some(producer) = latest.copied() else {
                            return failure(
                                request,
                                &format!("NameError: name '{}' is not defined", occurrence.name),
                            );
                        };
                        producer
                    }
                };
                if producer == cell {
                    continue;
                }
                bindings.push(Binding {
                    name: occurrence.name.clone(),
                    offset: occurrence.position(),
                    producer: NodeRef::Cell(producer),
                });
                if !upstream.contains(&producer) {
                    upstream.push(producer);
                }
            }

            if let Some(definition) = definition {
                locals.insert(definition.name.clone());
                if !exports.contains(&definition.name) {
                    exports.push(definition.name.clone());
                }
            }
        }

        let live: HashSet<CellId> = request.resolvable.values().copied().collect();
        let mut refresh_downstream_for = BTreeMap::new();
        for (producer, readers) in &mut state.consumers {
            if !upstream.contains(producer) && readers.remove(&cell) {
                let list = readers.iter().copied().filter(|c| live.contains(c)).collect();
                refresh_downstream_for.insert(*producer, list);
            }
        }
        for producer in &upstream {
            state.consumers.entry(*producer).or_default().insert(cell);
        }
        state.history.retain(|c| *c != cell);
        state.history.push(cell);

        let downstream = state
            .consumers
            .get(&cell)
            .map(|readers| readers.iter().copied().filter(|c| live.contains(c)).collect())
            .unwrap_or_default();

        tracing::debug!(%cell, reads = bindings.len(), "toy engine executed cell");
        ExecutionReport {
            links: upstream
                .iter()
                .map(|producer| Link {
                    from: NodeRef::Cell(*producer),
                    to: cell,
                })
                .collect(),
            internal_own: exports
                .iter()
                .map(|name| InternalId::new(format!("{}_{name}", cell.prefix(8))))
                .collect(),
            upstream,
            downstream,
            refresh_downstream_for,
            exports,
            bindings,
            ..ExecutionReport::ok(request.token, cell)
        }
    }

    /// Begin, evaluate and ingest in one step
    pub fn run(&self, coordinator: &mut Coordinator, cell: CellId) -> IngestOutcome {
        let request = coordinator
            .begin_execution(cell)
            .expect("cell exists");
        let report = self.evaluate(&request);
        coordinator
            .ingest_execution_report(report)
            .expect("report applies")
    }

    /// Run `cells` in order
    pub fn run_all(&self, coordinator: &mut Coordinator, cells: &[CellId]) {
        for cell in cells {
            self.run(coordinator, *cell);
        }
    }

    /// Delete a cell from both the notebook and the engine
    pub fn delete(&self, coordinator: &mut Coordinator, cell: CellId) -> dfnb_core::PropagationReport {
        self.forget(cell);
        coordinator
            .rewrite_for_deletion(cell)
            .expect("cell exists")
    }
}

#[async_trait::async_trait]
impl ExecutionEngine for ToyEngine {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport, EngineError> {
        Ok(self.evaluate(&request))
    }
}

/// Engine that is never reachable
#[derive(Debug, Default)]
pub struct UnavailableEngine;

#[async_trait::async_trait]
impl ExecutionEngine for UnavailableEngine {
    async fn execute(&self, _request: ExecutionRequest) -> Result<ExecutionReport, EngineError> {
        Err(EngineError::Unavailable("engine offline".to_string()))
    }
}

fn failure(request: &ExecutionRequest, message: &str) -> ExecutionReport {
    ExecutionReport::error(request.token, request.cell, message)
}

/// Byte ranges of each line, without the newline
fn lines(source: &str) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for line in source.split('\n') {
        ranges.push(start..start + line.len());
        start += line.len() + 1;
    }
    ranges
}

/// Coordinator with one cell per source, in order
pub fn notebook(sources: &[&str]) -> (Coordinator, Vec<CellId>) {
    let mut coordinator = Coordinator::new();
    let cells = sources.iter().map(|s| coordinator.create_cell(*s)).collect();
    (coordinator, cells)
}

/// Short id of `cell`, owned
pub fn short(coordinator: &Coordinator, cell: CellId) -> String {
    coordinator
        .short_id(cell)
        .expect("registered cell")
        .to_string()
}

/// Displayed source of `cell`
pub fn source(coordinator: &Coordinator, cell: CellId) -> String {
    coordinator
        .cell(cell)
        .expect("live cell")
        .source()
        .to_string()
}
