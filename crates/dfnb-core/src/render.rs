//! Display rendering from persistent code
//!
//! The displayed source of an executed cell is a pure function of its
//! persistent code and the current notebook state: every annotated
//! occurrence is shown bare when its producer is the only candidate for the
//! name, otherwise with the producer's tag, otherwise with its short id.

use crate::cell::Cell;
use crate::metadata::InputVars;
use crate::propagate::{ConflictReason, RewriteConflict};
use dfnb_codec::{parse_references, resolve_reference, rewrite, CodecError, Substitution};
use dfnb_graph::DependencyGraph;
use dfnb_ident::{CellId, IdentifierRegistry};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};

/// Read-only view of the notebook used while rendering
pub(crate) struct RenderContext<'a> {
    pub(crate) registry: &'a IdentifierRegistry,
    pub(crate) graph: &'a DependencyGraph,
    pub(crate) cells: &'a IndexMap<CellId, Cell>,
    pub(crate) tag_index: &'a HashMap<String, CellId>,
}

/// Display text and metadata derived from one persistent code
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rendered {
    pub(crate) display: String,
    pub(crate) input_vars: InputVars,
    pub(crate) conflicts: Vec<RewriteConflict>,
}

impl RenderContext<'_> {
    /// Cell a reference text names, live or retired
    pub(crate) fn resolve(&self, text: &str) -> Option<CellId> {
        resolve_reference(text, self.registry, |tag| self.tag_index.get(tag).copied())
    }

    /// Live cells exporting `name`
    ///
    /// Every exporter counts, wherever it sits in the graph: a bare name may
    /// bind to any of them on the next run.
    pub(crate) fn candidates(&self, name: &str) -> Vec<CellId> {
        self.graph
            .producers_of(name)
            .into_iter()
            .filter(|cell| self.registry.is_live(*cell))
            .collect()
    }

    /// Preferred explicit form for a producer: tag, else short id
    pub(crate) fn explicit_form(&self, producer: CellId) -> Option<String> {
        if let Some(tag) = self.cells.get(&producer).and_then(Cell::tag) {
            return Some(tag.as_str().to_string());
        }
        self.registry.truncate(producer).map(str::to_string)
    }

    /// Render `persistent` as displayed in `consumer`
    pub(crate) fn render(&self, consumer: CellId, persistent: &str) -> Result<Rendered, CodecError> {
        let mut substitutions = Vec::new();
        let mut refs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut tag_refs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for occurrence in parse_references(persistent) {
            let Some(reference) = occurrence.reference_text() else {
                continue;
            };
            let name = occurrence.name.as_str();

            let Some(producer) = self.resolve(reference) else {
                conflicts.push(RewriteConflict::new(consumer, name, reference, ConflictReason::Unresolved));
                continue;
            };
            let short = self.registry.truncate(producer).unwrap_or(reference);
            push_unique(refs.entry(short.to_string()).or_default(), name);

            if !self.graph.contains(producer) {
                let reason = if self.registry.is_retired(producer) {
                    ConflictReason::ProducerDeleted
                } else {
                    ConflictReason::ProducerNotExecuted
                };
                conflicts.push(RewriteConflict::new(consumer, name, short, reason));
                substitutions.push(Substitution::new(occurrence.position(), name, Some(short)));
                continue;
            }

            let candidates = self.candidates(name);
            if candidates == [producer] {
                substitutions.push(Substitution::new(occurrence.position(), name, None));
                continue;
            }

            let shown = self.explicit_form(producer).unwrap_or_else(|| short.to_string());
            if shown != short {
                push_unique(tag_refs.entry(shown.clone()).or_default(), name);
            }
            substitutions.push(Substitution::new(occurrence.position(), name, Some(&shown)));
        }

        Ok(Rendered {
            display: rewrite(persistent, &substitutions)?,
            input_vars: InputVars { refs, tag_refs },
            conflicts,
        })
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}
