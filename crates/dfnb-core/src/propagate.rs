//! Tag and rename propagation
//!
//! Every change that can alter how a reference should be displayed (a new
//! producer, a deleted producer, a tag edit) ends in [`Coordinator::propagate`]:
//! the affected cells are re-rendered from their persistent code, all new
//! texts are computed first and then committed together. Rendering is a pure
//! function of notebook state, so running the same propagation again is a
//! no-op.

use crate::coordinator::Coordinator;
use crate::render::Rendered;
use dfnb_codec::{parse_references, rewrite, Substitution};
use dfnb_ident::{CellId, Tag, TagError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why a reference could not be brought up to date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Reference text names no known cell or tag
    Unresolved,
    /// Producer cell was deleted
    ProducerDeleted,
    /// Producer exists but has no successful execution
    ProducerNotExecuted,
    /// Rewriting the cell's text failed
    Rewrite(String),
}

/// Reference left in its last known-good explicit form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteConflict {
    /// Cell containing the reference
    pub cell: CellId,
    /// Variable name
    pub name: String,
    /// Reference text kept in the source
    pub reference: String,
    /// Cause
    pub reason: ConflictReason,
}

impl RewriteConflict {
    pub(crate) fn new(cell: CellId, name: &str, reference: &str, reason: ConflictReason) -> Self {
        Self {
            cell,
            name: name.to_string(),
            reference: reference.to_string(),
            reason,
        }
    }
}

/// New displayed text for one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPatch {
    /// Cell to patch
    pub cell: CellId,
    /// Full replacement text
    pub source: String,
}

/// Everything one propagation pass changed or could not change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Cells whose displayed text changed
    pub patches: Vec<TextPatch>,
    /// Per-cell references that could not be updated
    pub conflicts: Vec<RewriteConflict>,
    /// Cells that must run again before their text can be trusted
    pub needs_execution: Vec<CellId>,
}

impl PropagationReport {
    /// Nothing changed and nothing conflicted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.conflicts.is_empty() && self.needs_execution.is_empty()
    }

    /// Patch for `cell`, if any
    #[must_use]
    pub fn patch_for(&self, cell: CellId) -> Option<&str> {
        self.patches
            .iter()
            .find(|p| p.cell == cell)
            .map(|p| p.source.as_str())
    }

    pub(crate) fn merge(&mut self, other: PropagationReport) {
        for patch in other.patches {
            self.patches.retain(|p| p.cell != patch.cell);
            self.patches.push(patch);
        }
        self.conflicts.extend(other.conflicts);
        for cell in other.needs_execution {
            self.mark_needs_execution(cell);
        }
    }

    /// Take over patches made directly to unrendered or user-edited text
    fn absorb_retargeted(&mut self, patches: Vec<TextPatch>) {
        for patch in patches {
            self.mark_needs_execution(patch.cell);
            self.patches.retain(|p| p.cell != patch.cell);
            self.patches.push(patch);
        }
    }

    pub(crate) fn mark_needs_execution(&mut self, cell: CellId) {
        if !self.needs_execution.contains(&cell) {
            self.needs_execution.push(cell);
        }
    }
}

/// Consumer rebound to a surviving producer after a deletion
struct Rebinding {
    consumer: CellId,
    persistent: String,
    edges: Vec<(CellId, String)>,
}

impl Coordinator {
    /// Re-render `affected` cells from persistent code and commit the results
    pub(crate) fn propagate(&mut self, affected: impl IntoIterator<Item = CellId>) -> PropagationReport {
        let affected: BTreeSet<CellId> = affected.into_iter().collect();
        let mut report = PropagationReport::default();

        // Compute everything before touching any cell
        let mut rendered: Vec<(CellId, Rendered)> = Vec::new();
        {
            let ctx = self.render_context();
            for (id, cell) in self.cells.iter().filter(|(id, _)| affected.contains(id)) {
                let Some(persistent) = cell.persistent_code.as_deref() else {
                    continue;
                };
                match ctx.render(*id, persistent) {
                    Ok(r) => rendered.push((*id, r)),
                    Err(err) => {
                        tracing::warn!(cell = %id, error = %err, "cannot render cell");
                        report.conflicts.push(RewriteConflict::new(
                            *id,
                            "",
                            "",
                            ConflictReason::Rewrite(err.to_string()),
                        ));
                    }
                }
            }
        }

        for (id, r) in rendered {
            for conflict in &r.conflicts {
                tracing::warn!(
                    cell = %conflict.cell,
                    name = %conflict.name,
                    reference = %conflict.reference,
                    reason = ?conflict.reason,
                    "reference left in explicit form"
                );
            }
            report.conflicts.extend(r.conflicts);

            let Some(cell) = self.cells.get_mut(&id) else {
                continue;
            };
            if cell.is_user_edited() {
                cell.rendered = Some(r.display);
                if cell.is_user_edited() {
                    report.mark_needs_execution(id);
                }
                continue;
            }
            if cell.source != r.display {
                tracing::debug!(cell = %id, "patched displayed source");
                cell.source.clone_from(&r.display);
                report.patches.push(TextPatch {
                    cell: id,
                    source: r.display.clone(),
                });
            }
            cell.rendered = Some(r.display);
        }
        report
    }

    /// Re-render every executed cell
    ///
    /// Repairs display text after an interrupted propagation.
    pub fn refresh_all(&mut self) -> PropagationReport {
        let all: Vec<CellId> = self.cells.keys().copied().collect();
        self.propagate(all)
    }

    /// Change a cell's tag and rewrite every reference to it
    ///
    /// Blank `tag` removes the tag. References shown with the old tag switch
    /// to the new tag, or to the short id when the tag is removed.
    ///
    /// # Errors
    /// - [`TagError::Invalid`] for non-identifier text
    /// - [`TagError::Collision`] if another cell holds the tag
    /// - [`TagError::ShadowsIdentifier`] if the tag would resolve as an identifier
    /// - [`DataflowError::UnknownCell`](crate::DataflowError::UnknownCell)
    ///
    /// A rejected tag changes nothing.
    pub fn rewrite_for_tag_change(
        &mut self,
        cell: CellId,
        tag: &str,
    ) -> Result<PropagationReport, crate::DataflowError> {
        let new_tag = Tag::parse(tag)?;
        let old_tag = self
            .cells
            .get(&cell)
            .ok_or(crate::DataflowError::UnknownCell(cell))?
            .tag
            .clone();

        if let Some(tag) = &new_tag {
            if let Err(err) = self.validate_tag(cell, tag) {
                tracing::warn!(%cell, error = %err, "tag rejected");
                return Err(err.into());
            }
        }
        if old_tag == new_tag {
            return Ok(PropagationReport::default());
        }

        let retargeted = self.retarget_edited(cell, old_tag.as_ref(), new_tag.as_ref());

        if let Some(old) = &old_tag {
            self.tag_index.remove(old.as_str());
        }
        if let Some(new) = &new_tag {
            self.tag_index.insert(new.as_str().to_string(), cell);
        }
        if let Some(state) = self.cells.get_mut(&cell) {
            state.tag.clone_from(&new_tag);
        }
        tracing::info!(
            %cell,
            old = old_tag.as_ref().map_or("", Tag::as_str),
            new = new_tag.as_ref().map_or("", Tag::as_str),
            "tag changed"
        );

        let consumers = self.graph.downstream_of(cell).unwrap_or_default();
        let mut report = self.propagate(consumers);
        report.absorb_retargeted(retargeted);
        Ok(report)
    }

    /// Delete a cell and rewrite every reference that named it
    ///
    /// A consumer that read a name from the deleted cell is rebound when
    /// exactly one other live cell exports that name; otherwise its reference
    /// keeps the deleted cell's short id and is reported as a conflict. The
    /// identifier is retired and never reissued.
    ///
    /// # Errors
    /// Returns [`DataflowError::UnknownCell`](crate::DataflowError::UnknownCell).
    pub fn rewrite_for_deletion(
        &mut self,
        cell: CellId,
    ) -> Result<PropagationReport, crate::DataflowError> {
        let removed = self
            .cells
            .get(&cell)
            .ok_or(crate::DataflowError::UnknownCell(cell))?;
        let removed_tag = removed.tag.clone();
        let consumers = self.downstream_of(cell);
        let exports: Vec<String> = self
            .graph
            .node(cell)
            .map(|node| node.exports.iter().cloned().collect())
            .unwrap_or_default();

        let rebound = self.rebind_consumers(cell, &consumers);
        let mut retargeted = self.retarget_edited(cell, removed_tag.as_ref(), None);
        retargeted.retain(|p| p.cell != cell);

        self.graph.remove_node(cell);
        self.registry.retire(cell);
        self.cells.shift_remove(&cell);
        self.pending.remove(&cell);
        if let Some(tag) = &removed_tag {
            self.tag_index.remove(tag.as_str());
        }
        for other in self.cells.values_mut() {
            other.upstream.retain(|c| *c != cell);
            other.downstream.retain(|c| *c != cell);
            other.stale_from.remove(&cell);
        }

        let mut needs_execution = Vec::new();
        for Rebinding {
            consumer,
            persistent,
            edges,
        } in rebound
        {
            for (producer, name) in edges {
                if let Err(err) = self.graph.add_edge(producer, consumer, &name) {
                    tracing::warn!(error = %err, %name, "cannot record rebound edge");
                }
            }
            if let Some(state) = self.cells.get_mut(&consumer) {
                state.persistent_code = Some(persistent);
            }
            needs_execution.push(consumer);
        }

        let mut affected: BTreeSet<CellId> = consumers.into_iter().collect();
        for name in &exports {
            for producer in self.graph.producers_of(name) {
                affected.extend(self.downstream_of(producer));
            }
        }
        let mut report = self.propagate(affected);
        for consumer in needs_execution {
            report.mark_needs_execution(consumer);
        }
        report.absorb_retargeted(retargeted);

        tracing::info!(
            %cell,
            patches = report.patches.len(),
            conflicts = report.conflicts.len(),
            "cell deleted"
        );
        Ok(report)
    }

    /// New persistent code for consumers whose reads of `deleted` have a
    /// unique replacement producer
    fn rebind_consumers(&self, deleted: CellId, consumers: &[CellId]) -> Vec<Rebinding> {
        let ctx = self.render_context();
        let mut rebound = Vec::new();

        for consumer in consumers {
            let Some(persistent) = self
                .cells
                .get(consumer)
                .and_then(|c| c.persistent_code.as_deref())
            else {
                continue;
            };

            let mut subs = Vec::new();
            let mut edges = Vec::new();
            for occurrence in parse_references(persistent) {
                if occurrence.reference_text().and_then(|r| ctx.resolve(r)) != Some(deleted) {
                    continue;
                }
                let others: Vec<CellId> = self
                    .graph
                    .producers_of(&occurrence.name)
                    .into_iter()
                    .filter(|p| *p != deleted && p != consumer && self.registry.is_live(*p))
                    .collect();
                let [replacement] = others.as_slice() else {
                    continue;
                };
                let Some(short) = self.registry.truncate(*replacement) else {
                    continue;
                };
                subs.push(Substitution::new(
                    occurrence.position(),
                    occurrence.name.clone(),
                    Some(short),
                ));
                edges.push((*replacement, occurrence.name));
            }
            if subs.is_empty() {
                continue;
            }

            match rewrite(persistent, &subs) {
                Ok(persistent) => rebound.push(Rebinding {
                    consumer: *consumer,
                    persistent,
                    edges,
                }),
                Err(err) => tracing::warn!(cell = %consumer, error = %err, "cannot rebind consumer"),
            }
        }
        rebound
    }

    fn validate_tag(&self, cell: CellId, tag: &Tag) -> Result<(), TagError> {
        if let Some(holder) = self.tag_index.get(tag.as_str()) {
            if *holder != cell {
                return Err(TagError::Collision {
                    tag: tag.as_str().to_string(),
                    holder: *holder,
                });
            }
        }
        // tokens that already resolve as an identifier must keep resolving to it
        if self.registry.resolve(tag.as_str()).is_some() {
            return Err(TagError::ShadowsIdentifier(tag.as_str().to_string()));
        }
        Ok(())
    }

    /// Rewrite tokens naming `cell` inside text that propagation cannot reach
    ///
    /// User-edited cells and cells without a successful run have no rendered
    /// form to refresh, but a token spelling a removed tag would dangle. Only
    /// those tokens are touched.
    fn retarget_edited(
        &mut self,
        cell: CellId,
        old_tag: Option<&Tag>,
        new_tag: Option<&Tag>,
    ) -> Vec<TextPatch> {
        let Some(short) = self.registry.truncate(cell).map(str::to_string) else {
            return Vec::new();
        };
        let target = new_tag.map_or(short.as_str(), Tag::as_str).to_string();
        let names_cell = |text: &str| {
            old_tag.is_some_and(|t| t.as_str() == text) || self.registry.resolve(text) == Some(cell)
        };

        let mut patches = Vec::new();
        for (id, state) in self
            .cells
            .iter()
            .filter(|(_, c)| c.is_user_edited() || c.persistent_code.is_none())
        {
            let subs: Vec<Substitution> = parse_references(&state.source)
                .iter()
                .filter(|o| o.reference_text().is_some_and(|r| r != target && names_cell(r)))
                .map(|o| Substitution::new(o.position(), o.name.clone(), Some(&target)))
                .collect();
            if subs.is_empty() {
                continue;
            }
            match rewrite(&state.source, &subs) {
                Ok(source) => patches.push(TextPatch { cell: *id, source }),
                Err(err) => tracing::warn!(cell = %id, error = %err, "cannot retarget edited cell"),
            }
        }

        for patch in &patches {
            if let Some(state) = self.cells.get_mut(&patch.cell) {
                state.source.clone_from(&patch.source);
            }
        }
        patches
    }
}
