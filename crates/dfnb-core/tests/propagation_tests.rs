//! Reference propagation tests
//!
//! End-to-end runs through the toy engine: redefinitions, tags and
//! deletions rewriting the displayed text of consuming cells.

use dfnb_core::prelude::*;
use dfnb_core::{ConflictReason, TagError};
use dfnb_test_utils::{notebook, short, source, ToyEngine};
use pretty_assertions::assert_eq;

/// `a=9`, `b=a+9`, `a=99` with the first two executed
fn redefinition_notebook() -> (Coordinator, Vec<CellId>, ToyEngine) {
    let (mut nb, cells) = notebook(&["a=9", "b=a+9", "a=99"]);
    let engine = ToyEngine::new();
    engine.run_all(&mut nb, &cells[..2]);
    (nb, cells, engine)
}

#[test]
fn test_unique_producer_stays_bare() {
    let (nb, cells, _engine) = redefinition_notebook();

    assert_eq!(source(&nb, cells[1]), "b=a+9");
    assert_eq!(nb.upstream_of(cells[1]), vec![cells[0]]);
    assert_eq!(
        nb.cell(cells[1]).unwrap().persistent_code(),
        Some(format!("b=a${}+9", short(&nb, cells[0])).as_str())
    );
}

#[test]
fn test_redefinition_makes_reference_explicit() {
    let (mut nb, cells, engine) = redefinition_notebook();
    let first = short(&nb, cells[0]);

    let IngestOutcome::Applied(summary) = engine.run(&mut nb, cells[2]) else {
        panic!("redefinition should apply");
    };

    let expected = format!("b=a${first}+9");
    assert_eq!(summary.propagation.patch_for(cells[1]), Some(expected.as_str()));
    assert_eq!(source(&nb, cells[1]), expected);
    // the consumer still reads from the first producer
    assert_eq!(nb.upstream_of(cells[1]), vec![cells[0]]);
}

#[test]
fn test_tag_replaces_short_id_and_removal_restores_it() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);

    let report = nb.rewrite_for_tag_change(cells[0], "testTag").unwrap();
    assert_eq!(report.patch_for(cells[1]), Some("b=a$testTag+9"));
    assert_eq!(source(&nb, cells[1]), "b=a$testTag+9");

    let report = nb.rewrite_for_tag_change(cells[0], "").unwrap();
    let expected = format!("b=a${}+9", short(&nb, cells[0]));
    assert_eq!(report.patch_for(cells[1]), Some(expected.as_str()));
    assert_eq!(nb.tag_holder("testTag"), None);
}

#[test]
fn test_renaming_tag_rewrites_consumers() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);
    nb.rewrite_for_tag_change(cells[0], "old").unwrap();

    nb.rewrite_for_tag_change(cells[0], "new").unwrap();
    assert_eq!(source(&nb, cells[1]), "b=a$new+9");
    assert_eq!(nb.tag_holder("old"), None);
    assert_eq!(nb.tag_holder("new"), Some(cells[0]));
}

#[test]
fn test_deleting_competing_producer_restores_bare_name() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);
    nb.rewrite_for_tag_change(cells[0], "testTag").unwrap();

    let report = engine.delete(&mut nb, cells[2]);
    assert_eq!(report.patch_for(cells[1]), Some("b=a+9"));

    engine.run(&mut nb, cells[0]);
    assert_eq!(source(&nb, cells[1]), "b=a+9");
    assert!(nb.cell(cells[2]).is_none());
}

#[test]
fn test_deletion_rebinds_to_sole_remaining_producer() {
    let (mut nb, cells) = notebook(&["a=1", "a=2", "b=a"]);
    let engine = ToyEngine::new();
    engine.run_all(&mut nb, &cells);

    let second = short(&nb, cells[1]);
    assert_eq!(source(&nb, cells[2]), format!("b=a${second}"));

    let report = engine.delete(&mut nb, cells[1]);
    assert_eq!(source(&nb, cells[2]), "b=a");
    assert_eq!(nb.upstream_of(cells[2]), vec![cells[0]]);
    assert!(report.needs_execution.contains(&cells[2]));
    assert!(report.conflicts.is_empty());
}

#[test]
fn test_deleting_only_producer_keeps_short_id() {
    let (mut nb, cells) = notebook(&["a=1", "b=a"]);
    let engine = ToyEngine::new();
    engine.run_all(&mut nb, &cells);
    let producer = short(&nb, cells[0]);

    let report = engine.delete(&mut nb, cells[0]);

    assert_eq!(source(&nb, cells[1]), format!("b=a${producer}"));
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].reason, ConflictReason::ProducerDeleted);
    assert_eq!(report.conflicts[0].reference, producer);

    // the retired short id is never handed out again
    let fresh = nb.create_cell("c=1");
    assert_ne!(short(&nb, fresh), producer);
    assert!(nb.insert_cell(cells[0], "a=1").is_err());
}

#[test]
fn test_edited_consumer_is_not_patched() {
    let (mut nb, cells, engine) = redefinition_notebook();
    nb.edit_cell(cells[1], "b=a+10").unwrap();

    let IngestOutcome::Applied(summary) = engine.run(&mut nb, cells[2]) else {
        panic!("redefinition should apply");
    };

    assert_eq!(source(&nb, cells[1]), "b=a+10");
    assert_eq!(summary.propagation.patch_for(cells[1]), None);
    assert!(summary.propagation.needs_execution.contains(&cells[1]));
}

#[test]
fn test_tag_collision_is_rejected() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);
    nb.rewrite_for_tag_change(cells[0], "shared").unwrap();
    let before = source(&nb, cells[1]);

    let result = nb.rewrite_for_tag_change(cells[2], "shared");
    assert!(matches!(
        result,
        Err(DataflowError::Tag(TagError::Collision { holder, .. })) if holder == cells[0]
    ));
    assert_eq!(source(&nb, cells[1]), before);
    assert!(nb.cell(cells[2]).unwrap().tag().is_none());
}

#[test]
fn test_invalid_tag_is_rejected() {
    let (mut nb, cells, _engine) = redefinition_notebook();

    for bad in ["1st", "has space", "a$b"] {
        let result = nb.rewrite_for_tag_change(cells[0], bad);
        assert!(matches!(result, Err(DataflowError::Tag(TagError::Invalid(_)))), "{bad}");
    }
    assert!(nb.cell(cells[0]).unwrap().tag().is_none());
}

#[test]
fn test_tag_may_not_spell_a_short_id() {
    let mut nb = Coordinator::new();
    let lettered: CellId = "abcdef0123456789abcdef0123456789".parse().unwrap();
    nb.insert_cell(lettered, "a=1").unwrap();
    let other = nb.create_cell("b=2");

    let result = nb.rewrite_for_tag_change(other, "abcdef01");
    assert!(matches!(
        result,
        Err(DataflowError::Tag(TagError::ShadowsIdentifier(_)))
    ));
}

#[test]
fn test_propagation_is_idempotent() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);
    nb.rewrite_for_tag_change(cells[0], "testTag").unwrap();

    nb.refresh_all();
    let again = nb.refresh_all();
    assert!(again.is_empty(), "{again:?}");
    assert_eq!(source(&nb, cells[1]), "b=a$testTag+9");
}

#[test]
fn test_explicit_reference_survives_reexecution() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);
    let first = short(&nb, cells[0]);

    engine.run(&mut nb, cells[1]);

    assert_eq!(source(&nb, cells[1]), format!("b=a${first}+9"));
    assert_eq!(nb.upstream_of(cells[1]), vec![cells[0]]);
}

#[test]
fn test_bare_reexecution_binds_latest_producer() {
    let (mut nb, cells, engine) = redefinition_notebook();
    engine.run(&mut nb, cells[2]);
    nb.edit_cell(cells[1], "b=a+9").unwrap();

    engine.run(&mut nb, cells[1]);

    let latest = short(&nb, cells[2]);
    assert_eq!(source(&nb, cells[1]), format!("b=a${latest}+9"));
    assert_eq!(nb.upstream_of(cells[1]), vec![cells[2]]);
    assert!(nb.downstream_of(cells[0]).is_empty());
}

#[test]
fn test_downstream_redefinition_pins_bare_reader() {
    let (mut nb, cells) = notebook(&["a=9", "b=a+9", "a=b*2"]);
    let engine = ToyEngine::new();
    engine.run_all(&mut nb, &cells);
    let first = short(&nb, cells[0]);

    // the new producer reads from the consumer, so it is not upstream of it
    assert_eq!(nb.upstream_of(cells[2]), vec![cells[1]]);
    assert_eq!(source(&nb, cells[1]), format!("b=a${first}+9"));

    engine.run(&mut nb, cells[1]);
    assert_eq!(nb.upstream_of(cells[1]), vec![cells[0]]);
}

#[test]
fn test_tag_changes_reach_unexecuted_cells() {
    let (mut nb, cells) = notebook(&["a=9", "a=99"]);
    let engine = ToyEngine::new();
    engine.run_all(&mut nb, &cells);
    nb.rewrite_for_tag_change(cells[0], "testTag").unwrap();
    let reader = nb.create_cell("b=a$testTag+9");
    let first = short(&nb, cells[0]);

    let report = nb.rewrite_for_tag_change(cells[0], "").unwrap();
    let by_id = format!("b=a${first}+9");
    assert_eq!(report.patch_for(reader), Some(by_id.as_str()));
    assert!(report.needs_execution.contains(&reader));

    nb.rewrite_for_tag_change(cells[0], "other").unwrap();
    assert_eq!(source(&nb, reader), "b=a$other+9");

    let IngestOutcome::Applied(_) = engine.run(&mut nb, reader) else {
        panic!("retagged reference should resolve");
    };
    assert_eq!(nb.upstream_of(reader), vec![cells[0]]);
}

#[test]
fn test_deleting_tagged_cell_retargets_unexecuted_reader() {
    let (mut nb, cells) = notebook(&["a=1", "a=2"]);
    let engine = ToyEngine::new();
    engine.run_all(&mut nb, &cells);
    nb.rewrite_for_tag_change(cells[0], "first").unwrap();
    let reader = nb.create_cell("b=a$first");
    let retired = short(&nb, cells[0]);

    let report = engine.delete(&mut nb, cells[0]);

    let expected = format!("b=a${retired}");
    assert_eq!(report.patch_for(reader), Some(expected.as_str()));
    assert_eq!(source(&nb, reader), expected);
    assert!(report.needs_execution.contains(&reader));
    assert_eq!(nb.tag_holder("first"), None);
}

#[test]
fn test_tag_may_not_spell_an_identifier_prefix() {
    let mut nb = Coordinator::new();
    let lettered: CellId = "abcdef0123456789abcdef0123456789".parse().unwrap();
    nb.insert_cell(lettered, "a=1").unwrap();
    let other = nb.create_cell("b=2");

    for shadowing in ["abcdef0123", "abcdef0123456789abcdef0123456789"] {
        let result = nb.rewrite_for_tag_change(other, shadowing);
        assert!(
            matches!(result, Err(DataflowError::Tag(TagError::ShadowsIdentifier(_)))),
            "{shadowing}"
        );
    }
    assert!(nb.cell(other).unwrap().tag().is_none());
}
