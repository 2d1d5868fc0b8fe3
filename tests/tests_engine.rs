//! End-to-end reasoning scenarios driven through the public surface.

#![allow(clippy::unwrap_used)]

#[path = "helpers/mod.rs"]
mod helpers;

use std::time::Duration;

use cogent::EngineConfig;

use helpers::{
    DEADLINE, EventRecorder, start_engine, term, wait_for_absence, wait_for_fact, wait_until,
};

#[test]
fn test_modus_ponens_with_cascading_retraction() {
    let engine = start_engine(EngineConfig::default());
    engine
        .submit_source("(=> (human ?x) (mortal ?x))", 1.0, None)
        .unwrap();
    engine.submit_source("(human socrates)", 10.0, None).unwrap();

    let premise = wait_for_fact(&engine, "(human socrates)").expect("premise committed");
    let derived = wait_for_fact(&engine, "(mortal socrates)").expect("modus ponens fired");
    assert!(derived.support.contains(&premise.id));
    assert!((derived.priority - 9.5).abs() < 1e-9);
    assert!(derived.id.starts_with("fact-"));

    engine.retract_assertion(&premise.id);
    assert!(
        wait_for_absence(&engine, "(mortal socrates)"),
        "derived fact must follow its supporter out"
    );
    engine.stop();
}

#[test]
fn test_oriented_rewrite_derives_reduced_term() {
    let engine = start_engine(EngineConfig::default());
    engine.submit_source("(= (f a) b)", 5.0, None).unwrap();
    engine.submit_source("(P (f a))", 4.0, None).unwrap();

    let equality = wait_for_fact(&engine, "(= (f a) b)").expect("equality committed");
    let target = wait_for_fact(&engine, "(P (f a))").expect("target committed");
    let rewritten = wait_for_fact(&engine, "(P b)").expect("rewrite fired");
    assert!(rewritten.support.contains(&equality.id));
    assert!(rewritten.support.contains(&target.id));
    engine.stop();
}

#[test]
fn test_biconditional_fires_both_directions() {
    let engine = start_engine(EngineConfig::default());
    engine
        .submit_source("(<=> (p ?x) (q ?x))", 1.0, None)
        .unwrap();

    engine.submit_source("(p c)", 5.0, None).unwrap();
    assert!(wait_for_fact(&engine, "(q c)").is_some(), "forward direction");

    engine.submit_source("(q d)", 5.0, None).unwrap();
    assert!(wait_for_fact(&engine, "(p d)").is_some(), "backward direction");
    engine.stop();
}

#[test]
fn test_duplicate_rejected_but_opposite_polarity_stored() {
    let engine = start_engine(EngineConfig::default());
    engine.submit_source("(color red)", 1.0, None).unwrap();
    wait_for_fact(&engine, "(color red)").expect("first committed");

    let rejections_before = engine
        .counters()
        .rejections
        .load(std::sync::atomic::Ordering::Relaxed);
    engine.submit_source("(color red)", 2.0, None).unwrap();
    assert!(
        wait_until(DEADLINE, || {
            engine
                .counters()
                .rejections
                .load(std::sync::atomic::Ordering::Relaxed)
                > rejections_before
        }),
        "resubmission must be rejected"
    );
    assert_eq!(engine.kb().find_instances(&term("(color ?x)")).len(), 1);

    engine.submit_source("(not (color red))", 1.0, None).unwrap();
    assert!(
        wait_for_fact(&engine, "(not (color red))").is_some(),
        "opposite polarity is a different assertion"
    );
    engine.stop();
}

#[test]
fn test_trivial_submissions_never_stored() {
    let engine = start_engine(EngineConfig::default());
    engine.submit_source("(= x x)", 1.0, None).unwrap();
    engine.submit_source("(instance foo foo)", 1.0, None).unwrap();
    engine.submit_source("(not (= y y))", 1.0, None).unwrap();
    // A sentinel fact proves the pipeline drained past the trivia.
    engine.submit_source("(sentinel ok)", 1.0, None).unwrap();
    wait_for_fact(&engine, "(sentinel ok)").expect("sentinel committed");
    assert_eq!(engine.kb().len(), 1);
    engine.stop();
}

#[test]
fn test_eviction_drops_lowest_priority_and_reports_it() {
    let engine = start_engine(EngineConfig {
        kb_capacity: 3,
        ..EngineConfig::default()
    });
    let recorder = EventRecorder::attach(&engine);

    engine.submit_source("(fact one)", 1.0, None).unwrap();
    wait_for_fact(&engine, "(fact one)").expect("first committed");
    let low_id = engine.kb().find_instances(&term("(fact one)"))[0].id.clone();
    engine.submit_source("(fact two)", 2.0, None).unwrap();
    engine.submit_source("(fact three)", 3.0, None).unwrap();
    wait_for_fact(&engine, "(fact three)").expect("kb at capacity");

    engine.submit_source("(fact four)", 4.0, None).unwrap();
    wait_for_fact(&engine, "(fact four)").expect("new fact committed");

    assert_eq!(engine.kb().len(), 3);
    assert!(wait_for_absence(&engine, "(fact one)"), "lowest priority evicted");
    assert!(
        wait_until(DEADLINE, || recorder.contains(&format!("evict {low_id}"))),
        "evict event names the victim"
    );
    engine.stop();
}

#[test]
fn test_retract_by_note_removes_all_note_assertions() {
    let engine = start_engine(EngineConfig::default());
    engine.submit_source("(p a) (p b)", 1.0, Some("note-1")).unwrap();
    engine.submit_source("(p c)", 1.0, Some("note-2")).unwrap();
    wait_for_fact(&engine, "(p a)").unwrap();
    wait_for_fact(&engine, "(p b)").unwrap();
    wait_for_fact(&engine, "(p c)").unwrap();

    assert_eq!(engine.retract_note("note-1"), 2);
    assert!(wait_for_absence(&engine, "(p a)"));
    assert!(wait_for_absence(&engine, "(p b)"));
    assert!(wait_for_fact(&engine, "(p c)").is_some(), "other note untouched");
    engine.stop();
}

#[test]
fn test_derived_facts_inherit_note_provenance() {
    let engine = start_engine(EngineConfig::default());
    engine
        .submit_source("(=> (human ?x) (mortal ?x))", 1.0, None)
        .unwrap();
    engine
        .submit_source("(human hypatia)", 5.0, Some("note-9"))
        .unwrap();
    let derived = wait_for_fact(&engine, "(mortal hypatia)").expect("derived");
    assert_eq!(derived.source_note_id.as_deref(), Some("note-9"));

    // Retracting the note takes the derivation with it.
    assert!(engine.retract_note("note-9") >= 1);
    assert!(wait_for_absence(&engine, "(mortal hypatia)"));
    engine.stop();
}

#[test]
fn test_pause_holds_commits_until_resume() {
    let engine = start_engine(EngineConfig::default());
    engine.pause();
    // Let the workers park at the gate.
    std::thread::sleep(Duration::from_millis(200));

    engine.submit_source("(p a)", 1.0, None).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert!(engine.kb().is_empty(), "paused engine must not commit");

    engine.resume();
    assert!(wait_for_fact(&engine, "(p a)").is_some());
    engine.stop();
}

#[test]
fn test_rule_added_after_facts_still_fires() {
    let engine = start_engine(EngineConfig::default());
    engine.submit_source("(human turing)", 5.0, None).unwrap();
    wait_for_fact(&engine, "(human turing)").unwrap();

    engine
        .submit_source("(=> (human ?x) (mortal ?x))", 1.0, None)
        .unwrap();
    assert!(
        wait_for_fact(&engine, "(mortal turing)").is_some(),
        "new rules scan the existing KB"
    );
    engine.stop();
}

#[test]
fn test_conjunctive_antecedent_joins_two_facts() {
    let engine = start_engine(EngineConfig::default());
    engine
        .submit_source(
            "(=> (and (parent ?x ?y) (parent ?y ?z)) (grandparent ?x ?z))",
            1.0,
            None,
        )
        .unwrap();
    engine.submit_source("(parent tom bob)", 8.0, None).unwrap();
    engine.submit_source("(parent bob ann)", 6.0, None).unwrap();

    let derived = wait_for_fact(&engine, "(grandparent tom ann)").expect("join fired");
    assert_eq!(derived.support.len(), 2);
    engine.stop();
}

#[test]
fn test_skolemized_existential_feeds_rules() {
    let engine = start_engine(EngineConfig::default());
    engine
        .submit_source("(=> (loves ?x ?y) (knows ?x ?y))", 1.0, None)
        .unwrap();
    engine
        .submit_source("(exists (?x) (loves ?x mary))", 5.0, None)
        .unwrap();

    let derived = wait_for_fact(&engine, "(knows ?a mary)").expect("skolemized fact fired rule");
    let Some(items) = derived.kif.items() else {
        panic!("derived fact must be a list");
    };
    assert!(items[1].to_string().starts_with("skolem_x_"));
    engine.stop();
}
