use wavestate::{Engine, Participant, Roster, StateObject, Value, engine::EngineError};

use crate::helpers::{Link, record};

fn roster_with(ids: &[&str]) -> Roster {
    let roster = Roster::new();
    let participants: Vec<Participant> = ids.iter().map(|id| Participant::new(*id)).collect();
    roster.receive_participants(&participants).unwrap();
    roster
}

#[test]
fn test_foreign_reference_encodes_with_participant_marker() {
    let roster = roster_with(&["joe@example.com"]);
    let engine = Engine::new();
    engine.set_foreign_engine(roster.engine()).unwrap();
    let sent = record(&engine);

    let joe = roster.participant("joe@example.com").unwrap();
    let note = StateObject::new();
    note.set("author", Value::foreign(&joe)).unwrap();
    engine.set("note", &note).unwrap();

    let id = note.id().unwrap();
    assert_eq!(
        sent.borrow()[0][&format!("{id}.author")],
        Some("pjoe@example.com".to_string())
    );
    // Foreign references do not count towards the participant's lifetime.
    assert_eq!(joe.reference_count(), 1);
}

#[test]
fn test_foreign_reference_resolves_on_replica() {
    let source_roster = roster_with(&["ann", "bob"]);
    let replica_roster = roster_with(&["ann", "bob"]);
    let source = Engine::new();
    source.set_foreign_engine(source_roster.engine()).unwrap();
    let replica = Engine::new();
    replica.set_foreign_engine(replica_roster.engine()).unwrap();
    let link = Link::new(&source);

    source
        .set("turn", Value::foreign(&source_roster.participant("bob").unwrap()))
        .unwrap();
    link.deliver(&replica);

    let bob = replica_roster.participant("bob").unwrap();
    let resolved = replica.get("turn").unwrap();
    assert!(resolved.as_object().is_some_and(|o| o.ptr_eq(&bob)));
    assert_eq!(resolved, Value::foreign(&bob));
}

#[test]
fn test_unknown_participant_is_a_decode_error() {
    let roster = roster_with(&["ann"]);
    let engine = Engine::new();
    engine.set_foreign_engine(roster.engine()).unwrap();

    let err = engine
        .receive_flat_value(".turn", Some("pghost"))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        wavestate::Error::Engine(EngineError::UnresolvedForeign { ref id }) if id == "ghost"
    ));
    assert!(engine.get("turn").is_none());
    assert!(roster.participant("ghost").is_none());
}

#[test]
fn test_reference_kind_must_match_owner() {
    let roster = roster_with(&["ann"]);
    let engine = Engine::new();
    engine.set_foreign_engine(roster.engine()).unwrap();
    let ann = roster.participant("ann").unwrap();

    let err = engine.set("who", &ann).unwrap_err();
    assert!(err.is_usage_error());

    let local = engine.create_object().unwrap();
    let err = engine.set("who", Value::foreign(&local)).unwrap_err();
    assert!(err.is_usage_error());
    assert!(engine.get("who").is_none());
}

#[test]
fn test_foreign_reference_without_roster_fails() {
    let roster = roster_with(&["ann"]);
    let engine = Engine::new();
    let ann = roster.participant("ann").unwrap();
    let err = engine.set("who", Value::foreign(&ann)).unwrap_err();
    assert!(matches!(
        err,
        wavestate::Error::Engine(EngineError::NoForeignEngine)
    ));
}

#[test]
fn test_roster_field_updates_reach_observers() {
    let roster = Roster::new();
    roster
        .receive_participants(&[Participant::new("ann").with_display_name("Ann")])
        .unwrap();
    let ann = roster.participant("ann").unwrap();

    roster
        .receive_participants(&[Participant::new("ann")])
        .unwrap();
    assert!(!ann.contains_key("displayName"));
    assert_eq!(
        roster.participants(),
        vec![Participant::new("ann")]
    );
}
