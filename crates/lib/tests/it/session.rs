use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use wavestate::{Engine, EngineConfig, OrderedList, Participant, Session, StateObject, Value};

use crate::helpers::{Link, child, text};

#[test]
fn test_ready_callback_sees_both_feeds() {
    let session = Session::new().unwrap();
    let seen = Rc::new(RefCell::new(None));
    let slot = seen.clone();
    session.on_ready(move |state, roster| {
        *slot.borrow_mut() = Some((state.get("topic"), roster.participants().len()));
    });

    let snapshot = BTreeMap::from([(".topic".to_string(), " standup".to_string())]);
    session.receive_state(&snapshot).unwrap();
    assert!(seen.borrow().is_none());

    session
        .receive_participants(&[Participant::new("ann"), Participant::new("bob")])
        .unwrap();
    assert_eq!(*seen.borrow(), Some((Some(Value::from("standup")), 2)));
}

#[test]
fn test_host_round_trip_through_snapshots() {
    // The host keeps one flat map and hands each session the full map.
    let writer = Session::new().unwrap();
    let reader = Session::new().unwrap();
    for session in [&writer, &reader] {
        session
            .receive_participants(&[Participant::new("ann")])
            .unwrap();
    }

    let host_state: Rc<RefCell<BTreeMap<String, String>>> = Rc::default();
    let host = host_state.clone();
    writer
        .state()
        .set_sink(move |delta| {
            let mut host = host.borrow_mut();
            for (key, value) in delta {
                match value {
                    Some(value) => host.insert(key.clone(), value.clone()),
                    None => host.remove(key),
                };
            }
            Ok(())
        })
        .unwrap();

    let ann = writer.roster().participant("ann").unwrap();
    let messages = OrderedList::new(StateObject::new()).unwrap();
    writer.state().set("messages", messages.object()).unwrap();
    for body in ["hi", "hello", "bye"] {
        let msg = StateObject::new();
        msg.set("body", body).unwrap();
        msg.set("author", Value::foreign(&ann)).unwrap();
        messages.insert_item(&msg, None).unwrap();
    }
    reader.receive_state(&host_state.borrow()).unwrap();

    let mirror = OrderedList::new(child(reader.state().root(), "messages")).unwrap();
    let bodies: Vec<String> = mirror.members().iter().map(|m| text(m, "body")).collect();
    assert_eq!(bodies, vec!["hi", "hello", "bye"]);
    let reader_ann = reader.roster().participant("ann").unwrap();
    assert_eq!(
        mirror.get(0).unwrap().get("author"),
        Some(Value::foreign(&reader_ann))
    );

    messages.remove_item(&messages.get(1).unwrap()).unwrap();
    reader.receive_state(&host_state.borrow()).unwrap();
    assert_eq!(mirror.len(), 2);
}

#[test]
fn test_session_with_throttled_engine() {
    let session = Session::with_config(EngineConfig::default().with_throttle_delay_ms(30)).unwrap();
    assert_eq!(session.state().config().throttle_delay_ms, Some(30));
    assert!(session
        .state()
        .foreign_engine()
        .is_some_and(|f| f.ptr_eq(session.roster().engine())));
}

#[test]
fn test_session_around_existing_engine() {
    let engine = Engine::new();
    let source = Engine::new();
    let link = Link::new(&source);
    source.set("k", "v").unwrap();
    link.deliver(&engine);

    let session = Session::with_engine(engine).unwrap();
    assert_eq!(session.state().get("k"), Some(Value::from("v")));
    assert!(!session.is_ready());
}
