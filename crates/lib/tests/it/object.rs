use std::{cell::RefCell, rc::Rc};

use wavestate::{Engine, StateObject, Value, object::KeyHandler};

use crate::helpers::{Link, record};

#[test]
fn test_reference_lifecycle_on_engine() {
    let engine = Engine::new();
    let a = engine.create_object().unwrap();
    let b = StateObject::new();
    let c = StateObject::new();
    b.set("child", &c).unwrap();
    c.set("name", "c").unwrap();

    a.set("x", &b).unwrap();
    assert_eq!(b.reference_count(), 1);
    assert!(b.is_managed() && c.is_managed());

    a.set("x", Value::Null).unwrap();
    assert_eq!(b.reference_count(), 0);
    assert!(b.is_empty() && c.is_empty());
    assert!(!b.is_managed() && !c.is_managed());
    assert_eq!(engine.object_count(), 2);
}

#[test]
fn test_shared_reference_survives_partial_release() {
    let engine = Engine::new();
    let shared = StateObject::new();
    shared.set("v", "1").unwrap();
    engine.set("left", &shared).unwrap();
    engine.set("right", &shared).unwrap();
    assert_eq!(shared.reference_count(), 2);

    engine.set("left", Value::Null).unwrap();
    assert_eq!(shared.reference_count(), 1);
    assert_eq!(shared.get("v"), Some(Value::from("1")));
    assert!(shared.is_managed());
}

#[test]
fn test_destroyed_object_can_be_reregistered() {
    let engine = Engine::new();
    let object = StateObject::new();
    object.set("k", "v").unwrap();
    engine.set("o", &object).unwrap();
    let id = object.id().unwrap();

    engine.set("o", Value::Null).unwrap();
    assert!(!object.is_managed());
    assert!(engine.object(&id).is_none());

    object.set("k", "again").unwrap();
    engine.set("o", &object).unwrap();
    assert!(object.is_managed());
    assert_eq!(object.id(), Some(id.clone()));
    assert!(engine.object(&id).is_some());
}

#[test]
fn test_root_cannot_be_destroyed() {
    let engine = Engine::new();
    let err = engine.root().destroy().unwrap_err();
    assert!(err.is_usage_error());
    assert_eq!(err.module(), "object");
}

#[test]
fn test_local_render_precedes_transport() {
    let engine = Engine::new();
    let sent = record(&engine);
    let seen_before_send = Rc::new(RefCell::new(Vec::new()));
    let log = seen_before_send.clone();
    let sent_so_far = sent.clone();
    let handler: KeyHandler = Rc::new(move |value: &Value| {
        log.borrow_mut().push((value.to_string(), sent_so_far.borrow().len()));
    });
    engine.set_key_handlers([("status", handler)]);

    engine.set("status", "busy").unwrap();
    assert_eq!(*seen_before_send.borrow(), vec![("busy".to_string(), 0)]);
    assert_eq!(sent.borrow().len(), 1);
}

#[test]
fn test_remote_updates_fire_handlers_with_previous() {
    let source = Engine::new();
    let link = Link::new(&source);
    let replica = Engine::new();

    let changes = Rc::new(RefCell::new(Vec::new()));
    let log = changes.clone();
    replica.set_key_value_handler(move |key, value, previous| {
        log.borrow_mut()
            .push(format!("{key}: {previous} -> {value}"));
    });

    source.set("mode", "draft").unwrap();
    source.set("mode", "final").unwrap();
    source.set("mode", Value::Null).unwrap();
    link.deliver(&replica);

    assert_eq!(
        *changes.borrow(),
        vec!["mode: null -> draft", "mode: draft -> final", "mode: final -> null"]
    );
}

#[test]
fn test_key_handler_registration_replays_current_value() {
    let source = Engine::new();
    let link = Link::new(&source);
    let replica = Engine::new();
    source.set("title", "hello").unwrap();
    link.deliver(&replica);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let handler: KeyHandler = Rc::new(move |value: &Value| log.borrow_mut().push(value.clone()));
    replica.set_key_handlers([("title", handler)]);
    assert_eq!(*seen.borrow(), vec![Value::from("hello")]);
}
