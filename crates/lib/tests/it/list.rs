use std::{cell::RefCell, rc::Rc};

use wavestate::{Engine, OrderedList, StateObject, Value, list::ListError};

use crate::helpers::{Link, Pair, child, record, text};

fn message(text: &str) -> StateObject {
    let object = StateObject::new();
    object.set("text", text).unwrap();
    object
}

fn texts(list: &OrderedList) -> Vec<String> {
    list.members().iter().map(|m| text(m, "text")).collect()
}

#[test]
fn test_chat_scenario_replicates_in_order() {
    let source = Engine::new();
    let link = Link::new(&source);
    let replica = Engine::new();

    let messages = OrderedList::new(StateObject::new()).unwrap();
    source.set("messages", messages.object()).unwrap();

    let siblings = Rc::new(RefCell::new(Vec::new()));
    let log = siblings.clone();
    messages.set_insert_callback(move |member, next, _| {
        log.borrow_mut()
            .push((text(member, "text"), next.map(|n| text(n, "text"))));
    });

    let (a, b, c) = (message("A"), message("B"), message("C"));
    messages.insert_item(&a, None).unwrap();
    messages.insert_item(&b, None).unwrap();
    messages.insert_item(&c, Some(&b)).unwrap();
    assert_eq!(texts(&messages), vec!["A", "C", "B"]);
    assert_eq!(
        siblings.borrow().last(),
        Some(&("C".to_string(), Some("B".to_string())))
    );

    link.deliver(&replica);
    let mirror = OrderedList::new(child(replica.root(), "messages")).unwrap();
    assert_eq!(texts(&mirror), vec!["A", "C", "B"]);
}

#[test]
fn test_each_insert_is_one_delta() {
    let engine = Engine::new();
    let list = OrderedList::new(engine.create_object().unwrap()).unwrap();
    let sent = record(&engine);

    list.insert_item(&message("hello"), None).unwrap();
    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    // Position key on the list object, plus the new member's text.
    assert_eq!(sent[0].len(), 2);
    let list_id = list.object().id().unwrap();
    let position = list.entries()[0].0.clone();
    assert!(sent[0].contains_key(&format!("{list_id}.{position}")));
}

#[test]
fn test_move_is_one_delta() {
    let engine = Engine::new();
    let list = OrderedList::new(engine.create_object().unwrap()).unwrap();
    let (a, b) = (message("a"), message("b"));
    list.insert_item(&a, None).unwrap();
    list.insert_item(&b, None).unwrap();
    let sent = record(&engine);

    list.insert_item(&b, Some(&a)).unwrap();
    assert_eq!(texts(&list), vec!["b", "a"]);
    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 2);
    assert_eq!(sent[0].values().filter(|v| v.is_none()).count(), 1);
    assert!(b.is_managed());
}

#[test]
fn test_remote_listeners_track_inserts_and_removes() {
    let source = Engine::new();
    let link = Link::new(&source);
    let replica = Engine::new();

    let list = OrderedList::new(StateObject::new()).unwrap();
    source.set("list", list.object()).unwrap();
    link.deliver(&replica);
    let mirror = OrderedList::new(child(replica.root(), "list")).unwrap();

    // Members may arrive before their own keys within a delta, so record
    // identities and resolve them afterwards.
    let events = Rc::new(RefCell::new(Vec::new()));
    let inserts = events.clone();
    mirror.set_insert_callback(move |member, _, index| {
        inserts.borrow_mut().push(('+', member.id(), index));
    });
    let removes = events.clone();
    mirror.set_remove_callback(move |member, index| {
        removes.borrow_mut().push(('-', member.id(), index));
    });

    let (x, y) = (message("x"), message("y"));
    list.insert_item(&x, None).unwrap();
    link.deliver(&replica);
    list.insert_item(&y, Some(&x)).unwrap();
    link.deliver(&replica);
    list.remove_item(&x).unwrap();
    link.deliver(&replica);

    assert_eq!(texts(&mirror), vec!["y"]);
    assert_eq!(
        *events.borrow(),
        vec![
            ('+', x.id(), 0),
            ('+', y.id(), 0),
            ('-', x.id(), 1),
        ]
    );
}

#[test]
fn test_removed_members_leave_replica_table() {
    let source = Engine::new();
    let link = Link::new(&source);
    let replica = Engine::new();

    let list = OrderedList::new(StateObject::new()).unwrap();
    source.set("list", list.object()).unwrap();
    let member = message("gone soon");
    list.insert_item(&member, None).unwrap();
    link.deliver(&replica);
    assert_eq!(replica.object_count(), 3);
    let member_id = member.id().unwrap();

    list.remove_item(&member).unwrap();
    link.deliver(&replica);
    assert_eq!(source.object_count(), 2);
    assert_eq!(replica.object_count(), 2);
    assert!(replica.object(&member_id).is_none());
    assert!(child(replica.root(), "list").is_empty());
}

#[test]
fn test_concurrent_appends_converge() {
    let pair = Pair::new();
    let list = OrderedList::new(StateObject::new()).unwrap();
    pair.a.set("list", list.object()).unwrap();
    pair.sync();
    let mirror = OrderedList::new(child(pair.b.root(), "list")).unwrap();

    // Both replicas append without seeing each other's change.
    list.insert_item(&message("from a"), None).unwrap();
    mirror.insert_item(&message("from b"), None).unwrap();
    pair.sync();

    assert_eq!(list.len(), 2);
    assert_eq!(texts(&list), texts(&mirror));
    let keys = |l: &OrderedList| l.entries().into_iter().map(|(k, _)| k).collect::<Vec<_>>();
    assert_eq!(keys(&list), keys(&mirror));
}

#[test]
fn test_many_concurrent_inserts_converge() {
    let pair = Pair::new();
    let list = OrderedList::new(StateObject::new()).unwrap();
    pair.a.set("list", list.object()).unwrap();
    let anchor = message("anchor");
    list.insert_item(&anchor, None).unwrap();
    pair.sync();
    let mirror = OrderedList::new(child(pair.b.root(), "list")).unwrap();
    let mirror_anchor = mirror.get(0).unwrap();

    for round in 0..20 {
        list.insert_item(&message(&format!("a{round}")), Some(&anchor))
            .unwrap();
        mirror
            .insert_item(&message(&format!("b{round}")), Some(&mirror_anchor))
            .unwrap();
        pair.sync();
    }

    assert_eq!(list.len(), 41);
    assert_eq!(texts(&list), texts(&mirror));
    assert_eq!(texts(&list).last().map(String::as_str), Some("anchor"));
    let entries = list.entries();
    assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn test_remove_non_member_is_reported() {
    let engine = Engine::new();
    let list = OrderedList::new(engine.create_object().unwrap()).unwrap();
    let stranger = engine.create_object().unwrap();
    let err = list.remove_item(&stranger).unwrap_err();
    assert!(matches!(
        err,
        wavestate::Error::List(ListError::MemberNotFound { .. })
    ));
}

#[test]
fn test_list_ignores_plain_values() {
    let engine = Engine::new();
    let object = engine.create_object().unwrap();
    let list = OrderedList::new(object.clone()).unwrap();
    object.set("label", "not a member").unwrap();
    list.insert_item(&message("m"), None).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(object.get("label"), Some(Value::from("not a member")));
}
