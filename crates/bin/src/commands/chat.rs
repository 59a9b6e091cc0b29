//! Chat demo - two replicas sharing an ordered list over a loopback transport.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use serde::Serialize;
use tracing::info;
use wavestate::{Engine, EngineConfig, FlatDelta, OrderedList, StateObject, Value};

use crate::cli::ChatArgs;
use crate::output::{OutputFormat, print_json, print_table, printable_key};

/// One direction of the loopback: deltas flushed by an engine wait here.
type Queue = Rc<RefCell<VecDeque<FlatDelta>>>;

fn attach(from: &Engine) -> wavestate::Result<Queue> {
    let queue: Queue = Rc::default();
    let sink = queue.clone();
    from.set_sink(move |delta| {
        sink.borrow_mut().push_back(delta.clone());
        Ok(())
    })?;
    Ok(queue)
}

/// Delivers every queued delta to `to`. Returns how many were delivered.
fn relay(queue: &Queue, to: &Engine) -> wavestate::Result<usize> {
    let mut delivered = 0;
    loop {
        let next = queue.borrow_mut().pop_front();
        let Some(delta) = next else {
            return Ok(delivered);
        };
        let report = to.receive_flat_delta(&delta)?;
        for (key, err) in &report.failures {
            tracing::warn!(flat_key = %key, error = %err, "Replica rejected value");
        }
        delivered += 1;
    }
}

#[derive(Debug, PartialEq, Serialize)]
struct MessageRow {
    position: String,
    author: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct ReplicaReport {
    name: &'static str,
    messages: Vec<MessageRow>,
}

#[derive(Debug, Serialize)]
struct ChatReport {
    deltas: usize,
    converged: bool,
    replicas: Vec<ReplicaReport>,
}

fn field(object: &StateObject, key: &str) -> String {
    object
        .get(key)
        .and_then(|value| value.as_text().map(str::to_string))
        .unwrap_or_default()
}

fn report(name: &'static str, list: &OrderedList) -> ReplicaReport {
    let messages = list
        .entries()
        .iter()
        .map(|(position, member)| MessageRow {
            position: position.clone(),
            author: field(member, "author"),
            text: field(member, "text"),
        })
        .collect();
    ReplicaReport { name, messages }
}

/// Run the chat command
pub fn run(args: &ChatArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::default().with_id_length(args.id_length);
    let alice = Engine::builder().config(config.clone()).build()?;
    let bob = Engine::builder().config(config).build()?;
    let to_bob = attach(&alice)?;
    let to_alice = attach(&bob)?;

    let list = OrderedList::new(StateObject::new())?;
    alice.set("messages", list.object())?;
    let mut deltas = relay(&to_bob, &bob)?;
    let mirror = match bob.get("messages") {
        Some(Value::Local(object)) => OrderedList::new(object)?,
        _ => return Err("replica did not receive the message list".into()),
    };

    for (i, text) in args.messages.iter().enumerate() {
        let (target, author) = if args.alternate && i % 2 == 1 {
            (&mirror, "bob")
        } else {
            (&list, "alice")
        };
        let message = StateObject::new();
        message.set("author", author)?;
        message.set("text", text.as_str())?;
        let sibling = if args.prepend { target.get(0) } else { None };
        target.insert_item(&message, sibling.as_ref())?;

        deltas += relay(&to_bob, &bob)?;
        deltas += relay(&to_alice, &alice)?;
    }

    let replicas = vec![report("alice", &list), report("bob", &mirror)];
    let converged = replicas[0].messages == replicas[1].messages;
    info!(deltas, converged, "Chat replicated");
    let chat = ChatReport {
        deltas,
        converged,
        replicas,
    };

    match format {
        OutputFormat::Human => {
            for replica in &chat.replicas {
                println!("{}:", replica.name);
                let rows: Vec<Vec<String>> = replica
                    .messages
                    .iter()
                    .enumerate()
                    .map(|(i, m)| {
                        vec![
                            i.to_string(),
                            printable_key(&m.position),
                            m.author.clone(),
                            m.text.clone(),
                        ]
                    })
                    .collect();
                print_table(&["#", "POSITION", "AUTHOR", "TEXT"], &rows);
                println!();
            }
            println!(
                "Relayed {} deltas; replicas {}",
                chat.deltas,
                if chat.converged { "converged" } else { "diverged" }
            );
        }
        OutputFormat::Json => print_json(&chat)?,
    }

    Ok(())
}
