use std::{cell::RefCell, collections::VecDeque, rc::Rc, sync::Arc};

use wavestate::{DeltaReport, Engine, EngineConfig, FixedClock, FlatDelta, StateObject, Value};

// ==========================
// TRANSPORT HELPERS
// ==========================

/// Captures every delta an engine flushes.
pub fn record(engine: &Engine) -> Rc<RefCell<Vec<FlatDelta>>> {
    let sent = Rc::new(RefCell::new(Vec::new()));
    let log = sent.clone();
    engine
        .set_sink(move |delta| {
            log.borrow_mut().push(delta.clone());
            Ok(())
        })
        .expect("Failed to attach sink");
    sent
}

/// One direction of an in-memory transport.
///
/// Deltas flushed by the source engine queue up until [`Link::deliver`]
/// hands them to the destination.
pub struct Link {
    queue: Rc<RefCell<VecDeque<FlatDelta>>>,
}

impl Link {
    pub fn new(from: &Engine) -> Self {
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        let sink_queue = queue.clone();
        from.set_sink(move |delta| {
            sink_queue.borrow_mut().push_back(delta.clone());
            Ok(())
        })
        .expect("Failed to attach link");
        Self { queue }
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Delivers every queued delta to `to`, returning the reports.
    pub fn deliver(&self, to: &Engine) -> Vec<DeltaReport> {
        let mut reports = Vec::new();
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(delta) = next else { break };
            let report = to
                .receive_flat_delta(&delta)
                .expect("Failed to apply delta");
            assert!(report.is_clean(), "decode failures: {:?}", report.failures);
            reports.push(report);
        }
        reports
    }
}

/// Two engines linked in both directions.
pub struct Pair {
    pub a: Engine,
    pub b: Engine,
    a_to_b: Link,
    b_to_a: Link,
}

impl Pair {
    pub fn new() -> Self {
        let a = Engine::new();
        let b = Engine::new();
        let a_to_b = Link::new(&a);
        let b_to_a = Link::new(&b);
        Self { a, b, a_to_b, b_to_a }
    }

    /// Delivers queued deltas both ways until neither side has anything left.
    pub fn sync(&self) {
        while self.a_to_b.pending() > 0 || self.b_to_a.pending() > 0 {
            self.a_to_b.deliver(&self.b);
            self.b_to_a.deliver(&self.a);
        }
    }
}

// ==========================
// ENGINE FACTORIES
// ==========================

/// An engine with a throttle delay on a hand-driven clock.
pub fn throttled_engine(delay_ms: u64) -> (Engine, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(10_000));
    let engine = Engine::builder()
        .config(EngineConfig::default().with_throttle_delay_ms(delay_ms))
        .clock(clock.clone())
        .build()
        .expect("Failed to build throttled engine");
    (engine, clock)
}

// ==========================
// ASSERTION HELPERS
// ==========================

/// Reads a text value, panicking with context if it is anything else.
pub fn text(object: &StateObject, key: &str) -> String {
    match object.get(key) {
        Some(Value::Text(text)) => text,
        other => panic!("expected text at {key:?}, found {other:?}"),
    }
}

/// Follows a local reference.
pub fn child(object: &StateObject, key: &str) -> StateObject {
    match object.get(key) {
        Some(Value::Local(child)) => child,
        other => panic!("expected reference at {key:?}, found {other:?}"),
    }
}

/// Asserts two objects on different replicas hold the same tree of values,
/// comparing references by id.
pub fn assert_same_tree(left: &StateObject, right: &StateObject) {
    let mut stack = vec![(left.clone(), right.clone())];
    while let Some((l, r)) = stack.pop() {
        assert_eq!(l.id(), r.id());
        assert_eq!(l.keys(), r.keys(), "keys differ on {:?}", l.id());
        for (key, value) in l.entries() {
            let other = r.get(&key).expect("key present on both sides");
            match (&value, &other) {
                (Value::Text(a), Value::Text(b)) => assert_eq!(a, b),
                (Value::Local(a), Value::Local(b)) => stack.push((a.clone(), b.clone())),
                (Value::Foreign(a), Value::Foreign(b)) => assert_eq!(a.id(), b.id()),
                _ => panic!("value kinds differ at {key:?}: {value:?} vs {other:?}"),
            }
        }
    }
}
