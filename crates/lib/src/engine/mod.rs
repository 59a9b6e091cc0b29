//! The replication engine.
//!
//! An [`Engine`] owns a set of [`StateObject`]s, gives each an id, and
//! translates every change into the flat wire format described in
//! [`codec`]. Outgoing changes are collected in a buffer and handed to a
//! [`DeltaSink`] as one [`FlatDelta`] per flush; inbound deltas are decoded
//! back into values and applied to the addressed objects without echoing.
//!
//! An engine is itself a root object with an empty id: keys set on the
//! engine travel as `"." + key`.
//!
//! # Buffering
//!
//! Every [`StateObject::set`] opens a buffer if none is open and closes it on
//! return, so all changes made synchronously by handlers leave together.
//! Callers can widen the scope with [`Engine::start_buffer`] and
//! [`Engine::end_buffer`]. With a throttle delay configured, closing an
//! implicit scope does not flush: the first buffered change schedules a flush
//! at `now + delay`, performed by [`Engine::poll_throttle`] unless an explicit
//! [`Engine::end_buffer`] gets there first.
//!
//! # Example
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//! use wavestate::{Engine, StateObject, Value};
//!
//! let sent = Rc::new(RefCell::new(Vec::new()));
//! let engine = Engine::new();
//! let log = sent.clone();
//! engine
//!     .set_sink(move |delta| {
//!         log.borrow_mut().push(delta.clone());
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let note = StateObject::new();
//! note.set("text", "hi").unwrap();
//! engine.set("note", &note).unwrap();
//!
//! // One delta carries both the reference and the object's existing state.
//! assert_eq!(sent.borrow().len(), 1);
//! let id = note.id().unwrap();
//! assert_eq!(sent.borrow()[0][".note"], Some(format!("&{id}")));
//! assert_eq!(sent.borrow()[0][&format!("{id}.text")], Some(" hi".to_string()));
//! ```

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    fmt,
    rc::Rc,
    sync::Arc,
};

use rand::Rng;
use tracing::{debug, error, trace};

use crate::{
    Result,
    clock::{Clock, SystemClock},
    config::EngineConfig,
    constants::ID_ALPHABET,
    object::{KeyHandler, Received, StateObject},
    value::Value,
};

pub mod codec;
pub mod errors;

pub use codec::WireValue;
pub use errors::EngineError;

/// A batch of flat keys mapped to encoded values. `None` deletes the key.
pub type FlatDelta = BTreeMap<String, Option<String>>;

/// Receives every flushed delta. Installed with [`Engine::set_sink`].
pub type DeltaSink = Rc<dyn Fn(&FlatDelta) -> Result<()>>;

/// Outcome of applying an inbound delta.
#[derive(Debug, Default)]
pub struct DeltaReport {
    /// Keys whose value changed
    pub applied: usize,
    /// Keys that already held the delivered value
    pub unchanged: usize,
    /// Keys that could not be decoded, with the reason. The rest of the
    /// delta was still applied.
    pub failures: Vec<(String, crate::Error)>,
}

impl DeltaReport {
    /// Returns true if every key was decoded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) struct EngineInner {
    root: StateObject,
    config: EngineConfig,
    read_only: bool,
    clock: Arc<dyn Clock>,
    objects: RefCell<HashMap<String, StateObject>>,
    /// Last known encoded state, the baseline for snapshot diffs.
    flat_state: RefCell<BTreeMap<String, String>>,
    /// `Some` while buffering.
    buffer: RefCell<Option<FlatDelta>>,
    throttle_deadline: Cell<Option<u64>>,
    sink: RefCell<Option<DeltaSink>>,
    foreign: RefCell<Option<Engine>>,
    ready: Cell<bool>,
    /// Objects an inbound batch may have left empty and unreferenced.
    orphans: RefCell<Vec<StateObject>>,
}

/// Builder for [`Engine`].
///
/// ```
/// use wavestate::{Engine, EngineConfig};
///
/// let engine = Engine::builder()
///     .config(EngineConfig::default().with_throttle_delay_ms(100))
///     .build()
///     .unwrap();
/// assert_eq!(engine.config().throttle_delay_ms, Some(100));
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    read_only: bool,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    /// Use the given configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a read-only engine, driven only by inbound updates.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Use the given clock for throttle deadlines.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(Engine::assemble(self.config, self.read_only, clock))
    }
}

/// Owns replicated objects and speaks the flat delta protocol.
///
/// `Engine` is a cheap handle; clones share the same engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Rc<EngineInner>,
}

impl Engine {
    /// Creates a writable engine with the default configuration.
    pub fn new() -> Self {
        Self::assemble(EngineConfig::default(), false, Arc::new(SystemClock))
    }

    /// Returns a builder for engines with custom configuration.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub(crate) fn from_inner(inner: Rc<EngineInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn assemble(config: EngineConfig, read_only: bool, clock: Arc<dyn Clock>) -> Self {
        let inner = Rc::new_cyclic(|weak| EngineInner {
            root: StateObject::root(weak.clone()),
            config,
            read_only,
            clock,
            objects: RefCell::new(HashMap::new()),
            flat_state: RefCell::new(BTreeMap::new()),
            buffer: RefCell::new(None),
            throttle_deadline: Cell::new(None),
            sink: RefCell::new(None),
            foreign: RefCell::new(None),
            ready: Cell::new(false),
            orphans: RefCell::new(Vec::new()),
        });
        let root = inner.root.clone();
        inner.objects.borrow_mut().insert(String::new(), root);
        Self { inner }
    }

    /// The root object. Its keys travel as `"." + key`.
    pub fn root(&self) -> &StateObject {
        &self.inner.root
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns true if this engine rejects outbound writes.
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Returns true if both handles point at the same engine.
    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true once the first full snapshot has been received.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.get()
    }

    pub(crate) fn mark_ready(&self) {
        self.inner.ready.set(true);
    }

    /// Sets a key on the root object. See [`StateObject::set`].
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.inner.root.set(key, value)
    }

    /// Reads a key of the root object. See [`StateObject::get`].
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.root.get(key)
    }

    /// Registers per-key handlers on the root object.
    pub fn set_key_handlers<K: Into<String>>(
        &self,
        handlers: impl IntoIterator<Item = (K, KeyHandler)>,
    ) {
        self.inner.root.set_key_handlers(handlers)
    }

    /// Registers a key-value handler on the root object.
    pub fn set_key_value_handler(&self, handler: impl Fn(&str, &Value, &Value) + 'static) {
        self.inner.root.set_key_value_handler(handler)
    }

    /// Installs the function that receives every flushed delta.
    ///
    /// Read-only engines never produce deltas and refuse a sink.
    pub fn set_sink(&self, sink: impl Fn(&FlatDelta) -> Result<()> + 'static) -> Result<()> {
        if self.inner.read_only {
            return Err(EngineError::ReadOnly.into());
        }
        *self.inner.sink.borrow_mut() = Some(Rc::new(sink));
        Ok(())
    }

    /// Removes the sink. Later flushes only update the flat state.
    pub fn clear_sink(&self) {
        self.inner.sink.borrow_mut().take();
    }

    /// Designates the engine whose objects may be referenced with
    /// [`Value::Foreign`].
    pub fn set_foreign_engine(&self, foreign: &Engine) -> Result<()> {
        if foreign.ptr_eq(self) {
            return Err(EngineError::InvalidConfig {
                reason: "an engine cannot be its own foreign engine".to_string(),
            }
            .into());
        }
        *self.inner.foreign.borrow_mut() = Some(foreign.clone());
        Ok(())
    }

    /// The designated foreign engine, if any.
    pub fn foreign_engine(&self) -> Option<Engine> {
        self.inner.foreign.borrow().clone()
    }

    /// Looks up an owned object by id. The empty id is the root.
    pub fn object(&self, id: &str) -> Option<StateObject> {
        self.inner.objects.borrow().get(id).cloned()
    }

    /// Number of objects owned by this engine, including the root.
    pub fn object_count(&self) -> usize {
        self.inner.objects.borrow().len()
    }

    /// A copy of the last known encoded state.
    pub fn flat_state(&self) -> BTreeMap<String, String> {
        self.inner.flat_state.borrow().clone()
    }

    /// Creates a new object owned by this engine.
    pub fn create_object(&self) -> Result<StateObject> {
        StateObject::with_engine(self)
    }

    /// Takes ownership of `object`, assigning an id if it has none, and
    /// publishes every key it already holds.
    ///
    /// Registering an object this engine already owns does nothing.
    pub fn manage_object(&self, object: &StateObject) -> Result<()> {
        match object.engine() {
            Some(owner) if owner.ptr_eq(self) => return Ok(()),
            Some(_) => {
                return Err(EngineError::ForeignOwner {
                    id: object.id().unwrap_or_default(),
                }
                .into());
            }
            None => {}
        }

        let id = match object.id() {
            Some(id) => id,
            None => {
                let id = self.generate_id();
                object.assign_id(id.clone());
                id
            }
        };
        debug!(object_id = %id, "Managing object");
        object.attach(self);
        self.inner
            .objects
            .borrow_mut()
            .insert(id.clone(), object.clone());

        self.with_scope(|| {
            for (key, value) in object.entries() {
                self.set_value(&id, &key, &value)?;
            }
            Ok(())
        })
    }

    // Ids are not checked against the table; at the default length a
    // collision is negligible.
    fn generate_id(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.inner.config.id_length)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }

    /// Drops `object` from the table after it has been destroyed.
    pub(crate) fn forget(&self, object: &StateObject) {
        let Some(id) = object.id() else {
            return;
        };
        let mut objects = self.inner.objects.borrow_mut();
        if objects.get(&id).is_some_and(|o| o.ptr_eq(object)) {
            objects.remove(&id);
        }
    }

    /// Looks up `id`, creating an empty owned object for unknown ids.
    pub(crate) fn object_or_placeholder(&self, id: &str) -> StateObject {
        if let Some(object) = self.object(id) {
            return object;
        }
        trace!(object_id = %id, "Creating placeholder object");
        let object = StateObject::placeholder(id, self);
        self.inner
            .objects
            .borrow_mut()
            .insert(id.to_string(), object.clone());
        object
    }

    // ===== Buffering =====

    /// Opens the output buffer.
    ///
    /// Returns true if this call opened it, false if a buffer was already
    /// open (nested scopes are absorbed by the outermost one).
    pub fn start_buffer(&self) -> bool {
        let mut buffer = self.inner.buffer.borrow_mut();
        if buffer.is_some() {
            return false;
        }
        *buffer = Some(FlatDelta::new());
        true
    }

    /// Flushes the buffer as a single delta and closes it.
    ///
    /// Also cancels a pending throttled flush. Does nothing if no buffer is
    /// open; an empty buffer closes without calling the sink.
    pub fn end_buffer(&self) -> Result<()> {
        let Some(delta) = self.inner.buffer.borrow_mut().take() else {
            return Ok(());
        };
        self.inner.throttle_deadline.set(None);
        if delta.is_empty() {
            return Ok(());
        }
        debug!(keys = delta.len(), "Flushing buffered delta");
        self.dispatch(&delta)
    }

    /// Returns true while a buffer is open.
    pub fn is_buffering(&self) -> bool {
        self.inner.buffer.borrow().is_some()
    }

    /// When a throttled flush is pending, the time (per the engine's clock)
    /// at which [`poll_throttle`](Self::poll_throttle) will perform it.
    pub fn throttle_deadline(&self) -> Option<u64> {
        self.inner.throttle_deadline.get()
    }

    /// Performs a pending throttled flush if its deadline has passed.
    ///
    /// Returns true if a flush happened.
    pub fn poll_throttle(&self) -> Result<bool> {
        match self.inner.throttle_deadline.get() {
            Some(deadline) if self.inner.clock.now_millis() >= deadline => {
                self.end_buffer()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Runs `f` inside a buffer scope, closing the scope only if this call
    /// opened it.
    pub(crate) fn with_scope<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let opened = self.start_buffer();
        let result = f();
        if !opened {
            return result;
        }
        let closed = self.close_scope();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Closes an implicit scope: flushes now, or schedules a throttled flush.
    fn close_scope(&self) -> Result<()> {
        if let Some(delay) = self.inner.config.throttle_delay_ms {
            let pending = self
                .inner
                .buffer
                .borrow()
                .as_ref()
                .is_some_and(|buffer| !buffer.is_empty());
            if pending {
                if self.inner.throttle_deadline.get().is_none() {
                    let deadline = self.inner.clock.now_millis().saturating_add(delay);
                    debug!(deadline, "Scheduled throttled flush");
                    self.inner.throttle_deadline.set(Some(deadline));
                }
                return Ok(());
            }
        }
        self.end_buffer()
    }

    fn dispatch(&self, delta: &FlatDelta) -> Result<()> {
        if self.inner.read_only {
            return Err(EngineError::ReadOnly.into());
        }
        let sink = self.inner.sink.borrow().clone();
        match sink {
            Some(sink) => sink(delta),
            None => {
                trace!(keys = delta.len(), "No sink attached; delta kept in flat state only");
                Ok(())
            }
        }
    }

    // ===== Encoding =====

    /// Rejects writes this engine cannot publish, before any state changes.
    pub(crate) fn check_write(&self, value: &Value) -> Result<()> {
        if self.inner.read_only {
            return Err(EngineError::ReadOnly.into());
        }
        match value {
            Value::Local(object) => self.check_local(object),
            Value::Foreign(object) => self.check_foreign(object),
            Value::Null | Value::Text(_) => Ok(()),
        }
    }

    fn check_local(&self, object: &StateObject) -> Result<()> {
        match object.engine() {
            None => Ok(()),
            Some(owner) if owner.ptr_eq(self) => Ok(()),
            Some(owner) => {
                let id = object.id().unwrap_or_default();
                if self.foreign_engine().is_some_and(|f| f.ptr_eq(&owner)) {
                    Err(EngineError::WrongReferenceKind {
                        id,
                        expected: "a foreign reference",
                    }
                    .into())
                } else {
                    Err(EngineError::ForeignOwner { id }.into())
                }
            }
        }
    }

    fn check_foreign(&self, object: &StateObject) -> Result<()> {
        let foreign = self.foreign_engine().ok_or(EngineError::NoForeignEngine)?;
        let id = object.id().unwrap_or_default();
        match object.engine() {
            Some(owner) if owner.ptr_eq(&foreign) => Ok(()),
            Some(owner) if owner.ptr_eq(self) => Err(EngineError::WrongReferenceKind {
                id,
                expected: "a local reference",
            }
            .into()),
            _ => Err(EngineError::ForeignOwner { id }.into()),
        }
    }

    fn encode(&self, value: &Value) -> Result<Option<String>> {
        let encoded = match value {
            Value::Null => None,
            Value::Text(text) => Some(WireValue::Text(text).encode()),
            Value::Local(object) => {
                if !object.is_managed() {
                    self.manage_object(object)?;
                }
                self.check_local(object)?;
                let id = object.id().unwrap_or_default();
                Some(WireValue::Reference(&id).encode())
            }
            Value::Foreign(object) => {
                self.check_foreign(object)?;
                let id = object.id().unwrap_or_default();
                Some(WireValue::Foreign(&id).encode())
            }
        };
        Ok(encoded)
    }

    /// Encodes one change, records it in the flat state, and buffers or
    /// dispatches it.
    pub(crate) fn set_value(&self, object_id: &str, key: &str, value: &Value) -> Result<()> {
        let flat_key = codec::flat_key(object_id, key);
        let encoded = self.encode(value)?;
        trace!(flat_key = %flat_key, encoded = ?encoded, "Encoded value");

        {
            let mut flat_state = self.inner.flat_state.borrow_mut();
            match &encoded {
                Some(encoded) => flat_state.insert(flat_key.clone(), encoded.clone()),
                None => flat_state.remove(&flat_key),
            };
        }

        let unbuffered = {
            let mut buffer = self.inner.buffer.borrow_mut();
            match buffer.as_mut() {
                Some(buffer) => {
                    buffer.insert(flat_key, encoded);
                    None
                }
                None => Some((flat_key, encoded)),
            }
        };
        match unbuffered {
            Some((flat_key, encoded)) => self.dispatch(&FlatDelta::from([(flat_key, encoded)])),
            None => Ok(()),
        }
    }

    // ===== Decoding =====

    fn decode(&self, encoded: Option<&str>) -> Result<Value> {
        let Some(encoded) = encoded else {
            return Ok(Value::Null);
        };
        let value = match codec::parse_value(encoded)? {
            WireValue::Text(text) => Value::Text(text.to_string()),
            WireValue::Reference(id) => Value::Local(self.object_or_placeholder(id)),
            WireValue::Foreign(id) => {
                let foreign = self.foreign_engine().ok_or(EngineError::NoForeignEngine)?;
                let object = foreign
                    .object(id)
                    .filter(|object| !object.is_root())
                    .ok_or_else(|| EngineError::UnresolvedForeign { id: id.to_string() })?;
                Value::Foreign(object)
            }
        };
        Ok(value)
    }

    /// Applies one inbound flat value.
    ///
    /// Returns true if the addressed key changed, false if it already held
    /// the value. The change reaches the object through its receive path, so
    /// nothing is echoed back to the sink.
    pub fn receive_flat_value(&self, flat_key: &str, encoded: Option<&str>) -> Result<bool> {
        let applied = self.apply_flat_value(flat_key, encoded);
        self.collect_orphans();
        applied
    }

    fn apply_flat_value(&self, flat_key: &str, encoded: Option<&str>) -> Result<bool> {
        let (id, key) = codec::split_flat_key(flat_key, self.inner.config.id_length)?;
        let value = self.decode(encoded)?;
        let target = self.object_or_placeholder(id);

        // Recorded before handlers run, so their reactions overwrite it.
        {
            let mut flat_state = self.inner.flat_state.borrow_mut();
            match encoded {
                Some(encoded) => flat_state.insert(flat_key.to_string(), encoded.to_string()),
                None => flat_state.remove(flat_key),
            };
        }

        let applied = match target.receive_value(key, value)? {
            Received::Duplicate => false,
            Received::Applied { released } => {
                if let Some(released) = released {
                    trace!(object_id = ?released.id(), "Object lost its last reference remotely");
                    self.inner.orphans.borrow_mut().push(released);
                }
                true
            }
        };
        if !target.is_root() && target.is_empty() {
            self.inner.orphans.borrow_mut().push(target);
        }
        Ok(applied)
    }

    /// Drops objects left empty and unreferenced by inbound changes.
    ///
    /// Runs once per inbound batch, so a placeholder created for a forward
    /// reference survives until the batch that references it is done.
    fn collect_orphans(&self) {
        let orphans = std::mem::take(&mut *self.inner.orphans.borrow_mut());
        for object in orphans {
            if object.is_root() || object.reference_count() > 0 || !object.is_empty() {
                continue;
            }
            if !object.engine().is_some_and(|engine| engine.ptr_eq(self)) {
                continue;
            }
            debug!(object_id = ?object.id(), "Dropping unreferenced object");
            self.forget(&object);
            object.detach();
        }
    }

    /// Applies an inbound delta.
    ///
    /// A key that fails to decode is logged and reported without stopping
    /// the rest of the batch. Changes made by handlers in reaction leave as
    /// one outbound delta; only a failure to flush those is returned as an
    /// error.
    pub fn receive_flat_delta(&self, delta: &FlatDelta) -> Result<DeltaReport> {
        let mut report = DeltaReport::default();
        let flushed = self.with_scope(|| {
            for (flat_key, encoded) in delta {
                match self.apply_flat_value(flat_key, encoded.as_deref()) {
                    Ok(true) => report.applied += 1,
                    Ok(false) => report.unchanged += 1,
                    Err(err) => {
                        error!(flat_key = %flat_key, error = %err, "Skipping inbound value");
                        report.failures.push((flat_key.clone(), err));
                    }
                }
            }
            Ok(())
        });
        self.collect_orphans();
        flushed?;
        Ok(report)
    }

    /// Applies a complete flat state by diffing it against the last known
    /// one: keys missing from `snapshot` are deleted, changed keys updated.
    ///
    /// Marks the engine ready.
    pub fn receive_snapshot(&self, snapshot: &BTreeMap<String, String>) -> Result<DeltaReport> {
        let delta: FlatDelta = {
            let flat_state = self.inner.flat_state.borrow();
            let deleted = flat_state
                .keys()
                .filter(|key| !snapshot.contains_key(*key))
                .map(|key| (key.clone(), None::<String>));
            let changed = snapshot
                .iter()
                .filter(|(key, value)| flat_state.get(*key) != Some(*value))
                .map(|(key, value)| (key.clone(), Some(value.clone())));
            deleted.chain(changed).collect()
        };
        self.mark_ready();
        self.receive_flat_delta(&delta)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<StateObject> for Engine {
    fn as_ref(&self) -> &StateObject {
        &self.inner.root
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("read_only", &self.inner.read_only)
            .field("objects", &self.object_count())
            .field("flat_keys", &self.inner.flat_state.borrow().len())
            .field("buffering", &self.is_buffering())
            .field("throttle_deadline", &self.inner.throttle_deadline.get())
            .finish()
    }
}
