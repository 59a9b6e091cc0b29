//! Replicated key-value objects.
//!
//! A [`StateObject`] maps string keys to [`Value`]s and notifies registered
//! handlers whenever a key changes, whether the change was made locally or
//! arrived from the transport. Objects start out unattached; the first time
//! one is stored as a value (or registered explicitly) an [`Engine`] claims it
//! and assigns it an id.
//!
//! Local references are reference counted. When the last object holding a
//! [`Value::Local`] to an object lets go of it, the object is destroyed: every
//! key is cleared (cascading to whatever it referenced) and it is detached
//! from its engine.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use wavestate::{StateObject, Value};
//!
//! let object = StateObject::new();
//! object.set("title", "hello").unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let log = seen.clone();
//! object.set_key_value_handler(move |key, value, _previous| {
//!     log.borrow_mut().push(format!("{key}={value}"));
//! });
//! object.set("title", "bye").unwrap();
//!
//! assert_eq!(*seen.borrow(), vec!["title=hello", "title=bye"]);
//! ```

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    fmt,
    rc::{Rc, Weak},
};

use tracing::{debug, trace, warn};

use crate::{
    Result,
    engine::{Engine, EngineInner},
    value::Value,
};

pub mod errors;

pub use errors::ObjectError;

/// Callback for a single key, invoked with the key's new value.
pub type KeyHandler = Rc<dyn Fn(&Value)>;

/// Callback for every key, invoked with `(key, new_value, previous_value)`.
pub type KeyValueHandler = Rc<dyn Fn(&str, &Value, &Value)>;

pub(crate) struct ObjectInner {
    /// `None` until an engine assigns one. The root object's id is empty.
    id: RefCell<Option<String>>,
    engine: RefCell<Weak<EngineInner>>,
    state: RefCell<BTreeMap<String, Value>>,
    key_handlers: RefCell<HashMap<String, KeyHandler>>,
    kv_handler: RefCell<Option<KeyValueHandler>>,
    references: Cell<usize>,
    root: bool,
}

/// Outcome of applying a value through the receive path.
pub(crate) enum Received {
    /// The value equalled the stored one and nothing happened.
    Duplicate,
    /// The value was stored. `released` holds a previously referenced object
    /// whose reference count reached zero as a result.
    Applied { released: Option<StateObject> },
}

/// A replicated key-value node.
///
/// `StateObject` is a cheap handle; clones share the same underlying object.
#[derive(Clone)]
pub struct StateObject {
    inner: Rc<ObjectInner>,
}

impl StateObject {
    /// Creates an unattached object with no id and no engine.
    pub fn new() -> Self {
        Self::build(None, Weak::new(), false)
    }

    /// Creates an object and registers it with `engine` immediately.
    pub fn with_engine(engine: &Engine) -> Result<Self> {
        let object = Self::new();
        engine.manage_object(&object)?;
        Ok(object)
    }

    /// The root object an engine is built around.
    pub(crate) fn root(engine: Weak<EngineInner>) -> Self {
        Self::build(Some(String::new()), engine, true)
    }

    /// An object that already has an id and an owner, created on the
    /// receive path. Its (empty) state is not published.
    pub(crate) fn placeholder(id: &str, engine: &Engine) -> Self {
        Self::build(Some(id.to_string()), Rc::downgrade(&engine.inner), false)
    }

    fn build(id: Option<String>, engine: Weak<EngineInner>, root: bool) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: RefCell::new(id),
                engine: RefCell::new(engine),
                state: RefCell::new(BTreeMap::new()),
                key_handlers: RefCell::new(HashMap::new()),
                kv_handler: RefCell::new(None),
                references: Cell::new(0),
                root,
            }),
        }
    }

    /// The object's id, or `None` if no engine has claimed it yet.
    pub fn id(&self) -> Option<String> {
        self.inner.id.borrow().clone()
    }

    /// The engine that owns this object, if any.
    pub fn engine(&self) -> Option<Engine> {
        self.inner.engine.borrow().upgrade().map(Engine::from_inner)
    }

    /// Returns true if an engine currently owns this object.
    pub fn is_managed(&self) -> bool {
        self.inner.engine.borrow().strong_count() > 0
    }

    /// Returns true if this is an engine's root object.
    pub fn is_root(&self) -> bool {
        self.inner.root
    }

    /// Number of local references currently held to this object.
    pub fn reference_count(&self) -> usize {
        self.inner.references.get()
    }

    /// Returns true if both handles point at the same object.
    pub fn ptr_eq(&self, other: &StateObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the current value of `key`.
    ///
    /// Prefer [`set_key_handlers`](Self::set_key_handlers) or
    /// [`set_key_value_handler`](Self::set_key_value_handler) for reads that
    /// should follow remote updates.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().get(key).cloned()
    }

    /// Returns true if `key` holds a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.borrow().contains_key(key)
    }

    /// All keys currently holding a value, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.borrow().keys().cloned().collect()
    }

    /// A snapshot of every key and value, in key order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .state
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().len()
    }

    /// Returns true if no key holds a value.
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().is_empty()
    }

    /// Sets `key` to `value`, or deletes it when `value` is [`Value::Null`].
    ///
    /// Setting a key to the value it already holds does nothing. Otherwise the
    /// change is applied locally (handlers see it immediately), reference
    /// counts are adjusted, and the change is handed to the owning engine. If
    /// no buffer was open, one is opened for the duration of the call so that
    /// every change made synchronously by handlers leaves as a single delta.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let engine = self.engine();
        if let Some(engine) = &engine {
            engine.check_write(&value)?;
        }
        if self.get(key).unwrap_or_default() == value {
            return Ok(());
        }

        match &engine {
            Some(engine) => engine.with_scope(|| self.apply_set(key, value, Some(engine))),
            None => self.apply_set(key, value, None),
        }
    }

    fn apply_set(&self, key: &str, value: Value, engine: Option<&Engine>) -> Result<()> {
        let released = match self.receive_value(key, value.clone())? {
            Received::Applied { released } => released,
            Received::Duplicate => return Ok(()),
        };
        if let Some(engine) = engine {
            engine.set_value(&self.id().unwrap_or_default(), key, &value)?;
        }
        if let Some(released) = released {
            released.destroy()?;
        }
        Ok(())
    }

    /// Registers one handler per key, replacing any previous registrations.
    ///
    /// Each handler whose key already holds a value is invoked immediately
    /// with that value.
    pub fn set_key_handlers<K: Into<String>>(
        &self,
        handlers: impl IntoIterator<Item = (K, KeyHandler)>,
    ) {
        let handlers: HashMap<String, KeyHandler> = handlers
            .into_iter()
            .map(|(key, handler)| (key.into(), handler))
            .collect();
        let replay: Vec<(KeyHandler, Value)> = handlers
            .iter()
            .filter_map(|(key, handler)| self.get(key).map(|value| (handler.clone(), value)))
            .collect();
        *self.inner.key_handlers.borrow_mut() = handlers;
        for (handler, value) in replay {
            handler(&value);
        }
    }

    /// Registers a handler invoked for every key change with
    /// `(key, new_value, previous_value)`, replacing any previous one.
    ///
    /// The handler is invoked immediately once per existing key, with
    /// [`Value::Null`] as the previous value.
    pub fn set_key_value_handler(&self, handler: impl Fn(&str, &Value, &Value) + 'static) {
        let handler: KeyValueHandler = Rc::new(handler);
        *self.inner.kv_handler.borrow_mut() = Some(handler.clone());
        for (key, value) in self.entries() {
            handler(&key, &value, &Value::Null);
        }
    }

    /// Applies a value without forwarding it to the engine.
    ///
    /// Used for local rendering by [`set`](Self::set) and for inbound deltas.
    /// Adjusts reference counts and dispatches handlers. A value equal to the
    /// stored one indicates a redundant delta upstream; it is logged and
    /// otherwise ignored.
    pub(crate) fn receive_value(&self, key: &str, value: Value) -> Result<Received> {
        self.apply_value(key, value, true)
    }

    /// Like [`receive_value`](Self::receive_value), without running handlers.
    ///
    /// Reference counts are still adjusted.
    pub(crate) fn receive_value_silently(&self, key: &str, value: Value) -> Result<Received> {
        self.apply_value(key, value, false)
    }

    fn apply_value(&self, key: &str, value: Value, notify: bool) -> Result<Received> {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            let previous = state.get(key).cloned().unwrap_or_default();
            if previous == value {
                warn!(
                    object_id = ?self.id(),
                    key,
                    value = %value,
                    "Ignoring update equal to the stored value"
                );
                return Ok(Received::Duplicate);
            }
            if value.is_null() {
                state.remove(key);
            } else {
                state.insert(key.to_string(), value.clone());
            }
            previous
        };
        trace!(object_id = ?self.id(), key, value = %value, "Applied value");

        if let Value::Local(object) = &value {
            object.retain();
        }
        let released = match &previous {
            Value::Local(object) if object.release()? => Some(object.clone()),
            _ => None,
        };

        if !notify {
            return Ok(Received::Applied { released });
        }
        let key_handler = self.inner.key_handlers.borrow().get(key).cloned();
        if let Some(handler) = key_handler {
            handler(&value);
        }
        let kv_handler = self.inner.kv_handler.borrow().clone();
        if let Some(handler) = kv_handler {
            handler(key, &value, &previous);
        }

        Ok(Received::Applied { released })
    }

    /// Clears every key and detaches the object from its engine.
    ///
    /// Objects whose last reference is cleared along the way are destroyed
    /// too, off an explicit worklist rather than recursion. A destroyed object must be registered again
    /// before reuse.
    pub fn destroy(&self) -> Result<()> {
        if self.is_root() {
            return Err(ObjectError::RootObject.into());
        }
        let mut doomed = vec![self.clone()];
        while let Some(object) = doomed.pop() {
            debug!(object_id = ?object.id(), "Destroying object");
            let engine = object.engine();
            let mut clear = || -> Result<()> {
                let id = object.id().unwrap_or_default();
                for key in object.keys() {
                    if let Received::Applied { released } = object.receive_value(&key, Value::Null)? {
                        doomed.extend(released);
                    }
                    if let Some(engine) = &engine {
                        engine.set_value(&id, &key, &Value::Null)?;
                    }
                }
                Ok(())
            };
            match &engine {
                Some(engine) => {
                    engine.with_scope(clear)?;
                    engine.forget(&object);
                }
                None => clear()?,
            }
            object.detach();
        }
        Ok(())
    }

    pub(crate) fn assign_id(&self, id: String) {
        *self.inner.id.borrow_mut() = Some(id);
    }

    pub(crate) fn attach(&self, engine: &Engine) {
        *self.inner.engine.borrow_mut() = Rc::downgrade(&engine.inner);
    }

    pub(crate) fn detach(&self) {
        *self.inner.engine.borrow_mut() = Weak::new();
    }

    fn retain(&self) {
        if !self.is_root() {
            self.inner.references.set(self.inner.references.get() + 1);
        }
    }

    /// Drops one reference. Returns true if the count reached zero.
    fn release(&self) -> Result<bool> {
        if self.is_root() {
            return Ok(false);
        }
        let count = self.inner.references.get();
        if count == 0 {
            return Err(ObjectError::ReferenceUnderflow {
                id: self.id().unwrap_or_default(),
            }
            .into());
        }
        self.inner.references.set(count - 1);
        Ok(count == 1)
    }
}

impl Default for StateObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateObject")
            .field("id", &self.id())
            .field("managed", &self.is_managed())
            .field("keys", &self.len())
            .field("references", &self.reference_count())
            .finish()
    }
}
