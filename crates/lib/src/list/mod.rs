//! Ordered lists over an object's keyspace.
//!
//! An [`OrderedList`] stores its members in one [`StateObject`]: each member
//! is held as a [`Value::Local`] under a generated position key, and list
//! order is the lexicographic order of those keys. Inserting or removing a
//! member is a single key change, so lists replicate like any other object
//! and concurrent inserts from different replicas merge without renumbering.
//!
//! The in-memory sequence is derived from the object's key-value callback,
//! which makes remote changes and local ones indistinguishable to listeners.
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//! use wavestate::{OrderedList, StateObject};
//!
//! let list = OrderedList::new(StateObject::new()).unwrap();
//! let (a, b, c) = (StateObject::new(), StateObject::new(), StateObject::new());
//! list.insert_item(&a, None).unwrap();
//! list.insert_item(&b, None).unwrap();
//! list.insert_item(&c, Some(&b)).unwrap();
//!
//! let order = list.members();
//! assert!(order[0].ptr_eq(&a) && order[1].ptr_eq(&c) && order[2].ptr_eq(&b));
//! ```

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use tracing::{debug, trace};

use crate::{Result, config::PositionConfig, object::StateObject, value::Value};

pub mod errors;
pub mod position;

pub use errors::ListError;

/// Listener invoked with `(member, next_sibling, index)` when a member is
/// inserted. `next_sibling` is the member now following it, if any.
pub type InsertCallback = Rc<dyn Fn(&StateObject, Option<&StateObject>, usize)>;

/// Listener invoked with `(member, index)` when a member is removed.
pub type RemoveCallback = Rc<dyn Fn(&StateObject, usize)>;

struct ListInner {
    object: StateObject,
    config: PositionConfig,
    /// Sorted by position key.
    entries: RefCell<Vec<(String, StateObject)>>,
    on_insert: RefCell<Option<InsertCallback>>,
    on_remove: RefCell<Option<RemoveCallback>>,
}

/// A list whose order is carried by position keys on a replicated object.
///
/// The list installs itself as the object's key-value handler; the object
/// should not be given another one.
#[derive(Clone)]
pub struct OrderedList {
    inner: Rc<ListInner>,
}

impl OrderedList {
    /// Wraps `object` with the default position alphabet.
    ///
    /// Members already stored on the object are picked up immediately.
    pub fn new(object: StateObject) -> Result<Self> {
        Self::with_config(object, PositionConfig::default())
    }

    /// Wraps `object`, generating position keys with `config`.
    pub fn with_config(object: StateObject, config: PositionConfig) -> Result<Self> {
        config.validate()?;
        let inner = Rc::new(ListInner {
            object,
            config,
            entries: RefCell::new(Vec::new()),
            on_insert: RefCell::new(None),
            on_remove: RefCell::new(None),
        });
        let weak: Weak<ListInner> = Rc::downgrade(&inner);
        inner
            .object
            .set_key_value_handler(move |key, value, previous| {
                if let Some(inner) = weak.upgrade() {
                    inner.key_changed(key, value, previous);
                }
            });
        Ok(Self { inner })
    }

    /// The object holding the list's position keys.
    pub fn object(&self) -> &StateObject {
        &self.inner.object
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Returns true if the list has no members.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Members in list order.
    pub fn members(&self) -> Vec<StateObject> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(_, member)| member.clone())
            .collect()
    }

    /// `(position key, member)` pairs in list order.
    pub fn entries(&self) -> Vec<(String, StateObject)> {
        self.inner.entries.borrow().clone()
    }

    /// The member at `index`.
    pub fn get(&self, index: usize) -> Option<StateObject> {
        self.inner
            .entries
            .borrow()
            .get(index)
            .map(|(_, member)| member.clone())
    }

    /// Index of `member`, if it belongs to the list.
    pub fn index_of(&self, member: &StateObject) -> Option<usize> {
        self.inner.index_of(member)
    }

    /// Position key of `member`, if it belongs to the list.
    pub fn position_of(&self, member: &StateObject) -> Option<String> {
        let entries = self.inner.entries.borrow();
        entries
            .iter()
            .find(|(_, m)| m.ptr_eq(member))
            .map(|(key, _)| key.clone())
    }

    /// Returns true if `member` belongs to the list.
    pub fn contains(&self, member: &StateObject) -> bool {
        self.index_of(member).is_some()
    }

    /// Registers the insert listener, replacing any previous one.
    ///
    /// The listener is invoked immediately for every current member, in
    /// order, with no sibling. Those replayed calls say "already present",
    /// not where the member sits relative to others.
    pub fn set_insert_callback(
        &self,
        callback: impl Fn(&StateObject, Option<&StateObject>, usize) + 'static,
    ) {
        let callback: InsertCallback = Rc::new(callback);
        *self.inner.on_insert.borrow_mut() = Some(callback.clone());
        for (index, member) in self.members().iter().enumerate() {
            callback(member, None, index);
        }
    }

    /// Registers the remove listener, replacing any previous one.
    pub fn set_remove_callback(&self, callback: impl Fn(&StateObject, usize) + 'static) {
        *self.inner.on_remove.borrow_mut() = Some(Rc::new(callback));
    }

    /// Places `member` immediately before `next_sibling`, or at the end.
    ///
    /// A sibling that is not yet in the list is appended first. A member that
    /// already sits at the requested place is left alone; one that sits
    /// elsewhere is moved, which listeners observe as an insert at the new
    /// place followed by a remove at the old one. All resulting key changes
    /// leave as one delta.
    pub fn insert_item(
        &self,
        member: &StateObject,
        next_sibling: Option<&StateObject>,
    ) -> Result<()> {
        if next_sibling.is_some_and(|sibling| sibling.ptr_eq(member)) {
            return Err(ListError::SiblingIsMember.into());
        }
        match self.inner.object.engine() {
            Some(engine) => engine.with_scope(|| self.place(member, next_sibling)),
            None => self.place(member, next_sibling),
        }
    }

    fn place(&self, member: &StateObject, next_sibling: Option<&StateObject>) -> Result<()> {
        if let Some(sibling) = next_sibling {
            if !self.contains(sibling) {
                debug!(sibling_id = ?sibling.id(), "Appending missing sibling");
                self.place(sibling, None)?;
            }
        }

        let (min, max, old) = {
            let entries = self.inner.entries.borrow();
            let end = match next_sibling {
                Some(sibling) => self.inner.index_of(sibling).ok_or_else(|| {
                    ListError::MemberNotFound {
                        id: sibling.id().unwrap_or_default(),
                    }
                })?,
                None => entries.len(),
            };
            let current = entries.iter().position(|(_, m)| m.ptr_eq(member));
            if current.is_some_and(|index| index + 1 == end) {
                trace!(member_id = ?member.id(), "Item already in place");
                return Ok(());
            }
            let min = end.checked_sub(1).map(|i| entries[i].0.clone());
            let max = next_sibling.map(|_| entries[end].0.clone());
            let old = current.map(|index| entries[index].0.clone());
            (min, max, old)
        };

        let key = position::position_between(min.as_deref(), max.as_deref(), &self.inner.config)?;
        self.inner.object.set(&key, member)?;
        if let Some(old) = old {
            self.inner.object.set(&old, Value::Null)?;
        }
        Ok(())
    }

    /// Removes `member` by clearing its position key.
    pub fn remove_item(&self, member: &StateObject) -> Result<()> {
        let key = self
            .position_of(member)
            .ok_or_else(|| ListError::MemberNotFound {
                id: member.id().unwrap_or_default(),
            })?;
        self.inner.object.set(&key, Value::Null)
    }
}

impl ListInner {
    fn index_of(&self, member: &StateObject) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|(_, m)| m.ptr_eq(member))
    }

    fn key_changed(&self, key: &str, value: &Value, previous: &Value) {
        if let Value::Local(old) = previous {
            let removed = {
                let mut entries = self.entries.borrow_mut();
                let index = entries
                    .iter()
                    .position(|(k, m)| k == key && m.ptr_eq(old));
                index.map(|index| (entries.remove(index).1, index))
            };
            if let Some((member, index)) = removed {
                trace!(key = %key.escape_debug(), index, "Removed list member");
                let callback = self.on_remove.borrow().clone();
                if let Some(callback) = callback {
                    callback(&member, index);
                }
            }
        }

        match value {
            Value::Local(member) => {
                let (index, next) = {
                    let mut entries = self.entries.borrow_mut();
                    let index = entries.partition_point(|(k, _)| k.as_str() < key);
                    entries.insert(index, (key.to_string(), member.clone()));
                    (index, entries.get(index + 1).map(|(_, m)| m.clone()))
                };
                trace!(key = %key.escape_debug(), index, "Inserted list member");
                let callback = self.on_insert.borrow().clone();
                if let Some(callback) = callback {
                    callback(member, next.as_ref(), index);
                }
            }
            Value::Null => {}
            other => {
                debug!(
                    key = %key.escape_debug(),
                    kind = other.type_name(),
                    "Ignoring non-member value on list object"
                );
            }
        }
    }
}

impl fmt::Debug for OrderedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedList")
            .field("object_id", &self.inner.object.id())
            .field("len", &self.len())
            .finish()
    }
}
