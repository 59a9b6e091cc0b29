//! Values that can be stored under a key of a [`StateObject`].
//!
//! A value is either absent ([`Value::Null`]), a string, or a reference to
//! another object. References come in two kinds: [`Value::Local`] points at an
//! object owned by the same engine, [`Value::Foreign`] points at an object
//! owned by the engine's read-only foreign engine (e.g. a participant roster).
//! The kind is chosen by the caller; the engine rejects a reference whose
//! target is owned by the wrong engine.

use std::fmt;

use crate::object::StateObject;

/// A value stored under one key of a [`StateObject`].
///
/// Equality is string equality for [`Value::Text`] and identity for the
/// reference variants:
///
/// ```
/// # use wavestate::{StateObject, Value};
/// let a = StateObject::new();
/// let b = StateObject::new();
///
/// assert_eq!(Value::from("x"), Value::from("x".to_string()));
/// assert_eq!(Value::from(&a), Value::from(&a));
/// assert_ne!(Value::from(&a), Value::from(&b));
/// assert_ne!(Value::from(&a), Value::foreign(&a));
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value. Setting a key to `Null` deletes it.
    #[default]
    Null,
    /// Plain string value
    Text(String),
    /// Reference to an object owned by the same engine
    Local(StateObject),
    /// Reference to an object owned by the foreign engine
    Foreign(StateObject),
}

impl Value {
    /// Creates a reference to an object owned by the foreign engine.
    pub fn foreign(object: &StateObject) -> Self {
        Value::Foreign(object.clone())
    }

    /// Returns true if this is the absent value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this is either kind of reference
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Local(_) | Value::Foreign(_))
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Local(_) => "local",
            Value::Foreign(_) => "foreign",
        }
    }

    /// Attempts to convert to a string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the referenced object for either reference kind
    pub fn as_object(&self) -> Option<&StateObject> {
        match self {
            Value::Local(object) | Value::Foreign(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the referenced object if this is a local reference
    pub fn as_local(&self) -> Option<&StateObject> {
        match self {
            Value::Local(object) => Some(object),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Local(a), Value::Local(b)) | (Value::Foreign(a), Value::Foreign(b)) => {
                a.ptr_eq(b)
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        self.as_text() == Some(other)
    }
}

// Referenced objects are printed by id only; their state may reference back.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Local(object) => write!(f, "Local({:?})", object.id()),
            Value::Foreign(object) => write!(f, "Foreign({:?})", object.id()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Local(object) => write!(f, "&{}", object.id().unwrap_or_default()),
            Value::Foreign(object) => write!(f, "p{}", object.id().unwrap_or_default()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<StateObject> for Value {
    fn from(object: StateObject) -> Self {
        Value::Local(object)
    }
}

impl From<&StateObject> for Value {
    fn from(object: &StateObject) -> Self {
        Value::Local(object.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
