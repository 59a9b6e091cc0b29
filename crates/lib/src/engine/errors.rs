//! Error types for the replication engine.
//!
//! Decode errors are local to a single flat key: the engine reports them and
//! moves on to the rest of the delta. Usage errors (writing through a
//! read-only engine, referencing an object owned elsewhere) are surfaced to
//! the caller before any state changes.

use thiserror::Error;

/// Structured error types for [`Engine`](super::Engine) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Outbound writes are not allowed on a read-only engine
    #[error("Engine is read only")]
    ReadOnly,

    /// An encoded value started with a marker the codec does not know
    #[error("Unknown value marker {marker:?}")]
    UnknownMarker { marker: char },

    /// An encoded value was the empty string and carried no marker
    #[error("Encoded value is empty")]
    EmptyValue,

    /// A flat key did not contain the id delimiter
    #[error("Malformed flat key: {flat_key:?}")]
    MalformedKey { flat_key: String },

    /// A foreign reference named an id the foreign engine does not know
    #[error("Foreign reference to unknown object {id:?}")]
    UnresolvedForeign { id: String },

    /// A foreign reference was used but no foreign engine is configured
    #[error("No foreign engine configured")]
    NoForeignEngine,

    /// The referenced object is owned by an unrelated engine
    #[error("Object {id:?} is owned by another engine")]
    ForeignOwner { id: String },

    /// The reference variant does not match the engine owning the object
    #[error("Object {id:?} must be referenced as {expected}")]
    WrongReferenceKind { id: String, expected: &'static str },

    /// The engine configuration is unusable
    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl EngineError {
    /// Check if this error came from decoding inbound data
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownMarker { .. }
                | EngineError::EmptyValue
                | EngineError::MalformedKey { .. }
                | EngineError::UnresolvedForeign { .. }
        )
    }

    /// Check if this error is a write to a read-only engine
    pub fn is_read_only(&self) -> bool {
        matches!(self, EngineError::ReadOnly)
    }

    /// Check if this error was caused by misuse of the API
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            EngineError::ReadOnly
                | EngineError::NoForeignEngine
                | EngineError::ForeignOwner { .. }
                | EngineError::WrongReferenceKind { .. }
                | EngineError::InvalidConfig { .. }
        )
    }

    /// Check if this error indicates a referenced object could not be found
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::UnresolvedForeign { .. })
    }

    /// Get the object id if this error concerns a specific object
    pub fn object_id(&self) -> Option<&str> {
        match self {
            EngineError::UnresolvedForeign { id }
            | EngineError::ForeignOwner { id }
            | EngineError::WrongReferenceKind { id, .. } => Some(id),
            _ => None,
        }
    }
}

// Conversion from EngineError to the main Error type
impl From<EngineError> for crate::Error {
    fn from(err: EngineError) -> Self {
        crate::Error::Engine(err)
    }
}
