//!
//! Wavestate: replicated key-value object graphs over flat delta transports.
//! This library keeps a graph of objects in sync between a local process and a
//! host that relays string-keyed deltas, and layers ordered lists on top.
//!
//! ## Core Concepts
//!
//! * **Objects (`object::StateObject`)**: Key-value nodes whose values are strings or references to other objects. Change handlers fire for local and remote updates alike.
//! * **Values (`value::Value`)**: The tagged value type: null, text, a local reference, or a foreign reference into the roster.
//! * **Engines (`engine::Engine`)**: Own objects, assign their ids, and encode every change as a flat `objectId.key -> marker+payload` entry. Outgoing changes are buffered and flushed as one delta; inbound deltas are decoded and applied without echo.
//! * **Ordered lists (`list::OrderedList`)**: Lists stored in one object's keyspace under random fractional position keys, so concurrent inserts merge without renumbering.
//! * **Roster (`roster::Roster`)**: A read-only engine mirroring the host's participant feed, referenced from shared state via foreign references.
//! * **Sessions (`session::Session`)**: Wire the state engine to the roster and report when both feeds are ready.
//!
//! Everything here is single-threaded: handles are `Rc`-based and every entry
//! point runs to completion synchronously.

pub mod clock;
pub mod config;
pub mod constants;
pub mod engine;
pub mod list;
pub mod object;
pub mod roster;
pub mod session;
pub mod value;

pub use clock::{Clock, SystemClock};
pub use config::{EngineConfig, PositionConfig};
pub use engine::{DeltaReport, DeltaSink, Engine, EngineBuilder, FlatDelta};
pub use list::OrderedList;
pub use object::StateObject;
pub use roster::{Participant, Roster};
pub use session::Session;
pub use value::Value;

/// Clock that only advances when told to, for tests.
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;

/// Result type used throughout the wavestate library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the wavestate library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured object errors from the object module
    #[error(transparent)]
    Object(object::ObjectError),

    /// Structured engine errors from the engine module
    #[error(transparent)]
    Engine(engine::EngineError),

    /// Structured list errors from the list module
    #[error(transparent)]
    List(list::ListError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Object(_) => "object",
            Error::Engine(_) => "engine",
            Error::List(_) => "list",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a referenced object or member was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Engine(engine_err) => engine_err.is_not_found(),
            Error::List(list_err) => list_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error was caused by misuse of the API.
    pub fn is_usage_error(&self) -> bool {
        match self {
            Error::Object(object_err) => object_err.is_usage_error(),
            Error::Engine(engine_err) => engine_err.is_usage_error(),
            Error::List(list_err) => list_err.is_usage_error(),
            Error::Serialize(_) => false,
        }
    }

    /// Check if this error came from malformed inbound data.
    pub fn is_protocol_error(&self) -> bool {
        match self {
            Error::Engine(engine_err) => engine_err.is_decode_error(),
            _ => false,
        }
    }

    /// Check if this error is a write to a read-only engine.
    pub fn is_read_only(&self) -> bool {
        match self {
            Error::Engine(engine_err) => engine_err.is_read_only(),
            _ => false,
        }
    }

    /// Check if this error indicates broken internal bookkeeping.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            Error::Object(object_err) => object_err.is_invariant_violation(),
            _ => false,
        }
    }

    /// Check if this error is list-related.
    pub fn is_list_error(&self) -> bool {
        matches!(self, Error::List(_))
    }
}
