//! Error types for replicated objects.

use thiserror::Error;

/// Structured error types for [`StateObject`](super::StateObject) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ObjectError {
    /// A reference count was decremented below zero
    #[error("Reference count underflow on object {id:?}")]
    ReferenceUnderflow { id: String },

    /// The engine's root object cannot be destroyed
    #[error("The root object of an engine cannot be destroyed")]
    RootObject,
}

impl ObjectError {
    /// Check if this error indicates broken reference bookkeeping
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ObjectError::ReferenceUnderflow { .. })
    }

    /// Check if this error was caused by misuse of the API
    pub fn is_usage_error(&self) -> bool {
        matches!(self, ObjectError::RootObject)
    }
}

// Conversion from ObjectError to the main Error type
impl From<ObjectError> for crate::Error {
    fn from(err: ObjectError) -> Self {
        crate::Error::Object(err)
    }
}
