//! Error types for ordered lists and position-key generation.

use thiserror::Error;

/// Structured error types for [`OrderedList`](super::OrderedList) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ListError {
    /// The lower bound sorts after the upper bound
    #[error("Position bounds out of order: {min:?} > {max:?}")]
    BoundsOutOfOrder { min: String, max: String },

    /// The object is not a member of the list
    #[error("Object {id:?} is not a member of the list")]
    MemberNotFound { id: String },

    /// No key sorts strictly between the bounds
    #[error("No position exists between the given bounds")]
    NoRoom,

    /// The position alphabet cannot produce keys
    #[error("Invalid position alphabet: {reason}")]
    InvalidAlphabet { reason: String },

    /// A member was asked to be inserted before itself
    #[error("An item cannot be its own next sibling")]
    SiblingIsMember,
}

impl ListError {
    /// Check if this error indicates a missing member
    pub fn is_not_found(&self) -> bool {
        matches!(self, ListError::MemberNotFound { .. })
    }

    /// Check if this error was caused by misuse of the API
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ListError::BoundsOutOfOrder { .. }
                | ListError::MemberNotFound { .. }
                | ListError::InvalidAlphabet { .. }
                | ListError::SiblingIsMember
        )
    }

    /// Check if this error came from position-key generation
    pub fn is_position_error(&self) -> bool {
        matches!(
            self,
            ListError::BoundsOutOfOrder { .. } | ListError::NoRoom | ListError::InvalidAlphabet { .. }
        )
    }
}

// Conversion from ListError to the main Error type
impl From<ListError> for crate::Error {
    fn from(err: ListError) -> Self {
        crate::Error::List(err)
    }
}
