//! Error types for the value store.

use crate::data::Kind;
use crate::id::{HashToken, ValueId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Rejections produced by the typed set engine.
///
/// A rejected set leaves the target value unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    /// The incoming kind differs from the bound kind of the target.
    #[error("invalid type: expected {expected:?}, found {found:?}")]
    InvalidType {
        /// Kind bound to the target.
        expected: Kind,
        /// Kind of the incoming payload.
        found: Kind,
    },

    /// The incoming integer lies outside the declared bounds or width.
    #[error("value {value} out of range [{min}, {max}]")]
    RangeError {
        /// Rejected value.
        value: i128,
        /// Effective lower bound.
        min: i128,
        /// Effective upper bound.
        max: i128,
    },

    /// The incoming value is not one of the declared enumerators.
    #[error("value {value} is not a declared enumerator")]
    EnumError {
        /// Rejected numeric value.
        value: i64,
    },

    /// A read-only value was written by a non-owning actor.
    #[error("value is read-only")]
    AccessError,
}

/// Errors that can occur in value store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Malformed value ID.
    #[error("invalid value id: {0}")]
    InvalidId(String),

    /// Value not found.
    #[error("value not found: {0}")]
    NotFound(ValueId),

    /// The value exists but is not a container.
    #[error("not a container: {0}")]
    NotAContainer(ValueId),

    /// A removal carried a token that does not belong to the ID.
    #[error("hash token {token} does not match {id}")]
    TokenMismatch {
        /// ID being removed.
        id: ValueId,
        /// Token carried with the removal.
        token: HashToken,
    },

    /// Two distinct IDs produced the same hash token.
    #[error("hash token collision between {existing} and {incoming}")]
    TokenCollision {
        /// ID already stored under the token.
        existing: ValueId,
        /// ID that collided with it.
        incoming: ValueId,
    },

    /// The typed set engine rejected a mutation.
    #[error("set rejected for {id}: {source}")]
    Rejected {
        /// Target ID.
        id: ValueId,
        /// Engine rejection.
        #[source]
        source: SetError,
    },
}

impl StoreError {
    /// Wraps a set rejection with the ID it concerns.
    pub fn rejected(id: &ValueId, source: SetError) -> Self {
        Self::Rejected {
            id: id.clone(),
            source,
        }
    }

    /// Returns the typed-set rejection, if this error is one.
    pub fn set_error(&self) -> Option<&SetError> {
        match self {
            StoreError::Rejected { source, .. } => Some(source),
            _ => None,
        }
    }
}
