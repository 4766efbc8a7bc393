//! Protocol messages exchanged between a client and the authority.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use vstore_core::{HashToken, Value, ValueId};

/// One entry of a `ValueChanged` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueUpdate {
    /// A value's current state.
    Set {
        /// The value.
        value: Value,
    },
    /// A key was added to a container.
    AddToContainer {
        /// Container ID.
        container: ValueId,
        /// Added key.
        key: String,
    },
    /// A key was erased from a container.
    RemoveFromContainer {
        /// Container ID.
        container: ValueId,
        /// Erased key.
        key: String,
    },
}

impl ValueUpdate {
    /// Creates a `Set` update.
    pub fn set(value: Value) -> Self {
        ValueUpdate::Set { value }
    }

    /// Returns the target ID (the container for directives).
    pub fn id(&self) -> &ValueId {
        match self {
            ValueUpdate::Set { value } => &value.id,
            ValueUpdate::AddToContainer { container, .. }
            | ValueUpdate::RemoveFromContainer { container, .. } => container,
        }
    }

    /// Returns true for container add/remove directives.
    pub fn is_directive(&self) -> bool {
        !matches!(self, ValueUpdate::Set { .. })
    }
}

/// Status carried by a `Result` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The request succeeded.
    Success,
    /// One or more requested ids do not exist on the authority.
    NotFound,
    /// Any other failure, with an implementation-defined code.
    Other(u32),
}

impl ResultStatus {
    /// Returns true for [`ResultStatus::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, ResultStatus::Success)
    }
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    /// Subscribe to the subtrees rooted at `ids`.
    Subscribe {
        /// Client-chosen sequence number.
        sequence_no: u32,
        /// Subscribed roots.
        ids: Vec<ValueId>,
    },
    /// Drop every subscription of this client.
    Unsubscribe {
        /// Client-chosen sequence number.
        sequence_no: u32,
    },
    /// Values changed or container keys added/removed.
    ValueChanged {
        /// Updates in application order.
        values: Vec<ValueUpdate>,
    },
    /// Values deleted.
    ValueRemoved {
        /// Deleted IDs.
        ids: Vec<ValueId>,
        /// Hash token of each deleted ID, index-aligned with `ids`.
        tokens: Vec<HashToken>,
    },
    /// Read values once without subscribing.
    MultiGet {
        /// Client-chosen sequence number.
        sequence_no: u32,
        /// Requested IDs.
        ids: Vec<ValueId>,
    },
    /// Write several values in one request.
    MultiSet {
        /// Client-chosen sequence number.
        sequence_no: u32,
        /// Values to write.
        values: Vec<Value>,
    },
    /// Reply to a sequence-numbered request.
    Result {
        /// Sequence number of the request.
        sequence_no: u32,
        /// Outcome.
        status: ResultStatus,
        /// Values (on success) or the missing IDs (on not found).
        values: Vec<Value>,
    },
    /// Acknowledges a full resync.
    SyncCompleted,
}

impl Message {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            Message::Subscribe { .. } => 1,
            Message::Unsubscribe { .. } => 2,
            Message::ValueChanged { .. } => 3,
            Message::ValueRemoved { .. } => 4,
            Message::MultiGet { .. } => 5,
            Message::MultiSet { .. } => 6,
            Message::Result { .. } => 7,
            Message::SyncCompleted => 8,
        }
    }

    /// Returns the sequence number, for messages that carry one.
    pub fn sequence_no(&self) -> Option<u32> {
        match self {
            Message::Subscribe { sequence_no, .. }
            | Message::Unsubscribe { sequence_no }
            | Message::MultiGet { sequence_no, .. }
            | Message::MultiSet { sequence_no, .. }
            | Message::Result { sequence_no, .. } => Some(*sequence_no),
            Message::ValueChanged { .. }
            | Message::ValueRemoved { .. }
            | Message::SyncCompleted => None,
        }
    }

    /// Builds a `ValueRemoved` message, computing the token of each ID.
    pub fn value_removed(ids: Vec<ValueId>) -> Self {
        let tokens = ids.iter().map(ValueId::token).collect();
        Message::ValueRemoved { ids, tokens }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::decoding(e.to_string()))
    }
}
