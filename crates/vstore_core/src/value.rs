//! A single typed datum.

use crate::data::{Access, Data, Kind};
use crate::error::SetError;
use crate::id::{HashToken, ValueId};
use crate::typed::{self, SetStatus};
use serde::{Deserialize, Serialize};

/// A typed value identified by a [`ValueId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    /// Identifier.
    pub id: ValueId,
    /// Access mode.
    #[serde(default)]
    pub access: Access,
    /// Payload; its variant is the kind.
    pub data: Data,
}

impl Value {
    /// Creates a read-write value.
    pub fn new(id: ValueId, data: Data) -> Self {
        Self {
            id,
            access: Access::ReadWrite,
            data,
        }
    }

    /// Creates a value with an explicit access mode.
    pub fn with_access(id: ValueId, data: Data, access: Access) -> Self {
        Self { id, access, data }
    }

    /// Creates an unset value.
    pub fn unset(id: ValueId) -> Self {
        Self::new(id, Data::Unset)
    }

    /// Returns the kind tag.
    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    /// Returns the hash token of the ID.
    pub fn token(&self) -> HashToken {
        self.id.token()
    }

    /// Returns true if the value is read-only.
    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }

    /// Returns true if the payload carries meaningful data.
    pub fn has_data(&self) -> bool {
        typed::has_data(&self.data)
    }

    /// Replaces the payload through the typed set engine.
    pub fn set(&mut self, incoming: &Data) -> Result<SetStatus, SetError> {
        typed::set(&mut self.data, incoming)
    }
}
