//! Container schemas.
//!
//! A container's schema is the template instantiated for every key added to
//! it. Template entries are addressed with the `+` wildcard in place of the
//! instance key, e.g. `logger.+.level`.

use crate::data::{Access, ContainerOrder, Data};
use crate::error::{StoreError, StoreResult};
use crate::id::{ValueId, WILDCARD};
use serde::{Deserialize, Serialize};

/// One value created for every container instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Wildcard pattern, e.g. `logger.+.level`.
    pub id: ValueId,
    /// Default payload.
    pub data: Data,
    /// Access mode.
    #[serde(default)]
    pub access: Access,
}

impl TemplateEntry {
    /// Creates a read-write template entry.
    pub fn new(id: ValueId, data: Data) -> Self {
        Self {
            id,
            data,
            access: Access::ReadWrite,
        }
    }
}

/// Schema of a dynamically keyed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSchema {
    /// Container ID.
    pub id: ValueId,
    /// Key order.
    pub order: ContainerOrder,
    /// Values created for each instance.
    #[serde(default)]
    pub template: Vec<TemplateEntry>,
}

impl ContainerSchema {
    /// Creates a schema without template entries.
    pub fn new(id: ValueId, order: ContainerOrder) -> Self {
        Self {
            id,
            order,
            template: Vec::new(),
        }
    }

    /// Adds a template entry.
    ///
    /// The entry must live strictly below `<container>.+`.
    pub fn with_entry(mut self, entry: TemplateEntry) -> StoreResult<Self> {
        self.validate_entry(&entry)?;
        self.template.push(entry);
        Ok(self)
    }

    /// Checks that every template entry lives below `<container>.+`.
    pub fn validate(&self) -> StoreResult<()> {
        self.template
            .iter()
            .try_for_each(|entry| self.validate_entry(entry))
    }

    fn validate_entry(&self, entry: &TemplateEntry) -> StoreResult<()> {
        let instance = self.id.join(WILDCARD)?;
        if entry.id.depth() <= instance.depth() || !entry.id.starts_with(&instance) {
            return Err(StoreError::InvalidId(format!(
                "template entry {} is not below {}",
                entry.id, instance
            )));
        }
        Ok(())
    }

    /// Returns the ID of the instance root for `key`.
    pub fn instance_id(&self, key: &str) -> StoreResult<ValueId> {
        self.id.join(key)
    }

    /// Returns the concrete values created for `key`.
    pub fn instantiate(&self, key: &str) -> Vec<(ValueId, Data, Access)> {
        self.template
            .iter()
            .map(|entry| (entry.id.instantiate(key), entry.data.clone(), entry.access))
            .collect()
    }
}
