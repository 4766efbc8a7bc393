//! Schema-and-data fragments.
//!
//! A fragment is a JSON document declaring containers (with their instance
//! templates) and plain values:
//!
//! ```json
//! {
//!   "containers": [
//!     { "id": "logger", "ordered": true,
//!       "template": [ { "id": "logger.+.level", "data": { "text": "info" } } ] }
//!   ],
//!   "values": [
//!     { "id": "system.name", "access": "read_only", "data": { "text": "edge" } }
//!   ]
//! }
//! ```

use crate::error::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use vstore_core::{
    Access, ContainerOrder, ContainerSchema, Data, TemplateEntry, ValueId, ValueStore,
};

/// One declared value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDecl {
    /// Value ID (a wildcard pattern inside a template).
    pub id: ValueId,
    /// Access mode.
    #[serde(default)]
    pub access: Access,
    /// Initial payload.
    #[serde(default)]
    pub data: Data,
}

/// One declared container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDecl {
    /// Container ID.
    pub id: ValueId,
    /// Keys keep insertion order when true.
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    /// Values created for every instance.
    #[serde(default)]
    pub template: Vec<ValueDecl>,
}

fn default_ordered() -> bool {
    true
}

impl ContainerDecl {
    /// Builds the container schema.
    pub fn schema(&self) -> SchemaResult<ContainerSchema> {
        let order = if self.ordered {
            ContainerOrder::Ordered
        } else {
            ContainerOrder::Unordered
        };
        let mut schema = ContainerSchema::new(self.id.clone(), order);
        for decl in &self.template {
            schema = schema.with_entry(TemplateEntry {
                id: decl.id.clone(),
                data: decl.data.clone(),
                access: decl.access,
            })?;
        }
        Ok(schema)
    }
}

/// A parsed fragment file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Declared containers.
    #[serde(default)]
    pub containers: Vec<ContainerDecl>,
    /// Declared values.
    #[serde(default)]
    pub values: Vec<ValueDecl>,
}

impl Fragment {
    /// Parses a fragment from JSON text.
    pub fn parse(text: &str) -> SchemaResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a fragment file.
    pub fn read(path: &Path) -> SchemaResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SchemaError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Declares every container and value into `store`.
    ///
    /// Used on a scratch store, this validates the whole fragment against the
    /// typed set rules before any live value is touched.
    pub fn declare_into(&self, store: &ValueStore) -> SchemaResult<()> {
        for decl in &self.containers {
            store.declare_container(decl.schema()?)?;
        }
        for decl in &self.values {
            store.declare(&decl.id, decl.data.clone(), decl.access)?;
        }
        Ok(())
    }
}
