//! # vstore_schema
//!
//! Runtime loading of schema-and-data fragments into a [`ValueStore`].
//!
//! A fragment declares containers (with their instance templates) and plain
//! values. Fragments can be merged into a live tree ([`load`]), taken out of
//! it again ([`unload`]) or reasserted over it ([`reload`]). The
//! [`DynamicLoader`] drives these actions from control values inside the
//! store itself, so a remote operator can switch fragments at runtime.
//!
//! [`ValueStore`]: vstore_core::ValueStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod fragment;
mod loader;

pub use config::{LoaderConfig, DEFAULT_ROOT};
pub use error::{SchemaError, SchemaResult};
pub use fragment::{ContainerDecl, Fragment, ValueDecl};
pub use loader::{load, reload, unload, DynamicLoader, LoadStatus, LoaderAction};
