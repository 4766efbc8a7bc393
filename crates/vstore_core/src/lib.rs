//! # vstore core
//!
//! Typed, change-notifying hierarchical value store.
//!
//! This crate provides:
//! - Dotted value identifiers and their stable 64-bit hash tokens
//! - Typed payloads with per-kind set rules (bounds, enumerators, collections)
//! - The value store: tree queries, subtree removal, containers with templates
//! - Observer lists with owned subscription handles
//!
//! ## Key Invariants
//!
//! - A rejected set never changes the stored value
//! - Setting an equal payload reports `SameValue` and emits no event
//! - Every mutation carries its provenance, and so does every event
//! - Events are delivered after the store lock is released

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod container;
mod data;
mod error;
mod id;
mod observer;
mod store;
mod typed;
mod value;

pub use container::{ContainerSchema, TemplateEntry};
pub use data::{
    Access, ContainerOrder, Data, EnumData, Enumerator, IntWidth, Interval, Kind, Provenance,
    TimeSpec, TimeVal,
};
pub use error::{SetError, StoreError, StoreResult};
pub use id::{HashToken, ValueId, SEPARATOR, WILDCARD};
pub use observer::{ObserverList, Subscription};
pub use store::{StoreEvent, ValueStore};
pub use typed::{has_data, normalize, set, validate, SetStatus};
pub use value::Value;
