//! # vstore Sync Engine
//!
//! Microservice-side synchronization for the vstore value store.
//!
//! This crate provides:
//! - `SyncClient`: subscriptions with completion callbacks, the outbound
//!   write queue and the resync performed after a lost connection
//! - `MessageHandler`: translation between store events and protocol
//!   messages, with echo suppression and the ancestor (app-name) filter
//! - `ConnectionManager`: reconnect backoff (250 ms doubling, wrapping at 8 s)
//! - `Transport` with TCP, local-domain socket and mock implementations
//! - `Executor` with a tokio strand and a deterministic manual executor
//!
//! ## Architecture
//!
//! The authority owns the data; each microservice mirrors the subtrees it
//! subscribed to in a local `ValueStore`:
//! 1. Local mutations are sent upstream as they happen
//! 2. Remote mutations are applied with `Remote` provenance and never echoed
//! 3. After a reconnect the client pushes its state, then resubscribes
//!
//! ## Key Invariants
//!
//! - All engine work runs as posted tasks on one executor
//! - Outbound messages are written in enqueue order
//! - Transport loss is recovered by the backoff loop, never surfaced as fatal

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connection;
mod error;
mod executor;
mod handler;
mod queue;
mod socket;
mod transport;

pub use client::{Completion, ConnectionState, SyncClient};
pub use config::{ClientConfig, Endpoint, RetryConfig, DEFAULT_PORT};
pub use connection::{AttemptPhase, ConnectionManager};
pub use error::{SyncError, SyncResult};
pub use executor::{Executor, ManualExecutor, Task, TimerHandle, TokioExecutor};
pub use handler::{MessageHandler, ResultEvent};
pub use queue::WriteQueue;
#[cfg(unix)]
pub use socket::UnixTransport;
pub use socket::{transport_for, TcpTransport};
pub use transport::{MockTransport, Transport, TransportEvents};
