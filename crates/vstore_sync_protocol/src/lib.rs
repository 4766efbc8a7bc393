//! # vstore Sync Protocol
//!
//! Protocol messages and frame codec for vstore synchronization.
//!
//! This crate provides:
//! - `Message`, the envelope exchanged with the authority (Subscribe,
//!   Unsubscribe, ValueChanged, ValueRemoved, MultiGet, MultiSet, Result,
//!   SyncCompleted)
//! - CBOR encoding/decoding of messages
//! - A frame codec that auto-detects the legacy and marked frame layouts
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{encode_frame, FrameDecoder, FrameEncoding, DEFAULT_MAX_FRAME_SIZE, FRAME_MARKER};
pub use messages::{Message, ResultStatus, ValueUpdate};
