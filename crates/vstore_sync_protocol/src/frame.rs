//! Frame codec.
//!
//! Two frame encodings coexist on the wire:
//!
//! ```text
//! Legacy: | length: u32 BE | payload |
//! Marked: | 0xA7 | length: u32 BE | payload |
//! ```
//!
//! The decoder inspects the first byte of every frame to tell them apart. A
//! legacy length whose first byte is the marker would exceed 2.6 GiB, far
//! above any accepted frame size, so the detection is unambiguous.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// First byte of a marked frame.
pub const FRAME_MARKER: u8 = 0xA7;

/// Default upper bound on a frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_LEN: usize = 4;

/// Header layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameEncoding {
    /// Length prefix only.
    Legacy,
    /// Marker byte followed by the length prefix.
    #[default]
    Marked,
}

impl FrameEncoding {
    /// Returns the header size in bytes.
    pub fn header_len(&self) -> usize {
        match self {
            FrameEncoding::Legacy => LENGTH_LEN,
            FrameEncoding::Marked => 1 + LENGTH_LEN,
        }
    }

    /// Detects the encoding of a frame from its first byte.
    pub fn detect(first: u8) -> Self {
        if first == FRAME_MARKER {
            FrameEncoding::Marked
        } else {
            FrameEncoding::Legacy
        }
    }

    /// Wraps a payload in a frame.
    pub fn frame(&self, payload: &[u8]) -> ProtocolResult<Bytes> {
        let length = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        let mut buf = BytesMut::with_capacity(self.header_len() + payload.len());
        if *self == FrameEncoding::Marked {
            buf.put_u8(FRAME_MARKER);
        }
        buf.put_u32(length);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }
}

/// Encodes a message and wraps it in a frame.
pub fn encode_frame(message: &Message, encoding: FrameEncoding) -> ProtocolResult<Bytes> {
    encoding.frame(&message.encode()?)
}

/// Incremental frame decoder over a byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Creates a decoder with [`DEFAULT_MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a decoder with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the number of buffered bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extracts the next complete frame payload.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. An oversized frame
    /// is an error and discards the buffer, since the stream cannot be
    /// resynchronized past it.
    pub fn next_frame(&mut self) -> ProtocolResult<Option<(FrameEncoding, Bytes)>> {
        let Some(&first) = self.buffer.first() else {
            return Ok(None);
        };
        let encoding = FrameEncoding::detect(first);
        let header_len = encoding.header_len();
        if self.buffer.len() < header_len {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_LEN];
        length_bytes.copy_from_slice(&self.buffer[header_len - LENGTH_LEN..header_len]);
        let size = u32::from_be_bytes(length_bytes) as usize;
        if size > self.max_frame_size {
            self.buffer.clear();
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        if self.buffer.len() < header_len + size {
            return Ok(None);
        }

        self.buffer.advance(header_len);
        Ok(Some((encoding, self.buffer.split_to(size).freeze())))
    }

    /// Extracts and decodes the next complete message.
    pub fn next_message(&mut self) -> ProtocolResult<Option<Message>> {
        match self.next_frame()? {
            Some((_, payload)) => Message::decode(&payload).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
