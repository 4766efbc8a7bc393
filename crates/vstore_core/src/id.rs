//! Value identifiers and hash tokens.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Wildcard segment matching any single container instance key.
pub const WILDCARD: &str = "+";

/// Dotted hierarchical path identifying one value.
///
/// Value IDs are:
/// - Immutable once constructed
/// - Ordered sequences of non-empty segments
/// - Compared segment by segment
///
/// The empty ID is the root of the tree and has no parent.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ValueId {
    segments: Vec<String>,
}

impl ValueId {
    /// Returns the root ID (no segments).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Creates an ID from segments.
    ///
    /// Returns an error if any segment is empty or contains the separator.
    pub fn from_segments<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// Parses a dotted string, e.g. `system.process.running`.
    pub fn parse(input: &str) -> StoreResult<Self> {
        if input.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(input.split(SEPARATOR))
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root ID.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the ID with the last segment removed, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<ValueId> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns the last segment, or `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns a new ID with one segment appended.
    pub fn join(&self, segment: &str) -> StoreResult<ValueId> {
        validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Returns the concatenation of this ID and `other`.
    #[must_use]
    pub fn concat(&self, other: &ValueId) -> ValueId {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Returns true if `prefix` is this ID or one of its ancestors.
    pub fn starts_with(&self, prefix: &ValueId) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Returns the remainder of this ID below `prefix`.
    pub fn relative_to(&self, prefix: &ValueId) -> Option<ValueId> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// Returns true if any segment is the `+` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.segments.iter().any(|s| s == WILDCARD)
    }

    /// Matches a concrete ID against this (possibly wildcarded) pattern.
    ///
    /// A `+` segment matches exactly one segment of any value.
    pub fn matches(&self, concrete: &ValueId) -> bool {
        self.segments.len() == concrete.segments.len()
            && self
                .segments
                .iter()
                .zip(concrete.segments.iter())
                .all(|(p, c)| p == WILDCARD || p == c)
    }

    /// Replaces every `+` segment with `key`.
    #[must_use]
    pub fn instantiate(&self, key: &str) -> ValueId {
        Self {
            segments: self
                .segments
                .iter()
                .map(|s| if s == WILDCARD { key.to_string() } else { s.clone() })
                .collect(),
        }
    }

    /// Returns the stable hash token of this ID.
    pub fn token(&self) -> HashToken {
        HashToken::of(self)
    }
}

fn validate_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty() {
        return Err(StoreError::InvalidId("empty segment".into()));
    }
    if segment.contains(SEPARATOR) {
        return Err(StoreError::InvalidId(format!(
            "segment '{segment}' contains separator"
        )));
    }
    Ok(())
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueId({self})")
    }
}

impl FromStr for ValueId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ValueId> for String {
    fn from(id: ValueId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ValueId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ValueId {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Stable 64-bit digest of a [`ValueId`].
///
/// Equal IDs always produce equal tokens, across processes and platforms.
/// Used for set membership (ancestor filters) and for validating removals
/// without the full path.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashToken(u64);

impl HashToken {
    /// Computes the token of an ID: the first 8 bytes of SHA-256 over the
    /// dotted form, big-endian.
    pub fn of(id: &ValueId) -> Self {
        let digest = Sha256::digest(id.to_string().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(bytes))
    }

    /// Creates a token from its raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashToken({:016x})", self.0)
    }
}

impl fmt::Display for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
