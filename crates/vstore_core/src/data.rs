//! Kinds and payloads of values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

/// Width of a bounded integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntWidth {
    /// 8-bit signed.
    I8,
    /// 16-bit signed.
    I16,
    /// 32-bit signed.
    I32,
    /// 64-bit signed.
    I64,
    /// 8-bit unsigned.
    U8,
    /// 16-bit unsigned.
    U16,
    /// 32-bit unsigned.
    U32,
    /// 64-bit unsigned.
    U64,
}

impl IntWidth {
    /// Returns the representable range of this width.
    pub fn limits(&self) -> (i128, i128) {
        match self {
            IntWidth::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            IntWidth::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            IntWidth::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            IntWidth::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            IntWidth::U8 => (0, i128::from(u8::MAX)),
            IntWidth::U16 => (0, i128::from(u16::MAX)),
            IntWidth::U32 => (0, i128::from(u32::MAX)),
            IntWidth::U64 => (0, i128::from(u64::MAX)),
        }
    }

    /// Returns true for signed widths.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IntWidth::I8 | IntWidth::I16 | IntWidth::I32 | IntWidth::I64
        )
    }
}

/// Kind tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// No type bound yet; the first write binds it.
    Unset,
    /// Boolean.
    Bool,
    /// UTF-8 text.
    Text,
    /// Bounded integer of the given width.
    Int(IntWidth),
    /// Enumeration with declared enumerators.
    Enum,
    /// IPv4 address.
    Ipv4,
    /// IPv6 address.
    Ipv6,
    /// EUI-48 hardware address.
    Eui48,
    /// Unique device identifier.
    Udid,
    /// Seconds and microseconds.
    TimeVal,
    /// Seconds and nanoseconds.
    TimeSpec,
    /// Opaque multi-format payload.
    Multi,
    /// Sorted, de-duplicated string set.
    Set,
    /// De-duplicated string set without ordering.
    UnorderedSet,
    /// Ordered string sequence.
    Vector,
    /// Fixed, schema-defined children.
    Struct,
    /// Dynamically keyed children.
    Container,
}

impl Kind {
    /// Returns true for Struct and Container.
    pub fn is_structural(&self) -> bool {
        matches!(self, Kind::Struct | Kind::Container)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Int(width) => write!(f, "{width:?}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Bounded integer payload.
///
/// Bounds of `(0, 0)` mean unbounded; zero is itself a valid value, so the
/// pair is a sentinel rather than a real bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    /// Declared width.
    pub width: IntWidth,
    /// Current value.
    pub value: T,
    /// Lower bound.
    #[serde(default)]
    pub min: T,
    /// Upper bound.
    #[serde(default)]
    pub max: T,
}

impl<T: Copy + Default + PartialEq + Into<i128>> Interval<T> {
    /// Creates an unbounded interval.
    pub fn new(width: IntWidth, value: T) -> Self {
        Self {
            width,
            value,
            min: T::default(),
            max: T::default(),
        }
    }

    /// Creates an interval with explicit bounds.
    pub fn bounded(width: IntWidth, value: T, min: T, max: T) -> Self {
        Self {
            width,
            value,
            min,
            max,
        }
    }

    /// Returns true if bounds are declared.
    pub fn has_bounds(&self) -> bool {
        self.min != T::default() || self.max != T::default()
    }

    /// Returns the effective `[min, max]` for a candidate value: the declared
    /// bounds when present, intersected with the width's limits.
    pub fn effective_range(&self) -> (i128, i128) {
        let (lo, hi) = self.width.limits();
        if self.has_bounds() {
            (lo.max(self.min.into()), hi.min(self.max.into()))
        } else {
            (lo, hi)
        }
    }
}

/// One declared enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumerator {
    /// Symbolic name.
    pub name: String,
    /// Numeric value.
    pub value: i64,
}

impl Enumerator {
    /// Creates an enumerator.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Enumeration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumData {
    /// Current numeric value.
    pub value: i64,
    /// Declared enumerators.
    #[serde(default)]
    pub enumerators: Vec<Enumerator>,
}

impl EnumData {
    /// Returns true if `value` is a declared enumerator.
    pub fn is_declared(&self, value: i64) -> bool {
        self.enumerators.iter().any(|e| e.value == value)
    }

    /// Returns the name of the current value.
    pub fn name(&self) -> Option<&str> {
        self.enumerators
            .iter()
            .find(|e| e.value == self.value)
            .map(|e| e.name.as_str())
    }

    /// Looks up the numeric value of an enumerator by name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.enumerators
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value)
    }
}

/// Seconds and microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeVal {
    /// Seconds.
    pub sec: i64,
    /// Microseconds.
    pub usec: i64,
}

/// Seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeSpec {
    /// Seconds.
    pub sec: i64,
    /// Nanoseconds.
    pub nsec: i64,
}

/// Order of a container's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerOrder {
    /// Keys keep insertion order.
    Ordered,
    /// Keys are reported sorted.
    Unordered,
}

/// Typed payload of a value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Data {
    /// No payload; type not yet bound.
    #[default]
    Unset,
    /// Boolean.
    Bool(bool),
    /// UTF-8 text.
    Text(String),
    /// Signed bounded integer.
    Signed(Interval<i64>),
    /// Unsigned bounded integer.
    Unsigned(Interval<u64>),
    /// Enumeration.
    Enum(EnumData),
    /// IPv4 address (empty when `None`).
    Ipv4(Option<Ipv4Addr>),
    /// IPv6 address (empty when `None`).
    Ipv6(Option<Ipv6Addr>),
    /// EUI-48 hardware address.
    Eui48([u8; 6]),
    /// Unique device identifier.
    Udid(Uuid),
    /// Seconds and microseconds.
    TimeVal(TimeVal),
    /// Seconds and nanoseconds.
    TimeSpec(TimeSpec),
    /// Opaque payload compared bytewise.
    Multi(Vec<u8>),
    /// Sorted, de-duplicated strings.
    Set(Vec<String>),
    /// De-duplicated strings, order not significant.
    UnorderedSet(Vec<String>),
    /// Ordered strings.
    Vector(Vec<String>),
    /// Fixed children; no comparable payload.
    Struct,
    /// Dynamically keyed children; no comparable payload.
    Container(ContainerOrder),
}

impl Data {
    /// Returns the kind tag of this payload.
    pub fn kind(&self) -> Kind {
        match self {
            Data::Unset => Kind::Unset,
            Data::Bool(_) => Kind::Bool,
            Data::Text(_) => Kind::Text,
            Data::Signed(i) => Kind::Int(i.width),
            Data::Unsigned(i) => Kind::Int(i.width),
            Data::Enum(_) => Kind::Enum,
            Data::Ipv4(_) => Kind::Ipv4,
            Data::Ipv6(_) => Kind::Ipv6,
            Data::Eui48(_) => Kind::Eui48,
            Data::Udid(_) => Kind::Udid,
            Data::TimeVal(_) => Kind::TimeVal,
            Data::TimeSpec(_) => Kind::TimeSpec,
            Data::Multi(_) => Kind::Multi,
            Data::Set(_) => Kind::Set,
            Data::UnorderedSet(_) => Kind::UnorderedSet,
            Data::Vector(_) => Kind::Vector,
            Data::Struct => Kind::Struct,
            Data::Container(_) => Kind::Container,
        }
    }

    /// Creates unbounded signed integer data.
    pub fn signed(width: IntWidth, value: i64) -> Self {
        Data::Signed(Interval::new(width, value))
    }

    /// Creates unbounded unsigned integer data.
    pub fn unsigned(width: IntWidth, value: u64) -> Self {
        Data::Unsigned(Interval::new(width, value))
    }

    /// Creates text data.
    pub fn text(value: impl Into<String>) -> Self {
        Data::Text(value.into())
    }

    /// Creates enum data from `(name, value)` pairs.
    pub fn enumeration<I, S>(value: i64, enumerators: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Data::Enum(EnumData {
            value,
            enumerators: enumerators
                .into_iter()
                .map(|(name, v)| Enumerator::new(name, v))
                .collect(),
        })
    }

    /// Returns the text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the enum payload, if any.
    pub fn as_enum(&self) -> Option<&EnumData> {
        match self {
            Data::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Returns an integer payload widened to `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Data::Signed(i) => Some(i128::from(i.value)),
            Data::Unsigned(i) => Some(i128::from(i.value)),
            _ => None,
        }
    }
}

/// Access mode of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Only the owner may write.
    ReadOnly,
    /// Any actor may write.
    #[default]
    ReadWrite,
}

/// Origin of a mutation.
///
/// Not persisted; passed through every store call and carried on every
/// store event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Originated in this process.
    Local,
    /// Arrived from the wire.
    Remote,
}

impl Provenance {
    /// Returns true for [`Provenance::Remote`].
    pub fn is_remote(&self) -> bool {
        matches!(self, Provenance::Remote)
    }
}
