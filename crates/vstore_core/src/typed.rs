//! Typed set engine.
//!
//! Every replacement of a value's payload goes through [`set`], which decides
//! whether the incoming payload is a change, a repeat of the current payload,
//! or a violation of the target's declared type, range or enumerators.
//!
//! Rules:
//! - An unset target adopts the incoming kind (first write binds the type),
//!   provided the payload fits its own width, bounds and enumerators
//! - Any other kind mismatch is `InvalidType`, including signed against
//!   unsigned integers of the same width
//! - Equal payloads are `SameValue` and leave the target untouched
//! - Bounded integers reject values outside the declared bounds and width
//! - Enums reject values that are not declared enumerators
//! - Collections are normalized after assignment
//! - Struct and Container have no comparable payload and always succeed

use crate::data::{Data, EnumData, Interval, Kind};
use crate::error::SetError;

/// Outcome of an accepted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    /// The payload was replaced.
    Success,
    /// The incoming payload equals the current one; nothing changed.
    SameValue,
}

impl SetStatus {
    /// Returns true if the payload was replaced.
    pub fn is_changed(&self) -> bool {
        matches!(self, SetStatus::Success)
    }
}

/// Replaces `current` with `incoming` according to the per-kind rules.
///
/// On error `current` is left unchanged.
pub fn set(current: &mut Data, incoming: &Data) -> Result<SetStatus, SetError> {
    let current_kind = current.kind();
    let incoming_kind = incoming.kind();

    if current_kind == Kind::Unset {
        if incoming_kind == Kind::Unset {
            return Ok(SetStatus::SameValue);
        }
        validate(incoming)?;
        let mut adopted = incoming.clone();
        normalize(&mut adopted);
        *current = adopted;
        return Ok(SetStatus::Success);
    }

    if current_kind != incoming_kind {
        return Err(SetError::InvalidType {
            expected: current_kind,
            found: incoming_kind,
        });
    }

    if matches!(current_kind, Kind::Set | Kind::UnorderedSet | Kind::Vector) {
        return set_collection(current, incoming);
    }

    match (current, incoming) {
        (Data::Signed(target), Data::Signed(source)) => set_interval(target, source),
        (Data::Unsigned(target), Data::Unsigned(source)) => set_interval(target, source),
        (Data::Signed(_), Data::Unsigned(_)) | (Data::Unsigned(_), Data::Signed(_)) => {
            Err(SetError::InvalidType {
                expected: current_kind,
                found: incoming_kind,
            })
        }
        (Data::Enum(target), Data::Enum(source)) => set_enum(target, source),
        (Data::Struct, _) | (Data::Container(_), _) => Ok(SetStatus::Success),
        (current, incoming) => set_plain(current, incoming),
    }
}

/// Checks a payload against its own declaration: integers must fit their
/// width and declared bounds, enums with declared enumerators must hold one
/// of them.
pub fn validate(data: &Data) -> Result<(), SetError> {
    match data {
        Data::Signed(interval) => check_range(interval),
        Data::Unsigned(interval) => check_range(interval),
        Data::Enum(e) if !e.enumerators.is_empty() && !e.is_declared(e.value) => {
            Err(SetError::EnumError { value: e.value })
        }
        _ => Ok(()),
    }
}

fn check_range<T>(interval: &Interval<T>) -> Result<(), SetError>
where
    T: Copy + Default + PartialEq + Into<i128>,
{
    let (min, max) = interval.effective_range();
    let value: i128 = interval.value.into();
    if value < min || value > max {
        return Err(SetError::RangeError { value, min, max });
    }
    Ok(())
}

fn set_interval<T>(target: &mut Interval<T>, source: &Interval<T>) -> Result<SetStatus, SetError>
where
    T: Copy + Default + PartialEq + Into<i128>,
{
    if target.value == source.value {
        return Ok(SetStatus::SameValue);
    }
    let (min, max) = target.effective_range();
    let value: i128 = source.value.into();
    if value < min || value > max {
        return Err(SetError::RangeError { value, min, max });
    }
    target.value = source.value;
    Ok(SetStatus::Success)
}

fn set_enum(target: &mut EnumData, source: &EnumData) -> Result<SetStatus, SetError> {
    if target.value == source.value {
        return Ok(SetStatus::SameValue);
    }
    if !target.is_declared(source.value) {
        return Err(SetError::EnumError {
            value: source.value,
        });
    }
    target.value = source.value;
    Ok(SetStatus::Success)
}

fn set_plain(current: &mut Data, incoming: &Data) -> Result<SetStatus, SetError> {
    if current == incoming {
        return Ok(SetStatus::SameValue);
    }
    *current = incoming.clone();
    Ok(SetStatus::Success)
}

fn set_collection(current: &mut Data, incoming: &Data) -> Result<SetStatus, SetError> {
    let mut candidate = incoming.clone();
    normalize(&mut candidate);
    if collection_eq(current, &candidate) {
        return Ok(SetStatus::SameValue);
    }
    *current = candidate;
    Ok(SetStatus::Success)
}

/// Applies the collection normalization rules in place.
///
/// - `Set`: sorted and de-duplicated
/// - `UnorderedSet`: de-duplicated, first occurrence kept
/// - everything else: untouched
pub fn normalize(data: &mut Data) {
    match data {
        Data::Set(items) => {
            items.sort();
            items.dedup();
        }
        Data::UnorderedSet(items) => {
            let mut seen = std::collections::HashSet::new();
            items.retain(|item| seen.insert(item.clone()));
        }
        _ => {}
    }
}

fn collection_eq(a: &Data, b: &Data) -> bool {
    match (a, b) {
        (Data::UnorderedSet(x), Data::UnorderedSet(y)) => {
            let x: std::collections::HashSet<&String> = x.iter().collect();
            let y: std::collections::HashSet<&String> = y.iter().collect();
            x == y
        }
        _ => a == b,
    }
}

/// Returns true if the payload carries meaningful data.
///
/// Integers, enums, booleans, times and hardware addresses always have data
/// (zero is meaningful). Text, addresses, collections and opaque payloads
/// have data when non-empty; a UDID has data when not nil. Structural and
/// unset values never have data.
pub fn has_data(data: &Data) -> bool {
    match data {
        Data::Signed(_)
        | Data::Unsigned(_)
        | Data::Enum(_)
        | Data::Bool(_)
        | Data::TimeVal(_)
        | Data::TimeSpec(_)
        | Data::Eui48(_) => true,
        Data::Text(s) => !s.is_empty(),
        Data::Ipv4(addr) => addr.is_some(),
        Data::Ipv6(addr) => addr.is_some(),
        Data::Udid(uuid) => !uuid.is_nil(),
        Data::Multi(bytes) => !bytes.is_empty(),
        Data::Set(items) | Data::UnorderedSet(items) | Data::Vector(items) => !items.is_empty(),
        Data::Struct | Data::Container(_) | Data::Unset => false,
    }
}
