//! Typed Uuids

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub struct TypedUuid<T>(Uuid, PhantomData<T>);

impl<T> TypedUuid<T> {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }

    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    #[must_use]
    pub const fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl<T> Default for TypedUuid<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedUuid<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedUuid<T> {}

impl<T> Debug for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<T> Display for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl<T> PartialEq for TypedUuid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for TypedUuid<T> {}

impl<T> Hash for TypedUuid<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialOrd for TypedUuid<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedUuid<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> From<Uuid> for TypedUuid<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T> From<TypedUuid<T>> for Uuid {
    fn from(typed: TypedUuid<T>) -> Self {
        typed.into_uuid()
    }
}

impl<T> FromStr for TypedUuid<T> {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(value).map(Self::from_uuid)
    }
}

impl<T> Serialize for TypedUuid<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for TypedUuid<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

/// Marker for tag identifiers printed on physical products.
pub struct TagMarker;

/// Marker for product identifiers embedded in verification tokens.
pub struct ProductMarker;

/// Marker for production batch identifiers.
pub struct BatchMarker;

/// Marker for ledger event identifiers.
pub struct EventMarker;

pub type TagUuid = TypedUuid<TagMarker>;
pub type ProductUuid = TypedUuid<ProductMarker>;
pub type BatchUuid = TypedUuid<BatchMarker>;
pub type EventUuid = TypedUuid<EventMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_uuid() {
        let uuid = Uuid::now_v7();
        let tag = TagUuid::from_uuid(uuid);

        assert_eq!(tag.into_uuid(), uuid);
        assert_eq!(tag.to_string(), uuid.to_string());
    }

    #[test]
    fn parses_from_canonical_string() {
        let tag: TagUuid = "11111111-1111-1111-1111-111111111111"
            .parse()
            .expect("canonical uuid should parse");

        assert_eq!(tag.to_string(), "11111111-1111-1111-1111-111111111111");
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("not-a-uuid".parse::<TagUuid>().is_err());
    }

    #[test]
    fn serializes_as_plain_uuid() {
        let tag = TagUuid::nil();
        let json = serde_json::to_string(&tag).expect("uuid serializes");

        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(EventUuid::new(), EventUuid::new());
    }
}
