//! Typed aggregate identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Identifier of an aggregate of type `M`.
///
/// Ids are UUIDs tagged with the aggregate they belong to, so an
/// `Id<User>` can't be passed where an `Id<Order>` is expected. An
/// aggregate describes its identity field with an `Id<Self>`; any other
/// `Id<_>` field is mapped as an ordinary identifier property.
pub struct Id<M> {
    uuid: Uuid,
    _model: PhantomData<fn() -> M>,
}

impl<M> Id<M> {
    /// Creates a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Creates an id from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _model: PhantomData,
        }
    }

    /// Parses an id from its hyphenated text form.
    pub fn parse(text: &str) -> CoreResult<Self> {
        Uuid::parse_str(text)
            .map(Self::from_uuid)
            .map_err(|_| CoreError::type_mismatch("identifier", text))
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn to_uuid(&self) -> Uuid {
        self.uuid
    }
}

impl<M> Default for Id<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Id<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Id<M> {}

impl<M> PartialEq for Id<M> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl<M> Eq for Id<M> {}

impl<M> PartialOrd for Id<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Id<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uuid.cmp(&other.uuid)
    }
}

impl<M> Hash for Id<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl<M> fmt::Debug for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.uuid)
    }
}

impl<M> fmt::Display for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<M> From<Uuid> for Id<M> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<M> From<Id<M>> for Uuid {
    fn from(id: Id<M>) -> Self {
        id.uuid
    }
}
