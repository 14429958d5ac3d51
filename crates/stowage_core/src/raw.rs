//! The raw model: what adapters persist.
//!
//! A raw aggregate is a tree of primitive [`Value`]s shaped after its
//! [`crate::Definition`]. A [`Diff`] carries only what changed between two
//! snapshots of the same aggregate.

use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// Identity of a raw aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Name of the identity field.
    pub name: String,
    /// The id.
    pub value: Uuid,
}

/// A named primitive value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Normalized value.
    pub value: Value,
}

impl Property {
    /// Creates a property.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

fn find<'a>(properties: &'a [Property], name: &str) -> Option<&'a Value> {
    properties.iter().find(|p| p.name == name).map(|p| &p.value)
}

fn merge(target: &mut Vec<Property>, changes: &[Property]) {
    for change in changes {
        match target.iter_mut().find(|p| p.name == change.name) {
            Some(existing) => existing.value = change.value.clone(),
            None => target.push(change.clone()),
        }
    }
}

/// Properties of an always-present component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Field name on the aggregate.
    pub name: String,
    /// Properties.
    pub properties: Vec<Property>,
}

impl Entity {
    /// Looks up a property value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        find(&self.properties, name)
    }
}

/// State of an optional component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Not present.
    Absent,
    /// Present. In a diff, holds only the changed properties.
    Present(Vec<Property>),
    /// Newly present since the previous snapshot, with every property.
    BrandNew(Vec<Property>),
}

impl Presence {
    /// The properties, if present.
    #[must_use]
    pub fn properties(&self) -> Option<&[Property]> {
        match self {
            Self::Absent => None,
            Self::Present(p) | Self::BrandNew(p) => Some(p),
        }
    }

    /// Returns true unless absent.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// An optional component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optional {
    /// Field name on the aggregate.
    pub name: String,
    /// Presence and properties.
    pub presence: Presence,
}

/// Stable identity of a collection element within its aggregate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference(Uuid);

impl Reference {
    /// Mints a new reference.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a reference from text.
    pub fn parse(text: &str) -> CoreResult<Self> {
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|_| CoreError::type_mismatch("reference", text))
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Reference {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.0)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A collection element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Reference of the element.
    pub reference: Reference,
    /// Properties.
    pub properties: Vec<Property>,
}

impl Element {
    /// Looks up a property value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        find(&self.properties, name)
    }
}

/// A collection of components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Field name on the aggregate.
    pub name: String,
    /// Elements, in aggregate order.
    pub elements: Vec<Element>,
}

/// A normalized aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    /// Identity.
    pub id: Identity,
    /// Root properties.
    pub properties: Vec<Property>,
    /// Entities.
    pub entities: Vec<Entity>,
    /// Optionals.
    pub optionals: Vec<Optional>,
    /// Collections.
    pub collections: Vec<Collection>,
}

impl Aggregate {
    /// Creates an aggregate with only an identity.
    pub fn new(id_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            id: Identity {
                name: id_name.into(),
                value: id,
            },
            properties: Vec::new(),
            entities: Vec::new(),
            optionals: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Looks up a root property value. The identity is found as text.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        if name == self.id.name {
            return Some(Value::Text(self.id.value.to_string()));
        }
        find(&self.properties, name).cloned()
    }

    /// Looks up an entity.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Looks up an optional.
    #[must_use]
    pub fn optional(&self, name: &str) -> Option<&Optional> {
        self.optionals.iter().find(|o| o.name == name)
    }

    /// Looks up a collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Applies a diff to this snapshot.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::IdentityMismatch`] if the diff belongs to
    /// another aggregate.
    pub fn apply(&mut self, diff: &Diff) -> CoreResult<()> {
        if diff.id != self.id {
            return Err(CoreError::IdentityMismatch {
                then: self.id.value.to_string(),
                now: diff.id.value.to_string(),
            });
        }

        merge(&mut self.properties, &diff.properties);

        for change in &diff.entities {
            match self.entities.iter_mut().find(|e| e.name == change.name) {
                Some(entity) => merge(&mut entity.properties, &change.properties),
                None => self.entities.push(change.clone()),
            }
        }

        for change in &diff.optionals {
            let presence = match (&change.presence, self.optional(&change.name)) {
                (Presence::Absent, _) => Presence::Absent,
                (Presence::BrandNew(all), _) => Presence::Present(all.clone()),
                (Presence::Present(changed), Some(current)) => {
                    let mut properties = current
                        .presence
                        .properties()
                        .map(<[Property]>::to_vec)
                        .unwrap_or_default();
                    merge(&mut properties, changed);
                    Presence::Present(properties)
                }
                (Presence::Present(changed), None) => Presence::Present(changed.clone()),
            };
            match self.optionals.iter_mut().find(|o| o.name == change.name) {
                Some(optional) => optional.presence = presence,
                None => self.optionals.push(Optional {
                    name: change.name.clone(),
                    presence,
                }),
            }
        }

        for change in &diff.collections {
            match self.collections.iter_mut().find(|c| c.name == change.name) {
                Some(collection) => collection.elements = change.elements.clone(),
                None => self.collections.push(Collection {
                    name: change.name.clone(),
                    elements: change.elements.clone(),
                }),
            }
        }
        Ok(())
    }
}

/// Changes to a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDiff {
    /// Field name on the aggregate.
    pub name: String,
    /// Elements that are new.
    pub added: Vec<Element>,
    /// References of elements that are gone.
    pub removed: Vec<Reference>,
    /// The full resulting collection.
    pub elements: Vec<Element>,
}

/// Changes between two snapshots of one aggregate.
///
/// Holds only what changed; unchanged properties, entities, optionals and
/// collections are omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// Identity of the aggregate.
    pub id: Identity,
    /// Changed root properties.
    pub properties: Vec<Property>,
    /// Entities with their changed properties.
    pub entities: Vec<Entity>,
    /// Optionals whose presence or properties changed.
    pub optionals: Vec<Optional>,
    /// Collections with added or removed elements.
    pub collections: Vec<CollectionDiff>,
}

impl Diff {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
            && self.entities.is_empty()
            && self.optionals.is_empty()
            && self.collections.is_empty()
    }
}
