//! Aggregate definitions.
//!
//! A [`Definition`] is the resolved, type-erased description of an
//! aggregate: its identity, root properties, entities, optionals and
//! collections, each property with its mapping [`Type`]. Backends work
//! exclusively from definitions; the typed [`Mapping`] additionally keeps
//! the accessors needed to normalize and rebuild domain objects.

pub(crate) mod resolve;
mod schema;

pub use resolve::{Definitions, Mapping};
pub use schema::{Aggregate, Component, ComponentSchema, Fields, Schema};
pub(crate) use schema::Slot;

use crate::error::{CoreError, CoreResult};
use crate::types::Type;

/// A mapped scalar property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Field name.
    pub name: String,
    /// Resolved mapping type.
    pub ty: Type,
}

impl PropertyDef {
    pub(crate) fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A mapped entity, optional or collection element type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDef {
    /// Field name on the aggregate.
    pub name: String,
    /// Scalar properties of the component.
    pub properties: Vec<PropertyDef>,
}

impl ComponentDef {
    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Where a property is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// The aggregate root.
    Root,
    /// Inside the named entity.
    Entity(&'a str),
    /// Inside the named optional.
    Optional(&'a str),
    /// Inside an element of the named collection.
    Collection(&'a str),
}

/// Resolved description of an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    name: String,
    id: Option<PropertyDef>,
    properties: Vec<PropertyDef>,
    entities: Vec<ComponentDef>,
    optionals: Vec<ComponentDef>,
    collections: Vec<ComponentDef>,
}

impl Definition {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            properties: Vec::new(),
            entities: Vec::new(),
            optionals: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Name of the aggregate.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identity field.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::MissingIdentity`] if the aggregate declared
    /// none.
    pub fn id(&self) -> CoreResult<&PropertyDef> {
        self.id.as_ref().ok_or_else(|| CoreError::MissingIdentity {
            model: self.name.clone(),
        })
    }

    /// Root scalar properties, excluding the identity.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Entities.
    #[must_use]
    pub fn entities(&self) -> &[ComponentDef] {
        &self.entities
    }

    /// Optionals.
    #[must_use]
    pub fn optionals(&self) -> &[ComponentDef] {
        &self.optionals
    }

    /// Collections.
    #[must_use]
    pub fn collections(&self) -> &[ComponentDef] {
        &self.collections
    }

    /// Looks up a root property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up an entity by name.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&ComponentDef> {
        self.entities.iter().find(|c| c.name == name)
    }

    /// Looks up an optional by name.
    #[must_use]
    pub fn optional(&self, name: &str) -> Option<&ComponentDef> {
        self.optionals.iter().find(|c| c.name == name)
    }

    /// Looks up a collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&ComponentDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Looks up the component a scope refers to.
    ///
    /// Returns `Ok(None)` for the root scope.
    pub fn component(&self, scope: Scope<'_>) -> CoreResult<Option<&ComponentDef>> {
        let (found, name) = match scope {
            Scope::Root => return Ok(None),
            Scope::Entity(name) => (self.entity(name), name),
            Scope::Optional(name) => (self.optional(name), name),
            Scope::Collection(name) => (self.collection(name), name),
        };
        found
            .map(Some)
            .ok_or_else(|| CoreError::unknown_property(&self.name, name))
    }

    /// Looks up a property within a scope.
    ///
    /// At the root the identity field is found too.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UnknownProperty`] if the scope or property
    /// doesn't exist.
    pub fn lookup(&self, scope: Scope<'_>, property: &str) -> CoreResult<&PropertyDef> {
        let found = match self.component(scope)? {
            None => self
                .id
                .as_ref()
                .filter(|id| id.name == property)
                .or_else(|| self.property(property)),
            Some(component) => component.property(property),
        };
        found.ok_or_else(|| {
            let qualified = match scope {
                Scope::Root => property.to_string(),
                Scope::Entity(name) | Scope::Optional(name) | Scope::Collection(name) => {
                    format!("{name}.{property}")
                }
            };
            CoreError::unknown_property(&self.name, qualified)
        })
    }

    /// Resolves a sort path: `property` at the root, or `entity.property`
    /// for a property of an entity.
    pub fn sort_key<'a>(&self, path: &'a str) -> CoreResult<(Scope<'a>, &PropertyDef)> {
        let scope = match path.split_once('.') {
            None => Scope::Root,
            Some((entity, _)) if self.entity(entity).is_some() => Scope::Entity(entity),
            Some(_) => return Err(CoreError::unknown_property(&self.name, path)),
        };
        let property = match scope {
            Scope::Root => path,
            _ => path.split_once('.').map_or(path, |(_, p)| p),
        };
        let def = self.lookup(scope, property)?;
        Ok((scope, def))
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.id
            .iter()
            .chain(&self.properties)
            .map(|p| p.name.as_str())
            .chain(
                self.entities
                    .iter()
                    .chain(&self.optionals)
                    .chain(&self.collections)
                    .map(|c| c.name.as_str()),
            )
    }

    fn ensure_unused(&self, name: &str) -> CoreResult<()> {
        if self.names().any(|n| n == name) {
            return Err(CoreError::definition(
                &self.name,
                format!("field {name} is declared twice"),
            ));
        }
        Ok(())
    }

    pub(crate) fn set_id(&mut self, name: &str) -> CoreResult<()> {
        if let Some(existing) = &self.id {
            return Err(CoreError::definition(
                &self.name,
                format!(
                    "multiple identity fields: {} and {name}",
                    existing.name
                ),
            ));
        }
        self.ensure_unused(name)?;
        self.id = Some(PropertyDef::new(name, Type::Identifier));
        Ok(())
    }

    pub(crate) fn push_property(&mut self, property: PropertyDef) -> CoreResult<usize> {
        self.ensure_unused(&property.name)?;
        self.properties.push(property);
        Ok(self.properties.len() - 1)
    }

    pub(crate) fn push_entity(&mut self, component: ComponentDef) -> CoreResult<usize> {
        self.ensure_unused(&component.name)?;
        self.entities.push(component);
        Ok(self.entities.len() - 1)
    }

    pub(crate) fn push_optional(&mut self, component: ComponentDef) -> CoreResult<usize> {
        self.ensure_unused(&component.name)?;
        self.optionals.push(component);
        Ok(self.optionals.len() - 1)
    }

    pub(crate) fn push_collection(&mut self, component: ComponentDef) -> CoreResult<usize> {
        self.ensure_unused(&component.name)?;
        self.collections.push(component);
        Ok(self.collections.len() - 1)
    }
}
