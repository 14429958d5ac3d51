//! Describing domain types.
//!
//! Aggregates and components list their fields through a [`Schema`] or
//! [`ComponentSchema`], pairing each field name with an accessor. The
//! accessors are kept so normalization can read the fields back without
//! any runtime reflection, and [`Fields`] carries values the other way
//! when an aggregate is rebuilt.

use std::any::TypeId;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::id::Id;
use crate::types::{Declared, DomainValue, Scalar};

/// A persistable aggregate root.
///
/// ```
/// use stowage_core::{Aggregate, CoreResult, Fields, Id, Schema};
///
/// struct Note {
///     id: Id<Note>,
///     text: String,
/// }
///
/// impl Aggregate for Note {
///     const NAME: &'static str = "note";
///
///     fn describe(schema: &mut Schema<Self>) {
///         schema.id("id", |n| &n.id).property("text", |n| &n.text);
///     }
///
///     fn assemble(mut fields: Fields) -> CoreResult<Self> {
///         Ok(Self {
///             id: fields.id()?,
///             text: fields.take("text")?,
///         })
///     }
/// }
/// ```
pub trait Aggregate: Sized + 'static {
    /// Name of the aggregate in storage (table, index or directory name).
    const NAME: &'static str;

    /// Declares the fields of the aggregate.
    fn describe(schema: &mut Schema<Self>);

    /// Rebuilds the aggregate from mapped fields.
    fn assemble(fields: Fields) -> CoreResult<Self>;
}

/// A value object owned by an aggregate: an entity, an optional or a
/// collection element.
///
/// Components hold scalar properties only.
pub trait Component: Sized + 'static {
    /// Declares the properties of the component.
    fn describe(schema: &mut ComponentSchema<Self>);

    /// Rebuilds the component from mapped fields.
    fn assemble(fields: Fields) -> CoreResult<Self>;
}

pub(crate) type Extractor<M> = Box<dyn Fn(&M) -> Slot + Send + Sync>;

/// How a field was declared.
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Identity { owner: TypeId },
    Scalar(Declared),
    Entity(ComponentShape),
    Optional(ComponentShape),
    Collection(ComponentShape),
}

#[derive(Debug, Clone)]
pub(crate) struct ComponentShape {
    pub(crate) type_name: &'static str,
    pub(crate) fields: Vec<(&'static str, Declared)>,
}

pub(crate) struct FieldDecl<M> {
    pub(crate) name: &'static str,
    pub(crate) shape: Shape,
    pub(crate) extract: Extractor<M>,
}

/// Field declarations of an aggregate.
pub struct Schema<M> {
    pub(crate) fields: Vec<FieldDecl<M>>,
    pub(crate) excluded: Vec<&'static str>,
}

impl<M: Aggregate> Schema<M> {
    pub(crate) fn describe() -> Self {
        let mut schema = Self {
            fields: Vec::new(),
            excluded: Vec::new(),
        };
        M::describe(&mut schema);
        schema
    }

    /// Declares an identity field.
    ///
    /// Only an `Id<M>` of the aggregate itself becomes the identity; an id
    /// owned by another aggregate is mapped as an identifier property.
    pub fn id<O, F>(&mut self, name: &'static str, get: F) -> &mut Self
    where
        O: 'static,
        F: Fn(&M) -> &Id<O> + Send + Sync + 'static,
    {
        self.fields.push(FieldDecl {
            name,
            shape: Shape::Identity {
                owner: TypeId::of::<O>(),
            },
            extract: Box::new(move |m| Slot::Identity(get(m).to_uuid())),
        });
        self
    }

    /// Declares a scalar property.
    pub fn property<T, F>(&mut self, name: &'static str, get: F) -> &mut Self
    where
        T: Scalar,
        F: Fn(&M) -> &T + Send + Sync + 'static,
    {
        self.fields.push(FieldDecl {
            name,
            shape: Shape::Scalar(T::declared()),
            extract: Box::new(move |m| Slot::Scalar(get(m).to_domain())),
        });
        self
    }

    /// Declares an entity: a component that is always present.
    pub fn entity<C, F>(&mut self, name: &'static str, get: F) -> &mut Self
    where
        C: Component,
        F: Fn(&M) -> &C + Send + Sync + 'static,
    {
        let component = Arc::new(ComponentSchema::<C>::describe());
        let shape = Shape::Entity(component.shape());
        self.fields.push(FieldDecl {
            name,
            shape,
            extract: Box::new(move |m| Slot::Entity(component.extract(get(m)))),
        });
        self
    }

    /// Declares an optional: a component that may be absent.
    pub fn optional<C, F>(&mut self, name: &'static str, get: F) -> &mut Self
    where
        C: Component,
        F: Fn(&M) -> &Option<C> + Send + Sync + 'static,
    {
        let component = Arc::new(ComponentSchema::<C>::describe());
        let shape = Shape::Optional(component.shape());
        self.fields.push(FieldDecl {
            name,
            shape,
            extract: Box::new(move |m| {
                Slot::Optional(get(m).as_ref().map(|c| component.extract(c)))
            }),
        });
        self
    }

    /// Declares a collection of components.
    pub fn collection<C, F>(&mut self, name: &'static str, get: F) -> &mut Self
    where
        C: Component,
        F: Fn(&M) -> &Vec<C> + Send + Sync + 'static,
    {
        let component = Arc::new(ComponentSchema::<C>::describe());
        let shape = Shape::Collection(component.shape());
        self.fields.push(FieldDecl {
            name,
            shape,
            extract: Box::new(move |m| {
                Slot::Collection(get(m).iter().map(|c| component.extract(c)).collect())
            }),
        });
        self
    }

    /// Excludes a declared field from persistence.
    pub fn exclude(&mut self, name: &'static str) -> &mut Self {
        self.excluded.push(name);
        self
    }
}

struct ComponentField<C> {
    name: &'static str,
    declared: Declared,
    extract: Box<dyn Fn(&C) -> DomainValue + Send + Sync>,
}

/// Property declarations of a component.
pub struct ComponentSchema<C> {
    fields: Vec<ComponentField<C>>,
    excluded: Vec<&'static str>,
}

impl<C: Component> ComponentSchema<C> {
    fn describe() -> Self {
        let mut schema = Self {
            fields: Vec::new(),
            excluded: Vec::new(),
        };
        C::describe(&mut schema);
        schema.fields.retain(|f| !schema.excluded.contains(&f.name));
        schema
    }

    /// Declares a scalar property.
    pub fn property<T, F>(&mut self, name: &'static str, get: F) -> &mut Self
    where
        T: Scalar,
        F: Fn(&C) -> &T + Send + Sync + 'static,
    {
        self.fields.push(ComponentField {
            name,
            declared: T::declared(),
            extract: Box::new(move |c| get(c).to_domain()),
        });
        self
    }

    /// Excludes a declared property from persistence.
    pub fn exclude(&mut self, name: &'static str) -> &mut Self {
        self.excluded.push(name);
        self
    }

    fn shape(&self) -> ComponentShape {
        ComponentShape {
            type_name: std::any::type_name::<C>(),
            fields: self
                .fields
                .iter()
                .map(|f| (f.name, f.declared.clone()))
                .collect(),
        }
    }

    fn extract(&self, component: &C) -> Fields {
        let mut fields = Fields::new(std::any::type_name::<C>());
        for field in &self.fields {
            fields.insert(field.name, Slot::Scalar((field.extract)(component)));
        }
        fields
    }
}

/// A field value travelling between a domain object and the raw model.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Identity(Uuid),
    Scalar(DomainValue),
    Entity(Fields),
    Optional(Option<Fields>),
    Collection(Vec<Fields>),
}

/// Named field values handed to [`Aggregate::assemble`] and
/// [`Component::assemble`].
#[derive(Debug, Clone)]
pub struct Fields {
    owner: String,
    slots: Vec<(String, Slot)>,
}

impl Fields {
    pub(crate) fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            slots: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, slot: Slot) {
        self.slots.push((name.into(), slot));
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    fn remove(&mut self, name: &str) -> Option<Slot> {
        let position = self.slots.iter().position(|(n, _)| n == name)?;
        Some(self.slots.swap_remove(position).1)
    }

    fn missing(&self, name: &str) -> CoreError {
        CoreError::definition(
            self.owner.clone(),
            format!("field {name} is not mapped or was already taken"),
        )
    }

    fn wrong_shape(&self, name: &str, expected: &str) -> CoreError {
        CoreError::definition(
            self.owner.clone(),
            format!("field {name} is not mapped as {expected}"),
        )
    }

    /// Takes the identity of the aggregate.
    pub fn id<M>(&mut self) -> CoreResult<Id<M>> {
        let position = self
            .slots
            .iter()
            .position(|(_, s)| matches!(s, Slot::Identity(_)));
        match position.map(|p| self.slots.swap_remove(p).1) {
            Some(Slot::Identity(uuid)) => Ok(Id::from_uuid(uuid)),
            _ => Err(CoreError::MissingIdentity {
                model: self.owner.clone(),
            }),
        }
    }

    /// Takes a scalar property.
    pub fn take<T: Scalar>(&mut self, name: &str) -> CoreResult<T> {
        match self.remove(name) {
            Some(Slot::Scalar(value)) => T::from_domain(value),
            Some(Slot::Identity(uuid)) => T::from_domain(DomainValue::Uuid(uuid)),
            Some(_) => Err(self.wrong_shape(name, "a property")),
            None => Err(self.missing(name)),
        }
    }

    /// Takes a scalar property, or `None` when the field isn't mapped
    /// (for example because it was excluded).
    pub fn maybe_take<T: Scalar>(&mut self, name: &str) -> CoreResult<Option<T>> {
        if self.get(name).is_none() {
            return Ok(None);
        }
        self.take(name).map(Some)
    }

    /// Takes and assembles an entity.
    pub fn entity<C: Component>(&mut self, name: &str) -> CoreResult<C> {
        match self.remove(name) {
            Some(Slot::Entity(fields)) => C::assemble(fields),
            Some(_) => Err(self.wrong_shape(name, "an entity")),
            None => Err(self.missing(name)),
        }
    }

    /// Takes and assembles an optional.
    pub fn optional<C: Component>(&mut self, name: &str) -> CoreResult<Option<C>> {
        match self.remove(name) {
            Some(Slot::Optional(Some(fields))) => C::assemble(fields).map(Some),
            Some(Slot::Optional(None)) => Ok(None),
            Some(_) => Err(self.wrong_shape(name, "an optional")),
            None => Err(self.missing(name)),
        }
    }

    /// Takes and assembles a collection.
    pub fn collection<C: Component>(&mut self, name: &str) -> CoreResult<Vec<C>> {
        match self.remove(name) {
            Some(Slot::Collection(elements)) => elements.into_iter().map(C::assemble).collect(),
            Some(_) => Err(self.wrong_shape(name, "a collection")),
            None => Err(self.missing(name)),
        }
    }
}
