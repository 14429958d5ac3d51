//! Turning a described schema into a definition.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};

use super::schema::{ComponentShape, FieldDecl, Schema, Shape};
use super::{Aggregate, ComponentDef, Definition, PropertyDef};
use crate::error::{CoreError, CoreResult};
use crate::types::{Declared, Registry, Type};

/// What a mapped field turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Identity,
    Property(usize),
    Entity(usize),
    Optional(usize),
    Collection(usize),
}

pub(crate) struct MappedField<M> {
    pub(crate) decl: FieldDecl<M>,
    pub(crate) role: Role,
}

/// The resolved mapping of aggregate type `M`.
///
/// Holds the type-erased [`Definition`] together with the accessors
/// collected while describing `M`.
pub struct Mapping<M> {
    pub(crate) definition: Arc<Definition>,
    pub(crate) fields: Vec<MappedField<M>>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Mapping<M> {
    /// The resolved definition.
    #[must_use]
    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }
}

impl<M> fmt::Debug for Mapping<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl<M: Aggregate> Mapping<M> {
    /// Describes `M` and resolves every field through `registry`.
    ///
    /// Each field is tried as, in order: the aggregate's own identity, a
    /// scalar property, an optional, an entity, a collection. Excluded
    /// fields are skipped.
    pub fn resolve(registry: &Registry) -> CoreResult<Self> {
        let schema = Schema::<M>::describe();
        let mut definition = Definition::new(M::NAME);
        let mut fields = Vec::with_capacity(schema.fields.len());

        for decl in schema.fields {
            if schema.excluded.contains(&decl.name) {
                trace!(model = M::NAME, field = decl.name, "field excluded");
                continue;
            }

            let role = match &decl.shape {
                Shape::Identity { owner } if *owner == TypeId::of::<M>() => {
                    definition.set_id(decl.name)?;
                    Role::Identity
                }
                Shape::Identity { .. } => {
                    let ty = registry.resolve(&Declared::Identifier);
                    Role::Property(definition.push_property(PropertyDef::new(decl.name, ty))?)
                }
                Shape::Scalar(declared) => {
                    let ty = scalar(M::NAME, decl.name, declared, registry)?;
                    Role::Property(definition.push_property(PropertyDef::new(decl.name, ty))?)
                }
                Shape::Optional(shape) => {
                    Role::Optional(definition.push_optional(component(decl.name, shape, registry)?)?)
                }
                Shape::Entity(shape) => {
                    Role::Entity(definition.push_entity(component(decl.name, shape, registry)?)?)
                }
                Shape::Collection(shape) => Role::Collection(
                    definition.push_collection(component(decl.name, shape, registry)?)?,
                ),
            };
            fields.push(MappedField { decl, role });
        }

        debug!(
            model = M::NAME,
            properties = definition.properties().len(),
            entities = definition.entities().len(),
            optionals = definition.optionals().len(),
            collections = definition.collections().len(),
            "definition resolved"
        );

        Ok(Self {
            definition: Arc::new(definition),
            fields,
            _model: PhantomData,
        })
    }
}

/// Resolves a scalar field.
///
/// `Option<Option<T>>` is rejected: both `None` and `Some(None)` would be
/// stored as null, so the value could not be read back.
fn scalar(owner: &str, field: &str, declared: &Declared, registry: &Registry) -> CoreResult<Type> {
    if let Declared::Nullable(inner) = declared {
        if matches!(**inner, Declared::Nullable(_)) {
            return Err(CoreError::definition(
                owner,
                format!("field {field} nests an Option inside an Option"),
            ));
        }
    }
    Ok(registry.resolve(declared))
}

fn component(name: &str, shape: &ComponentShape, registry: &Registry) -> CoreResult<ComponentDef> {
    trace!(component = shape.type_name, field = name, "resolving component");
    Ok(ComponentDef {
        name: name.to_string(),
        properties: shape
            .fields
            .iter()
            .map(|(field, declared)| {
                scalar(shape.type_name, field, declared, registry).map(|ty| PropertyDef::new(*field, ty))
            })
            .collect::<CoreResult<_>>()?,
    })
}

/// Cache of resolved mappings, one per aggregate type.
pub struct Definitions {
    registry: Registry,
    cache: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Definitions {
    /// Creates an empty cache resolving through `registry`.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The registry used for resolution.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the mapping of `M`, resolving it on first use.
    pub fn get<M: Aggregate>(&self) -> CoreResult<Arc<Mapping<M>>> {
        let key = TypeId::of::<M>();
        if let Some(mapping) = self
            .cache
            .lock()
            .get(&key)
            .and_then(|m| Arc::clone(m).downcast::<Mapping<M>>().ok())
        {
            return Ok(mapping);
        }

        let mapping = Arc::new(Mapping::<M>::resolve(&self.registry)?);
        self.cache
            .lock()
            .insert(key, Arc::clone(&mapping) as Arc<dyn Any + Send + Sync>);
        Ok(mapping)
    }

    /// Number of cached mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns true if nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for Definitions {
    fn default() -> Self {
        Self::new(Registry::new())
    }
}

impl fmt::Debug for Definitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definitions")
            .field("registry", &self.registry)
            .field("cached", &self.len())
            .finish()
    }
}
