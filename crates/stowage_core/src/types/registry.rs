//! Type resolution.

use std::fmt;
use std::sync::Arc;

use super::{CustomType, Declared, EnumType, Type};

/// Resolves a declared field shape to a mapping type.
///
/// Resolvers are consulted in order; the first one returning `Some` wins.
pub trait Resolver: Send + Sync {
    /// Attempts to resolve `declared`. `registry` is passed so wrappers can
    /// resolve their inner type.
    fn resolve(&self, declared: &Declared, registry: &Registry) -> Option<Type>;
}

/// Resolves `String` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextResolver;

impl Resolver for TextResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        matches!(declared, Declared::Text).then_some(Type::Text)
    }
}

/// Resolves integer fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerResolver;

impl Resolver for IntegerResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        matches!(declared, Declared::Integer).then_some(Type::Integer)
    }
}

/// Resolves `bool` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanResolver;

impl Resolver for BooleanResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        matches!(declared, Declared::Boolean).then_some(Type::Boolean)
    }
}

/// Resolves `f64` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatResolver;

impl Resolver for FloatResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        matches!(declared, Declared::Float).then_some(Type::Float)
    }
}

/// Resolves UUID-shaped fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierResolver;

impl Resolver for IdentifierResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        matches!(declared, Declared::Identifier).then_some(Type::Identifier)
    }
}

/// Resolves unit-only enums.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumResolver;

impl Resolver for EnumResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        match declared {
            Declared::Enum { name, variants } => Some(Type::Enum(EnumType {
                name: (*name).to_string(),
                variants: variants.iter().map(|v| (*v).to_string()).collect(),
            })),
            _ => None,
        }
    }
}

/// Resolves `Option<T>` by resolving `T` and wrapping it.
///
/// `Option<Option<T>>` collapses into a single nullable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableResolver;

impl Resolver for NullableResolver {
    fn resolve(&self, declared: &Declared, registry: &Registry) -> Option<Type> {
        match declared {
            Declared::Nullable(inner) => match registry.resolve(inner) {
                nested @ Type::Nullable(_) => Some(nested),
                ty => Some(Type::Nullable(Box::new(ty))),
            },
            _ => None,
        }
    }
}

/// Resolves [`Declared::Named`] fields with a given name to a custom type.
#[derive(Debug, Clone)]
pub struct CustomResolver {
    name: &'static str,
    ty: Arc<dyn CustomType>,
}

impl CustomResolver {
    /// Creates a resolver mapping fields declared as `name` to `ty`.
    pub fn new(name: &'static str, ty: impl CustomType + 'static) -> Self {
        Self {
            name,
            ty: Arc::new(ty),
        }
    }
}

impl Resolver for CustomResolver {
    fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
        match declared {
            Declared::Named(name) if *name == self.name => Some(Type::Custom(Arc::clone(&self.ty))),
            _ => None,
        }
    }
}

/// Ordered collection of resolvers.
///
/// Unresolvable declarations fall back to [`Type::Opaque`].
#[derive(Clone)]
pub struct Registry {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl Registry {
    /// Creates a registry holding the built-in resolvers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: vec![
                Arc::new(TextResolver),
                Arc::new(IntegerResolver),
                Arc::new(BooleanResolver),
                Arc::new(FloatResolver),
                Arc::new(IdentifierResolver),
                Arc::new(EnumResolver),
                Arc::new(NullableResolver),
            ],
        }
    }

    /// Creates a registry without any resolvers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Adds a resolver that takes priority over the ones already present.
    #[must_use]
    pub fn with(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.insert(0, Arc::new(resolver));
        self
    }

    /// Registers a custom type for fields declared under `name`.
    #[must_use]
    pub fn with_custom(self, name: &'static str, ty: impl CustomType + 'static) -> Self {
        self.with(CustomResolver::new(name, ty))
    }

    /// Resolves a declared shape, falling back to [`Type::Opaque`].
    #[must_use]
    pub fn resolve(&self, declared: &Declared) -> Type {
        self.resolvers
            .iter()
            .find_map(|r| r.resolve(declared, self))
            .unwrap_or(Type::Opaque)
    }

    /// Returns the number of resolvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if there are no resolvers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreResult;
    use crate::types::DomainValue;
    use crate::value::Value;

    #[test]
    fn builtins_resolve() {
        let registry = Registry::new();
        assert_eq!(registry.resolve(&Declared::Text), Type::Text);
        assert_eq!(registry.resolve(&Declared::Identifier), Type::Identifier);
        assert_eq!(
            registry.resolve(&Declared::Nullable(Box::new(Declared::Integer))),
            Type::Nullable(Box::new(Type::Integer))
        );
    }

    #[test]
    fn unknown_falls_back_to_opaque() {
        let registry = Registry::new();
        assert_eq!(registry.resolve(&Declared::Named("money")), Type::Opaque);
        assert_eq!(Registry::empty().resolve(&Declared::Text), Type::Opaque);
    }

    #[test]
    fn nested_nullables_collapse() {
        let registry = Registry::new();
        let declared = Declared::Nullable(Box::new(Declared::Nullable(Box::new(Declared::Text))));
        assert_eq!(
            registry.resolve(&declared),
            Type::Nullable(Box::new(Type::Text))
        );
    }

    #[derive(Debug)]
    struct Upper;

    impl CustomType for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn normalize(&self, value: &DomainValue) -> CoreResult<Value> {
            match value {
                DomainValue::Text(s) => Ok(Value::Text(s.to_uppercase())),
                other => Err(crate::CoreError::type_mismatch("upper", format!("{other:?}"))),
            }
        }

        fn denormalize(&self, value: Value) -> CoreResult<DomainValue> {
            match value {
                Value::Text(s) => Ok(DomainValue::Text(s.to_lowercase())),
                other => Err(crate::CoreError::type_mismatch("upper", other.to_string())),
            }
        }
    }

    struct ShoutingText;

    impl Resolver for ShoutingText {
        fn resolve(&self, declared: &Declared, _: &Registry) -> Option<Type> {
            matches!(declared, Declared::Text).then(|| Type::Custom(Arc::new(Upper)))
        }
    }

    #[test]
    fn registered_resolvers_take_priority() {
        let registry = Registry::new().with(ShoutingText);
        assert_eq!(registry.len(), 8);
        assert!(matches!(registry.resolve(&Declared::Text), Type::Custom(_)));
    }

    #[test]
    fn custom_by_name() {
        let registry = Registry::new().with_custom("upper", Upper);
        let ty = registry.resolve(&Declared::Named("upper"));
        assert_eq!(ty.name(), "upper");
        assert_eq!(
            ty.normalize(&DomainValue::Text("abc".into())).unwrap(),
            Value::Text("ABC".into())
        );
        let wrapped = registry.resolve(&Declared::Nullable(Box::new(Declared::Named("upper"))));
        assert!(wrapped.is_nullable());
    }
}
