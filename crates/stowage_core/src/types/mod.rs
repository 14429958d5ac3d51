//! Mapping types: how domain values become primitive values and back.
//!
//! A [`Type`] is resolved once per property through a [`Registry`] from
//! the [`Declared`] shape of the field. The closed set of built-in types
//! covers text, numbers, booleans, identifiers, enums and nullables;
//! anything else is either a registered [`CustomType`] or falls back to
//! [`Type::Opaque`].

mod registry;
mod scalar;

pub use registry::{
    BooleanResolver, CustomResolver, EnumResolver, FloatResolver, IdentifierResolver,
    IntegerResolver, NullableResolver, Registry, Resolver, TextResolver,
};
pub use scalar::Scalar;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// A domain-side value as produced by a [`Scalar`] field.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainValue {
    /// Missing optional value.
    Null,
    /// Text.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Boolean.
    Boolean(bool),
    /// Float.
    Float(f64),
    /// UUID-shaped identifier.
    Uuid(Uuid),
    /// Name of an enum variant.
    Variant(String),
}

impl DomainValue {
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// The declared shape of a scalar field, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Declared {
    /// `String`.
    Text,
    /// Any integer type.
    Integer,
    /// `bool`.
    Boolean,
    /// `f64`.
    Float,
    /// `Uuid` or `Id<_>`.
    Identifier,
    /// A unit-only enum.
    Enum {
        /// Type name of the enum.
        name: &'static str,
        /// Variant names, in declaration order.
        variants: &'static [&'static str],
    },
    /// `Option<T>`.
    Nullable(Box<Declared>),
    /// A user type, resolved by name through the registry.
    Named(&'static str),
}

/// A user-supplied mapping type.
///
/// Implementations convert between a domain value and a primitive value.
/// Backends that need more than that ask for a capability through
/// [`CustomType::capability`], see [`capability`].
pub trait CustomType: Send + Sync + fmt::Debug {
    /// Name of the type, used in errors and generated schemas.
    fn name(&self) -> &str;

    /// Converts a domain value to a primitive value.
    fn normalize(&self, value: &DomainValue) -> CoreResult<Value>;

    /// Converts a primitive value to a domain value.
    fn denormalize(&self, value: Value) -> CoreResult<DomainValue>;

    /// Whether the normalized value is text, so pattern comparators apply.
    fn textual(&self) -> bool {
        false
    }

    /// Returns the capability object registered under `id`, if any.
    fn capability(&self, id: TypeId) -> Option<&dyn Any> {
        let _ = id;
        None
    }
}

/// Looks up the capability `C` on a custom type.
#[must_use]
pub fn capability<C: Any>(custom: &dyn CustomType) -> Option<&C> {
    custom
        .capability(TypeId::of::<C>())
        .and_then(|c| c.downcast_ref::<C>())
}

/// An enum type with its allowed variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    /// Type name.
    pub name: String,
    /// Variant names.
    pub variants: Vec<String>,
}

impl EnumType {
    /// Returns true if `variant` is one of this enum's variants.
    #[must_use]
    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// A resolved mapping type.
#[derive(Debug, Clone)]
pub enum Type {
    /// Text.
    Text,
    /// Signed integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Float.
    Float,
    /// UUID stored as its hyphenated text form.
    Identifier,
    /// Enum stored as its variant name.
    Enum(EnumType),
    /// Nullable wrapper.
    Nullable(Box<Type>),
    /// Unrecognized type, passed through as text.
    Opaque,
    /// User-registered type.
    Custom(Arc<dyn CustomType>),
}

impl Type {
    /// Human-readable name of the type.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Text => "text".into(),
            Self::Integer => "integer".into(),
            Self::Boolean => "boolean".into(),
            Self::Float => "float".into(),
            Self::Identifier => "identifier".into(),
            Self::Enum(e) => format!("enum {}", e.name),
            Self::Nullable(inner) => format!("nullable {}", inner.name()),
            Self::Opaque => "opaque".into(),
            Self::Custom(c) => c.name().to_string(),
        }
    }

    /// Returns the type with any nullable wrapper removed.
    #[must_use]
    pub fn inner(&self) -> &Type {
        match self {
            Self::Nullable(inner) => inner.inner(),
            other => other,
        }
    }

    /// Returns true if null is an allowed value.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable(_))
    }

    /// Returns true if normalized values are text, so that pattern
    /// comparators (starts-with, ends-with, contains) make sense.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        match self.inner() {
            Self::Text | Self::Opaque | Self::Identifier | Self::Enum(_) => true,
            Self::Custom(c) => c.textual(),
            _ => false,
        }
    }

    /// Returns true if `value` is something this type can normalize to.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Nullable(_), Value::Null) => true,
            (Self::Nullable(inner), other) => inner.accepts(other),
            (_, Value::Null) => false,
            (Self::Text | Self::Opaque, Value::Text(_)) => true,
            (Self::Identifier, Value::Text(s)) => Uuid::parse_str(s).is_ok(),
            (Self::Enum(e), Value::Text(s)) => e.contains(s),
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_) | Value::Integer(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Custom(_), _) => true,
            _ => false,
        }
    }

    /// Converts a domain value to its primitive form.
    pub fn normalize(&self, value: &DomainValue) -> CoreResult<Value> {
        match (self, value) {
            (Self::Nullable(_), DomainValue::Null) => Ok(Value::Null),
            (Self::Nullable(inner), other) => inner.normalize(other),
            (Self::Custom(c), other) => c.normalize(other),
            (Self::Text | Self::Opaque, DomainValue::Text(s)) => Ok(Value::Text(s.clone())),
            (Self::Integer, DomainValue::Integer(i)) => Ok(Value::Integer(*i)),
            (Self::Boolean, DomainValue::Boolean(b)) => Ok(Value::Boolean(*b)),
            (Self::Float, DomainValue::Float(f)) => Ok(Value::Float(*f)),
            (Self::Identifier, DomainValue::Uuid(u)) => Ok(Value::Text(u.to_string())),
            (Self::Enum(e), DomainValue::Variant(v)) if e.contains(v) => Ok(Value::Text(v.clone())),
            (ty, other) => Err(CoreError::type_mismatch(ty.name(), other.describe())),
        }
    }

    /// Converts a primitive value back to its domain form.
    pub fn denormalize(&self, value: Value) -> CoreResult<DomainValue> {
        match (self, value) {
            (Self::Nullable(_), Value::Null) => Ok(DomainValue::Null),
            (Self::Nullable(inner), other) => inner.denormalize(other),
            (Self::Custom(c), other) => c.denormalize(other),
            (Self::Text | Self::Opaque, Value::Text(s)) => Ok(DomainValue::Text(s)),
            (Self::Integer, Value::Integer(i)) => Ok(DomainValue::Integer(i)),
            (Self::Boolean, Value::Boolean(b)) => Ok(DomainValue::Boolean(b)),
            (Self::Float, Value::Float(f)) => Ok(DomainValue::Float(f)),
            (Self::Float, Value::Integer(i)) => Ok(DomainValue::Float(i as f64)),
            (Self::Identifier, Value::Text(s)) => Uuid::parse_str(&s)
                .map(DomainValue::Uuid)
                .map_err(|_| CoreError::type_mismatch("identifier", s)),
            (Self::Enum(e), Value::Text(s)) if e.contains(&s) => Ok(DomainValue::Variant(s)),
            (ty, other) => Err(CoreError::type_mismatch(ty.name(), other.to_string())),
        }
    }

    /// Coerces a value read from a driver into the primitive shape this
    /// type normalizes to.
    ///
    /// Drivers don't always hand back what was written: SQLite returns
    /// booleans as integers, and some drivers return numbers as text.
    pub fn coerce(&self, value: Value) -> CoreResult<Value> {
        match (self, value) {
            (Self::Nullable(_), Value::Null) => Ok(Value::Null),
            (Self::Nullable(inner), other) => inner.coerce(other),
            (Self::Custom(_), other) => Ok(other),
            (Self::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (Self::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| CoreError::type_mismatch("integer", s)),
            (Self::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (Self::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (Self::Float, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| CoreError::type_mismatch("float", s)),
            (Self::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (Self::Boolean, Value::Integer(i)) => Ok(Value::Boolean(i != 0)),
            (Self::Boolean, Value::Text(s)) => match s.as_str() {
                "1" | "true" => Ok(Value::Boolean(true)),
                "0" | "false" => Ok(Value::Boolean(false)),
                _ => Err(CoreError::type_mismatch("boolean", s)),
            },
            (Self::Text | Self::Opaque | Self::Identifier | Self::Enum(_), Value::Text(s)) => {
                Ok(Value::Text(s))
            }
            (ty, other) => Err(CoreError::type_mismatch(ty.name(), other.to_string())),
        }
    }

    /// Looks up capability `C` when this is a custom type.
    #[must_use]
    pub fn capability<C: Any>(&self) -> Option<&C> {
        match self.inner() {
            Self::Custom(c) => capability::<C>(c.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text, Self::Text)
            | (Self::Integer, Self::Integer)
            | (Self::Boolean, Self::Boolean)
            | (Self::Float, Self::Float)
            | (Self::Identifier, Self::Identifier)
            | (Self::Opaque, Self::Opaque) => true,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Nullable(a), Self::Nullable(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn status() -> Type {
        Type::Enum(EnumType {
            name: "Status".into(),
            variants: vec!["Active".into(), "Banned".into()],
        })
    }

    #[test]
    fn identifier_roundtrip_through_text() {
        let uuid = Uuid::new_v4();
        let value = Type::Identifier.normalize(&DomainValue::Uuid(uuid)).unwrap();
        assert_eq!(value, Value::Text(uuid.to_string()));
        assert_eq!(
            Type::Identifier.denormalize(value).unwrap(),
            DomainValue::Uuid(uuid)
        );
    }

    #[test]
    fn enum_rejects_unknown_variant() {
        let err = status()
            .normalize(&DomainValue::Variant("Deleted".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        assert!(status().denormalize(Value::Text("Deleted".into())).is_err());
    }

    #[test]
    fn non_nullable_rejects_null() {
        assert!(Type::Text.normalize(&DomainValue::Null).is_err());
        assert!(Type::Integer.denormalize(Value::Null).is_err());
        let nullable = Type::Nullable(Box::new(Type::Integer));
        assert_eq!(nullable.normalize(&DomainValue::Null).unwrap(), Value::Null);
    }

    #[test]
    fn mismatched_kind_is_an_error() {
        let err = Type::Integer
            .denormalize(Value::Text("12".into()))
            .unwrap_err();
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn coerce_driver_values() {
        assert_eq!(
            Type::Boolean.coerce(Value::Integer(1)).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            Type::Integer.coerce(Value::Text(" 42".into())).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Type::Float.coerce(Value::Integer(2)).unwrap(),
            Value::Float(2.0)
        );
        assert!(Type::Integer.coerce(Value::Text("x".into())).is_err());
    }

    #[test]
    fn textual_kinds() {
        assert!(Type::Text.is_textual());
        assert!(status().is_textual());
        assert!(Type::Nullable(Box::new(Type::Opaque)).is_textual());
        assert!(!Type::Integer.is_textual());
    }

    #[test]
    fn accepts_checks_kind_and_nullability() {
        assert!(Type::Float.accepts(&Value::Integer(3)));
        assert!(!Type::Text.accepts(&Value::Null));
        assert!(Type::Nullable(Box::new(Type::Text)).accepts(&Value::Null));
        assert!(status().accepts(&Value::Text("Active".into())));
        assert!(!status().accepts(&Value::Text("Nope".into())));
        assert!(!Type::Identifier.accepts(&Value::Text("nope".into())));
    }

    #[derive(Debug)]
    struct Cents;

    struct Precision(u8);

    impl CustomType for Cents {
        fn name(&self) -> &str {
            "cents"
        }

        fn normalize(&self, value: &DomainValue) -> CoreResult<Value> {
            match value {
                DomainValue::Integer(i) => Ok(Value::Integer(*i)),
                other => Err(CoreError::type_mismatch("cents", format!("{other:?}"))),
            }
        }

        fn denormalize(&self, value: Value) -> CoreResult<DomainValue> {
            match value {
                Value::Integer(i) => Ok(DomainValue::Integer(i)),
                other => Err(CoreError::type_mismatch("cents", other.to_string())),
            }
        }

        fn capability(&self, id: TypeId) -> Option<&dyn Any> {
            static PRECISION: Precision = Precision(2);
            (id == TypeId::of::<Precision>()).then_some(&PRECISION as &dyn Any)
        }
    }

    #[test]
    fn custom_capability_lookup() {
        let ty = Type::Custom(Arc::new(Cents));
        assert_eq!(ty.capability::<Precision>().map(|p| p.0), Some(2));
        assert!(ty.capability::<String>().is_none());
        assert!(Type::Text.capability::<Precision>().is_none());
    }

    fn typed_value() -> impl Strategy<Value = (Type, DomainValue)> {
        prop_oneof![
            ".*".prop_map(|s| (Type::Text, DomainValue::Text(s))),
            any::<i64>().prop_map(|i| (Type::Integer, DomainValue::Integer(i))),
            any::<bool>().prop_map(|b| (Type::Boolean, DomainValue::Boolean(b))),
            any::<f64>()
                .prop_filter("NaN never equals itself", |f| !f.is_nan())
                .prop_map(|f| (Type::Float, DomainValue::Float(f))),
            any::<u128>().prop_map(|u| (Type::Identifier, DomainValue::Uuid(Uuid::from_u128(u)))),
            prop::sample::select(vec!["Active", "Banned"])
                .prop_map(|v| (status(), DomainValue::Variant(v.to_string()))),
            proptest::option::of(any::<i64>()).prop_map(|i| (
                Type::Nullable(Box::new(Type::Integer)),
                i.map_or(DomainValue::Null, DomainValue::Integer)
            )),
            proptest::option::of("[a-z]{0,8}").prop_map(|s| (
                Type::Nullable(Box::new(Type::Text)),
                s.map_or(DomainValue::Null, DomainValue::Text)
            )),
        ]
    }

    proptest! {
        #[test]
        fn builtin_types_roundtrip((ty, value) in typed_value()) {
            let normalized = ty.normalize(&value).unwrap();
            prop_assert!(ty.accepts(&normalized));
            prop_assert_eq!(ty.coerce(normalized.clone()).unwrap(), normalized.clone());
            prop_assert_eq!(ty.denormalize(normalized).unwrap(), value);
        }
    }
}
