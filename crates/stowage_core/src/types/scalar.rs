//! Conversions between Rust field types and domain values.

use uuid::Uuid;

use super::{Declared, DomainValue};
use crate::error::{CoreError, CoreResult};
use crate::id::Id;

/// A field type that maps to a single primitive value.
///
/// Implemented for the common std types, [`Uuid`], [`Id`] and `Option` of
/// any scalar. Unit-only enums implement it through [`crate::enum_scalar!`].
pub trait Scalar: Sized {
    /// The declared shape used for type resolution.
    fn declared() -> Declared;

    /// Converts the field to a domain value.
    fn to_domain(&self) -> DomainValue;

    /// Rebuilds the field from a domain value.
    fn from_domain(value: DomainValue) -> CoreResult<Self>;
}

fn mismatch(expected: &str, value: &DomainValue) -> CoreError {
    CoreError::type_mismatch(expected, format!("{value:?}"))
}

impl Scalar for String {
    fn declared() -> Declared {
        Declared::Text
    }

    fn to_domain(&self) -> DomainValue {
        DomainValue::Text(self.clone())
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        match value {
            DomainValue::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl Scalar for i64 {
    fn declared() -> Declared {
        Declared::Integer
    }

    fn to_domain(&self) -> DomainValue {
        DomainValue::Integer(*self)
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        match value {
            DomainValue::Integer(i) => Ok(i),
            other => Err(mismatch("integer", &other)),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                fn declared() -> Declared {
                    Declared::Integer
                }

                fn to_domain(&self) -> DomainValue {
                    DomainValue::Integer(i64::from(*self))
                }

                fn from_domain(value: DomainValue) -> CoreResult<Self> {
                    match value {
                        DomainValue::Integer(i) => <$ty>::try_from(i)
                            .map_err(|_| CoreError::type_mismatch(stringify!($ty), i.to_string())),
                        other => Err(mismatch(stringify!($ty), &other)),
                    }
                }
            }
        )*
    };
}

narrow_integer!(i32, u32, i16, u16, u8);

impl Scalar for bool {
    fn declared() -> Declared {
        Declared::Boolean
    }

    fn to_domain(&self) -> DomainValue {
        DomainValue::Boolean(*self)
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        match value {
            DomainValue::Boolean(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl Scalar for f64 {
    fn declared() -> Declared {
        Declared::Float
    }

    fn to_domain(&self) -> DomainValue {
        DomainValue::Float(*self)
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        match value {
            DomainValue::Float(f) => Ok(f),
            DomainValue::Integer(i) => Ok(i as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl Scalar for Uuid {
    fn declared() -> Declared {
        Declared::Identifier
    }

    fn to_domain(&self) -> DomainValue {
        DomainValue::Uuid(*self)
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        match value {
            DomainValue::Uuid(u) => Ok(u),
            other => Err(mismatch("identifier", &other)),
        }
    }
}

impl<M> Scalar for Id<M> {
    fn declared() -> Declared {
        Declared::Identifier
    }

    fn to_domain(&self) -> DomainValue {
        DomainValue::Uuid(self.to_uuid())
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        Uuid::from_domain(value).map(Id::from_uuid)
    }
}

/// `None` maps to null. An `Option<Option<T>>` field would store both `None`
/// and `Some(None)` as null, so resolving a definition with one fails.
impl<T: Scalar> Scalar for Option<T> {
    fn declared() -> Declared {
        Declared::Nullable(Box::new(T::declared()))
    }

    fn to_domain(&self) -> DomainValue {
        self.as_ref().map_or(DomainValue::Null, Scalar::to_domain)
    }

    fn from_domain(value: DomainValue) -> CoreResult<Self> {
        match value {
            DomainValue::Null => Ok(None),
            other => T::from_domain(other).map(Some),
        }
    }
}

/// Implements [`Scalar`] for a unit-only enum, mapping each variant to its
/// name.
///
/// ```
/// use stowage_core::enum_scalar;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Status {
///     Active,
///     Banned,
/// }
///
/// enum_scalar!(Status { Active, Banned });
/// ```
#[macro_export]
macro_rules! enum_scalar {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::types::Scalar for $ty {
            fn declared() -> $crate::types::Declared {
                $crate::types::Declared::Enum {
                    name: stringify!($ty),
                    variants: &[$(stringify!($variant)),+],
                }
            }

            fn to_domain(&self) -> $crate::types::DomainValue {
                let name = match self {
                    $($ty::$variant => stringify!($variant),)+
                };
                $crate::types::DomainValue::Variant(name.to_string())
            }

            fn from_domain(
                value: $crate::types::DomainValue,
            ) -> $crate::CoreResult<Self> {
                match value {
                    $crate::types::DomainValue::Variant(name) => match name.as_str() {
                        $(stringify!($variant) => Ok($ty::$variant),)+
                        _ => Err($crate::CoreError::type_mismatch(stringify!($ty), name)),
                    },
                    other => Err($crate::CoreError::type_mismatch(
                        stringify!($ty),
                        format!("{other:?}"),
                    )),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Colour {
        Red,
        Green,
    }

    crate::enum_scalar!(Colour { Red, Green });

    #[test]
    fn enum_variants_roundtrip() {
        assert_eq!(
            Colour::Green.to_domain(),
            DomainValue::Variant("Green".into())
        );
        assert_eq!(
            Colour::from_domain(DomainValue::Variant("Red".into())).unwrap(),
            Colour::Red
        );
        assert!(Colour::from_domain(DomainValue::Variant("Blue".into())).is_err());
        assert!(matches!(
            Colour::declared(),
            Declared::Enum { name: "Colour", variants } if variants.len() == 2
        ));
    }

    #[test]
    fn narrow_integers_check_range() {
        assert_eq!(u8::from_domain(DomainValue::Integer(200)).unwrap(), 200);
        assert!(u8::from_domain(DomainValue::Integer(300)).is_err());
        assert!(u32::from_domain(DomainValue::Integer(-1)).is_err());
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(None::<String>.to_domain(), DomainValue::Null);
        assert_eq!(Option::<i64>::from_domain(DomainValue::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_domain(DomainValue::Integer(4)).unwrap(),
            Some(4)
        );
        assert_eq!(
            Option::<String>::declared(),
            Declared::Nullable(Box::new(Declared::Text))
        );
    }

    #[test]
    fn typed_ids_are_identifiers() {
        struct Order;
        let id: Id<Order> = Id::new();
        assert_eq!(id.to_domain(), DomainValue::Uuid(id.to_uuid()));
        assert_eq!(Id::<Order>::declared(), Declared::Identifier);
    }
}
