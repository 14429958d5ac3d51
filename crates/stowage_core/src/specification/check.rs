//! Validation shared by every specification compiler.
//!
//! Compilers call [`validate`] before translating anything, so an unknown
//! property or an inapplicable comparator fails the same way on every
//! backend.

use super::{Comparator, Operand, Sign, Sort, Specification};
use crate::context::ContextToken;
use crate::definition::{Definition, PropertyDef, Scope};
use crate::error::{CoreError, CoreResult};
use crate::types::Type;
use crate::value::Value;

/// Checks a specification against a definition.
///
/// # Errors
///
/// - [`CoreError::UnknownProperty`] if a property, entity, optional or
///   collection isn't mapped
/// - [`CoreError::UnsupportedSpecification`] for nested scopes and
///   comparators that don't apply to the property's type
/// - [`CoreError::TypeMismatch`] if an operand doesn't fit the property
pub fn validate(specification: &Specification, definition: &Definition) -> CoreResult<()> {
    walk(specification, definition, Scope::Root)
}

fn walk<'a>(spec: &'a Specification, def: &Definition, scope: Scope<'a>) -> CoreResult<()> {
    match spec {
        Specification::Comparator(comparator) => check_comparator(comparator, def, scope).map(|_| ()),
        Specification::Composite { left, right, .. } => {
            walk(left, def, scope)?;
            walk(right, def, scope)
        }
        Specification::Not(inner) => walk(inner, def, scope),
        Specification::Entity { name, inner } => {
            enter(spec, def, scope, Scope::Entity(name))?;
            walk(inner, def, Scope::Entity(name))
        }
        Specification::Just { optional, inner } => {
            enter(spec, def, scope, Scope::Optional(optional))?;
            walk(inner, def, Scope::Optional(optional))
        }
        Specification::Has { optional } => enter(spec, def, scope, Scope::Optional(optional)),
        Specification::Child { collection, inner } => {
            enter(spec, def, scope, Scope::Collection(collection))?;
            walk(inner, def, Scope::Collection(collection))
        }
    }
}

fn enter(spec: &Specification, def: &Definition, from: Scope<'_>, to: Scope<'_>) -> CoreResult<()> {
    if from != Scope::Root {
        return Err(CoreError::unsupported(
            spec.kind(),
            "scoped specifications cannot be nested",
        ));
    }
    def.component(to).map(|_| ())
}

/// Checks one comparator and returns the property it compares.
pub(crate) fn check_comparator<'d>(
    comparator: &Comparator,
    def: &'d Definition,
    scope: Scope<'_>,
) -> CoreResult<&'d PropertyDef> {
    let property = def.lookup(scope, &comparator.property)?;
    let ty = &property.ty;
    let sign = comparator.sign;

    match &comparator.value {
        _ if sign.is_nullity() => {}
        Operand::Value(Value::Text(_)) if sign.is_pattern() => {
            if !ty.is_textual() {
                return Err(CoreError::unsupported(
                    "comparator",
                    format!(
                        "{sign} needs a text property, {} is {}",
                        property.name,
                        ty.name()
                    ),
                ));
            }
        }
        _ if sign.is_pattern() => {
            return Err(CoreError::unsupported(
                "comparator",
                format!("{sign} needs a text operand"),
            ));
        }
        Operand::List(values) if sign == Sign::In => {
            if let Some(bad) = values.iter().find(|v| v.is_null() || !ty.accepts(v)) {
                return Err(CoreError::type_mismatch(ty.name(), bad.to_string()));
            }
        }
        Operand::Matching(query) if sign == Sign::In => {
            if !matches!(ty.inner(), Type::Identifier | Type::Text | Type::Opaque) {
                return Err(CoreError::unsupported(
                    "comparator",
                    format!(
                        "{} holds {}, not ids of {}",
                        property.name,
                        ty.name(),
                        query.model()
                    ),
                ));
            }
        }
        Operand::Value(_) if sign == Sign::In => {
            return Err(CoreError::unsupported("comparator", "in needs a list operand"));
        }
        Operand::Value(Value::Null) => {
            return Err(CoreError::unsupported(
                "comparator",
                format!("{sign} against null, use is-null or is-not-null"),
            ));
        }
        Operand::Value(value) => {
            if !ty.accepts(value) {
                return Err(CoreError::type_mismatch(ty.name(), value.to_string()));
            }
        }
        Operand::List(_) | Operand::Matching(_) => {
            return Err(CoreError::unsupported(
                "comparator",
                format!("{sign} doesn't take a list operand"),
            ));
        }
    }
    Ok(property)
}

/// Checks a sort path and returns the property it orders by.
pub fn validate_sort<'a, 'd>(
    sort: &'a Sort,
    definition: &'d Definition,
) -> CoreResult<(Scope<'a>, &'d PropertyDef)> {
    definition.sort_key(&sort.path)
}

/// Replaces every sub-query operand with the ids it selects.
///
/// # Errors
///
/// Fails with [`CoreError::ForeignContext`] if a sub-query was built by a
/// repository of another manager.
pub fn resolve_sub_queries(
    specification: Specification,
    token: &ContextToken,
) -> CoreResult<Specification> {
    Ok(match specification {
        Specification::Comparator(Comparator {
            property,
            sign,
            value: Operand::Matching(query),
        }) => {
            if !query.token().same_as(token) {
                return Err(CoreError::ForeignContext {
                    model: query.model().to_string(),
                });
            }
            Specification::Comparator(Comparator {
                property,
                sign,
                value: Operand::List(query.execute()?),
            })
        }
        Specification::Composite {
            left,
            operator,
            right,
        } => Specification::Composite {
            left: Box::new(resolve_sub_queries(*left, token)?),
            operator,
            right: Box::new(resolve_sub_queries(*right, token)?),
        },
        Specification::Not(inner) => {
            Specification::Not(Box::new(resolve_sub_queries(*inner, token)?))
        }
        Specification::Entity { name, inner } => Specification::Entity {
            name,
            inner: Box::new(resolve_sub_queries(*inner, token)?),
        },
        Specification::Just { optional, inner } => Specification::Just {
            optional,
            inner: Box::new(resolve_sub_queries(*inner, token)?),
        },
        Specification::Child { collection, inner } => Specification::Child {
            collection,
            inner: Box::new(resolve_sub_queries(*inner, token)?),
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Mapping;
    use crate::fixtures::Article;
    use crate::specification::{Property, SubQuery};
    use crate::types::Registry;
    use std::sync::Arc;

    fn definition() -> Arc<Definition> {
        Arc::clone(
            Mapping::<Article>::resolve(&Registry::new())
                .unwrap()
                .definition(),
        )
    }

    #[test]
    fn accepts_well_formed_specifications() {
        let def = definition();
        let spec = Property::of("title")
            .contains("ell")
            .and(Specification::entity("meta", Property::of("words").greater_than(10)))
            .and(Specification::child("comments", Property::of("votes").less_than(2)))
            .or(Specification::has("cover"))
            .or(Property::of("rating").is_null())
            .or(Property::of("state").in_list(["Draft"]));
        validate(&spec, &def).unwrap();
    }

    #[test]
    fn unknown_properties_fail() {
        let def = definition();
        let err = validate(&Property::of("nope").equals(1), &def).unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));

        let err = validate(
            &Specification::entity("meta", Property::of("title").equals("x")),
            &def,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { property, .. } if property == "meta.title"));

        let err = validate(&Specification::has("meta"), &def).unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));
    }

    #[test]
    fn pattern_signs_need_text() {
        let def = definition();
        let err = validate(&Property::of("rating").starts_with("1"), &def).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedSpecification { .. }));
        validate(&Property::of("state").starts_with("Pub"), &def).unwrap();
    }

    #[test]
    fn nested_scopes_are_unsupported() {
        let def = definition();
        let spec = Specification::entity(
            "meta",
            Specification::child("comments", Property::of("votes").equals(1)),
        );
        let err = validate(&spec, &def).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedSpecification { node, .. } if node == "child"));
    }

    #[test]
    fn operands_must_fit_the_type() {
        let def = definition();
        assert!(matches!(
            validate(&Property::of("title").equals(3), &def),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            validate(&Property::of("title").equals(None::<String>), &def),
            Err(CoreError::UnsupportedSpecification { .. })
        ));
        assert!(matches!(
            validate(&Property::of("state").equals("Gone"), &def),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn sub_queries_check_their_context() {
        let ours = ContextToken::new();
        let theirs = ContextToken::new();
        let query = SubQuery::new(theirs, "author", || Ok(Vec::new()));
        let spec = Property::of("author").matching(query);

        let err = resolve_sub_queries(spec, &ours).unwrap_err();
        assert!(matches!(err, CoreError::ForeignContext { .. }));
    }

    #[test]
    fn sub_queries_resolve_to_lists() {
        let token = ContextToken::new();
        let id = uuid::Uuid::new_v4();
        let query = SubQuery::new(token.clone(), "author", move || {
            Ok(vec![Value::Text(id.to_string())])
        });
        let spec = !Property::of("author").matching(query);

        let resolved = resolve_sub_queries(spec, &token).unwrap();
        validate(&resolved, &definition()).unwrap();
        match resolved {
            Specification::Not(inner) => assert!(matches!(
                *inner,
                Specification::Comparator(Comparator {
                    value: Operand::List(ref ids),
                    ..
                }) if ids.len() == 1
            )),
            other => panic!("unexpected {other:?}"),
        }
    }
}
