//! Compiles specifications into the Elasticsearch query DSL.
//!
//! Entities and optionals are object fields addressed as `entity.property`.
//! Collections are nested and matched with a `nested` query over
//! `collection.data.property`, so every comparator under one `Child` holds
//! for the same element. Text fields are compared through their `.keyword`
//! subfield; fields already mapped as keywords are compared directly.

use serde_json::{json, Value as Json};
use stowage_core::definition::{Definition, Scope};
use stowage_core::specification::{
    validate, Comparator, Direction, Operand, Operator, Sign, Sort, Specification,
};
use stowage_core::{CoreError, CoreResult, Fetch, Value};

use crate::document::to_json;
use crate::mapping::{exact, DATA};

/// Compiles a specification into a query.
///
/// Sub-queries must have been resolved into id lists beforehand.
///
/// # Errors
///
/// Fails like [`validate`] for specifications that don't fit the
/// aggregate, and with [`CoreError::UnsupportedSpecification`] for an
/// unresolved sub-query.
pub fn compile(specification: &Specification, definition: &Definition) -> CoreResult<Json> {
    validate(specification, definition)?;
    node(specification, definition, Scope::Root)
}

/// The body of one page of a fetch, asking for `size` hits.
///
/// The first page skips `fetch.drop` hits. Later pages resume after the
/// sort values of the previous page's last hit. The id is always the last
/// sort key, so pages never overlap.
pub fn search_body(
    fetch: &Fetch,
    definition: &Definition,
    size: usize,
    after: Option<&[Json]>,
) -> CoreResult<Json> {
    let mut sorts = match &fetch.sort {
        Some(order) => vec![sort(order, definition)?],
        None => Vec::new(),
    };
    sorts.push(json!({ definition.id()?.name.as_str(): { "order": "asc" } }));

    let mut body = json!({
        "query": query(fetch.specification.as_ref(), definition)?,
        "size": size,
        "sort": sorts,
    });
    match after {
        Some(after) => body["search_after"] = Json::Array(after.to_vec()),
        None => body["from"] = json!(fetch.drop.unwrap_or(0)),
    }
    Ok(body)
}

/// The count request body of an optional specification.
pub fn count_body(specification: Option<&Specification>, definition: &Definition) -> CoreResult<Json> {
    Ok(json!({ "query": query(specification, definition)? }))
}

fn query(specification: Option<&Specification>, definition: &Definition) -> CoreResult<Json> {
    specification.map_or_else(
        || Ok(json!({ "match_all": {} })),
        |s| compile(s, definition),
    )
}

/// Missing values sort first when ascending and last when descending.
fn sort(order: &Sort, definition: &Definition) -> CoreResult<Json> {
    let (scope, property) = definition.sort_key(&order.path)?;
    let path = path(scope, &property.name);
    let (direction, missing) = match order.direction {
        Direction::Ascending => ("asc", "_first"),
        Direction::Descending => ("desc", "_last"),
    };
    Ok(json!({ exact(&path, &property.ty): { "order": direction, "missing": missing } }))
}

fn path(scope: Scope<'_>, property: &str) -> String {
    match scope {
        Scope::Root => property.to_string(),
        Scope::Entity(name) | Scope::Optional(name) => format!("{name}.{property}"),
        Scope::Collection(name) => format!("{name}.{DATA}.{property}"),
    }
}

/// Escapes `*`, `?` and `\` for a wildcard pattern.
pub(crate) fn escape_wildcard(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn node(spec: &Specification, def: &Definition, scope: Scope<'_>) -> CoreResult<Json> {
    Ok(match spec {
        Specification::Comparator(comparator) => self::comparator(comparator, def, scope)?,
        Specification::Composite {
            left,
            operator,
            right,
        } => {
            let left = node(left, def, scope)?;
            let right = node(right, def, scope)?;
            match operator {
                Operator::And => json!({ "bool": { "must": [left, right] } }),
                Operator::Or => json!({
                    "bool": { "should": [left, right], "minimum_should_match": 1 }
                }),
            }
        }
        Specification::Not(inner) => {
            json!({ "bool": { "must_not": [node(inner, def, scope)?] } })
        }
        Specification::Entity { name, inner } => node(inner, def, Scope::Entity(name))?,
        Specification::Just { optional, inner } => json!({
            "bool": { "must": [
                { "exists": { "field": optional } },
                node(inner, def, Scope::Optional(optional))?,
            ] }
        }),
        Specification::Has { optional } => json!({ "exists": { "field": optional } }),
        Specification::Child { collection, inner } => json!({
            "nested": {
                "path": collection,
                "query": node(inner, def, Scope::Collection(collection))?,
            }
        }),
    })
}

fn comparator(comparator: &Comparator, def: &Definition, scope: Scope<'_>) -> CoreResult<Json> {
    let property = def.lookup(scope, &comparator.property)?;
    let field = exact(&path(scope, &property.name), &property.ty);
    let sign = comparator.sign;

    Ok(match (sign, &comparator.value) {
        (Sign::IsNull, _) => json!({ "bool": { "must_not": [{ "exists": { "field": field } }] } }),
        (Sign::IsNotNull, _) => json!({ "exists": { "field": field } }),
        (Sign::In, Operand::List(values)) if values.is_empty() => {
            json!({ "bool": { "must_not": [{ "match_all": {} }] } })
        }
        (Sign::In, Operand::List(values)) => {
            let values: Vec<Json> = values.iter().map(to_json).collect();
            json!({ "terms": { field: values } })
        }
        (_, Operand::Matching(query)) => {
            return Err(CoreError::unsupported(
                "comparator",
                format!("sub-query over {} wasn't resolved", query.model()),
            ))
        }
        (Sign::StartsWith, Operand::Value(Value::Text(text))) => {
            json!({ "prefix": { field: { "value": text } } })
        }
        (Sign::EndsWith, Operand::Value(Value::Text(text))) => {
            json!({ "wildcard": { field: { "value": format!("*{}", escape_wildcard(text)) } } })
        }
        (Sign::Contains, Operand::Value(Value::Text(text))) => {
            json!({ "wildcard": { field: { "value": format!("*{}*", escape_wildcard(text)) } } })
        }
        (Sign::Equals, Operand::Value(value)) => json!({ "term": { field: to_json(value) } }),
        // A missing field must not count as different.
        (Sign::NotEquals, Operand::Value(value)) => json!({
            "bool": {
                "must": [{ "exists": { "field": field } }],
                "must_not": [{ "term": { field: to_json(value) } }],
            }
        }),
        (_, Operand::Value(value)) if sign.is_ordering() => {
            let op = match sign {
                Sign::LessThan => "lt",
                Sign::GreaterThan => "gt",
                Sign::LessThanOrEqual => "lte",
                _ => "gte",
            };
            json!({ "range": { field: { op: to_json(value) } } })
        }
        (other, _) => {
            return Err(CoreError::unsupported(
                "comparator",
                format!("{other} can't be expressed as a query"),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stowage_core::definition::Mapping;
    use stowage_core::specification::Property;
    use stowage_core::Registry;
    use stowage_testkit::fixtures::User;

    use super::*;

    fn user() -> Arc<Definition> {
        Mapping::<User>::resolve(&Registry::new())
            .unwrap()
            .definition()
            .clone()
    }

    #[test]
    fn text_fields_compare_through_keyword() {
        let query = compile(&Property::of("name").equals("alice"), &user()).unwrap();
        assert_eq!(query, json!({ "term": { "name.keyword": "alice" } }));

        let query = compile(&Property::of("name").starts_with("al"), &user()).unwrap();
        assert_eq!(query, json!({ "prefix": { "name.keyword": { "value": "al" } } }));
    }

    #[test]
    fn keyword_fields_compare_directly() {
        let query = compile(&Property::of("status").equals("Active"), &user()).unwrap();
        assert_eq!(query, json!({ "term": { "status": "Active" } }));

        let query = compile(&Property::of("status").ends_with("ive"), &user()).unwrap();
        assert_eq!(query, json!({ "wildcard": { "status": { "value": "*ive" } } }));
    }

    #[test]
    fn escapes_wildcards() {
        let query = compile(&Property::of("name").contains("a*b?"), &user()).unwrap();
        assert_eq!(
            query,
            json!({ "wildcard": { "name.keyword": { "value": "*a\\*b\\?*" } } })
        );
    }

    #[test]
    fn compiles_ranges_and_nullity() {
        let query = compile(&Property::of("age").less_than_or_equal(3_i64), &user()).unwrap();
        assert_eq!(query, json!({ "range": { "age": { "lte": 3 } } }));

        let query = compile(&Property::of("age").is_null(), &user()).unwrap();
        assert_eq!(
            query,
            json!({ "bool": { "must_not": [{ "exists": { "field": "age" } }] } })
        );
    }

    #[test]
    fn not_equals_requires_a_value() {
        let query = compile(&Property::of("age").not_equals(3_i64), &user()).unwrap();
        assert_eq!(
            query,
            json!({ "bool": {
                "must": [{ "exists": { "field": "age" } }],
                "must_not": [{ "term": { "age": 3 } }],
            } })
        );
    }

    #[test]
    fn collections_compile_to_nested_queries() {
        let spec = Specification::child(
            "tags",
            Property::of("label")
                .equals("admin")
                .and(Property::of("weight").greater_than(5_i64)),
        );
        assert_eq!(
            compile(&spec, &user()).unwrap(),
            json!({ "nested": {
                "path": "tags",
                "query": { "bool": { "must": [
                    { "term": { "tags.data.label.keyword": "admin" } },
                    { "range": { "tags.data.weight": { "gt": 5 } } },
                ] } },
            } })
        );
    }

    #[test]
    fn optionals_require_presence() {
        let spec = Specification::just("phone", Property::of("verified").equals(true));
        assert_eq!(
            compile(&spec, &user()).unwrap(),
            json!({ "bool": { "must": [
                { "exists": { "field": "phone" } },
                { "term": { "phone.verified": true } },
            ] } })
        );
    }

    #[test]
    fn builds_paged_sorted_requests() {
        let fetch = Fetch::all()
            .sort(Sort::descending("address.city"))
            .drop(2)
            .take(50);
        let body = search_body(&fetch, &user(), 20, None).unwrap();
        assert_eq!(
            body,
            json!({
                "query": { "match_all": {} },
                "from": 2,
                "size": 20,
                "sort": [
                    { "address.city.keyword": { "order": "desc", "missing": "_last" } },
                    { "id": { "order": "asc" } },
                ],
            })
        );
    }

    #[test]
    fn later_pages_resume_after_the_last_hit() {
        let fetch = Fetch::all().drop(2);
        let after = [json!("7c0e")];
        let body = search_body(&fetch, &user(), 20, Some(&after[..])).unwrap();
        assert_eq!(body["search_after"], json!(["7c0e"]));
        assert!(body.get("from").is_none());
        assert_eq!(body["sort"], json!([{ "id": { "order": "asc" } }]));
    }
}
