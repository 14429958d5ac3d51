//! Index mapping of an aggregate.

use serde_json::{json, Map, Value as Json};
use stowage_core::definition::{ComponentDef, Definition, PropertyDef};
use stowage_core::{CoreResult, Type};

/// Key of an element's reference inside a collection entry.
pub(crate) const REFERENCE: &str = "reference";
/// Key of an element's properties inside a collection entry.
pub(crate) const DATA: &str = "data";
/// Subfield holding the exact value of a text field.
pub(crate) const KEYWORD: &str = "keyword";

/// Capability a custom type registers to choose its field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchField {
    /// Elasticsearch field type, like `"scaled_float"` or `"ip"`.
    pub field_type: &'static str,
}

impl SearchField {
    /// Creates the capability.
    #[must_use]
    pub const fn new(field_type: &'static str) -> Self {
        Self { field_type }
    }
}

fn field_type(ty: &Type) -> &'static str {
    match ty.inner() {
        Type::Text | Type::Opaque => "text",
        Type::Integer => "long",
        Type::Float => "double",
        Type::Boolean => "boolean",
        Type::Identifier | Type::Enum(_) => "keyword",
        Type::Custom(_) => ty
            .capability::<SearchField>()
            .map_or("keyword", |f| f.field_type),
        Type::Nullable(_) => "keyword",
    }
}

/// Whether a type is mapped as analyzed text with an exact subfield.
pub(crate) fn is_analyzed(ty: &Type) -> bool {
    field_type(ty) == "text"
}

/// The field to use for exact matching and sorting on `path`.
pub(crate) fn exact(path: &str, ty: &Type) -> String {
    if is_analyzed(ty) {
        format!("{path}.{KEYWORD}")
    } else {
        path.to_string()
    }
}

fn property(ty: &Type) -> Json {
    match field_type(ty) {
        "text" => json!({
            "type": "text",
            "fields": { KEYWORD: { "type": "keyword" } }
        }),
        other => json!({ "type": other }),
    }
}

fn properties(defs: &[PropertyDef]) -> Map<String, Json> {
    defs.iter()
        .map(|p| (p.name.clone(), property(&p.ty)))
        .collect()
}

fn object(component: &ComponentDef) -> Json {
    json!({ "type": "object", "properties": properties(&component.properties) })
}

/// Renders the index creation body of an aggregate.
///
/// The id is a `keyword`, entities and optionals are objects and
/// collections are `nested` arrays of `{reference, data}` entries.
///
/// ```
/// # use stowage_core::{Manager, InMemoryAdapter};
/// # use stowage_testkit::fixtures::User;
/// let manager = Manager::new(InMemoryAdapter::new());
/// let definition = manager.definition::<User>().unwrap();
/// let body = stowage_search::mapping(&definition).unwrap();
/// assert_eq!(body["mappings"]["properties"]["id"]["type"], "keyword");
/// ```
pub fn mapping(definition: &Definition) -> CoreResult<Json> {
    let id = definition.id()?;
    let mut fields = properties(definition.properties());
    fields.insert(id.name.clone(), json!({ "type": "keyword" }));

    for component in definition.entities().iter().chain(definition.optionals()) {
        fields.insert(component.name.clone(), object(component));
    }
    for collection in definition.collections() {
        fields.insert(
            collection.name.clone(),
            json!({
                "type": "nested",
                "properties": {
                    REFERENCE: { "type": "keyword", "index": false },
                    DATA: object(collection),
                }
            }),
        );
    }
    Ok(json!({ "mappings": { "properties": fields } }))
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};
    use std::sync::Arc;

    use stowage_core::definition::Mapping;
    use stowage_core::types::{CustomType, DomainValue};
    use stowage_core::{CoreError, Registry, Value};
    use stowage_testkit::fixtures::User;

    use super::*;

    #[test]
    fn maps_every_shape() {
        let definition = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let body = mapping(definition.definition()).unwrap();
        let fields = &body["mappings"]["properties"];

        assert_eq!(fields["id"], json!({ "type": "keyword" }));
        assert_eq!(fields["name"]["type"], "text");
        assert_eq!(fields["name"]["fields"]["keyword"]["type"], "keyword");
        assert_eq!(fields["age"], json!({ "type": "long" }));
        assert_eq!(fields["score"], json!({ "type": "double" }));
        assert_eq!(fields["status"], json!({ "type": "keyword" }));
        assert_eq!(fields["address"]["type"], "object");
        assert_eq!(fields["address"]["properties"]["city"]["type"], "text");
        assert_eq!(fields["phone"]["properties"]["verified"], json!({ "type": "boolean" }));
        assert_eq!(fields["tags"]["type"], "nested");
        assert_eq!(
            fields["tags"]["properties"]["reference"],
            json!({ "type": "keyword", "index": false })
        );
        assert_eq!(
            fields["tags"]["properties"]["data"]["properties"]["weight"],
            json!({ "type": "long" })
        );
        assert!(fields.get("session").is_none());
    }

    #[derive(Debug)]
    struct Address;

    static IP: SearchField = SearchField::new("ip");

    impl CustomType for Address {
        fn name(&self) -> &str {
            "ip-address"
        }

        fn normalize(&self, value: &DomainValue) -> stowage_core::CoreResult<Value> {
            match value {
                DomainValue::Text(s) => Ok(Value::Text(s.clone())),
                other => Err(CoreError::type_mismatch("ip-address", format!("{other:?}"))),
            }
        }

        fn denormalize(&self, value: Value) -> stowage_core::CoreResult<DomainValue> {
            match value {
                Value::Text(s) => Ok(DomainValue::Text(s)),
                other => Err(CoreError::type_mismatch("ip-address", other.to_string())),
            }
        }

        fn capability(&self, id: TypeId) -> Option<&dyn Any> {
            (id == TypeId::of::<SearchField>()).then_some(&IP as &dyn Any)
        }
    }

    #[test]
    fn custom_types_choose_their_field() {
        let ty = Type::Custom(Arc::new(Address));
        assert_eq!(property(&ty), json!({ "type": "ip" }));
        assert_eq!(exact("remote", &ty), "remote");
        assert_eq!(exact("name", &Type::Text), "name.keyword");
    }
}
