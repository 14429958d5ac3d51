//! Conversion between raw aggregates and JSON documents.
//!
//! ```json
//! {
//!   "id": "7c0e…",
//!   "name": "alice",
//!   "address": { "city": "Oslo" },
//!   "phone": null,
//!   "tags": [{ "reference": "1f3a…", "data": { "label": "admin" } }]
//! }
//! ```

use serde_json::{Map, Value as Json};
use stowage_core::definition::{Definition, PropertyDef};
use stowage_core::raw::{
    Aggregate, Collection, Diff, Element, Entity, Optional, Presence, Property, Reference,
};
use stowage_core::{CoreResult, Type, Value};
use uuid::Uuid;

use crate::error::SearchError;
use crate::mapping::{DATA, REFERENCE};

pub(crate) fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s.clone()),
    }
}

fn object(properties: &[Property]) -> Json {
    Json::Object(
        properties
            .iter()
            .map(|p| (p.name.clone(), to_json(&p.value)))
            .collect(),
    )
}

fn elements(elements: &[Element]) -> Json {
    Json::Array(
        elements
            .iter()
            .map(|e| {
                let mut entry = Map::new();
                entry.insert(REFERENCE.into(), Json::String(e.reference.to_string()));
                entry.insert(DATA.into(), object(&e.properties));
                Json::Object(entry)
            })
            .collect(),
    )
}

/// Encodes a whole aggregate.
pub(crate) fn encode(aggregate: &Aggregate) -> Json {
    let mut document = Map::new();
    document.insert(
        aggregate.id.name.clone(),
        Json::String(aggregate.id.value.to_string()),
    );
    for property in &aggregate.properties {
        document.insert(property.name.clone(), to_json(&property.value));
    }
    for entity in &aggregate.entities {
        document.insert(entity.name.clone(), object(&entity.properties));
    }
    for optional in &aggregate.optionals {
        let value = optional.presence.properties().map_or(Json::Null, object);
        document.insert(optional.name.clone(), value);
    }
    for collection in &aggregate.collections {
        document.insert(collection.name.clone(), elements(&collection.elements));
    }
    Json::Object(document)
}

/// Encodes a diff as a partial document.
///
/// Objects in the partial document are merged into the stored one, so
/// changed entity and optional properties are sent alone. Arrays replace,
/// so every changed collection is sent whole.
pub(crate) fn encode_diff(diff: &Diff) -> Json {
    let mut document = Map::new();
    for property in &diff.properties {
        document.insert(property.name.clone(), to_json(&property.value));
    }
    for entity in &diff.entities {
        document.insert(entity.name.clone(), object(&entity.properties));
    }
    for optional in &diff.optionals {
        let value = match &optional.presence {
            Presence::Absent => Json::Null,
            Presence::Present(changed) | Presence::BrandNew(changed) => object(changed),
        };
        document.insert(optional.name.clone(), value);
    }
    for collection in &diff.collections {
        document.insert(collection.name.clone(), elements(&collection.elements));
    }
    Json::Object(document)
}

struct Reader<'a> {
    index: &'a str,
    id: &'a str,
}

impl Reader<'_> {
    fn error(&self, message: impl Into<String>) -> SearchError {
        SearchError::malformed(self.index, self.id, message)
    }

    fn value(&self, json: &Json, property: &PropertyDef) -> CoreResult<Value> {
        let value = match (property.ty.inner(), json) {
            (_, Json::Null) => Value::Null,
            (_, Json::Bool(b)) => Value::Boolean(*b),
            (Type::Float, Json::Number(n)) => n.as_f64().map_or(Value::Null, Value::Float),
            (_, Json::Number(n)) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            (_, Json::String(s)) => Value::Text(s.clone()),
            (_, other) => {
                return Err(self
                    .error(format!("{} holds {other}", property.name))
                    .into())
            }
        };
        Ok(value)
    }

    fn properties(&self, json: Option<&Json>, defs: &[PropertyDef]) -> CoreResult<Vec<Property>> {
        let empty = Map::new();
        let fields = match json {
            Some(Json::Object(fields)) => fields,
            None | Some(Json::Null) => &empty,
            Some(other) => return Err(self.error(format!("expected an object, got {other}")).into()),
        };
        defs.iter()
            .map(|def| -> CoreResult<Property> {
                let value = fields
                    .get(&def.name)
                    .map_or(Ok(Value::Null), |json| self.value(json, def))?;
                Ok(Property {
                    name: def.name.clone(),
                    value,
                })
            })
            .collect()
    }

    fn uuid(&self, json: Option<&Json>, what: &str) -> CoreResult<Uuid> {
        json.and_then(Json::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| self.error(format!("missing or malformed {what}")).into())
    }
}

/// Decodes a stored document.
pub(crate) fn decode(definition: &Definition, index: &str, id: &str, source: &Json) -> CoreResult<Aggregate> {
    let reader = Reader { index, id };
    let id_def = definition.id()?;
    let uuid = reader.uuid(source.get(&id_def.name), &id_def.name)?;

    let mut aggregate = Aggregate::new(&id_def.name, uuid);
    aggregate.properties = reader.properties(Some(source), definition.properties())?;
    for entity in definition.entities() {
        aggregate.entities.push(Entity {
            name: entity.name.clone(),
            properties: reader.properties(source.get(&entity.name), &entity.properties)?,
        });
    }
    for optional in definition.optionals() {
        let presence = match source.get(&optional.name) {
            None | Some(Json::Null) => Presence::Absent,
            found => Presence::Present(reader.properties(found, &optional.properties)?),
        };
        aggregate.optionals.push(Optional {
            name: optional.name.clone(),
            presence,
        });
    }
    for collection in definition.collections() {
        let entries = match source.get(&collection.name) {
            None | Some(Json::Null) => &[][..],
            Some(Json::Array(entries)) => entries.as_slice(),
            Some(other) => {
                return Err(reader
                    .error(format!("{} holds {other}", collection.name))
                    .into())
            }
        };
        let elements = entries
            .iter()
            .map(|entry| -> CoreResult<Element> {
                Ok(Element {
                    reference: Reference::from_uuid(reader.uuid(entry.get(REFERENCE), REFERENCE)?),
                    properties: reader.properties(entry.get(DATA), &collection.properties)?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        aggregate.collections.push(Collection {
            name: collection.name.clone(),
            elements,
        });
    }
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stowage_core::definition::Mapping;
    use stowage_core::normalize::References;
    use stowage_core::Registry;
    use stowage_testkit::fixtures::User;

    use super::*;

    #[test]
    fn encodes_the_layout() {
        let mapping = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let user = User::sample();
        let raw = mapping.normalize(&user, &References::default()).unwrap();
        let document = encode(&raw);

        assert_eq!(document["id"], json!(user.id.to_string()));
        assert_eq!(document["name"], json!("alice"));
        assert_eq!(document["score"], json!(4.5));
        assert_eq!(document["status"], json!("Active"));
        assert_eq!(document["address"]["city"], json!("Oslo"));
        assert_eq!(document["phone"], Json::Null);
        assert_eq!(document["tags"][0]["data"]["label"], json!("admin"));
        assert!(document["tags"][0]["reference"].is_string());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let mapping = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let refs = References::default();
        let user = User::sample().with_phone("+4700000000");
        let raw = mapping.normalize(&user, &refs).unwrap();

        let decoded = decode(mapping.definition(), "user", "x", &encode(&raw)).unwrap();
        assert_eq!(mapping.denormalize(decoded, &refs).unwrap(), user);
    }

    #[test]
    fn whole_floats_stay_floats() {
        let mapping = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let refs = References::default();
        let mut user = User::sample();
        user.score = 3.0;
        let mut document = encode(&mapping.normalize(&user, &refs).unwrap());
        document["score"] = json!(3);

        let decoded = decode(mapping.definition(), "user", "x", &document).unwrap();
        assert_eq!(decoded.property("score"), Some(Value::Float(3.0)));
    }

    #[test]
    fn partial_documents_hold_only_changes() {
        let mapping = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let refs = References::default();
        let then = User::sample();
        let mut now = then.clone().with_phone("+4711111111");
        now.address.city = "Bergen".into();

        let partial = encode_diff(&mapping.diff(&then, &now, &refs).unwrap());
        assert_eq!(
            partial,
            json!({
                "address": { "city": "Bergen" },
                "phone": { "number": "+4711111111", "verified": false }
            })
        );
    }

    #[test]
    fn rejects_documents_without_an_id() {
        let mapping = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let err = decode(mapping.definition(), "user", "x", &json!({ "name": "a" })).unwrap_err();
        assert!(matches!(err, stowage_core::CoreError::Adapter { adapter: "search", .. }));
    }
}
