//! Normalizing domain objects into raw aggregates and back.

mod diff;
mod references;

pub use diff::diff;
pub use references::References;

use uuid::Uuid;

use crate::definition::resolve::Role;
use crate::definition::{Aggregate, ComponentDef, Fields, Mapping, Slot};
use crate::error::{CoreError, CoreResult};
use crate::raw;
use crate::types::DomainValue;
use crate::value::Value;

impl<M: Aggregate> Mapping<M> {
    /// Reads the identity of a domain object.
    pub fn identify(&self, aggregate: &M) -> CoreResult<Uuid> {
        self.definition.id()?;
        self.fields
            .iter()
            .find(|f| f.role == Role::Identity)
            .and_then(|f| match (f.decl.extract)(aggregate) {
                Slot::Identity(uuid) => Some(uuid),
                _ => None,
            })
            .ok_or_else(|| CoreError::MissingIdentity {
                model: M::NAME.to_string(),
            })
    }

    /// Converts a domain object into its raw form.
    ///
    /// Collection elements get their references from `references`.
    pub fn normalize(&self, aggregate: &M, references: &References) -> CoreResult<raw::Aggregate> {
        let id_def = self.definition.id()?;
        let id = self.identify(aggregate)?;
        let mut raw = raw::Aggregate::new(id_def.name.clone(), id);

        for field in &self.fields {
            let slot = (field.decl.extract)(aggregate);
            match (field.role, slot) {
                (Role::Identity, _) => {}
                (Role::Property(index), slot) => {
                    let def = &self.definition.properties()[index];
                    let value = match slot {
                        Slot::Scalar(value) => value,
                        Slot::Identity(uuid) => DomainValue::Uuid(uuid),
                        _ => return Err(self.shape_error(&def.name)),
                    };
                    raw.properties.push(raw::Property {
                        name: def.name.clone(),
                        value: def.ty.normalize(&value)?,
                    });
                }
                (Role::Entity(index), Slot::Entity(fields)) => {
                    let def = &self.definition.entities()[index];
                    raw.entities.push(raw::Entity {
                        name: def.name.clone(),
                        properties: normalize_component(def, &fields)?,
                    });
                }
                (Role::Optional(index), Slot::Optional(fields)) => {
                    let def = &self.definition.optionals()[index];
                    let presence = match fields {
                        Some(fields) => raw::Presence::Present(normalize_component(def, &fields)?),
                        None => raw::Presence::Absent,
                    };
                    raw.optionals.push(raw::Optional {
                        name: def.name.clone(),
                        presence,
                    });
                }
                (Role::Collection(index), Slot::Collection(elements)) => {
                    let def = &self.definition.collections()[index];
                    let properties = elements
                        .iter()
                        .map(|fields| normalize_component(def, fields))
                        .collect::<CoreResult<Vec<_>>>()?;
                    raw.collections.push(raw::Collection {
                        name: def.name.clone(),
                        elements: references.assign(M::NAME, id, &def.name, properties),
                    });
                }
                (_, _) => return Err(self.shape_error(field.decl.name)),
            }
        }
        Ok(raw)
    }

    /// Rebuilds a domain object from its raw form.
    ///
    /// The references of collection elements are remembered in
    /// `references` so a later normalization can reuse them.
    pub fn denormalize(&self, raw: raw::Aggregate, references: &References) -> CoreResult<M> {
        let id_def = self.definition.id()?;
        let id = raw.id.value;
        let mut fields = Fields::new(M::NAME);

        for def in self.definition.properties() {
            let value = raw
                .properties
                .iter()
                .find(|p| p.name == def.name)
                .map_or(Value::Null, |p| p.value.clone());
            fields.insert(def.name.clone(), Slot::Scalar(def.ty.denormalize(value)?));
        }

        for def in self.definition.entities() {
            let properties = raw.entity(&def.name).map_or(&[][..], |e| &e.properties);
            fields.insert(
                def.name.clone(),
                Slot::Entity(denormalize_component(def, properties)?),
            );
        }

        for def in self.definition.optionals() {
            let properties = raw
                .optional(&def.name)
                .and_then(|o| o.presence.properties());
            let slot = match properties {
                Some(properties) => Some(denormalize_component(def, properties)?),
                None => None,
            };
            fields.insert(def.name.clone(), Slot::Optional(slot));
        }

        for def in self.definition.collections() {
            let elements = raw.collection(&def.name).map_or(&[][..], |c| &c.elements);
            references.remember(M::NAME, id, &def.name, elements);
            let components = elements
                .iter()
                .map(|e| denormalize_component(def, &e.properties))
                .collect::<CoreResult<Vec<_>>>()?;
            fields.insert(def.name.clone(), Slot::Collection(components));
        }

        fields.insert(id_def.name.clone(), Slot::Identity(id));
        M::assemble(fields)
    }

    /// Computes the raw diff between two versions of a domain object.
    pub fn diff(&self, then: &M, now: &M, references: &References) -> CoreResult<raw::Diff> {
        let then = self.normalize(then, references)?;
        let now = self.normalize(now, references)?;
        diff(&then, &now)
    }

    fn shape_error(&self, field: &str) -> CoreError {
        CoreError::definition(
            M::NAME,
            format!("accessor for {field} returned a value of the wrong shape"),
        )
    }
}

fn normalize_component(def: &ComponentDef, fields: &Fields) -> CoreResult<Vec<raw::Property>> {
    def.properties
        .iter()
        .map(|property| {
            let value = match fields.get(&property.name) {
                Some(Slot::Scalar(value)) => property.ty.normalize(value)?,
                _ => {
                    return Err(CoreError::definition(
                        def.name.clone(),
                        format!("property {} is not mapped", property.name),
                    ))
                }
            };
            Ok(raw::Property {
                name: property.name.clone(),
                value,
            })
        })
        .collect()
}

fn denormalize_component(def: &ComponentDef, properties: &[raw::Property]) -> CoreResult<Fields> {
    let mut fields = Fields::new(def.name.clone());
    for property in &def.properties {
        let value = properties
            .iter()
            .find(|p| p.name == property.name)
            .map_or(Value::Null, |p| p.value.clone());
        fields.insert(
            property.name.clone(),
            Slot::Scalar(property.ty.denormalize(value)?),
        );
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Article, Comment, Cover, Meta, State};
    use crate::types::Registry;
    use crate::Id;

    fn mapping() -> Mapping<Article> {
        Mapping::resolve(&Registry::new()).unwrap()
    }

    #[test]
    fn roundtrip_preserves_the_aggregate() {
        let mapping = mapping();
        let refs = References::default();
        let article = Article::sample();

        let raw = mapping.normalize(&article, &refs).unwrap();
        assert_eq!(raw.id.value, article.id.to_uuid());
        assert_eq!(raw.property("title"), Some(Value::Text("Hello".into())));
        assert_eq!(raw.property("state"), Some(Value::Text("Published".into())));
        assert_eq!(raw.property("rating"), Some(Value::Null));

        let back = mapping.denormalize(raw, &refs).unwrap();
        assert_eq!(back, Article {
            draft_notes: String::new(),
            ..article
        });
    }

    #[test]
    fn excluded_fields_are_dropped() {
        let mapping = mapping();
        let mut article = Article::sample();
        article.draft_notes = "secret".into();
        let raw = mapping.normalize(&article, &References::default()).unwrap();
        assert!(raw.property("draft_notes").is_none());
    }

    #[test]
    fn reloaded_elements_produce_no_diff() {
        let mapping = mapping();
        let refs = References::default();
        let article = Article::sample();
        let stored = mapping.normalize(&article, &refs).unwrap();

        let fresh = References::default();
        let loaded = mapping.denormalize(stored.clone(), &fresh).unwrap();
        let again = mapping.normalize(&loaded, &fresh).unwrap();
        assert!(diff(&stored, &again).unwrap().is_empty());
    }

    #[test]
    fn diff_of_domain_objects() {
        let mapping = mapping();
        let refs = References::default();
        let then = Article::sample();
        let mut now = then.clone();
        now.title = "Changed".into();
        now.state = State::Draft;
        now.cover = Some(Cover {
            url: "http://img".into(),
        });
        now.comments.push(Comment {
            body: "third".into(),
            votes: 0,
        });
        now.meta = Meta {
            words: then.meta.words,
            language: "nb".into(),
        };

        let d = mapping.diff(&then, &now, &refs).unwrap();
        assert_eq!(d.properties.len(), 2);
        assert_eq!(d.entities[0].properties.len(), 1);
        assert!(matches!(d.optionals[0].presence, raw::Presence::BrandNew(_)));
        assert_eq!(d.collections[0].added.len(), 1);
        assert!(d.collections[0].removed.is_empty());
    }

    #[test]
    fn wrong_raw_type_is_a_mismatch() {
        let mapping = mapping();
        let mut raw = mapping
            .normalize(&Article::sample(), &References::default())
            .unwrap();
        raw.properties
            .iter_mut()
            .find(|p| p.name == "title")
            .unwrap()
            .value = Value::Integer(3);
        let err = mapping.denormalize(raw, &References::default()).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn foreign_ids_are_properties() {
        let mapping = mapping();
        let article = Article::sample();
        let raw = mapping.normalize(&article, &References::default()).unwrap();
        let author: Id<crate::fixtures::Author> = article.author;
        assert_eq!(raw.property("author"), Some(Value::Text(author.to_string())));
    }
}
