//! On-disk layout of aggregates.
//!
//! ```text
//! user/
//!   7c0e…/
//!     properties/name          "alice"
//!     entities/address/city    "Oslo"
//!     optionals/phone/just/number
//!     collections/tags         [{"reference": "1f3a…", "data": {"label": "admin"}}]
//! ```
//!
//! Every file holds one JSON value. The id is written as a property too,
//! so an aggregate without other properties still has a directory. An
//! absent optional has no `just` directory. A collection is a single file,
//! rewritten whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stowage_core::definition::{Definition, PropertyDef};
use stowage_core::raw::{Aggregate, Collection, Element, Entity, Optional, Presence, Property, Reference};
use stowage_core::{CoreResult, Value};
use stowage_storage::Filesystem;
use uuid::Uuid;

use crate::error::{FilesystemError, FilesystemResult};

const PROPERTIES: &str = "properties";
const ENTITIES: &str = "entities";
const OPTIONALS: &str = "optionals";
const JUST: &str = "just";
const COLLECTIONS: &str = "collections";

#[derive(Debug, Serialize, Deserialize)]
struct StoredElement {
    reference: Uuid,
    data: BTreeMap<String, Value>,
}

/// Directory of one aggregate.
pub(crate) fn directory(model: &str, id: Uuid) -> PathBuf {
    Path::new(model).join(id.to_string())
}

fn write_properties(fs: &dyn Filesystem, dir: &Path, properties: &[Property]) -> FilesystemResult<()> {
    for property in properties {
        fs.write(&dir.join(&property.name), &serde_json::to_vec(&property.value)?)?;
    }
    Ok(())
}

/// Writes every file of an aggregate.
///
/// Existing files are overwritten in place and the directory of an absent
/// optional is removed.
pub(crate) fn write(fs: &dyn Filesystem, model: &str, aggregate: &Aggregate) -> FilesystemResult<()> {
    let dir = directory(model, aggregate.id.value);
    let properties = dir.join(PROPERTIES);
    fs.write(
        &properties.join(&aggregate.id.name),
        &serde_json::to_vec(&aggregate.id.value)?,
    )?;
    write_properties(fs, &properties, &aggregate.properties)?;
    for entity in &aggregate.entities {
        write_properties(fs, &dir.join(ENTITIES).join(&entity.name), &entity.properties)?;
    }
    for optional in &aggregate.optionals {
        let just = dir.join(OPTIONALS).join(&optional.name).join(JUST);
        match optional.presence.properties() {
            Some(properties) => {
                fs.remove(&just)?;
                write_properties(fs, &just, properties)?;
            }
            None => fs.remove(&just)?,
        }
    }
    for collection in &aggregate.collections {
        let stored: Vec<StoredElement> = collection
            .elements
            .iter()
            .map(|element| StoredElement {
                reference: element.reference.to_uuid(),
                data: element
                    .properties
                    .iter()
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect(),
            })
            .collect();
        fs.write(
            &dir.join(COLLECTIONS).join(&collection.name),
            &serde_json::to_vec(&stored)?,
        )?;
    }
    Ok(())
}

/// Removes an aggregate's directory.
pub(crate) fn remove(fs: &dyn Filesystem, model: &str, id: Uuid) -> FilesystemResult<()> {
    fs.remove(&directory(model, id))?;
    Ok(())
}

/// Ids of the stored aggregates of a model.
pub(crate) fn ids(fs: &dyn Filesystem, model: &str) -> FilesystemResult<Vec<Uuid>> {
    fs.list(Path::new(model))?
        .iter()
        .map(|name| {
            Uuid::parse_str(name).map_err(|_| {
                FilesystemError::malformed(format!("{model}/{name}"), "directory name is not an id")
            })
        })
        .collect()
}

fn value(fs: &dyn Filesystem, path: &Path, property: &PropertyDef) -> CoreResult<Value> {
    let Some(bytes) = fs.read(path).map_err(FilesystemError::from)? else {
        return Ok(Value::Null);
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(FilesystemError::from)?;
    if value.is_null() {
        return Ok(value);
    }
    property.ty.coerce(value)
}

fn read_properties(fs: &dyn Filesystem, dir: &Path, defs: &[PropertyDef]) -> CoreResult<Vec<Property>> {
    defs.iter()
        .map(|def| -> CoreResult<Property> {
            Ok(Property {
                name: def.name.clone(),
                value: value(fs, &dir.join(&def.name), def)?,
            })
        })
        .collect()
}

fn element(stored: StoredElement, defs: &[PropertyDef]) -> CoreResult<Element> {
    let mut data = stored.data;
    let properties = defs
        .iter()
        .map(|def| -> CoreResult<Property> {
            let value = match data.remove(&def.name) {
                None | Some(Value::Null) => Value::Null,
                Some(found) => def.ty.coerce(found)?,
            };
            Ok(Property {
                name: def.name.clone(),
                value,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Element {
        reference: Reference::from_uuid(stored.reference),
        properties,
    })
}

/// Reads an aggregate, or `None` if its directory doesn't exist.
pub(crate) fn read(fs: &dyn Filesystem, definition: &Definition, id: Uuid) -> CoreResult<Option<Aggregate>> {
    let dir = directory(definition.name(), id);
    if !fs.exists(&dir).map_err(FilesystemError::from)? {
        return Ok(None);
    }

    let mut aggregate = Aggregate::new(&definition.id()?.name, id);
    aggregate.properties = read_properties(fs, &dir.join(PROPERTIES), definition.properties())?;
    for entity in definition.entities() {
        aggregate.entities.push(Entity {
            name: entity.name.clone(),
            properties: read_properties(fs, &dir.join(ENTITIES).join(&entity.name), &entity.properties)?,
        });
    }
    for optional in definition.optionals() {
        let just = dir.join(OPTIONALS).join(&optional.name).join(JUST);
        let presence = if fs.exists(&just).map_err(FilesystemError::from)? {
            Presence::Present(read_properties(fs, &just, &optional.properties)?)
        } else {
            Presence::Absent
        };
        aggregate.optionals.push(Optional {
            name: optional.name.clone(),
            presence,
        });
    }
    for collection in definition.collections() {
        let path = dir.join(COLLECTIONS).join(&collection.name);
        let stored: Vec<StoredElement> = match fs.read(&path).map_err(FilesystemError::from)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                FilesystemError::malformed(path.display().to_string(), e.to_string())
            })?,
            None => Vec::new(),
        };
        let elements = stored
            .into_iter()
            .map(|s| element(s, &collection.properties))
            .collect::<CoreResult<Vec<_>>>()?;
        aggregate.collections.push(Collection {
            name: collection.name.clone(),
            elements,
        });
    }
    Ok(Some(aggregate))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stowage_core::definition::Mapping;
    use stowage_core::normalize::References;
    use stowage_core::Registry;
    use stowage_storage::InMemoryFilesystem;
    use stowage_testkit::fixtures::User;

    use super::*;

    fn raw(user: &User) -> (Arc<Definition>, Aggregate) {
        let mapping = Mapping::<User>::resolve(&Registry::new()).unwrap();
        let raw = mapping.normalize(user, &References::default()).unwrap();
        (Arc::clone(mapping.definition()), raw)
    }

    fn text(fs: &InMemoryFilesystem, path: &str) -> String {
        String::from_utf8(fs.read(Path::new(path)).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn writes_one_file_per_property() {
        let fs = InMemoryFilesystem::new();
        let user = User::sample().with_phone("+4712345678");
        let (_, aggregate) = raw(&user);
        write(&fs, "user", &aggregate).unwrap();

        let root = format!("user/{}", user.id);
        assert_eq!(text(&fs, &format!("{root}/properties/name")), "\"alice\"");
        assert_eq!(text(&fs, &format!("{root}/properties/score")), "4.5");
        assert_eq!(text(&fs, &format!("{root}/entities/address/city")), "\"Oslo\"");
        assert_eq!(
            text(&fs, &format!("{root}/optionals/phone/just/number")),
            "\"+4712345678\""
        );
        let tags: serde_json::Value =
            serde_json::from_str(&text(&fs, &format!("{root}/collections/tags"))).unwrap();
        assert_eq!(tags[0]["data"]["label"], "admin");
        assert_eq!(tags[1]["data"]["weight"], 1);
    }

    #[test]
    fn reads_back_what_was_written() {
        let fs = InMemoryFilesystem::new();
        let (def, aggregate) = raw(&User::sample().with_phone("+4712345678"));
        write(&fs, "user", &aggregate).unwrap();

        let read = read(&fs, &def, aggregate.id.value).unwrap();
        assert_eq!(read, Some(aggregate));
        assert_eq!(read_missing(&fs, &def), None);
    }

    fn read_missing(fs: &InMemoryFilesystem, def: &Definition) -> Option<Aggregate> {
        read(fs, def, Uuid::new_v4()).unwrap()
    }

    #[test]
    fn absent_optionals_lose_their_directory() {
        let fs = InMemoryFilesystem::new();
        let user = User::sample().with_phone("+4712345678");
        let (def, aggregate) = raw(&user);
        write(&fs, "user", &aggregate).unwrap();

        let (_, without) = raw(&User { phone: None, ..user.clone() });
        write(&fs, "user", &without).unwrap();

        let just = format!("user/{}/optionals/phone/just", user.id);
        assert!(!fs.exists(Path::new(&just)).unwrap());
        let read = read(&fs, &def, user.id.to_uuid()).unwrap().unwrap();
        assert_eq!(read.optionals[0].presence, Presence::Absent);
    }

    #[test]
    fn lists_stored_ids() {
        let fs = InMemoryFilesystem::new();
        let (_, aggregate) = raw(&User::sample());
        write(&fs, "user", &aggregate).unwrap();

        assert_eq!(ids(&fs, "user").unwrap(), vec![aggregate.id.value]);
        remove(&fs, "user", aggregate.id.value).unwrap();
        assert!(ids(&fs, "user").unwrap().is_empty());
    }

    #[test]
    fn stray_directories_are_malformed() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("user/not-an-id/properties/name"), b"\"x\"").unwrap();
        assert!(matches!(
            ids(&fs, "user"),
            Err(FilesystemError::Malformed { .. })
        ));
    }
}
