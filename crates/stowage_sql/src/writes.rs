//! Builds the statements that persist aggregates and diffs.

use stowage_core::definition::{ComponentDef, Definition};
use stowage_core::raw::{Aggregate, Diff, Element, Presence, Property};
use stowage_core::{CoreError, CoreResult, Value};
use uuid::Uuid;

use crate::connection::Statement;
use crate::schema::{child_table, quote, PARENT, REFERENCE};

fn id_value(id: Uuid) -> Value {
    Value::Text(id.to_string())
}

fn insert(table: &str, keys: Vec<(&str, Value)>, properties: &[Property]) -> Statement {
    let mut columns = Vec::with_capacity(keys.len() + properties.len());
    let mut parameters = Vec::with_capacity(columns.capacity());
    for (name, value) in keys {
        columns.push(quote(name));
        parameters.push(value);
    }
    for property in properties {
        columns.push(quote(&property.name));
        parameters.push(property.value.clone());
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    Statement::with(
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(table),
            columns.join(", ")
        ),
        parameters,
    )
}

fn update(table: &str, key: &str, id: Value, properties: &[Property]) -> Option<Statement> {
    if properties.is_empty() {
        return None;
    }
    let assignments: Vec<String> = properties
        .iter()
        .map(|p| format!("{} = ?", quote(&p.name)))
        .collect();
    let mut parameters: Vec<Value> = properties.iter().map(|p| p.value.clone()).collect();
    parameters.push(id);
    Some(Statement::with(
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote(table),
            assignments.join(", "),
            quote(key)
        ),
        parameters,
    ))
}

fn delete(table: &str, key: &str, id: Value) -> Statement {
    Statement::with(
        format!("DELETE FROM {} WHERE {} = ?", quote(table), quote(key)),
        vec![id],
    )
}

fn component<'d>(
    components: &'d [ComponentDef],
    name: &str,
    definition: &Definition,
) -> CoreResult<&'d ComponentDef> {
    components
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| CoreError::unknown_property(definition.name(), name))
}

fn insert_element(table: &str, parent: Uuid, element: &Element) -> Statement {
    insert(
        table,
        vec![
            (REFERENCE, id_value(element.reference.to_uuid())),
            (PARENT, id_value(parent)),
        ],
        &element.properties,
    )
}

/// Statements that store a new aggregate, parent first.
pub(crate) fn add(definition: &Definition, aggregate: &Aggregate) -> CoreResult<Vec<Statement>> {
    let id = aggregate.id.value;
    let mut statements = vec![insert(
        definition.name(),
        vec![(aggregate.id.name.as_str(), id_value(id))],
        &aggregate.properties,
    )];

    for entity in &aggregate.entities {
        let def = component(definition.entities(), &entity.name, definition)?;
        statements.push(insert(
            &child_table(definition, def),
            vec![(PARENT, id_value(id))],
            &entity.properties,
        ));
    }
    for optional in &aggregate.optionals {
        let def = component(definition.optionals(), &optional.name, definition)?;
        if let Some(properties) = optional.presence.properties() {
            statements.push(insert(
                &child_table(definition, def),
                vec![(PARENT, id_value(id))],
                properties,
            ));
        }
    }
    for collection in &aggregate.collections {
        let def = component(definition.collections(), &collection.name, definition)?;
        let table = child_table(definition, def);
        statements.extend(
            collection
                .elements
                .iter()
                .map(|e| insert_element(&table, id, e)),
        );
    }
    Ok(statements)
}

/// Statements that apply a diff. Only changed columns and rows are touched.
pub(crate) fn apply(definition: &Definition, diff: &Diff) -> CoreResult<Vec<Statement>> {
    let id = diff.id.value;
    let mut statements = Vec::new();
    statements.extend(update(
        definition.name(),
        &diff.id.name,
        id_value(id),
        &diff.properties,
    ));

    for entity in &diff.entities {
        let def = component(definition.entities(), &entity.name, definition)?;
        statements.extend(update(
            &child_table(definition, def),
            PARENT,
            id_value(id),
            &entity.properties,
        ));
    }

    for optional in &diff.optionals {
        let def = component(definition.optionals(), &optional.name, definition)?;
        let table = child_table(definition, def);
        match &optional.presence {
            Presence::Absent => statements.push(delete(&table, PARENT, id_value(id))),
            Presence::BrandNew(properties) => {
                statements.push(delete(&table, PARENT, id_value(id)));
                statements.push(insert(&table, vec![(PARENT, id_value(id))], properties));
            }
            Presence::Present(changed) => {
                statements.extend(update(&table, PARENT, id_value(id), changed));
            }
        }
    }

    for collection in &diff.collections {
        let def = component(definition.collections(), &collection.name, definition)?;
        let table = child_table(definition, def);
        for reference in &collection.removed {
            statements.push(Statement::with(
                format!(
                    "DELETE FROM {} WHERE {} = ? AND {} = ?",
                    quote(&table),
                    quote(REFERENCE),
                    quote(PARENT)
                ),
                vec![id_value(reference.to_uuid()), id_value(id)],
            ));
        }
        statements.extend(
            collection
                .added
                .iter()
                .map(|e| insert_element(&table, id, e)),
        );
    }
    Ok(statements)
}

/// Statements that delete an aggregate and every child row.
///
/// Children are deleted explicitly: optional rows are only detached by the
/// foreign key, and must not outlive their aggregate.
pub(crate) fn remove(definition: &Definition, id: Uuid) -> CoreResult<Vec<Statement>> {
    let key = &definition.id()?.name;
    let mut statements: Vec<Statement> = definition
        .collections()
        .iter()
        .chain(definition.optionals())
        .chain(definition.entities())
        .map(|c| delete(&child_table(definition, c), PARENT, id_value(id)))
        .collect();
    statements.push(delete(definition.name(), key, id_value(id)));
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stowage_core::definition::Mapping;
    use stowage_core::normalize::References;
    use stowage_core::Registry;
    use stowage_testkit::fixtures::User;

    use super::*;

    fn mapping() -> Mapping<User> {
        Mapping::<User>::resolve(&Registry::new()).unwrap()
    }

    fn definition(mapping: &Mapping<User>) -> Arc<Definition> {
        mapping.definition().clone()
    }

    #[test]
    fn adds_every_row() {
        let mapping = mapping();
        let refs = References::default();
        let user = User::sample();
        let raw = mapping.normalize(&user, &refs).unwrap();
        let statements = add(&definition(&mapping), &raw).unwrap();

        assert!(statements[0].sql.starts_with("INSERT INTO `user` (`id`, "));
        assert_eq!(statements[0].parameters[0], Value::Text(user.id.to_string()));
        let rows = 1 + 1 + usize::from(user.phone.is_some()) + user.tags.len();
        assert_eq!(statements.len(), rows);
    }

    #[test]
    fn updates_only_changed_columns() {
        let mapping = mapping();
        let refs = References::default();
        let then = User::sample();
        let mut now = then.clone();
        now.name = "renamed".into();

        let diff = mapping.diff(&then, &now, &refs).unwrap();
        let statements = apply(&definition(&mapping), &diff).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "UPDATE `user` SET `name` = ? WHERE `id` = ?");
        assert_eq!(
            statements[0].parameters,
            vec![Value::from("renamed"), Value::Text(then.id.to_string())]
        );
    }

    #[test]
    fn removes_children_before_the_parent() {
        let mapping = mapping();
        let id = Uuid::new_v4();
        let statements = remove(&definition(&mapping), id).unwrap();
        let last = statements.last().unwrap();
        assert_eq!(last.sql, "DELETE FROM `user` WHERE `id` = ?");
        assert!(statements[0].sql.starts_with("DELETE FROM `user_tags`"));
        assert_eq!(statements.len(), 4);
    }
}
