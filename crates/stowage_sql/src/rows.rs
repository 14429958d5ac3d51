//! Reads aggregates back from their tables.

use std::collections::HashMap;

use stowage_core::definition::{Definition, PropertyDef};
use stowage_core::raw::{Aggregate, Collection, Element, Entity, Optional, Presence, Property, Reference};
use stowage_core::specification::{Direction, Sort};
use stowage_core::{CoreResult, Value};
use uuid::Uuid;

use crate::compiler::Clause;
use crate::connection::{Connection, Row, Statement};
use crate::error::SqlError;
use crate::schema::{child_table, quote, PARENT, REFERENCE};

/// `SELECT <columns> FROM <root> LEFT JOIN <entities and optionals>`.
pub(crate) fn select(definition: &Definition) -> CoreResult<String> {
    let root = quote(definition.name());
    let id = definition.id()?;
    let mut columns = vec![format!("{root}.{}", quote(&id.name))];
    columns.extend(
        definition
            .properties()
            .iter()
            .map(|p| format!("{root}.{}", quote(&p.name))),
    );
    for entity in definition.entities() {
        let table = quote(&child_table(definition, entity));
        columns.extend(
            entity
                .properties
                .iter()
                .map(|p| format!("{table}.{}", quote(&p.name))),
        );
    }
    for optional in definition.optionals() {
        let table = quote(&child_table(definition, optional));
        columns.push(format!("{table}.{}", quote(PARENT)));
        columns.extend(
            optional
                .properties
                .iter()
                .map(|p| format!("{table}.{}", quote(&p.name))),
        );
    }
    Ok(format!("SELECT {} {}", columns.join(", "), from(definition)?))
}

/// `FROM <root> LEFT JOIN ...`, shared by selects and counts.
pub(crate) fn from(definition: &Definition) -> CoreResult<String> {
    let root = quote(definition.name());
    let id = quote(&definition.id()?.name);
    let mut sql = format!("FROM {root}");
    for component in definition.entities().iter().chain(definition.optionals()) {
        let table = quote(&child_table(definition, component));
        sql.push_str(&format!(
            " LEFT JOIN {table} ON {table}.{} = {root}.{id}",
            quote(PARENT)
        ));
    }
    Ok(sql)
}

/// Appends `WHERE`, `ORDER BY` and paging to a select.
pub(crate) fn finish(
    mut sql: String,
    filter: Option<Clause>,
    order: Option<&Sort>,
    drop: Option<usize>,
    take: Option<usize>,
    definition: &Definition,
) -> CoreResult<Statement> {
    let mut parameters = Vec::new();
    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(&filter.sql);
        parameters = filter.parameters;
    }
    if let Some(order) = order {
        let (scope, property) = definition.sort_key(&order.path)?;
        let qualifier = match definition.component(scope)? {
            Some(component) => quote(&child_table(definition, component)),
            None => quote(definition.name()),
        };
        let direction = match order.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        sql.push_str(&format!(
            " ORDER BY {qualifier}.{} {direction}",
            quote(&property.name)
        ));
    }
    if drop.is_some() || take.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
        let limit = take.map_or(-1, |t| i64::try_from(t).unwrap_or(i64::MAX));
        let offset = drop.map_or(0, |d| i64::try_from(d).unwrap_or(i64::MAX));
        parameters.push(Value::Integer(limit));
        parameters.push(Value::Integer(offset));
    }
    Ok(Statement::with(sql, parameters))
}

struct Cursor<'r> {
    table: &'r str,
    values: std::vec::IntoIter<Value>,
}

impl Cursor<'_> {
    fn next(&mut self) -> Result<Value, SqlError> {
        self.values
            .next()
            .ok_or_else(|| SqlError::malformed(self.table, "too few columns"))
    }

    fn property(&mut self, def: &PropertyDef) -> CoreResult<Property> {
        let value = self.next()?;
        let value = if value.is_null() {
            Value::Null
        } else {
            def.ty.coerce(value)?
        };
        Ok(Property {
            name: def.name.clone(),
            value,
        })
    }

    fn properties(&mut self, defs: &[PropertyDef]) -> CoreResult<Vec<Property>> {
        defs.iter().map(|d| self.property(d)).collect()
    }

    fn uuid(&mut self) -> CoreResult<Uuid> {
        match self.next()? {
            Value::Text(text) => Uuid::parse_str(&text).map_err(|e| {
                SqlError::malformed(self.table, format!("bad id {text}: {e}")).into()
            }),
            other => Err(SqlError::malformed(self.table, format!("bad id {other}")).into()),
        }
    }
}

/// Decodes a row of [`select`] into an aggregate without collections.
pub(crate) fn decode(definition: &Definition, row: Row) -> CoreResult<Aggregate> {
    let mut cursor = Cursor {
        table: definition.name(),
        values: row.into_iter(),
    };
    let id = definition.id()?;
    let mut aggregate = Aggregate::new(&id.name, cursor.uuid()?);
    aggregate.properties = cursor.properties(definition.properties())?;

    for entity in definition.entities() {
        aggregate.entities.push(Entity {
            name: entity.name.clone(),
            properties: cursor.properties(&entity.properties)?,
        });
    }
    for optional in definition.optionals() {
        let present = !cursor.next()?.is_null();
        let properties = cursor.properties(&optional.properties)?;
        aggregate.optionals.push(Optional {
            name: optional.name.clone(),
            presence: if present {
                Presence::Present(properties)
            } else {
                Presence::Absent
            },
        });
    }
    Ok(aggregate)
}

/// Most ids bound to one `IN` list.
///
/// SQLite builds before 3.32 allow 999 variables per statement.
pub(crate) const ID_BATCH: usize = 900;

/// Loads the collections of `aggregates`, one query per collection and
/// batch of [`ID_BATCH`] ids.
///
/// Elements come back in insertion order.
pub(crate) fn load_collections(
    connection: &dyn Connection,
    definition: &Definition,
    aggregates: &mut [Aggregate],
) -> CoreResult<()> {
    if aggregates.is_empty() {
        return Ok(());
    }
    let ids: Vec<Value> = aggregates
        .iter()
        .map(|a| Value::Text(a.id.value.to_string()))
        .collect();

    for collection in definition.collections() {
        let table = child_table(definition, collection);
        let mut columns = vec![quote(REFERENCE), quote(PARENT)];
        columns.extend(collection.properties.iter().map(|p| quote(&p.name)));

        let mut grouped: HashMap<Uuid, Vec<Element>> = HashMap::new();
        for batch in ids.chunks(ID_BATCH) {
            let statement = Statement::with(
                format!(
                    "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY rowid",
                    columns.join(", "),
                    quote(&table),
                    quote(PARENT),
                    vec!["?"; batch.len()].join(", ")
                ),
                batch.to_vec(),
            );
            for row in connection.query(&statement)? {
                let mut cursor = Cursor {
                    table: &table,
                    values: row.into_iter(),
                };
                let reference = Reference::from_uuid(cursor.uuid()?);
                let parent = cursor.uuid()?;
                let properties = cursor.properties(&collection.properties)?;
                grouped.entry(parent).or_default().push(Element {
                    reference,
                    properties,
                });
            }
        }

        for aggregate in aggregates.iter_mut() {
            aggregate.collections.push(Collection {
                name: collection.name.clone(),
                elements: grouped.remove(&aggregate.id.value).unwrap_or_default(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use stowage_core::definition::Mapping;
    use stowage_core::Registry;
    use stowage_testkit::fixtures::User;

    use super::*;
    use crate::error::SqlResult;

    #[derive(Default)]
    struct Recording {
        statements: Mutex<Vec<Statement>>,
    }

    impl Connection for Recording {
        fn execute(&self, statement: &Statement) -> SqlResult<usize> {
            self.statements.lock().push(statement.clone());
            Ok(0)
        }

        fn query(&self, statement: &Statement) -> SqlResult<Vec<Row>> {
            self.statements.lock().push(statement.clone());
            Ok(Vec::new())
        }

        fn batch(&self, _sql: &str) -> SqlResult<()> {
            Ok(())
        }
    }

    fn definition() -> Arc<Definition> {
        Arc::clone(Mapping::<User>::resolve(&Registry::new()).unwrap().definition())
    }

    #[test]
    fn collection_queries_bind_a_bounded_number_of_ids() {
        let def = definition();
        let mut aggregates: Vec<Aggregate> = (0..ID_BATCH * 2 + 1)
            .map(|_| Aggregate::new("id", Uuid::new_v4()))
            .collect();
        let connection = Recording::default();

        load_collections(&connection, &def, &mut aggregates).unwrap();

        let statements = connection.statements.lock();
        let sizes: Vec<usize> = statements.iter().map(|s| s.parameters.len()).collect();
        assert_eq!(sizes, [ID_BATCH, ID_BATCH, 1]);
        assert!(statements[0].sql.starts_with("SELECT `reference`, `aggregate_id`"));
        assert!(aggregates.iter().all(|a| a.collections.len() == 1));
    }

    #[test]
    fn nothing_is_queried_without_aggregates() {
        let connection = Recording::default();
        load_collections(&connection, &definition(), &mut []).unwrap();
        assert!(connection.statements.lock().is_empty());
    }
}
