//! Relational layout of an aggregate.
//!
//! One table per aggregate, one per entity and optional, one per
//! collection:
//!
//! | table | key | parent link |
//! |-------|-----|-------------|
//! | `<name>` | `id` | |
//! | `<name>_<entity>` | `aggregate_id` | `ON DELETE CASCADE` |
//! | `<name>_<optional>` | `aggregate_id` (nullable, unique) | `ON DELETE SET NULL` |
//! | `<name>_<collection>` | `reference` | `ON DELETE CASCADE` |

use std::fmt::Write as _;

use stowage_core::definition::{ComponentDef, Definition, PropertyDef};
use stowage_core::{CoreResult, Type};

/// Column of the parent id in child tables.
pub(crate) const PARENT: &str = "aggregate_id";
/// Column of the element reference in collection tables.
pub(crate) const REFERENCE: &str = "reference";

const FALLBACK: &str = "LONGTEXT";

/// Capability a custom type registers to choose its column type.
///
/// ```
/// use stowage_sql::SqlColumn;
///
/// static MONEY: SqlColumn = SqlColumn::new("DECIMAL(12, 2)");
/// assert_eq!(MONEY.definition, "DECIMAL(12, 2)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlColumn {
    /// Column type as written in `CREATE TABLE`.
    pub definition: &'static str,
}

impl SqlColumn {
    /// Creates the capability.
    #[must_use]
    pub const fn new(definition: &'static str) -> Self {
        Self { definition }
    }
}

/// Quotes an identifier.
pub(crate) fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Name of a child table.
pub(crate) fn child_table(definition: &Definition, component: &ComponentDef) -> String {
    format!("{}_{}", definition.name(), component.name)
}

/// Column type of a property, or `None` if the type has no known mapping.
pub(crate) fn column_type(ty: &Type) -> Option<&'static str> {
    match ty.inner() {
        Type::Text => Some("TEXT"),
        Type::Integer => Some("BIGINT"),
        Type::Boolean => Some("BOOLEAN"),
        Type::Float => Some("DOUBLE"),
        Type::Identifier => Some("CHAR(36)"),
        Type::Enum(_) => Some("VARCHAR(255)"),
        Type::Custom(_) => ty.capability::<SqlColumn>().map(|c| c.definition),
        Type::Opaque | Type::Nullable(_) => None,
    }
}

fn column(out: &mut String, property: &PropertyDef) {
    let null = if property.ty.is_nullable() { "NULL" } else { "NOT NULL" };
    match column_type(&property.ty) {
        Some(ty) => {
            let _ = write!(out, ",\n  {} {ty} {null}", quote(&property.name));
        }
        None => {
            let _ = write!(
                out,
                ",\n  -- adjust this column type: no mapping for {}\n  {} {FALLBACK} {null}",
                property.ty.name(),
                quote(&property.name)
            );
        }
    }
}

fn root(definition: &Definition) -> CoreResult<String> {
    let id = definition.id()?;
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {} CHAR(36) NOT NULL PRIMARY KEY",
        quote(definition.name()),
        quote(&id.name)
    );
    for property in definition.properties() {
        column(&mut sql, property);
    }
    sql.push_str("\n)");
    Ok(sql)
}

enum Kind {
    Entity,
    Optional,
    Collection,
}

fn child(definition: &Definition, component: &ComponentDef, kind: &Kind) -> CoreResult<String> {
    let id = definition.id()?;
    let keys = match kind {
        Kind::Entity => format!("{} CHAR(36) NOT NULL PRIMARY KEY", quote(PARENT)),
        Kind::Optional => format!("{} CHAR(36) NULL UNIQUE", quote(PARENT)),
        Kind::Collection => format!(
            "{} CHAR(36) NOT NULL PRIMARY KEY,\n  {} CHAR(36) NOT NULL",
            quote(REFERENCE),
            quote(PARENT)
        ),
    };
    let on_delete = match kind {
        Kind::Optional => "SET NULL",
        Kind::Entity | Kind::Collection => "CASCADE",
    };

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {keys}",
        quote(&child_table(definition, component))
    );
    for property in &component.properties {
        column(&mut sql, property);
    }
    let _ = write!(
        sql,
        ",\n  FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {on_delete}\n)",
        quote(PARENT),
        quote(definition.name()),
        quote(&id.name)
    );
    Ok(sql)
}

/// Renders the `CREATE TABLE` statements of an aggregate, parent first.
///
/// Properties whose type has no column mapping get a `LONGTEXT` column
/// preceded by a comment asking for a better type.
///
/// # Errors
///
/// Fails with [`stowage_core::CoreError::MissingIdentity`] if the aggregate
/// has no identity.
pub fn ddl(definition: &Definition) -> CoreResult<Vec<String>> {
    let mut statements = vec![root(definition)?];
    for entity in definition.entities() {
        statements.push(child(definition, entity, &Kind::Entity)?);
    }
    for optional in definition.optionals() {
        statements.push(child(definition, optional, &Kind::Optional)?);
    }
    for collection in definition.collections() {
        statements.push(child(definition, collection, &Kind::Collection)?);
    }
    Ok(statements)
}
