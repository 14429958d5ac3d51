//! Compiles specifications into SQL `WHERE` clauses.
//!
//! Entities and optionals are read through `LEFT JOIN`s on their tables, so
//! their columns are qualified with the child table name. Collections are
//! matched with a correlated `EXISTS` over the collection table.

use stowage_core::definition::{Definition, Scope};
use stowage_core::specification::{validate, Comparator, Operand, Operator, Sign, Specification};
use stowage_core::{CoreError, CoreResult, Value};

use crate::schema::{child_table, quote, PARENT};

const ELEMENT: &str = "element";

/// A compiled SQL fragment with its parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub parameters: Vec<Value>,
}

/// Compiles a specification into a boolean SQL expression over the
/// aggregate table and its joined entity and optional tables.
///
/// Sub-queries must have been resolved into id lists beforehand.
///
/// # Errors
///
/// Fails like [`validate`] for specifications that don't fit the
/// aggregate, and with [`CoreError::UnsupportedSpecification`] for an
/// unresolved sub-query.
pub fn compile(specification: &Specification, definition: &Definition) -> CoreResult<Clause> {
    validate(specification, definition)?;
    let mut compiler = Compiler {
        definition,
        parameters: Vec::new(),
    };
    let sql = compiler.node(specification, Scope::Root)?;
    Ok(Clause {
        sql,
        parameters: compiler.parameters,
    })
}

/// Escapes `%`, `_` and the escape character itself for a `LIKE` pattern
/// with `ESCAPE '\'`.
pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

struct Compiler<'d> {
    definition: &'d Definition,
    parameters: Vec<Value>,
}

impl Compiler<'_> {
    fn qualifier(&self, scope: Scope<'_>) -> CoreResult<String> {
        Ok(match scope {
            Scope::Root => quote(self.definition.name()),
            Scope::Collection(_) => quote(ELEMENT),
            Scope::Entity(_) | Scope::Optional(_) => match self.definition.component(scope)? {
                Some(component) => quote(&child_table(self.definition, component)),
                None => quote(self.definition.name()),
            },
        })
    }

    fn node(&mut self, spec: &Specification, scope: Scope<'_>) -> CoreResult<String> {
        match spec {
            Specification::Comparator(comparator) => self.comparator(comparator, scope),
            Specification::Composite {
                left,
                operator,
                right,
            } => {
                let left = self.node(left, scope)?;
                let right = self.node(right, scope)?;
                let op = match operator {
                    Operator::And => "AND",
                    Operator::Or => "OR",
                };
                Ok(format!("({left} {op} {right})"))
            }
            // A comparison against NULL yields NULL, which counts as false here.
            Specification::Not(inner) => {
                let inner = self.node(inner, scope)?;
                Ok(format!("NOT COALESCE(({inner}), 0)"))
            }
            Specification::Entity { name, inner } => self.node(inner, Scope::Entity(name)),
            Specification::Just { optional, inner } => {
                let present = self.present(optional)?;
                let inner = self.node(inner, Scope::Optional(optional))?;
                Ok(format!("({present} AND {inner})"))
            }
            Specification::Has { optional } => self.present(optional),
            Specification::Child { collection, inner } => {
                let table = match self.definition.component(Scope::Collection(collection))? {
                    Some(component) => child_table(self.definition, component),
                    None => return Err(CoreError::unknown_property(self.definition.name(), collection)),
                };
                let id = self.definition.id()?;
                let inner = self.node(inner, Scope::Collection(collection))?;
                Ok(format!(
                    "EXISTS (SELECT 1 FROM {} AS {} WHERE {}.{} = {}.{} AND {inner})",
                    quote(&table),
                    quote(ELEMENT),
                    quote(ELEMENT),
                    quote(PARENT),
                    quote(self.definition.name()),
                    quote(&id.name),
                ))
            }
        }
    }

    fn present(&self, optional: &str) -> CoreResult<String> {
        let qualifier = self.qualifier(Scope::Optional(optional))?;
        Ok(format!("{qualifier}.{} IS NOT NULL", quote(PARENT)))
    }

    fn bind(&mut self, value: Value) -> &'static str {
        self.parameters.push(value);
        "?"
    }

    fn comparator(&mut self, comparator: &Comparator, scope: Scope<'_>) -> CoreResult<String> {
        let column = format!(
            "{}.{}",
            self.qualifier(scope)?,
            quote(&comparator.property)
        );
        let sign = comparator.sign;

        let sql = match (sign, &comparator.value) {
            (Sign::IsNull, _) => format!("{column} IS NULL"),
            (Sign::IsNotNull, _) => format!("{column} IS NOT NULL"),
            (Sign::In, Operand::List(values)) if values.is_empty() => "1 = 0".to_string(),
            (Sign::In, Operand::List(values)) => {
                let placeholders: Vec<&str> =
                    values.iter().map(|v| self.bind(v.clone())).collect();
                format!("{column} IN ({})", placeholders.join(", "))
            }
            (_, Operand::Matching(query)) => {
                return Err(CoreError::unsupported(
                    "comparator",
                    format!("sub-query over {} wasn't resolved", query.model()),
                ))
            }
            (_, Operand::Value(Value::Text(text))) if sign.is_pattern() => {
                let text = escape_like(text);
                let pattern = match sign {
                    Sign::StartsWith => format!("{text}%"),
                    Sign::EndsWith => format!("%{text}"),
                    _ => format!("%{text}%"),
                };
                let placeholder = self.bind(Value::Text(pattern));
                format!("{column} LIKE {placeholder} ESCAPE '\\'")
            }
            (_, Operand::Value(value)) => {
                let op = match sign {
                    Sign::Equals => "=",
                    Sign::NotEquals => "<>",
                    Sign::LessThan => "<",
                    Sign::GreaterThan => ">",
                    Sign::LessThanOrEqual => "<=",
                    Sign::GreaterThanOrEqual => ">=",
                    other => {
                        return Err(CoreError::unsupported(
                            "comparator",
                            format!("{other} doesn't take a single value"),
                        ))
                    }
                };
                let placeholder = self.bind(value.clone());
                format!("{column} {op} {placeholder}")
            }
            (other, Operand::List(_)) => {
                return Err(CoreError::unsupported(
                    "comparator",
                    format!("{other} doesn't take a list operand"),
                ))
            }
        };
        Ok(sql)
    }
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
    fn compiles_comparators() {
        let clause = compile(&Property::of("name").equals("alice"), &user()).unwrap();
        assert_eq!(clause.sql, "`user`.`name` = ?");
        assert_eq!(clause.parameters, vec![Value::from("alice")]);

        let clause = compile(&Property::of("age").is_null(), &user()).unwrap();
        assert_eq!(clause.sql, "`user`.`age` IS NULL");
        assert!(clause.parameters.is_empty());
    }

    #[test]
    fn escapes_patterns() {
        let clause = compile(&Property::of("name").starts_with("50%_"), &user()).unwrap();
        assert_eq!(clause.sql, "`user`.`name` LIKE ? ESCAPE '\\'");
        assert_eq!(clause.parameters, vec![Value::from("50\\%\\_%")]);

        let clause = compile(&Property::of("name").contains("x"), &user()).unwrap();
        assert_eq!(clause.parameters, vec![Value::from("%x%")]);
    }

    #[test]
    fn compiles_lists() {
        let clause = compile(&Property::of("age").in_list([1_i64, 2]), &user()).unwrap();
        assert_eq!(clause.sql, "`user`.`age` IN (?, ?)");
        assert_eq!(clause.parameters, vec![Value::Integer(1), Value::Integer(2)]);

        let empty: [i64; 0] = [];
        let clause = compile(&Property::of("age").in_list(empty), &user()).unwrap();
        assert_eq!(clause.sql, "1 = 0");
    }

    #[test]
    fn negation_treats_null_as_false() {
        let spec = !Property::of("age").equals(3_i64);
        let clause = compile(&spec, &user()).unwrap();
        assert_eq!(clause.sql, "NOT COALESCE((`user`.`age` = ?), 0)");
    }

    #[test]
    fn scopes_use_child_tables() {
        let spec = Specification::entity("address", Property::of("city").equals("Oslo"))
            .and(Specification::just("phone", Property::of("number").starts_with("+47")))
            .or(Specification::has("phone"));
        let clause = compile(&spec, &user()).unwrap();
        assert_eq!(
            clause.sql,
            "((`user_address`.`city` = ? AND (`user_phone`.`aggregate_id` IS NOT NULL AND \
             `user_phone`.`number` LIKE ? ESCAPE '\\')) OR `user_phone`.`aggregate_id` IS NOT NULL)"
        );
    }

    #[test]
    fn collections_use_correlated_exists() {
        let spec = Specification::child("tags", Property::of("label").equals("admin"));
        let clause = compile(&spec, &user()).unwrap();
        assert_eq!(
            clause.sql,
            "EXISTS (SELECT 1 FROM `user_tags` AS `element` WHERE `element`.`aggregate_id` = \
             `user`.`id` AND `element`.`label` = ?)"
        );
    }

    #[test]
    fn rejects_what_validation_rejects() {
        let err = compile(&Property::of("nope").equals(1_i64), &user()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));
    }
}
