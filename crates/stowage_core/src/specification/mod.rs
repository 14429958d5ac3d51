//! Specifications: backend-neutral predicates over aggregates.
//!
//! A [`Specification`] is a tree of comparators combined with boolean
//! operators, optionally scoped into an entity, optional or collection.
//! Backends translate the tree into their own query language; the
//! [`memory`] compiler evaluates it against raw aggregates directly.
//!
//! ```
//! use stowage_core::specification::{Property, Specification};
//!
//! let adults_in_oslo = Property::of("age")
//!     .greater_than_or_equal(18)
//!     .and(Specification::entity("address", Property::of("city").equals("Oslo")));
//! ```

mod check;
pub mod memory;

pub use check::{resolve_sub_queries, validate, validate_sort};

use std::fmt;
use std::ops::Not;
use std::sync::Arc;

use crate::context::ContextToken;
use crate::error::CoreResult;
use crate::value::Value;

/// Comparison performed by a [`Comparator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessThanOrEqual,
    /// `>=`
    GreaterThanOrEqual,
    /// Value is null.
    IsNull,
    /// Value is not null.
    IsNotNull,
    /// Text starts with.
    StartsWith,
    /// Text ends with.
    EndsWith,
    /// Text contains.
    Contains,
    /// Value is one of a list.
    In,
}

impl Sign {
    /// Name of the sign, for errors and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not-equals",
            Self::LessThan => "less-than",
            Self::GreaterThan => "greater-than",
            Self::LessThanOrEqual => "less-than-or-equal",
            Self::GreaterThanOrEqual => "greater-than-or-equal",
            Self::IsNull => "is-null",
            Self::IsNotNull => "is-not-null",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
            Self::Contains => "contains",
            Self::In => "in",
        }
    }

    /// Whether the sign matches text patterns.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::StartsWith | Self::EndsWith | Self::Contains)
    }

    /// Whether the sign orders values.
    #[must_use]
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::GreaterThan | Self::LessThanOrEqual | Self::GreaterThanOrEqual
        )
    }

    /// Whether the sign takes no operand.
    #[must_use]
    pub fn is_nullity(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Boolean operator of a [`Specification::Composite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Both sides hold.
    And,
    /// Either side holds.
    Or,
}

/// Ids selected by another repository's query, resolved just before the
/// specification runs.
#[derive(Clone)]
pub struct SubQuery {
    token: ContextToken,
    model: &'static str,
    ids: Arc<dyn Fn() -> CoreResult<Vec<Value>> + Send + Sync>,
}

impl SubQuery {
    pub(crate) fn new(
        token: ContextToken,
        model: &'static str,
        ids: impl Fn() -> CoreResult<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            token,
            model,
            ids: Arc::new(ids),
        }
    }

    /// Aggregate the sub-query selects.
    #[must_use]
    pub fn model(&self) -> &'static str {
        self.model
    }

    /// Token of the manager the sub-query was built by.
    #[must_use]
    pub fn token(&self) -> &ContextToken {
        &self.token
    }

    /// Runs the sub-query and returns the selected ids as text values.
    pub fn execute(&self) -> CoreResult<Vec<Value>> {
        (self.ids)()
    }
}

impl fmt::Debug for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubQuery")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Right-hand side of a comparator.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A single value.
    Value(Value),
    /// A list of values, for [`Sign::In`].
    List(Vec<Value>),
    /// Ids selected by a sub-query, for [`Sign::In`].
    Matching(SubQuery),
}

/// A single comparison against a property.
#[derive(Debug, Clone)]
pub struct Comparator {
    /// Property name within the current scope.
    pub property: String,
    /// The comparison.
    pub sign: Sign,
    /// Right-hand side.
    pub value: Operand,
}

/// A predicate over aggregates.
#[derive(Debug, Clone)]
pub enum Specification {
    /// Compares a property.
    Comparator(Comparator),
    /// Combines two specifications.
    Composite {
        /// Left-hand side.
        left: Box<Specification>,
        /// Operator.
        operator: Operator,
        /// Right-hand side.
        right: Box<Specification>,
    },
    /// Negates a specification.
    Not(Box<Specification>),
    /// Evaluates `inner` against an entity's properties.
    Entity {
        /// Entity name.
        name: String,
        /// Specification over the entity.
        inner: Box<Specification>,
    },
    /// Holds when the optional is present and `inner` matches it.
    Just {
        /// Optional name.
        optional: String,
        /// Specification over the optional.
        inner: Box<Specification>,
    },
    /// Holds when the optional is present.
    Has {
        /// Optional name.
        optional: String,
    },
    /// Holds when at least one element of the collection matches.
    Child {
        /// Collection name.
        collection: String,
        /// Specification over an element.
        inner: Box<Specification>,
    },
}

impl Specification {
    /// Scopes `inner` into an entity.
    pub fn entity(name: impl Into<String>, inner: impl Into<Specification>) -> Self {
        Self::Entity {
            name: name.into(),
            inner: Box::new(inner.into()),
        }
    }

    /// Scopes `inner` into an optional that must be present.
    pub fn just(optional: impl Into<String>, inner: impl Into<Specification>) -> Self {
        Self::Just {
            optional: optional.into(),
            inner: Box::new(inner.into()),
        }
    }

    /// Tests that an optional is present.
    pub fn has(optional: impl Into<String>) -> Self {
        Self::Has {
            optional: optional.into(),
        }
    }

    /// Tests that some element of a collection matches `inner`.
    pub fn child(collection: impl Into<String>, inner: impl Into<Specification>) -> Self {
        Self::Child {
            collection: collection.into(),
            inner: Box::new(inner.into()),
        }
    }

    /// Both `self` and `other` hold.
    #[must_use]
    pub fn and(self, other: impl Into<Specification>) -> Self {
        Self::Composite {
            left: Box::new(self),
            operator: Operator::And,
            right: Box::new(other.into()),
        }
    }

    /// Either `self` or `other` holds.
    #[must_use]
    pub fn or(self, other: impl Into<Specification>) -> Self {
        Self::Composite {
            left: Box::new(self),
            operator: Operator::Or,
            right: Box::new(other.into()),
        }
    }

    /// Name of the node kind, for errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Comparator(_) => "comparator",
            Self::Composite { .. } => "composite",
            Self::Not(_) => "not",
            Self::Entity { .. } => "entity",
            Self::Just { .. } => "just",
            Self::Has { .. } => "has",
            Self::Child { .. } => "child",
        }
    }
}

impl Not for Specification {
    type Output = Specification;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl From<Comparator> for Specification {
    fn from(comparator: Comparator) -> Self {
        Self::Comparator(comparator)
    }
}

/// Entry point for building comparators.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
}

impl Property {
    /// Starts a comparator on the property called `name`.
    pub fn of(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn compare(self, sign: Sign, value: Operand) -> Specification {
        Specification::Comparator(Comparator {
            property: self.name,
            sign,
            value,
        })
    }

    /// Equal to `value`.
    pub fn equals(self, value: impl Into<Value>) -> Specification {
        self.compare(Sign::Equals, Operand::Value(value.into()))
    }

    /// Not equal to `value`.
    pub fn not_equals(self, value: impl Into<Value>) -> Specification {
        self.compare(Sign::NotEquals, Operand::Value(value.into()))
    }

    /// Less than `value`.
    pub fn less_than(self, value: impl Into<Value>) -> Specification {
        self.compare(Sign::LessThan, Operand::Value(value.into()))
    }

    /// Greater than `value`.
    pub fn greater_than(self, value: impl Into<Value>) -> Specification {
        self.compare(Sign::GreaterThan, Operand::Value(value.into()))
    }

    /// Less than or equal to `value`.
    pub fn less_than_or_equal(self, value: impl Into<Value>) -> Specification {
        self.compare(Sign::LessThanOrEqual, Operand::Value(value.into()))
    }

    /// Greater than or equal to `value`.
    pub fn greater_than_or_equal(self, value: impl Into<Value>) -> Specification {
        self.compare(Sign::GreaterThanOrEqual, Operand::Value(value.into()))
    }

    /// Is null.
    pub fn is_null(self) -> Specification {
        self.compare(Sign::IsNull, Operand::Value(Value::Null))
    }

    /// Is not null.
    pub fn is_not_null(self) -> Specification {
        self.compare(Sign::IsNotNull, Operand::Value(Value::Null))
    }

    /// Text starts with `prefix`.
    pub fn starts_with(self, prefix: impl Into<String>) -> Specification {
        self.compare(Sign::StartsWith, Operand::Value(Value::Text(prefix.into())))
    }

    /// Text ends with `suffix`.
    pub fn ends_with(self, suffix: impl Into<String>) -> Specification {
        self.compare(Sign::EndsWith, Operand::Value(Value::Text(suffix.into())))
    }

    /// Text contains `needle`.
    pub fn contains(self, needle: impl Into<String>) -> Specification {
        self.compare(Sign::Contains, Operand::Value(Value::Text(needle.into())))
    }

    /// One of `values`.
    pub fn in_list<I, V>(self, values: I) -> Specification
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.compare(Sign::In, Operand::List(values))
    }

    /// One of the ids selected by `query`.
    pub fn matching(self, query: SubQuery) -> Specification {
        self.compare(Sign::In, Operand::Matching(query))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// Ordering of fetched aggregates.
///
/// The path is a root property name, or `entity.property`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Property path.
    pub path: String,
    /// Direction.
    pub direction: Direction,
}

impl Sort {
    /// Ascending by `path`.
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Ascending,
        }
    }

    /// Descending by `path`.
    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Descending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_produce_trees() {
        let spec = Property::of("name")
            .starts_with("a")
            .or(!Property::of("age").less_than(3));

        match spec {
            Specification::Composite {
                left,
                operator,
                right,
            } => {
                assert_eq!(operator, Operator::Or);
                assert_eq!(left.kind(), "comparator");
                assert_eq!(right.kind(), "not");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn in_list_collects_values() {
        let spec = Property::of("age").in_list([1i64, 2, 3]);
        match spec {
            Specification::Comparator(Comparator {
                sign: Sign::In,
                value: Operand::List(values),
                ..
            }) => assert_eq!(values.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sign_classes() {
        assert!(Sign::Contains.is_pattern());
        assert!(Sign::LessThanOrEqual.is_ordering());
        assert!(Sign::IsNull.is_nullity());
        assert!(!Sign::In.is_pattern());
        assert_eq!(Sign::NotEquals.to_string(), "not-equals");
    }
}
