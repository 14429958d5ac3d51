//! Evaluating specifications against raw aggregates.
//!
//! Used by adapters without a query language of their own.

use std::cmp::Ordering;

use super::check::{check_comparator, validate, validate_sort};
use super::{Direction, Operand, Operator, Sign, Sort, Specification};
use crate::definition::{Definition, Scope};
use crate::error::CoreResult;
use crate::raw::{Aggregate, Property};
use crate::value::Value;

/// A compiled specification.
pub type Predicate = Box<dyn Fn(&Aggregate) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
enum Matcher {
    Compare {
        property: String,
        sign: Sign,
        values: Vec<Value>,
    },
    Composite(Box<Matcher>, Operator, Box<Matcher>),
    Not(Box<Matcher>),
    Entity(String, Box<Matcher>),
    Just(String, Box<Matcher>),
    Has(String),
    Child(String, Box<Matcher>),
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Root(&'a Aggregate),
    Properties(&'a [Property]),
}

impl Target<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        match self {
            Self::Root(aggregate) => aggregate.property(name),
            Self::Properties(properties) => properties
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.value.clone()),
        }
    }
}

impl Matcher {
    fn build(spec: &Specification, def: &Definition, scope: Scope<'_>) -> CoreResult<Self> {
        Ok(match spec {
            Specification::Comparator(comparator) => {
                check_comparator(comparator, def, scope)?;
                let values = match &comparator.value {
                    Operand::Value(value) => vec![value.clone()],
                    Operand::List(values) => values.clone(),
                    Operand::Matching(query) => query.execute()?,
                };
                Self::Compare {
                    property: comparator.property.clone(),
                    sign: comparator.sign,
                    values,
                }
            }
            Specification::Composite {
                left,
                operator,
                right,
            } => Self::Composite(
                Box::new(Self::build(left, def, scope)?),
                *operator,
                Box::new(Self::build(right, def, scope)?),
            ),
            Specification::Not(inner) => Self::Not(Box::new(Self::build(inner, def, scope)?)),
            Specification::Entity { name, inner } => Self::Entity(
                name.clone(),
                Box::new(Self::build(inner, def, Scope::Entity(name))?),
            ),
            Specification::Just { optional, inner } => Self::Just(
                optional.clone(),
                Box::new(Self::build(inner, def, Scope::Optional(optional))?),
            ),
            Specification::Has { optional } => Self::Has(optional.clone()),
            Specification::Child { collection, inner } => Self::Child(
                collection.clone(),
                Box::new(Self::build(inner, def, Scope::Collection(collection))?),
            ),
        })
    }

    fn matches(&self, aggregate: &Aggregate, target: Target<'_>) -> bool {
        match self {
            Self::Compare {
                property,
                sign,
                values,
            } => test(*sign, values, target.get(property).as_ref()),
            Self::Composite(left, Operator::And, right) => {
                left.matches(aggregate, target) && right.matches(aggregate, target)
            }
            Self::Composite(left, Operator::Or, right) => {
                left.matches(aggregate, target) || right.matches(aggregate, target)
            }
            Self::Not(inner) => !inner.matches(aggregate, target),
            Self::Entity(name, inner) => aggregate
                .entity(name)
                .is_some_and(|e| inner.matches(aggregate, Target::Properties(&e.properties))),
            Self::Just(name, inner) => aggregate
                .optional(name)
                .and_then(|o| o.presence.properties())
                .is_some_and(|p| inner.matches(aggregate, Target::Properties(p))),
            Self::Has(name) => aggregate
                .optional(name)
                .is_some_and(|o| o.presence.is_present()),
            Self::Child(name, inner) => aggregate.collection(name).is_some_and(|c| {
                c.elements
                    .iter()
                    .any(|e| inner.matches(aggregate, Target::Properties(&e.properties)))
            }),
        }
    }
}

fn equal(actual: &Value, expected: &Value) -> bool {
    actual == expected || actual.compare(expected) == Some(Ordering::Equal)
}

fn test(sign: Sign, values: &[Value], actual: Option<&Value>) -> bool {
    let actual = actual.filter(|v| !v.is_null());
    let Some(actual) = actual else {
        return sign == Sign::IsNull;
    };
    let expected = values.first();
    let text = |f: fn(&str, &str) -> bool| match (actual.as_text(), expected.and_then(Value::as_text)) {
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    };
    let order = || expected.and_then(|e| actual.compare(e));

    match sign {
        Sign::IsNull => false,
        Sign::IsNotNull => true,
        Sign::Equals => expected.is_some_and(|e| equal(actual, e)),
        Sign::NotEquals => expected.is_some_and(|e| !equal(actual, e)),
        Sign::LessThan => order() == Some(Ordering::Less),
        Sign::GreaterThan => order() == Some(Ordering::Greater),
        Sign::LessThanOrEqual => matches!(order(), Some(Ordering::Less | Ordering::Equal)),
        Sign::GreaterThanOrEqual => matches!(order(), Some(Ordering::Greater | Ordering::Equal)),
        Sign::StartsWith => text(|a, e| a.starts_with(e)),
        Sign::EndsWith => text(|a, e| a.ends_with(e)),
        Sign::Contains => text(|a, e| a.contains(e)),
        Sign::In => values.iter().any(|e| equal(actual, e)),
    }
}

/// Compiles a specification into a predicate.
///
/// A null or missing property satisfies only is-null; every other
/// comparator is false for it, and so is its negation's complement.
pub fn compile(specification: &Specification, definition: &Definition) -> CoreResult<Predicate> {
    validate(specification, definition)?;
    let matcher = Matcher::build(specification, definition, Scope::Root)?;
    Ok(Box::new(move |aggregate| {
        matcher.matches(aggregate, Target::Root(aggregate))
    }))
}

fn sort_value(aggregate: &Aggregate, scope: Scope<'_>, property: &str) -> Option<Value> {
    let value = match scope {
        Scope::Entity(name) => aggregate.entity(name).and_then(|e| e.get(property).cloned()),
        _ => aggregate.property(property),
    };
    value.filter(|v| !v.is_null())
}

/// Sorts aggregates in place. Nulls sort first when ascending.
pub fn sort(aggregates: &mut [Aggregate], sort: &Sort, definition: &Definition) -> CoreResult<()> {
    let (scope, property) = validate_sort(sort, definition)?;
    let name = property.name.clone();
    aggregates.sort_by(|a, b| {
        let ordering = match (sort_value(a, scope, &name), sort_value(b, scope, &name)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
        };
        match sort.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
    Ok(())
}

/// Filters, sorts and pages `aggregates` the way a fetch asks for.
pub fn select(
    aggregates: impl IntoIterator<Item = Aggregate>,
    specification: Option<&Specification>,
    order: Option<&Sort>,
    drop: Option<usize>,
    take: Option<usize>,
    definition: &Definition,
) -> CoreResult<Vec<Aggregate>> {
    let predicate = specification
        .map(|s| compile(s, definition))
        .transpose()?;
    let mut selected: Vec<Aggregate> = aggregates
        .into_iter()
        .filter(|a| predicate.as_ref().map_or(true, |p| p(a)))
        .collect();
    if let Some(order) = order {
        sort(&mut selected, order, definition)?;
    }
    Ok(selected
        .into_iter()
        .skip(drop.unwrap_or(0))
        .take(take.unwrap_or(usize::MAX))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Mapping;
    use crate::fixtures::{Article, Comment, Cover};
    use crate::normalize::References;
    use crate::specification::Property;
    use crate::types::Registry;

    struct Fixture {
        mapping: Mapping<Article>,
        refs: References,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                mapping: Mapping::resolve(&Registry::new()).unwrap(),
                refs: References::default(),
            }
        }

        fn raw(&self, article: &Article) -> Aggregate {
            self.mapping.normalize(article, &self.refs).unwrap()
        }

        fn check(&self, spec: &Specification, article: &Article) -> bool {
            let predicate = compile(spec, self.mapping.definition()).unwrap();
            predicate(&self.raw(article))
        }
    }

    #[test]
    fn comparators() {
        let f = Fixture::new();
        let article = Article::titled("Hello world", Some(4));

        assert!(f.check(&Property::of("title").equals("Hello world"), &article));
        assert!(f.check(&Property::of("title").starts_with("Hell"), &article));
        assert!(f.check(&Property::of("title").ends_with("world"), &article));
        assert!(f.check(&Property::of("title").contains("o w"), &article));
        assert!(f.check(&Property::of("rating").greater_than(3), &article));
        assert!(f.check(&Property::of("rating").less_than_or_equal(4), &article));
        assert!(!f.check(&Property::of("rating").less_than(4), &article));
        assert!(f.check(&Property::of("rating").in_list([1i64, 4]), &article));
        assert!(f.check(&Property::of("id").equals(article.id), &article));
    }

    #[test]
    fn null_satisfies_only_is_null() {
        let f = Fixture::new();
        let article = Article::titled("x", None);

        assert!(f.check(&Property::of("rating").is_null(), &article));
        assert!(!f.check(&Property::of("rating").is_not_null(), &article));
        assert!(!f.check(&Property::of("rating").equals(1), &article));
        assert!(!f.check(&Property::of("rating").not_equals(1), &article));
        assert!(f.check(&!Property::of("rating").equals(1), &article));
    }

    #[test]
    fn scoped_specifications() {
        let f = Fixture::new();
        let mut article = Article::sample();

        let has_cover = Specification::has("cover");
        let cover_is = Specification::just("cover", Property::of("url").contains("img"));
        assert!(!f.check(&has_cover, &article));
        assert!(!f.check(&cover_is, &article));

        article.cover = Some(Cover {
            url: "http://img/1".into(),
        });
        assert!(f.check(&has_cover, &article));
        assert!(f.check(&cover_is, &article));

        assert!(f.check(
            &Specification::entity("meta", Property::of("language").equals("en")),
            &article
        ));
        assert!(f.check(
            &Specification::child("comments", Property::of("votes").greater_than(2)),
            &article
        ));
        article.comments = vec![Comment {
            body: "meh".into(),
            votes: 0,
        }];
        assert!(!f.check(
            &Specification::child("comments", Property::of("votes").greater_than(2)),
            &article
        ));
    }

    #[test]
    fn select_sorts_and_pages() {
        let f = Fixture::new();
        let raws: Vec<_> = [("b", Some(2)), ("a", None), ("c", Some(1)), ("d", Some(3))]
            .iter()
            .map(|(t, r)| f.raw(&Article::titled(t, *r)))
            .collect();

        let sorted = select(
            raws.clone(),
            None,
            Some(&Sort::ascending("rating")),
            None,
            None,
            f.mapping.definition(),
        )
        .unwrap();
        let titles: Vec<_> = sorted
            .iter()
            .map(|a| a.property("title").unwrap())
            .collect();
        assert_eq!(titles, vec!["a".into(), "c".into(), "b".into(), "d".into()]);

        let page = select(
            raws,
            Some(&Property::of("rating").is_not_null()),
            Some(&Sort::descending("title")),
            Some(1),
            Some(1),
            f.mapping.definition(),
        )
        .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].property("title"), Some(Value::Text("c".into())));
    }

    #[test]
    fn sort_by_entity_property() {
        let f = Fixture::new();
        let mut a = Article::sample();
        a.meta.words = 5;
        let mut b = Article::sample();
        b.meta.words = 1;
        let mut raws = vec![f.raw(&a), f.raw(&b)];

        sort(&mut raws, &Sort::ascending("meta.words"), f.mapping.definition()).unwrap();
        assert_eq!(raws[0].id.value, b.id.to_uuid());
    }
}
