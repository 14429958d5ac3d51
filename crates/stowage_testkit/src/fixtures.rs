//! Fixture aggregates.
//!
//! [`User`] exercises every field shape: root properties of each kind, an
//! entity, an optional and a collection. [`Purchase`] refers to users by id
//! for cross-aggregate queries.

use stowage_core::definition::{Aggregate, Component, ComponentSchema, Fields, Schema};
use stowage_core::{CoreResult, Id};

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Can sign in.
    Active,
    /// Locked out.
    Suspended,
}

stowage_core::enum_scalar!(Status { Active, Suspended });

/// Postal address, always present.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    /// City.
    pub city: String,
    /// Street and number.
    pub street: String,
}

impl Component for Address {
    fn describe(schema: &mut ComponentSchema<Self>) {
        schema
            .property("city", |a| &a.city)
            .property("street", |a| &a.street);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            city: fields.take("city")?,
            street: fields.take("street")?,
        })
    }
}

/// Phone number, optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Phone {
    /// Number in international format.
    pub number: String,
    /// Whether the number was confirmed.
    pub verified: bool,
}

impl Component for Phone {
    fn describe(schema: &mut ComponentSchema<Self>) {
        schema
            .property("number", |p| &p.number)
            .property("verified", |p| &p.verified);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            number: fields.take("number")?,
            verified: fields.take("verified")?,
        })
    }
}

/// A weighted label, kept in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Label.
    pub label: String,
    /// Weight.
    pub weight: i64,
}

impl Tag {
    /// Creates a tag.
    pub fn new(label: &str, weight: i64) -> Self {
        Self {
            label: label.into(),
            weight,
        }
    }
}

impl Component for Tag {
    fn describe(schema: &mut ComponentSchema<Self>) {
        schema
            .property("label", |t| &t.label)
            .property("weight", |t| &t.weight);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            label: fields.take("label")?,
            weight: fields.take("weight")?,
        })
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Identity.
    pub id: Id<User>,
    /// Display name.
    pub name: String,
    /// Age, if known.
    pub age: Option<i64>,
    /// Reputation score.
    pub score: f64,
    /// Status.
    pub status: Status,
    /// Address.
    pub address: Address,
    /// Phone.
    pub phone: Option<Phone>,
    /// Tags.
    pub tags: Vec<Tag>,
    /// Not persisted.
    pub session: Option<String>,
}

impl User {
    /// A user with every field set except the phone.
    pub fn sample() -> Self {
        Self {
            id: Id::new(),
            name: "alice".into(),
            age: Some(30),
            score: 4.5,
            status: Status::Active,
            address: Address {
                city: "Oslo".into(),
                street: "Karl Johans gate 1".into(),
            },
            phone: None,
            tags: vec![Tag::new("admin", 10), Tag::new("beta", 1)],
            session: None,
        }
    }

    /// A sample user with another name and age.
    pub fn named(name: &str, age: Option<i64>) -> Self {
        Self {
            name: name.into(),
            age,
            ..Self::sample()
        }
    }

    /// Sets the phone.
    #[must_use]
    pub fn with_phone(mut self, number: &str) -> Self {
        self.phone = Some(Phone {
            number: number.into(),
            verified: false,
        });
        self
    }

    /// Sets the city.
    #[must_use]
    pub fn in_city(mut self, city: &str) -> Self {
        self.address.city = city.into();
        self
    }
}

impl Aggregate for User {
    const NAME: &'static str = "user";

    fn describe(schema: &mut Schema<Self>) {
        schema
            .id("id", |u| &u.id)
            .property("name", |u| &u.name)
            .property("age", |u| &u.age)
            .property("score", |u| &u.score)
            .property("status", |u| &u.status)
            .entity("address", |u| &u.address)
            .optional("phone", |u| &u.phone)
            .collection("tags", |u| &u.tags)
            .property("session", |u| &u.session)
            .exclude("session");
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            id: fields.id()?,
            name: fields.take("name")?,
            age: fields.take("age")?,
            score: fields.take("score")?,
            status: fields.take("status")?,
            address: fields.entity("address")?,
            phone: fields.optional("phone")?,
            tags: fields.collection("tags")?,
            session: fields.maybe_take("session")?.flatten(),
        })
    }
}

/// A purchase made by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    /// Identity.
    pub id: Id<Purchase>,
    /// The user who bought.
    pub buyer: Id<User>,
    /// Amount in cents.
    pub amount: i64,
}

impl Purchase {
    /// Creates a purchase.
    pub fn new(buyer: Id<User>, amount: i64) -> Self {
        Self {
            id: Id::new(),
            buyer,
            amount,
        }
    }
}

impl Aggregate for Purchase {
    const NAME: &'static str = "purchase";

    fn describe(schema: &mut Schema<Self>) {
        schema
            .id("id", |p| &p.id)
            .id("buyer", |p| &p.buyer)
            .property("amount", |p| &p.amount);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            id: fields.id()?,
            buyer: fields.take("buyer")?,
            amount: fields.take("amount")?,
        })
    }
}
