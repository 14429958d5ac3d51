//! Domain types used by the unit tests.

use crate::definition::{Aggregate, Component, ComponentSchema, Fields, Schema};
use crate::error::CoreResult;
use crate::id::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Draft,
    Published,
}

crate::enum_scalar!(State { Draft, Published });

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub words: i64,
    pub language: String,
}

impl Component for Meta {
    fn describe(schema: &mut ComponentSchema<Self>) {
        schema
            .property("words", |m| &m.words)
            .property("language", |m| &m.language);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            words: fields.take("words")?,
            language: fields.take("language")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cover {
    pub url: String,
}

impl Component for Cover {
    fn describe(schema: &mut ComponentSchema<Self>) {
        schema.property("url", |c| &c.url);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            url: fields.take("url")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub body: String,
    pub votes: i64,
}

impl Component for Comment {
    fn describe(schema: &mut ComponentSchema<Self>) {
        schema
            .property("body", |c| &c.body)
            .property("votes", |c| &c.votes);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            body: fields.take("body")?,
            votes: fields.take("votes")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: Id<Article>,
    pub title: String,
    pub rating: Option<i64>,
    pub state: State,
    pub author: Id<Author>,
    pub meta: Meta,
    pub cover: Option<Cover>,
    pub comments: Vec<Comment>,
    pub draft_notes: String,
}

impl Article {
    pub fn sample() -> Self {
        Self {
            id: Id::new(),
            title: "Hello".into(),
            rating: None,
            state: State::Published,
            author: Id::new(),
            meta: Meta {
                words: 120,
                language: "en".into(),
            },
            cover: None,
            comments: vec![
                Comment {
                    body: "first".into(),
                    votes: 3,
                },
                Comment {
                    body: "second".into(),
                    votes: 1,
                },
            ],
            draft_notes: String::new(),
        }
    }

    pub fn titled(title: &str, rating: Option<i64>) -> Self {
        Self {
            title: title.into(),
            rating,
            ..Self::sample()
        }
    }
}

impl Aggregate for Article {
    const NAME: &'static str = "article";

    fn describe(schema: &mut Schema<Self>) {
        schema
            .id("id", |a| &a.id)
            .property("title", |a| &a.title)
            .property("rating", |a| &a.rating)
            .property("state", |a| &a.state)
            .id("author", |a| &a.author)
            .entity("meta", |a| &a.meta)
            .optional("cover", |a| &a.cover)
            .collection("comments", |a| &a.comments)
            .property("draft_notes", |a| &a.draft_notes)
            .exclude("draft_notes");
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            id: fields.id()?,
            title: fields.take("title")?,
            rating: fields.take("rating")?,
            state: fields.take("state")?,
            author: fields.take("author")?,
            meta: fields.entity("meta")?,
            cover: fields.optional("cover")?,
            comments: fields.collection("comments")?,
            draft_notes: fields.maybe_take("draft_notes")?.unwrap_or_default(),
        })
    }
}

/// Declares no identity of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub name: String,
}

impl Aggregate for Author {
    const NAME: &'static str = "author";

    fn describe(schema: &mut Schema<Self>) {
        schema.property("name", |a| &a.name);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            name: fields.take("name")?,
        })
    }
}

pub struct Twin {
    a: Id<Twin>,
    b: Id<Twin>,
}

impl Aggregate for Twin {
    const NAME: &'static str = "twin";

    fn describe(schema: &mut Schema<Self>) {
        schema.id("a", |t| &t.a).id("b", |t| &t.b);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        let a = fields.id()?;
        Ok(Self { a, b: a })
    }
}

pub struct Broken {
    id: Id<Broken>,
    name: String,
}

impl Aggregate for Broken {
    const NAME: &'static str = "broken";

    fn describe(schema: &mut Schema<Self>) {
        schema
            .id("id", |b| &b.id)
            .property("name", |b| &b.name)
            .property("name", |b| &b.name);
    }

    fn assemble(mut fields: Fields) -> CoreResult<Self> {
        Ok(Self {
            id: fields.id()?,
            name: fields.take("name")?,
        })
    }
}
