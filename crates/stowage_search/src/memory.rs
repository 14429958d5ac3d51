//! An in-process document store.
//!
//! [`MemoryClient`] keeps documents in memory and evaluates the subset of
//! the query DSL the adapter emits: `match_all`, `term`, `terms`, `range`,
//! `prefix`, `wildcard`, `exists`, `bool` and `nested`. Every call is
//! recorded, so tests can check the requests the adapter sends.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value as Json};

use crate::client::{DocumentClient, Hit};
use crate::error::{SearchError, SearchResult};

/// A call made to a [`MemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `create_index`
    CreateIndex {
        /// Index name.
        index: String,
        /// Mapping body.
        mapping: Json,
    },
    /// `index`
    Index {
        /// Index name.
        index: String,
        /// Document id.
        id: String,
        /// Whole document.
        document: Json,
    },
    /// `update`
    Update {
        /// Index name.
        index: String,
        /// Document id.
        id: String,
        /// Partial document.
        partial: Json,
    },
    /// `delete`
    Delete {
        /// Index name.
        index: String,
        /// Document id.
        id: String,
    },
    /// `get`
    Get {
        /// Index name.
        index: String,
        /// Document id.
        id: String,
    },
    /// `search`
    Search {
        /// Index name.
        index: String,
        /// Request body.
        body: Json,
    },
    /// `count`
    Count {
        /// Index name.
        index: String,
        /// Request body.
        body: Json,
    },
}

#[derive(Default)]
struct State {
    indices: HashMap<String, Index>,
    requests: Vec<Request>,
}

#[derive(Default)]
struct Index {
    mapping: Json,
    documents: BTreeMap<String, Json>,
}

/// In-memory [`DocumentClient`].
///
/// Clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<State>>,
}

impl MemoryClient {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request made so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    /// Forgets the recorded requests.
    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// The mapping an index was created with.
    #[must_use]
    pub fn mapping(&self, index: &str) -> Option<Json> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|i| i.mapping.clone())
    }

    /// A stored document as is.
    #[must_use]
    pub fn document(&self, index: &str, id: &str) -> Option<Json> {
        self.state
            .lock()
            .indices
            .get(index)
            .and_then(|i| i.documents.get(id).cloned())
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryClient")
            .field("indices", &state.indices.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl DocumentClient for MemoryClient {
    fn create_index(&self, index: &str, mapping: &Json) -> SearchResult<()> {
        let mut state = self.state.lock();
        state.requests.push(Request::CreateIndex {
            index: index.into(),
            mapping: mapping.clone(),
        });
        state
            .indices
            .entry(index.to_string())
            .or_insert_with(|| Index {
                mapping: mapping.clone(),
                documents: BTreeMap::new(),
            });
        Ok(())
    }

    fn index(&self, index: &str, id: &str, document: &Json) -> SearchResult<()> {
        let mut state = self.state.lock();
        state.requests.push(Request::Index {
            index: index.into(),
            id: id.into(),
            document: document.clone(),
        });
        state
            .indices
            .entry(index.to_string())
            .or_default()
            .documents
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    fn update(&self, index: &str, id: &str, partial: &Json) -> SearchResult<()> {
        let mut state = self.state.lock();
        state.requests.push(Request::Update {
            index: index.into(),
            id: id.into(),
            partial: partial.clone(),
        });
        let document = state
            .indices
            .get_mut(index)
            .and_then(|i| i.documents.get_mut(id))
            .ok_or_else(|| SearchError::Status {
                url: format!("/{index}/_update/{id}"),
                status: 404,
                body: "document_missing_exception".into(),
            })?;
        merge(document, partial);
        Ok(())
    }

    fn delete(&self, index: &str, id: &str) -> SearchResult<bool> {
        let mut state = self.state.lock();
        state.requests.push(Request::Delete {
            index: index.into(),
            id: id.into(),
        });
        Ok(state
            .indices
            .get_mut(index)
            .and_then(|i| i.documents.remove(id))
            .is_some())
    }

    fn get(&self, index: &str, id: &str) -> SearchResult<Option<Json>> {
        let mut state = self.state.lock();
        state.requests.push(Request::Get {
            index: index.into(),
            id: id.into(),
        });
        Ok(state
            .indices
            .get(index)
            .and_then(|i| i.documents.get(id).cloned()))
    }

    fn search(&self, index: &str, body: &Json) -> SearchResult<Vec<Hit>> {
        let mut state = self.state.lock();
        state.requests.push(Request::Search {
            index: index.into(),
            body: body.clone(),
        });
        let Some(stored) = state.indices.get(index) else {
            return Ok(Vec::new());
        };

        let query = body.get("query").unwrap_or(&Json::Null);
        let keys = match body.get("sort") {
            Some(Json::Array(sorts)) => sorts.iter().map(SortKey::parse).collect::<SearchResult<Vec<_>>>()?,
            None => Vec::new(),
            Some(_) => return Err(SearchError::UnsupportedQuery(format!("sort {body}"))),
        };
        let mut hits = Vec::new();
        for (id, source) in &stored.documents {
            if matches(query, source, None)? {
                hits.push(Hit {
                    id: id.clone(),
                    source: source.clone(),
                    sort: keys.iter().map(|k| k.value(source)).collect(),
                });
            }
        }
        hits.sort_by(|a, b| compare_keys(&keys, &a.sort, &b.sort));
        if let Some(Json::Array(after)) = body.get("search_after") {
            hits.retain(|hit| compare_keys(&keys, &hit.sort, after) == Ordering::Greater);
        }

        let from = body.get("from").and_then(Json::as_u64).unwrap_or(0);
        let size = body.get("size").and_then(Json::as_u64).unwrap_or(10);
        Ok(hits
            .into_iter()
            .skip(usize::try_from(from).unwrap_or(usize::MAX))
            .take(usize::try_from(size).unwrap_or(usize::MAX))
            .collect())
    }

    fn count(&self, index: &str, body: &Json) -> SearchResult<usize> {
        let mut state = self.state.lock();
        state.requests.push(Request::Count {
            index: index.into(),
            body: body.clone(),
        });
        let Some(stored) = state.indices.get(index) else {
            return Ok(0);
        };
        let query = body.get("query").unwrap_or(&Json::Null);
        let mut count = 0;
        for source in stored.documents.values() {
            if matches(query, source, None)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Objects merge key by key, everything else replaces.
fn merge(target: &mut Json, partial: &Json) {
    match (target, partial) {
        (Json::Object(target), Json::Object(partial)) => {
            for (key, value) in partial {
                if let Some(existing) = target.get_mut(key) {
                    if existing.is_object() && value.is_object() {
                        merge(existing, value);
                        continue;
                    }
                }
                target.insert(key.clone(), value.clone());
            }
        }
        (target, partial) => *target = partial.clone(),
    }
}

/// The element a nested query is looking at.
type Nested<'a> = Option<(&'a str, &'a Json)>;

fn lookup<'a>(source: &'a Json, field: &str, nested: Nested<'a>) -> Option<&'a Json> {
    let (mut current, rest) = match nested {
        Some((path, element)) => match field.strip_prefix(path).and_then(|r| r.strip_prefix('.')) {
            Some(rest) => (element, rest),
            None => (source, field),
        },
        None => (source, field),
    };
    for segment in rest.split('.') {
        current = match current {
            Json::Object(fields) => fields.get(segment)?,
            Json::String(_) if segment == "keyword" => current,
            _ => return None,
        };
    }
    Some(current)
}

fn present(value: Option<&Json>) -> bool {
    match value {
        None | Some(Json::Null) => false,
        Some(Json::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn compare(left: &Json, right: &Json) -> Option<Ordering> {
    match (left, right) {
        (Json::Number(a), Json::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Json::String(a), Json::String(b)) => Some(a.cmp(b)),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn equal(left: &Json, right: &Json) -> bool {
    compare(left, right) == Some(Ordering::Equal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Star,
    One,
    Char(char),
}

fn tokens(pattern: &[char]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.iter().copied();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => Token::Star,
            '?' => Token::One,
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            c => Token::Char(c),
        });
    }
    tokens
}

/// Matches `*`, `?` and `\`-escaped characters.
///
/// Only the most recent `*` is ever retried, so a match takes at most
/// pattern length times text length steps.
fn wildcard(pattern: &[char], text: &[char]) -> bool {
    let tokens = tokens(pattern);
    let (mut p, mut t) = (0, 0);
    // Token after the last star, and the text position it resumes from.
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Star) => {
                p += 1;
                star = Some((p, t));
            }
            Some(Token::One) => {
                p += 1;
                t += 1;
            }
            Some(Token::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((after, from)) => {
                    p = after;
                    t = from + 1;
                    star = Some((after, t));
                }
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|token| *token == Token::Star)
}

fn single<'q>(clause: &'q Json, kind: &str) -> SearchResult<(&'q str, &'q Json)> {
    clause
        .as_object()
        .and_then(|fields| fields.iter().next())
        .map(|(field, value)| (field.as_str(), value))
        .ok_or_else(|| SearchError::UnsupportedQuery(format!("malformed {kind}: {clause}")))
}

fn operand<'q>(value: &'q Json) -> &'q Json {
    value.get("value").unwrap_or(value)
}

fn clauses<'q>(query: &'q Map<String, Json>, key: &str) -> &'q [Json] {
    query
        .get(key)
        .and_then(Json::as_array)
        .map_or(&[], Vec::as_slice)
}

fn matches(query: &Json, source: &Json, nested: Nested<'_>) -> SearchResult<bool> {
    let (kind, body) = match query {
        Json::Null => return Ok(true),
        other => single(other, "query")?,
    };
    let unsupported = || SearchError::UnsupportedQuery(format!("{kind}: {body}"));

    Ok(match kind {
        "match_all" => true,
        "term" => {
            let (field, value) = single(body, kind)?;
            lookup(source, field, nested).is_some_and(|v| equal(v, operand(value)))
        }
        "terms" => {
            let (field, values) = single(body, kind)?;
            let values = values.as_array().ok_or_else(unsupported)?;
            lookup(source, field, nested).is_some_and(|v| values.iter().any(|w| equal(v, w)))
        }
        "range" => {
            let (field, bounds) = single(body, kind)?;
            let bounds = bounds.as_object().ok_or_else(unsupported)?;
            let Some(value) = lookup(source, field, nested).filter(|v| !v.is_null()) else {
                return Ok(false);
            };
            let mut ok = true;
            for (op, bound) in bounds {
                let ordering = compare(value, bound);
                ok &= match op.as_str() {
                    "lt" => ordering == Some(Ordering::Less),
                    "lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    "gt" => ordering == Some(Ordering::Greater),
                    "gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    _ => return Err(unsupported()),
                };
            }
            ok
        }
        "prefix" => {
            let (field, value) = single(body, kind)?;
            let prefix = operand(value).as_str().ok_or_else(unsupported)?;
            lookup(source, field, nested)
                .and_then(Json::as_str)
                .is_some_and(|s| s.starts_with(prefix))
        }
        "wildcard" => {
            let (field, value) = single(body, kind)?;
            let pattern: Vec<char> = operand(value).as_str().ok_or_else(unsupported)?.chars().collect();
            lookup(source, field, nested)
                .and_then(Json::as_str)
                .is_some_and(|s| wildcard(&pattern, &s.chars().collect::<Vec<_>>()))
        }
        "exists" => {
            let field = body.get("field").and_then(Json::as_str).ok_or_else(unsupported)?;
            present(lookup(source, field, nested))
        }
        "bool" => {
            let body = body.as_object().ok_or_else(unsupported)?;
            let mut ok = true;
            for clause in clauses(body, "must").iter().chain(clauses(body, "filter")) {
                ok = ok && matches(clause, source, nested)?;
            }
            for clause in clauses(body, "must_not") {
                ok = ok && !matches(clause, source, nested)?;
            }
            let should = clauses(body, "should");
            if !should.is_empty() {
                let minimum = body
                    .get("minimum_should_match")
                    .and_then(Json::as_u64)
                    .unwrap_or(1);
                let mut hits = 0;
                for clause in should {
                    if matches(clause, source, nested)? {
                        hits += 1;
                    }
                }
                ok = ok && hits >= minimum;
            }
            ok
        }
        "nested" => {
            let path = body.get("path").and_then(Json::as_str).ok_or_else(unsupported)?;
            let inner = body.get("query").ok_or_else(unsupported)?;
            let elements = lookup(source, path, None)
                .and_then(Json::as_array)
                .map_or(&[][..], Vec::as_slice);
            let mut any = false;
            for element in elements {
                if matches(inner, source, Some((path, element)))? {
                    any = true;
                    break;
                }
            }
            any
        }
        _ => return Err(unsupported()),
    })
}

struct SortKey<'q> {
    field: &'q str,
    descending: bool,
    missing_first: bool,
}

impl<'q> SortKey<'q> {
    fn parse(sort: &'q Json) -> SearchResult<Self> {
        let (field, options) = single(sort, "sort")?;
        let descending = options.get("order").and_then(Json::as_str) == Some("desc");
        // Missing values go last unless asked otherwise, like Elasticsearch.
        let missing_first = options.get("missing").and_then(Json::as_str) == Some("_first");
        Ok(Self {
            field,
            descending,
            missing_first,
        })
    }

    fn value(&self, source: &Json) -> Json {
        lookup(source, self.field, None)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or(Json::Null)
    }

    fn compare(&self, a: &Json, b: &Json) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.missing_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.missing_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = compare(a, b).unwrap_or(Ordering::Equal);
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }
}

fn compare_keys(keys: &[SortKey<'_>], a: &[Json], b: &[Json]) -> Ordering {
    keys.iter()
        .zip(a.iter().zip(b))
        .map(|(key, (a, b))| key.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
