//! # stowage search
//!
//! Document-store adapter for stowage, speaking the Elasticsearch query
//! DSL.
//!
//! Each aggregate is one document in an index named after it. Entities and
//! optionals are embedded objects, collections are `nested` arrays of
//! `{reference, data}` entries. [`mapping`] renders the index mapping and
//! [`compile`] turns specifications into queries.
//!
//! The store is reached through a [`DocumentClient`]. [`MemoryClient`]
//! keeps documents in process and records every request; with the `http`
//! feature, `HttpClient` talks to a real cluster.
//!
//! Document stores have no transactions: see [`SearchAdapter`] for what
//! that means for rollbacks.
//!
//! ## Example
//!
//! ```rust
//! use stowage_core::Manager;
//! use stowage_search::{MemoryClient, SearchAdapter, SearchConfig};
//!
//! let client = MemoryClient::new();
//! let adapter = SearchAdapter::with_config(client.clone(), SearchConfig::new().index_prefix("app-"));
//! let manager = Manager::new(adapter);
//! # let _ = manager;
//! ```

mod adapter;
mod client;
mod config;
mod document;
mod error;
#[cfg(feature = "http")]
mod http;
mod mapping;
mod memory;
mod query;

pub use adapter::{PassThrough, SearchAdapter};
pub use client::{DocumentClient, Hit};
pub use config::SearchConfig;
pub use error::{SearchError, SearchResult};
#[cfg(feature = "http")]
pub use http::HttpClient;
pub use mapping::{mapping, SearchField};
pub use memory::{MemoryClient, Request};
pub use query::{compile, count_body, search_body};
