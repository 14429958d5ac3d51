//! # stowage core
//!
//! Maps domain aggregates onto pluggable storage backends.
//!
//! An aggregate describes its fields once through [`Aggregate::describe`].
//! The description is resolved into a [`Definition`] against a type
//! [`Registry`], and every load or store goes through a normalized,
//! backend-neutral [`raw`] form. Stores are diffed against the snapshot
//! loaded earlier, so backends only write what changed.
//!
//! ## Architecture
//!
//! - **Types**: resolve field shapes to mapping types
//! - **Definition**: the resolved schema of an aggregate
//! - **Normalize**: domain objects to raw aggregates, raw diffs
//! - **Specification**: backend-neutral predicates and their validation
//! - **Adapter**: the storage contract, with an in-memory implementation
//! - **Manager**: transactions and typed repositories

mod config;
mod context;
mod error;
mod id;
mod manager;
mod repository;
mod value;

pub mod adapter;
pub mod definition;
pub mod normalize;
pub mod raw;
pub mod specification;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use adapter::memory::InMemoryAdapter;
pub use adapter::{Adapter, Fetch, PendingWrite, PendingWrites, Storage, Transaction};
pub use config::Config;
pub use context::{ContextToken, TransactionState};
pub use definition::{
    Aggregate, Component, ComponentDef, ComponentSchema, Definition, Fields, Mapping,
    PropertyDef, Schema, Scope,
};
pub use error::{CoreError, CoreResult};
pub use id::Id;
pub use manager::Manager;
pub use repository::{Query, Repository};
pub use types::{CustomType, Registry, Scalar, Type};
pub use value::{Value, ValueKind};

/// Commonly used items.
pub mod prelude {
    pub use crate::specification::{Direction, Property, Specification};
    pub use crate::{
        Aggregate, Component, ComponentSchema, CoreError, CoreResult, Fields, Id, Manager,
        Repository, Schema,
    };
}
