//! # stowage filesystem
//!
//! Filesystem adapter for stowage.
//!
//! Each aggregate is a directory named by its id under a directory named
//! after the aggregate. Properties are single JSON files, components get
//! subdirectories and each collection is one JSON file. The layout works
//! over any [`stowage_storage::Filesystem`].
//!
//! Writes are kept in an overlay until the transaction commits. Queries
//! load every aggregate of a type and filter in memory.
//!
//! ## Example
//!
//! ```rust
//! use stowage_core::Manager;
//! use stowage_filesystem::FilesystemAdapter;
//!
//! let manager = Manager::new(FilesystemAdapter::in_memory());
//! # let _ = manager;
//! ```

mod adapter;
mod error;
mod layout;

pub use adapter::FilesystemAdapter;
pub use error::{FilesystemError, FilesystemResult};
