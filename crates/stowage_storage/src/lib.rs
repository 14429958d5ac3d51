//! # Stowage Storage
//!
//! Filesystem abstraction used by the stowage filesystem adapter.
//!
//! A [`Filesystem`] is an **opaque tree of byte files** addressed by
//! relative paths. It does not interpret what it stores: the adapter owns
//! the on-disk layout of aggregates.
//!
//! ## Design Principles
//!
//! - Files are written and read whole, there is no partial I/O
//! - Directories are implicit: writing a file creates its parents
//! - Removing a path removes everything underneath it and is idempotent
//! - Implementations must be `Send + Sync`
//!
//! ## Available Implementations
//!
//! - [`InMemoryFilesystem`] - For testing and ephemeral storage
//! - [`LocalFilesystem`] - Rooted at a directory of the OS filesystem
//!
//! ## Example
//!
//! ```rust
//! use stowage_storage::{Filesystem, InMemoryFilesystem};
//! use std::path::Path;
//!
//! let fs = InMemoryFilesystem::new();
//! fs.write(Path::new("users/1/properties/name"), b"\"alice\"").unwrap();
//! assert_eq!(fs.list(Path::new("users")).unwrap(), vec!["1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_path, Filesystem};
pub use error::{StorageError, StorageResult};
pub use file::LocalFilesystem;
pub use memory::InMemoryFilesystem;
