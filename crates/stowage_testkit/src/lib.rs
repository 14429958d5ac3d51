//! # stowage testkit
//!
//! Test utilities shared by the stowage crates.
//!
//! This crate provides:
//! - Fixture aggregates covering every field shape
//! - Property-based generators using proptest
//! - A conformance suite every adapter runs against itself
//! - A tracing bootstrap for tests
//!
//! ## Usage
//!
//! ```rust
//! use stowage_core::{InMemoryAdapter, Manager};
//! use stowage_testkit::conformance;
//!
//! let manager = Manager::new(InMemoryAdapter::new());
//! conformance::round_trip(&manager);
//! ```

pub mod conformance;
pub mod fixtures;
pub mod generators;

/// Installs a fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}
