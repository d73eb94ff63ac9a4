//! Catalog persistence boundary.
//!
//! The reconciler talks to storage only through [`CatalogStore`] and the
//! transactions it opens. Two implementations ship: an in-memory store for tests
//! and development, and a Postgres store for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryCatalogStore, InMemoryCatalogTx};
pub use postgres::{PostgresCatalogStore, PostgresCatalogTx};
pub use r#trait::{CatalogStore, CatalogTransaction, GatewayError};
