//! Infrastructure layer: catalog storage, the reconciliation pipeline and
//! configuration.

pub mod catalog_store;
pub mod config;
pub mod reconciler;

pub use catalog_store::{
    CatalogStore, CatalogTransaction, GatewayError, InMemoryCatalogStore, PostgresCatalogStore,
};
pub use config::{ConfigError, StoreConfig};
pub use reconciler::{CancelFlag, CreatedValue, ReconcileError, ReconcileReport, Reconciler};
