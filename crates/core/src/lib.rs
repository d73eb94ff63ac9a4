//! `forgecat-core`: catalog foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error model and the entity trait.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{Entity, id_set};
pub use error::{DomainError, DomainResult};
pub use id::{OptionId, OptionValueId, ProductId, ReconcileId, VariantId, VariantOptionId};
