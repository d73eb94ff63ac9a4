//! Catalog domain module: product options, option values, variants and the
//! links between them.
//!
//! This crate contains the desired-state reconciliation logic implemented purely
//! as deterministic domain code (no IO, no storage). Storage-facing orchestration
//! lives in `forgecat-infra`.

pub mod correlator;
pub mod desired;
pub mod model;
pub mod plan;
pub mod view;

pub use correlator::Correlator;
pub use desired::{
    DesiredCatalog, DesiredOption, DesiredOptionValue, DesiredSelection, DesiredVariant, Keyed,
    OptionRef, OptionSpec, ParsedCatalog, Partition, Selection, ValueRef, ValueSpec, VariantSpec,
};
pub use model::{
    CatalogState, NewOption, NewOptionValue, NewVariant, NewVariantOption, OptionRow, OptionUpdate,
    OptionValueRow, OptionValueUpdate, VariantFields, VariantOptionRow, VariantRow, VariantUpdate,
};
pub use plan::{LinkIntent, PendingOption, PendingVariant, PlanStats, ReconcilePlan, VariantTarget, plan};
pub use view::{CatalogView, OptionValueView, OptionView, SelectionView, VariantView};
