use std::sync::Arc;

use thiserror::Error;

use forgecat_catalog::{
    CatalogState, NewOption, NewOptionValue, NewVariant, NewVariantOption, OptionUpdate,
    OptionValueUpdate, VariantUpdate,
};
use forgecat_core::{OptionId, OptionValueId, ProductId, VariantId, VariantOptionId};

/// Catalog store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors: the store
/// reports what went wrong with the write, the reconciler decides what that
/// means for the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO, connection or driver failure. The transaction is unusable.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A storage constraint rejected the write (duplicate name, dangling
    /// reference, second link for the same axis).
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// An update or delete addressed a row the product does not own.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Transactional, product-scoped catalog store.
///
/// A store hands out one [`CatalogTransaction`] per reconciliation. All reads
/// and writes of a reconciliation go through that transaction; nothing is
/// visible to other readers until [`CatalogTransaction::commit`] succeeds, and
/// dropping a transaction without committing rolls it back.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - scope every read and write to the product the transaction was opened for
/// - return generated ids in input order
/// - cascade deletes (option → values → links, variant → links)
/// - enforce name uniqueness (options per product, values per option) no later
///   than commit
/// - reject a link whose value does not belong to its option, or whose option
///   or variant belongs to another product
/// - reject a second link for the same (variant, option) axis
pub trait CatalogStore: Send + Sync {
    type Tx<'a>: CatalogTransaction
    where
        Self: 'a;

    /// Open a transaction scoped to `product_id`.
    fn begin(&self, product_id: ProductId) -> Result<Self::Tx<'_>, GatewayError>;
}

/// Bulk operations of one open transaction.
///
/// Empty inputs are no-ops and must not round-trip to storage.
pub trait CatalogTransaction {
    fn product_id(&self) -> ProductId;

    /// Everything currently persisted for the transaction's product.
    fn fetch_catalog_state(&mut self) -> Result<CatalogState, GatewayError>;

    fn update_options(&mut self, rows: &[OptionUpdate]) -> Result<(), GatewayError>;
    fn insert_options(&mut self, rows: &[NewOption]) -> Result<Vec<OptionId>, GatewayError>;
    fn delete_options(&mut self, ids: &[OptionId]) -> Result<(), GatewayError>;

    fn update_option_values(&mut self, rows: &[OptionValueUpdate]) -> Result<(), GatewayError>;
    fn insert_option_values(&mut self, rows: &[NewOptionValue]) -> Result<Vec<OptionValueId>, GatewayError>;
    fn delete_option_values(&mut self, ids: &[OptionValueId]) -> Result<(), GatewayError>;

    fn update_variants(&mut self, rows: &[VariantUpdate]) -> Result<(), GatewayError>;
    fn insert_variants(&mut self, rows: &[NewVariant]) -> Result<Vec<VariantId>, GatewayError>;
    fn delete_variants(&mut self, ids: &[VariantId]) -> Result<(), GatewayError>;

    fn insert_variant_options(&mut self, rows: &[NewVariantOption]) -> Result<Vec<VariantOptionId>, GatewayError>;
    fn delete_variant_options(&mut self, ids: &[VariantOptionId]) -> Result<(), GatewayError>;

    /// Make every write of this transaction durable and visible.
    fn commit(self) -> Result<(), GatewayError>
    where
        Self: Sized;
}

impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore,
{
    type Tx<'a>
        = S::Tx<'a>
    where
        Self: 'a;

    fn begin(&self, product_id: ProductId) -> Result<Self::Tx<'_>, GatewayError> {
        (**self).begin(product_id)
    }
}
