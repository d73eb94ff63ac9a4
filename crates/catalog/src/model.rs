//! Persisted catalog rows and the records exchanged with storage.
//!
//! Rows mirror what a store holds for one product. Records (`*Update`, `New*`)
//! are what the executor hands to a store in bulk; stores pick their own batching
//! representation.

use serde::{Deserialize, Serialize};

use forgecat_core::{Entity, OptionId, OptionValueId, ProductId, VariantId, VariantOptionId};

/// A configurable axis of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRow {
    pub id: OptionId,
    pub product_id: ProductId,
    pub name: String,
    pub position: i32,
}

/// One value of an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValueRow {
    pub id: OptionValueId,
    pub option_id: OptionId,
    pub name: String,
    pub position: i32,
}

/// Mutable commercial fields of a variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantFields {
    pub sku: String,
    /// Prices are in the smallest currency unit (e.g. cents).
    pub origin_price: i64,
    pub sale_price: i64,
    pub stock: i32,
    /// Reference to an already-uploaded image; storage of the file itself is elsewhere.
    pub image: Option<String>,
}

/// A purchasable SKU of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRow {
    pub id: VariantId,
    pub product_id: ProductId,
    pub position: i32,
    #[serde(flatten)]
    pub fields: VariantFields,
}

/// "This variant selects this value for this option."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOptionRow {
    pub id: VariantOptionId,
    pub variant_id: VariantId,
    pub option_id: OptionId,
    pub option_value_id: OptionValueId,
}

impl Entity for OptionRow {
    type Id = OptionId;

    fn id(&self) -> OptionId {
        self.id
    }
}

impl Entity for OptionValueRow {
    type Id = OptionValueId;

    fn id(&self) -> OptionValueId {
        self.id
    }
}

impl Entity for VariantRow {
    type Id = VariantId;

    fn id(&self) -> VariantId {
        self.id
    }
}

impl Entity for VariantOptionRow {
    type Id = VariantOptionId;

    fn id(&self) -> VariantOptionId {
        self.id
    }
}

/// Everything currently persisted for one product.
///
/// This is the baseline a reconciliation diffs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogState {
    pub product_id: ProductId,
    pub options: Vec<OptionRow>,
    pub values: Vec<OptionValueRow>,
    pub variants: Vec<VariantRow>,
    pub variant_options: Vec<VariantOptionRow>,
}

impl CatalogState {
    /// Baseline of a product that has no catalog rows yet.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            options: Vec::new(),
            values: Vec::new(),
            variants: Vec::new(),
            variant_options: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
            && self.values.is_empty()
            && self.variants.is_empty()
            && self.variant_options.is_empty()
    }

    pub fn option(&self, id: OptionId) -> Option<&OptionRow> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn value(&self, id: OptionValueId) -> Option<&OptionValueRow> {
        self.values.iter().find(|v| v.id == id)
    }

    pub fn variant(&self, id: VariantId) -> Option<&VariantRow> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn values_of(&self, option_id: OptionId) -> impl Iterator<Item = &OptionValueRow> {
        self.values.iter().filter(move |v| v.option_id == option_id)
    }

    pub fn links_of(&self, variant_id: VariantId) -> impl Iterator<Item = &VariantOptionRow> {
        self.variant_options
            .iter()
            .filter(move |l| l.variant_id == variant_id)
    }

    /// Row counts as `(options, values, variants, variant_options)`.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.options.len(),
            self.values.len(),
            self.variants.len(),
            self.variant_options.len(),
        )
    }
}

// -------------------------
// Bulk records
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionUpdate {
    pub id: OptionId,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOption {
    pub product_id: ProductId,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValueUpdate {
    pub id: OptionValueId,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOptionValue {
    pub option_id: OptionId,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantUpdate {
    pub id: VariantId,
    pub position: i32,
    pub fields: VariantFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub product_id: ProductId,
    pub position: i32,
    pub fields: VariantFields,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewVariantOption {
    pub variant_id: VariantId,
    pub option_id: OptionId,
    pub option_value_id: OptionValueId,
}
