//! Read model of a product's catalog.
//!
//! Built from a fetched [`CatalogState`]; everything is ordered by position and
//! then by id, so two views of the same state are identical.

use serde::{Deserialize, Serialize};

use forgecat_core::{OptionId, OptionValueId, ProductId, VariantId};

use crate::desired::{DesiredCatalog, DesiredOption, DesiredOptionValue, DesiredSelection, DesiredVariant};
use crate::model::CatalogState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogView {
    pub product_id: ProductId,
    pub options: Vec<OptionView>,
    pub variants: Vec<VariantView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: OptionId,
    pub name: String,
    pub position: i32,
    pub values: Vec<OptionValueView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValueView {
    pub id: OptionValueId,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantView {
    pub id: VariantId,
    pub position: i32,
    pub sku: String,
    pub origin_price: i64,
    pub sale_price: i64,
    pub stock: i32,
    #[serde(rename = "file", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub options: Vec<SelectionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionView {
    pub option_id: OptionId,
    pub option_name: String,
    pub value_id: OptionValueId,
    pub value: String,
}

impl CatalogView {
    pub fn from_state(state: &CatalogState) -> Self {
        let mut options: Vec<OptionView> = state
            .options
            .iter()
            .map(|o| {
                let mut values: Vec<OptionValueView> = state
                    .values_of(o.id)
                    .map(|v| OptionValueView {
                        id: v.id,
                        name: v.name.clone(),
                        position: v.position,
                    })
                    .collect();
                values.sort_by_key(|v| (v.position, v.id));
                OptionView {
                    id: o.id,
                    name: o.name.clone(),
                    position: o.position,
                    values,
                }
            })
            .collect();
        options.sort_by_key(|o| (o.position, o.id));

        let mut variants: Vec<VariantView> = state
            .variants
            .iter()
            .map(|v| {
                let mut selections: Vec<(i32, SelectionView)> = state
                    .links_of(v.id)
                    .filter_map(|link| {
                        let option = state.option(link.option_id)?;
                        let value = state.value(link.option_value_id)?;
                        Some((
                            option.position,
                            SelectionView {
                                option_id: option.id,
                                option_name: option.name.clone(),
                                value_id: value.id,
                                value: value.name.clone(),
                            },
                        ))
                    })
                    .collect();
                selections.sort_by_key(|(position, s)| (*position, s.option_id, s.value_id));

                VariantView {
                    id: v.id,
                    position: v.position,
                    sku: v.fields.sku.clone(),
                    origin_price: v.fields.origin_price,
                    sale_price: v.fields.sale_price,
                    stock: v.fields.stock,
                    image: v.fields.image.clone(),
                    options: selections.into_iter().map(|(_, s)| s).collect(),
                }
            })
            .collect();
        variants.sort_by_key(|v| (v.position, v.id));

        Self {
            product_id: state.product_id,
            options,
            variants,
        }
    }

    /// The desired state that reproduces this view unchanged.
    ///
    /// Every entry carries its id, and selections are by id.
    pub fn to_desired(&self) -> DesiredCatalog {
        DesiredCatalog {
            options: self
                .options
                .iter()
                .map(|o| DesiredOption {
                    id: o.id,
                    name: o.name.clone(),
                    values: o
                        .values
                        .iter()
                        .map(|v| DesiredOptionValue::existing(v.id, v.name.clone()))
                        .collect(),
                })
                .collect(),
            variants: self
                .variants
                .iter()
                .map(|v| DesiredVariant {
                    id: v.id,
                    sku: v.sku.clone(),
                    origin_price: v.origin_price,
                    sale_price: v.sale_price,
                    stock: v.stock,
                    image: v.image.clone(),
                    options: v
                        .options
                        .iter()
                        .map(|s| DesiredSelection::by_id(s.option_id, s.value_id))
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn option_named(&self, name: &str) -> Option<&OptionView> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn variant_with_sku(&self, sku: &str) -> Option<&VariantView> {
        self.variants.iter().find(|v| v.sku == sku)
    }
}

impl From<&CatalogState> for CatalogView {
    fn from(state: &CatalogState) -> Self {
        Self::from_state(state)
    }
}

impl VariantView {
    /// Name of the value selected on `option_name`, if any.
    pub fn selected(&self, option_name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|s| s.option_name == option_name)
            .map(|s| s.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OptionRow, OptionValueRow, VariantFields, VariantOptionRow, VariantRow};
    use crate::plan;
    use forgecat_core::VariantOptionId;

    fn state() -> CatalogState {
        let pid = ProductId::new(1);
        CatalogState {
            product_id: pid,
            options: vec![
                OptionRow { id: OptionId::new(20), product_id: pid, name: "Color".into(), position: 1 },
                OptionRow { id: OptionId::new(10), product_id: pid, name: "Size".into(), position: 0 },
            ],
            values: vec![
                OptionValueRow { id: OptionValueId::new(201), option_id: OptionId::new(20), name: "Blue".into(), position: 1 },
                OptionValueRow { id: OptionValueId::new(200), option_id: OptionId::new(20), name: "Red".into(), position: 0 },
                OptionValueRow { id: OptionValueId::new(100), option_id: OptionId::new(10), name: "S".into(), position: 0 },
            ],
            variants: vec![VariantRow {
                id: VariantId::new(5),
                product_id: pid,
                position: 0,
                fields: VariantFields {
                    sku: "TEE-RED-S".into(),
                    origin_price: 2000,
                    sale_price: 1500,
                    stock: 4,
                    image: Some("tee.avif".into()),
                },
            }],
            variant_options: vec![
                VariantOptionRow {
                    id: VariantOptionId::new(1),
                    variant_id: VariantId::new(5),
                    option_id: OptionId::new(20),
                    option_value_id: OptionValueId::new(200),
                },
                VariantOptionRow {
                    id: VariantOptionId::new(2),
                    variant_id: VariantId::new(5),
                    option_id: OptionId::new(10),
                    option_value_id: OptionValueId::new(100),
                },
            ],
        }
    }

    #[test]
    fn orders_by_position() {
        let view = CatalogView::from_state(&state());

        let names: Vec<&str> = view.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["Size", "Color"]);
        let colors: Vec<&str> = view.options[1].values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(colors, ["Red", "Blue"]);

        let variant = &view.variants[0];
        assert_eq!(variant.options[0].option_name, "Size");
        assert_eq!(variant.selected("Color"), Some("Red"));
        assert_eq!(variant.image.as_deref(), Some("tee.avif"));

        let color = view.option_named("Color").unwrap();
        assert_eq!(color.values.len(), 2);
        assert!(view.option_named("Material").is_none());
    }

    #[test]
    fn to_desired_replans_to_pure_updates() {
        let state = state();
        let desired = CatalogView::from_state(&state).to_desired();
        let plan = plan(state.product_id, &desired.parse().unwrap(), &state).unwrap();

        let stats = plan.stats();
        assert_eq!(stats.inserts(), 0);
        assert_eq!(stats.deletes(), 0);
        assert_eq!(stats.updates(), 2 + 3 + 1);
    }
}
