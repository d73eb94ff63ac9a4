//! Desired-state payload and its normalization.
//!
//! A [`DesiredCatalog`] is what an operator submits: the complete target set of
//! options (with values) and variants (with option selections) for one product.
//! Entries carrying a nonzero id refer to rows that already exist; entries with
//! id `0` (or no id at all) are to be created. Anything persisted but absent from
//! the payload is deleted.
//!
//! [`DesiredCatalog::parse`] checks structural shape and splits every entity list
//! into `existing` and `new` partitions. Whether existing ids really belong to the
//! product is decided later by the planner, against the fetched baseline.
//!
//! ## Full selection payloads
//!
//! A variant's `options` list is the complete set of axis selections the variant
//! must have after reconciliation. Links for axes that are not listed are
//! removed. Partial selection updates are not supported.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use forgecat_core::{DomainError, DomainResult, OptionId, OptionValueId, VariantId};

use crate::model::VariantFields;

// -------------------------
// Wire payload
// -------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredCatalog {
    #[serde(default)]
    pub options: Vec<DesiredOption>,
    #[serde(default)]
    pub variants: Vec<DesiredVariant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredOption {
    #[serde(default)]
    pub id: OptionId,
    pub name: String,
    #[serde(default)]
    pub values: Vec<DesiredOptionValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredOptionValue {
    #[serde(default)]
    pub id: OptionValueId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredVariant {
    #[serde(default)]
    pub id: VariantId,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub origin_price: i64,
    #[serde(default)]
    pub sale_price: i64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default, rename = "file", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub options: Vec<DesiredSelection>,
}

/// One axis selection of a variant, by id or by name.
///
/// A nonzero id wins over the corresponding name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSelection {
    #[serde(default)]
    pub option_id: OptionId,
    #[serde(default)]
    pub option_name: String,
    #[serde(default)]
    pub value_id: OptionValueId,
    #[serde(default, rename = "value")]
    pub value_name: String,
}

impl DesiredOption {
    /// A brand-new option with brand-new values.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: OptionId::NEW,
            name: name.into(),
            values: values.into_iter().map(DesiredOptionValue::new).collect(),
        }
    }
}

impl DesiredOptionValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OptionValueId::NEW,
            name: name.into(),
        }
    }

    pub fn existing(id: OptionValueId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl DesiredSelection {
    pub fn by_name(option: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            option_name: option.into(),
            value_name: value.into(),
            ..Self::default()
        }
    }

    pub fn by_id(option_id: OptionId, value_id: OptionValueId) -> Self {
        Self {
            option_id,
            value_id,
            ..Self::default()
        }
    }
}

impl DesiredVariant {
    pub fn fields(&self) -> VariantFields {
        VariantFields {
            sku: self.sku.clone(),
            origin_price: self.origin_price,
            sale_price: self.sale_price,
            stock: self.stock,
            image: self.image.clone(),
        }
    }
}

// -------------------------
// Parsed (normalized) form
// -------------------------

/// Entities split into "already exists" and "create this".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<E, N> {
    pub existing: Vec<E>,
    pub new: Vec<N>,
}

impl<E, N> Default for Partition<E, N> {
    fn default() -> Self {
        Self {
            existing: Vec::new(),
            new: Vec::new(),
        }
    }
}

impl<E, N> Partition<E, N> {
    pub fn len(&self) -> usize {
        self.existing.len() + self.new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A spec tagged with the id of the row it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed<Id, T> {
    pub id: Id,
    pub spec: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSpec {
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: String,
    pub position: i32,
    pub values: Partition<Keyed<OptionValueId, ValueSpec>, ValueSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionRef {
    Id(OptionId),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueRef {
    Id(OptionValueId),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub option: OptionRef,
    pub value: ValueRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    /// Index in the request's variant list; doubles as display order and as the
    /// correlation key for variants created by this request.
    pub position: i32,
    pub fields: VariantFields,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCatalog {
    pub options: Partition<Keyed<OptionId, OptionSpec>, OptionSpec>,
    pub variants: Partition<Keyed<VariantId, VariantSpec>, VariantSpec>,
}

impl DesiredCatalog {
    /// Validate structural shape and partition every entity list.
    ///
    /// Duplicate option names (and duplicate value names within one option) are
    /// rejected: newly created rows are correlated by name, so a duplicate would
    /// make the correlation ambiguous.
    pub fn parse(&self) -> DomainResult<ParsedCatalog> {
        let mut parsed = ParsedCatalog::default();

        let mut option_names = HashSet::new();
        let mut option_ids = HashSet::new();
        let mut value_ids = HashSet::new();

        for (idx, option) in self.options.iter().enumerate() {
            let position = position_of(idx, "option")?;
            let name = required_name(&option.name, || format!("option at position {position}"))?;
            if !option_names.insert(name.clone()) {
                return Err(DomainError::validation(format!(
                    "duplicate option name '{name}'"
                )));
            }

            let values = parse_values(&name, &option.values, &mut value_ids)?;
            let spec = OptionSpec {
                name,
                position,
                values,
            };

            if option.id.is_new() {
                parsed.options.new.push(spec);
            } else {
                ensure_non_negative(option.id.get(), "option")?;
                if !option_ids.insert(option.id) {
                    return Err(DomainError::validation(format!(
                        "option id {} listed more than once",
                        option.id
                    )));
                }
                parsed.options.existing.push(Keyed {
                    id: option.id,
                    spec,
                });
            }
        }

        let mut variant_ids = HashSet::new();
        for (idx, variant) in self.variants.iter().enumerate() {
            let position = position_of(idx, "variant")?;
            let selections = parse_selections(position, &variant.options)?;
            let spec = VariantSpec {
                position,
                fields: variant.fields(),
                selections,
            };

            if variant.id.is_new() {
                parsed.variants.new.push(spec);
            } else {
                ensure_non_negative(variant.id.get(), "variant")?;
                if !variant_ids.insert(variant.id) {
                    return Err(DomainError::validation(format!(
                        "variant id {} listed more than once",
                        variant.id
                    )));
                }
                parsed.variants.existing.push(Keyed {
                    id: variant.id,
                    spec,
                });
            }
        }

        Ok(parsed)
    }
}

fn parse_values(
    option_name: &str,
    values: &[DesiredOptionValue],
    seen_ids: &mut HashSet<OptionValueId>,
) -> DomainResult<Partition<Keyed<OptionValueId, ValueSpec>, ValueSpec>> {
    let mut out = Partition::default();
    let mut names = HashSet::new();

    for (idx, value) in values.iter().enumerate() {
        let position = position_of(idx, "option value")?;
        let name = required_name(&value.name, || {
            format!("value at position {position} of option '{option_name}'")
        })?;
        if !names.insert(name.clone()) {
            return Err(DomainError::validation(format!(
                "duplicate value name '{name}' in option '{option_name}'"
            )));
        }

        let spec = ValueSpec { name, position };
        if value.id.is_new() {
            out.new.push(spec);
        } else {
            ensure_non_negative(value.id.get(), "option value")?;
            if !seen_ids.insert(value.id) {
                return Err(DomainError::validation(format!(
                    "option value id {} listed more than once",
                    value.id
                )));
            }
            out.existing.push(Keyed { id: value.id, spec });
        }
    }

    Ok(out)
}

fn parse_selections(position: i32, selections: &[DesiredSelection]) -> DomainResult<Vec<Selection>> {
    let mut out = Vec::with_capacity(selections.len());
    let mut axes = HashSet::new();

    for selection in selections {
        let option = if selection.option_id.is_new() {
            let name = required_name(&selection.option_name, || {
                format!("option of a selection on variant at position {position}")
            })?;
            OptionRef::Name(name)
        } else {
            ensure_non_negative(selection.option_id.get(), "selected option")?;
            OptionRef::Id(selection.option_id)
        };

        let value = if selection.value_id.is_new() {
            let name = required_name(&selection.value_name, || {
                format!("value of a selection on variant at position {position}")
            })?;
            ValueRef::Name(name)
        } else {
            ensure_non_negative(selection.value_id.get(), "selected option value")?;
            ValueRef::Id(selection.value_id)
        };

        if !axes.insert(option.clone()) {
            return Err(DomainError::validation(format!(
                "variant at position {position} selects option {} more than once",
                describe_option(&option)
            )));
        }
        out.push(Selection { option, value });
    }

    Ok(out)
}

pub(crate) fn describe_option(option: &OptionRef) -> String {
    match option {
        OptionRef::Id(id) => format!("#{id}"),
        OptionRef::Name(name) => format!("'{name}'"),
    }
}

fn required_name(raw: &str, what: impl FnOnce() -> String) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{} has an empty name", what())));
    }
    Ok(trimmed.to_string())
}

fn ensure_non_negative(raw: i64, what: &str) -> DomainResult<()> {
    if raw < 0 {
        return Err(DomainError::invalid_id(format!("{what} id must not be negative (got {raw})")));
    }
    Ok(())
}

fn position_of(idx: usize, what: &str) -> DomainResult<i32> {
    i32::try_from(idx).map_err(|_| DomainError::validation(format!("too many {what} entries")))
}
