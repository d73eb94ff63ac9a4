//! Reconciliation planning: diff a parsed desired state against the persisted
//! baseline of one product.
//!
//! The planner is pure. It decides every update and delete up front, and every
//! insert whose ids it can know. Inserts that depend on ids generated during the
//! same reconciliation (values of a new option, links of a new variant, links to
//! a new value) are emitted with name/position references; the executor resolves
//! them through the plan's [`Correlator`] as storage returns ids.
//!
//! Everything that can be rejected without touching storage is rejected here:
//! foreign or unknown ids, names that do not resolve, links that cross ownership
//! boundaries. A plan that comes out of [`plan`] only fails at apply time for
//! storage reasons.
//!
//! Execution order (children before parents for deletes, parents before
//! children for inserts):
//!
//! ```text
//! delete values → delete options → delete stale links → delete variants
//!   → update options / values / variants
//!   → insert options → insert values → insert variants → insert links
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use forgecat_core::{
    DomainError, DomainResult, OptionId, OptionValueId, ProductId, VariantId, VariantOptionId,
    id_set,
};

use crate::correlator::Correlator;
use crate::desired::{
    Keyed, OptionRef, OptionSpec, ParsedCatalog, Partition, Selection, ValueRef, ValueSpec,
    VariantSpec, describe_option,
};
use crate::model::{
    CatalogState, NewOptionValue, OptionUpdate, OptionValueUpdate, VariantFields, VariantOptionRow,
    VariantUpdate,
};

/// Which variant a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantTarget {
    Existing(VariantId),
    /// Created by this reconciliation from the request entry at this position.
    New(i32),
}

/// A variant → option value link still to be inserted.
///
/// References are normalized: `Id` whenever the target is known at plan time,
/// `Name` only when it is created by this reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkIntent {
    pub variant: VariantTarget,
    pub option: OptionRef,
    pub value: ValueRef,
}

/// An option to insert together with all of its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOption {
    pub name: String,
    pub position: i32,
    pub values: Vec<ValueSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVariant {
    pub position: i32,
    pub fields: VariantFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub product_id: ProductId,

    pub delete_values: Vec<OptionValueId>,
    pub delete_options: Vec<OptionId>,
    /// Links of surviving variants that no longer match the desired selections.
    /// Links removed by cascade (deleted option, value or variant) are not listed.
    pub delete_links: Vec<VariantOptionId>,
    pub delete_variants: Vec<VariantId>,

    pub update_options: Vec<OptionUpdate>,
    pub update_values: Vec<OptionValueUpdate>,
    pub update_variants: Vec<VariantUpdate>,

    pub insert_options: Vec<PendingOption>,
    /// New values of surviving options (parent id already known).
    pub insert_values: Vec<NewOptionValue>,
    pub insert_variants: Vec<PendingVariant>,
    pub links: Vec<LinkIntent>,

    /// Seeded with the desired names of surviving options and values.
    pub correlator: Correlator,
}

/// Row counts per operation kind, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanStats {
    pub option_inserts: usize,
    pub value_inserts: usize,
    pub variant_inserts: usize,
    pub link_inserts: usize,
    pub option_updates: usize,
    pub value_updates: usize,
    pub variant_updates: usize,
    pub option_deletes: usize,
    pub value_deletes: usize,
    pub variant_deletes: usize,
    pub link_deletes: usize,
}

impl PlanStats {
    pub fn inserts(&self) -> usize {
        self.option_inserts + self.value_inserts + self.variant_inserts + self.link_inserts
    }

    pub fn updates(&self) -> usize {
        self.option_updates + self.value_updates + self.variant_updates
    }

    pub fn deletes(&self) -> usize {
        self.option_deletes + self.value_deletes + self.variant_deletes + self.link_deletes
    }
}

impl ReconcilePlan {
    fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            delete_values: Vec::new(),
            delete_options: Vec::new(),
            delete_links: Vec::new(),
            delete_variants: Vec::new(),
            update_options: Vec::new(),
            update_values: Vec::new(),
            update_variants: Vec::new(),
            insert_options: Vec::new(),
            insert_values: Vec::new(),
            insert_variants: Vec::new(),
            links: Vec::new(),
            correlator: Correlator::new(),
        }
    }

    pub fn stats(&self) -> PlanStats {
        PlanStats {
            option_inserts: self.insert_options.len(),
            value_inserts: self.insert_values.len()
                + self.insert_options.iter().map(|o| o.values.len()).sum::<usize>(),
            variant_inserts: self.insert_variants.len(),
            link_inserts: self.links.len(),
            option_updates: self.update_options.len(),
            value_updates: self.update_values.len(),
            variant_updates: self.update_variants.len(),
            option_deletes: self.delete_options.len(),
            value_deletes: self.delete_values.len(),
            variant_deletes: self.delete_variants.len(),
            link_deletes: self.delete_links.len(),
        }
    }

    /// `true` when applying the plan creates no rows.
    pub fn is_insert_free(&self) -> bool {
        self.stats().inserts() == 0
    }
}

/// Diff `parsed` against `state` (the persisted baseline of `product_id`).
pub fn plan(product_id: ProductId, parsed: &ParsedCatalog, state: &CatalogState) -> DomainResult<ReconcilePlan> {
    validate_baseline(product_id, state)?;

    let mut planner = Planner::new(product_id, state);
    planner.plan_options(&parsed.options)?;
    planner.plan_variants(&parsed.variants)?;
    planner.plan_links(&parsed.variants)?;
    Ok(planner.plan)
}

/// Reject a baseline that mixes in rows of another product.
fn validate_baseline(product_id: ProductId, state: &CatalogState) -> DomainResult<()> {
    if state.product_id != product_id {
        return Err(DomainError::integrity(format!(
            "baseline is for product #{}, expected #{product_id}",
            state.product_id
        )));
    }
    if let Some(o) = state.options.iter().find(|o| o.product_id != product_id) {
        return Err(DomainError::integrity(format!(
            "baseline option #{} belongs to product #{}",
            o.id, o.product_id
        )));
    }
    if let Some(v) = state.variants.iter().find(|v| v.product_id != product_id) {
        return Err(DomainError::integrity(format!(
            "baseline variant #{} belongs to product #{}",
            v.id, v.product_id
        )));
    }
    let options = id_set(&state.options);
    if let Some(v) = state.values.iter().find(|v| !options.contains(&v.option_id)) {
        return Err(DomainError::integrity(format!(
            "baseline option value #{} hangs off unknown option #{}",
            v.id, v.option_id
        )));
    }
    let variants = id_set(&state.variants);
    if let Some(l) = state
        .variant_options
        .iter()
        .find(|l| !variants.contains(&l.variant_id))
    {
        return Err(DomainError::integrity(format!(
            "baseline link #{} hangs off unknown variant #{}",
            l.id, l.variant_id
        )));
    }
    Ok(())
}

struct Planner<'a> {
    state: &'a CatalogState,
    plan: ReconcilePlan,

    surviving_options: BTreeSet<OptionId>,
    /// Surviving value → owning option.
    surviving_values: HashMap<OptionValueId, OptionId>,
    deleted_options: BTreeSet<OptionId>,
    deleted_values: BTreeSet<OptionValueId>,
    /// New option name → names of its values.
    new_options: HashMap<String, HashSet<String>>,
    /// New values under surviving options.
    new_values: HashSet<(OptionId, String)>,
}

impl<'a> Planner<'a> {
    fn new(product_id: ProductId, state: &'a CatalogState) -> Self {
        Self {
            state,
            plan: ReconcilePlan::new(product_id),
            surviving_options: BTreeSet::new(),
            surviving_values: HashMap::new(),
            deleted_options: BTreeSet::new(),
            deleted_values: BTreeSet::new(),
            new_options: HashMap::new(),
            new_values: HashSet::new(),
        }
    }

    fn product_id(&self) -> ProductId {
        self.plan.product_id
    }

    fn plan_options(&mut self, options: &Partition<Keyed<OptionId, OptionSpec>, OptionSpec>) -> DomainResult<()> {
        let fetched = id_set(&self.state.options);

        for keyed in &options.existing {
            let id = keyed.id;
            if !fetched.contains(&id) {
                return Err(DomainError::reference(format!(
                    "option #{id} does not belong to product #{}",
                    self.product_id()
                )));
            }
            self.plan.update_options.push(OptionUpdate {
                id,
                name: keyed.spec.name.clone(),
                position: keyed.spec.position,
            });
            self.plan.correlator.register_option(&keyed.spec.name, id)?;
            self.surviving_options.insert(id);
            self.plan_values_of_existing(id, &keyed.spec)?;
        }

        self.deleted_options = fetched.difference(&self.surviving_options).copied().collect();
        self.plan.delete_options = self.deleted_options.iter().copied().collect();

        for spec in &options.new {
            if let Some(stray) = spec.values.existing.first() {
                return Err(DomainError::reference(format!(
                    "option value #{} cannot belong to new option '{}'",
                    stray.id, spec.name
                )));
            }
            self.new_options.insert(
                spec.name.clone(),
                spec.values.new.iter().map(|v| v.name.clone()).collect(),
            );
            self.plan.insert_options.push(PendingOption {
                name: spec.name.clone(),
                position: spec.position,
                values: spec.values.new.clone(),
            });
        }

        Ok(())
    }

    fn plan_values_of_existing(&mut self, option_id: OptionId, spec: &OptionSpec) -> DomainResult<()> {
        let fetched: BTreeSet<OptionValueId> = self.state.values_of(option_id).map(|v| v.id).collect();
        let mut kept = BTreeSet::new();

        for keyed in &spec.values.existing {
            if !fetched.contains(&keyed.id) {
                return Err(match self.state.value(keyed.id) {
                    Some(row) => DomainError::reference(format!(
                        "option value #{} belongs to option #{}, not #{option_id}",
                        keyed.id, row.option_id
                    )),
                    None => DomainError::reference(format!(
                        "option value #{} does not belong to product #{}",
                        keyed.id,
                        self.product_id()
                    )),
                });
            }
            self.plan.update_values.push(OptionValueUpdate {
                id: keyed.id,
                name: keyed.spec.name.clone(),
                position: keyed.spec.position,
            });
            self.plan
                .correlator
                .register_value(option_id, &keyed.spec.name, keyed.id)?;
            self.surviving_values.insert(keyed.id, option_id);
            kept.insert(keyed.id);
        }

        for value in &spec.values.new {
            self.new_values.insert((option_id, value.name.clone()));
            self.plan.insert_values.push(NewOptionValue {
                option_id,
                name: value.name.clone(),
                position: value.position,
            });
        }

        for stale in fetched.difference(&kept) {
            self.deleted_values.insert(*stale);
            self.plan.delete_values.push(*stale);
        }
        Ok(())
    }

    fn plan_variants(&mut self, variants: &Partition<Keyed<VariantId, VariantSpec>, VariantSpec>) -> DomainResult<()> {
        let fetched = id_set(&self.state.variants);
        let mut kept = BTreeSet::new();

        for keyed in &variants.existing {
            if !fetched.contains(&keyed.id) {
                return Err(DomainError::reference(format!(
                    "variant #{} does not belong to product #{}",
                    keyed.id,
                    self.product_id()
                )));
            }
            self.plan.update_variants.push(VariantUpdate {
                id: keyed.id,
                position: keyed.spec.position,
                fields: keyed.spec.fields.clone(),
            });
            kept.insert(keyed.id);
        }

        self.plan.delete_variants = fetched.difference(&kept).copied().collect();

        for spec in &variants.new {
            self.plan.insert_variants.push(PendingVariant {
                position: spec.position,
                fields: spec.fields.clone(),
            });
        }
        Ok(())
    }

    fn plan_links(&mut self, variants: &Partition<Keyed<VariantId, VariantSpec>, VariantSpec>) -> DomainResult<()> {
        for keyed in &variants.existing {
            let resolved = self.resolve_selections(keyed.spec.position, &keyed.spec.selections)?;
            let wanted: HashSet<(OptionId, OptionValueId)> =
                resolved.iter().filter_map(known_pair).collect();

            // Keep a current link only if it is still wanted; the first copy wins
            // when the baseline holds duplicates.
            let mut kept = HashSet::new();
            let current: Vec<&VariantOptionRow> = self
                .state
                .links_of(keyed.id)
                .filter(|l| !self.is_cascaded(l))
                .collect();
            for link in current {
                let pair = (link.option_id, link.option_value_id);
                if wanted.contains(&pair) && kept.insert(pair) {
                    continue;
                }
                self.plan.delete_links.push(link.id);
            }

            for selection in resolved {
                if known_pair(&selection).is_some_and(|pair| kept.contains(&pair)) {
                    continue;
                }
                self.plan.links.push(LinkIntent {
                    variant: VariantTarget::Existing(keyed.id),
                    option: selection.option,
                    value: selection.value,
                });
            }
        }

        for spec in &variants.new {
            for selection in self.resolve_selections(spec.position, &spec.selections)? {
                self.plan.links.push(LinkIntent {
                    variant: VariantTarget::New(spec.position),
                    option: selection.option,
                    value: selection.value,
                });
            }
        }
        Ok(())
    }

    fn is_cascaded(&self, link: &VariantOptionRow) -> bool {
        self.deleted_options.contains(&link.option_id) || self.deleted_values.contains(&link.option_value_id)
    }

    fn resolve_selections(&self, position: i32, selections: &[Selection]) -> DomainResult<Vec<Selection>> {
        let mut axes = HashSet::new();
        let mut out = Vec::with_capacity(selections.len());

        for selection in selections {
            let option = self.resolve_option(&selection.option)?;
            if !axes.insert(option.clone()) {
                return Err(DomainError::validation(format!(
                    "variant at position {position} selects option {} more than once",
                    describe_option(&option)
                )));
            }
            let value = self.resolve_value(&option, &selection.value)?;
            out.push(Selection { option, value });
        }
        Ok(out)
    }

    fn resolve_option(&self, option: &OptionRef) -> DomainResult<OptionRef> {
        match option {
            OptionRef::Id(id) => {
                if self.surviving_options.contains(id) {
                    Ok(OptionRef::Id(*id))
                } else if self.state.option(*id).is_some() {
                    Err(DomainError::reference(format!(
                        "option #{id} is removed by this desired state"
                    )))
                } else {
                    Err(DomainError::integrity(format!(
                        "option #{id} is not owned by product #{}",
                        self.product_id()
                    )))
                }
            }
            OptionRef::Name(name) => {
                if let Some(id) = self.plan.correlator.option_id(name) {
                    Ok(OptionRef::Id(id))
                } else if self.new_options.contains_key(name) {
                    Ok(OptionRef::Name(name.clone()))
                } else {
                    Err(DomainError::reference(format!(
                        "no option named '{name}' in the desired state"
                    )))
                }
            }
        }
    }

    fn resolve_value(&self, option: &OptionRef, value: &ValueRef) -> DomainResult<ValueRef> {
        match (option, value) {
            (OptionRef::Id(option_id), ValueRef::Id(value_id)) => {
                match self.surviving_values.get(value_id) {
                    Some(owner) if owner == option_id => Ok(ValueRef::Id(*value_id)),
                    Some(owner) => Err(DomainError::integrity(format!(
                        "option value #{value_id} belongs to option #{owner}, not #{option_id}"
                    ))),
                    None => match self.state.value(*value_id) {
                        Some(row) if row.option_id == *option_id => Err(DomainError::reference(
                            format!("option value #{value_id} is removed by this desired state"),
                        )),
                        Some(row) => Err(DomainError::integrity(format!(
                            "option value #{value_id} belongs to option #{}, not #{option_id}",
                            row.option_id
                        ))),
                        None => Err(DomainError::integrity(format!(
                            "option value #{value_id} is not owned by product #{}",
                            self.product_id()
                        ))),
                    },
                }
            }
            (OptionRef::Id(option_id), ValueRef::Name(name)) => {
                if let Some(id) = self.plan.correlator.value_id(*option_id, name) {
                    Ok(ValueRef::Id(id))
                } else if self.new_values.contains(&(*option_id, name.clone())) {
                    Ok(ValueRef::Name(name.clone()))
                } else {
                    Err(DomainError::reference(format!(
                        "option #{option_id} has no value named '{name}' in the desired state"
                    )))
                }
            }
            (OptionRef::Name(option_name), ValueRef::Id(value_id)) => Err(DomainError::reference(format!(
                "option value #{value_id} cannot belong to new option '{option_name}'"
            ))),
            (OptionRef::Name(option_name), ValueRef::Name(name)) => {
                let known = self
                    .new_options
                    .get(option_name)
                    .is_some_and(|values| values.contains(name));
                if known {
                    Ok(ValueRef::Name(name.clone()))
                } else {
                    Err(DomainError::reference(format!(
                        "new option '{option_name}' has no value named '{name}'"
                    )))
                }
            }
        }
    }
}

fn known_pair(selection: &Selection) -> Option<(OptionId, OptionValueId)> {
    match (&selection.option, &selection.value) {
        (OptionRef::Id(option), ValueRef::Id(value)) => Some((*option, *value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desired::{DesiredCatalog, DesiredOption, DesiredOptionValue, DesiredSelection, DesiredVariant};
    use crate::model::{OptionRow, OptionValueRow, VariantRow};

    fn pid() -> ProductId {
        ProductId::new(1)
    }

    /// Size(10): Small(100), Medium(101); variants 5 → Small, 6 → Medium.
    fn size_state() -> CatalogState {
        CatalogState {
            product_id: pid(),
            options: vec![OptionRow {
                id: OptionId::new(10),
                product_id: pid(),
                name: "Size".into(),
                position: 0,
            }],
            values: vec![
                OptionValueRow {
                    id: OptionValueId::new(100),
                    option_id: OptionId::new(10),
                    name: "Small".into(),
                    position: 0,
                },
                OptionValueRow {
                    id: OptionValueId::new(101),
                    option_id: OptionId::new(10),
                    name: "Medium".into(),
                    position: 1,
                },
            ],
            variants: vec![variant_row(5, 0), variant_row(6, 1)],
            variant_options: vec![link_row(500, 5, 10, 100), link_row(600, 6, 10, 101)],
        }
    }

    fn variant_row(id: i64, position: i32) -> VariantRow {
        VariantRow {
            id: VariantId::new(id),
            product_id: pid(),
            position,
            fields: VariantFields {
                sku: format!("SKU-{id}"),
                ..VariantFields::default()
            },
        }
    }

    fn link_row(id: i64, variant: i64, option: i64, value: i64) -> VariantOptionRow {
        VariantOptionRow {
            id: VariantOptionId::new(id),
            variant_id: VariantId::new(variant),
            option_id: OptionId::new(option),
            option_value_id: OptionValueId::new(value),
        }
    }

    fn size_option(values: Vec<DesiredOptionValue>) -> DesiredOption {
        DesiredOption {
            id: OptionId::new(10),
            name: "Size".into(),
            values,
        }
    }

    fn existing_variant(id: i64, selections: Vec<DesiredSelection>) -> DesiredVariant {
        DesiredVariant {
            id: VariantId::new(id),
            sku: format!("SKU-{id}"),
            options: selections,
            ..DesiredVariant::default()
        }
    }

    fn plan_for(desired: &DesiredCatalog, state: &CatalogState) -> DomainResult<ReconcilePlan> {
        plan(pid(), &desired.parse()?, state)
    }

    #[test]
    fn empty_baseline_inserts_everything_by_name() {
        let desired = DesiredCatalog {
            options: vec![DesiredOption::new("Color", ["Red", "Blue"])],
            variants: vec![DesiredVariant {
                sku: "RED".into(),
                options: vec![DesiredSelection::by_name("Color", "Red")],
                ..DesiredVariant::default()
            }],
        };
        let plan = plan_for(&desired, &CatalogState::empty(pid())).unwrap();

        assert_eq!(plan.insert_options.len(), 1);
        assert_eq!(plan.insert_options[0].values.len(), 2);
        assert_eq!(plan.insert_variants.len(), 1);
        assert_eq!(
            plan.links,
            vec![LinkIntent {
                variant: VariantTarget::New(0),
                option: OptionRef::Name("Color".into()),
                value: ValueRef::Name("Red".into()),
            }]
        );
        let stats = plan.stats();
        assert_eq!(stats.inserts(), 1 + 2 + 1 + 1);
        assert_eq!(stats.updates(), 0);
        assert_eq!(stats.deletes(), 0);
    }

    #[test]
    fn dropping_a_value_deletes_it_and_leaves_its_links_to_the_cascade() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![DesiredOptionValue::existing(
                OptionValueId::new(100),
                "S",
            )])],
            variants: vec![
                existing_variant(5, vec![DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(100))]),
                existing_variant(6, vec![]),
            ],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert_eq!(plan.update_options.len(), 1);
        assert_eq!(plan.update_options[0].id, OptionId::new(10));
        assert_eq!(
            plan.update_values,
            vec![OptionValueUpdate {
                id: OptionValueId::new(100),
                name: "S".into(),
                position: 0,
            }]
        );
        assert_eq!(plan.delete_values, vec![OptionValueId::new(101)]);
        assert!(plan.delete_options.is_empty());
        // Link 600 points at value 101 and goes with it.
        assert!(plan.delete_links.is_empty());
        assert!(plan.links.is_empty());
    }

    #[test]
    fn omitted_variant_is_deleted() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![
                DesiredOptionValue::existing(OptionValueId::new(100), "Small"),
                DesiredOptionValue::existing(OptionValueId::new(101), "Medium"),
            ])],
            variants: vec![existing_variant(
                6,
                vec![DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(101))],
            )],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert_eq!(plan.delete_variants, vec![VariantId::new(5)]);
        assert!(plan.delete_links.is_empty());
        assert!(plan.is_insert_free());
    }

    #[test]
    fn omitted_option_is_deleted_with_its_values_by_cascade() {
        let desired = DesiredCatalog {
            options: vec![],
            variants: vec![existing_variant(5, vec![]), existing_variant(6, vec![])],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert_eq!(plan.delete_options, vec![OptionId::new(10)]);
        assert!(plan.delete_values.is_empty());
        assert!(plan.delete_links.is_empty());
    }

    #[test]
    fn unchanged_selections_are_skipped_whether_by_id_or_by_name() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![
                DesiredOptionValue::existing(OptionValueId::new(100), "Small"),
                DesiredOptionValue::existing(OptionValueId::new(101), "Medium"),
            ])],
            variants: vec![
                existing_variant(5, vec![DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(100))]),
                existing_variant(6, vec![DesiredSelection::by_name("Size", "Medium")]),
            ],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert!(plan.links.is_empty());
        assert!(plan.delete_links.is_empty());
        assert_eq!(plan.stats().updates(), 1 + 2 + 2);
    }

    #[test]
    fn changed_selection_replaces_the_link_for_that_axis() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![
                DesiredOptionValue::existing(OptionValueId::new(100), "Small"),
                DesiredOptionValue::existing(OptionValueId::new(101), "Medium"),
            ])],
            variants: vec![
                existing_variant(5, vec![DesiredSelection::by_name("Size", "Medium")]),
                existing_variant(6, vec![DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(101))]),
            ],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert_eq!(plan.delete_links, vec![VariantOptionId::new(500)]);
        assert_eq!(
            plan.links,
            vec![LinkIntent {
                variant: VariantTarget::Existing(VariantId::new(5)),
                option: OptionRef::Id(OptionId::new(10)),
                value: ValueRef::Id(OptionValueId::new(101)),
            }]
        );
    }

    #[test]
    fn selecting_a_new_value_of_an_existing_option_stays_pending() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![
                DesiredOptionValue::existing(OptionValueId::new(100), "Small"),
                DesiredOptionValue::existing(OptionValueId::new(101), "Medium"),
                DesiredOptionValue::new("Large"),
            ])],
            variants: vec![
                existing_variant(5, vec![DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(100))]),
                existing_variant(6, vec![DesiredSelection::by_name("Size", "Large")]),
            ],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert_eq!(
            plan.insert_values,
            vec![NewOptionValue {
                option_id: OptionId::new(10),
                name: "Large".into(),
                position: 2,
            }]
        );
        assert_eq!(plan.delete_links, vec![VariantOptionId::new(600)]);
        assert_eq!(plan.links[0].option, OptionRef::Id(OptionId::new(10)));
        assert_eq!(plan.links[0].value, ValueRef::Name("Large".into()));
    }

    #[test]
    fn unknown_existing_ids_are_reference_errors() {
        let mut desired = DesiredCatalog {
            options: vec![DesiredOption {
                id: OptionId::new(99),
                name: "Ghost".into(),
                values: vec![],
            }],
            variants: vec![],
        };
        assert!(matches!(plan_for(&desired, &size_state()), Err(DomainError::Reference(_))));

        desired.options = vec![];
        desired.variants = vec![existing_variant(77, vec![])];
        assert!(matches!(plan_for(&desired, &size_state()), Err(DomainError::Reference(_))));
    }

    #[test]
    fn value_listed_under_the_wrong_option_is_a_reference_error() {
        let mut state = size_state();
        state.options.push(OptionRow {
            id: OptionId::new(20),
            product_id: pid(),
            name: "Color".into(),
            position: 1,
        });
        let desired = DesiredCatalog {
            options: vec![
                size_option(vec![]),
                DesiredOption {
                    id: OptionId::new(20),
                    name: "Color".into(),
                    values: vec![DesiredOptionValue::existing(OptionValueId::new(100), "Small")],
                },
            ],
            variants: vec![],
        };
        let err = plan_for(&desired, &state).unwrap_err();
        assert!(matches!(err, DomainError::Reference(msg) if msg.contains("belongs to option #10")));
    }

    #[test]
    fn value_id_under_a_new_option_is_a_reference_error() {
        let desired = DesiredCatalog {
            options: vec![DesiredOption {
                id: OptionId::NEW,
                name: "Material".into(),
                values: vec![DesiredOptionValue::existing(OptionValueId::new(100), "Cotton")],
            }],
            variants: vec![],
        };
        assert!(matches!(
            plan_for(&desired, &CatalogState::empty(pid())),
            Err(DomainError::Reference(_))
        ));
    }

    #[test]
    fn selection_of_a_foreign_option_is_an_integrity_violation() {
        let desired = DesiredCatalog {
            options: vec![],
            variants: vec![DesiredVariant {
                options: vec![DesiredSelection::by_id(OptionId::new(4242), OptionValueId::new(1))],
                ..DesiredVariant::default()
            }],
        };
        let err = plan_for(&desired, &CatalogState::empty(pid())).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn selection_of_a_removed_option_is_a_reference_error() {
        let desired = DesiredCatalog {
            options: vec![],
            variants: vec![existing_variant(
                5,
                vec![DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(100))],
            )],
        };
        let err = plan_for(&desired, &size_state()).unwrap_err();
        assert!(matches!(err, DomainError::Reference(msg) if msg.contains("removed")));
    }

    #[test]
    fn selected_value_must_belong_to_the_selected_option() {
        let mut state = size_state();
        state.options.push(OptionRow {
            id: OptionId::new(20),
            product_id: pid(),
            name: "Color".into(),
            position: 1,
        });
        let desired = DesiredCatalog {
            options: vec![
                size_option(vec![DesiredOptionValue::existing(OptionValueId::new(100), "Small")]),
                DesiredOption {
                    id: OptionId::new(20),
                    name: "Color".into(),
                    values: vec![],
                },
            ],
            variants: vec![existing_variant(
                5,
                vec![DesiredSelection::by_id(OptionId::new(20), OptionValueId::new(100))],
            )],
        };
        let err = plan_for(&desired, &state).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn unresolvable_names_are_reference_errors() {
        let desired = DesiredCatalog {
            options: vec![DesiredOption::new("Color", ["Red"])],
            variants: vec![DesiredVariant {
                options: vec![DesiredSelection::by_name("Color", "Green")],
                ..DesiredVariant::default()
            }],
        };
        assert!(matches!(
            plan_for(&desired, &CatalogState::empty(pid())),
            Err(DomainError::Reference(_))
        ));

        let desired = DesiredCatalog {
            options: vec![],
            variants: vec![DesiredVariant {
                options: vec![DesiredSelection::by_name("Material", "Wool")],
                ..DesiredVariant::default()
            }],
        };
        assert!(matches!(
            plan_for(&desired, &CatalogState::empty(pid())),
            Err(DomainError::Reference(_))
        ));
    }

    #[test]
    fn same_axis_by_id_and_by_name_is_rejected() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![
                DesiredOptionValue::existing(OptionValueId::new(100), "Small"),
                DesiredOptionValue::existing(OptionValueId::new(101), "Medium"),
            ])],
            variants: vec![existing_variant(
                5,
                vec![
                    DesiredSelection::by_id(OptionId::new(10), OptionValueId::new(100)),
                    DesiredSelection::by_name("Size", "Medium"),
                ],
            )],
        };
        let err = plan_for(&desired, &size_state()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_baseline_links_are_healed() {
        let mut state = size_state();
        state.variant_options.push(link_row(501, 5, 10, 100));
        let desired = DesiredCatalog {
            options: vec![size_option(vec![
                DesiredOptionValue::existing(OptionValueId::new(100), "Small"),
                DesiredOptionValue::existing(OptionValueId::new(101), "Medium"),
            ])],
            variants: vec![
                existing_variant(5, vec![DesiredSelection::by_name("Size", "Small")]),
                existing_variant(6, vec![DesiredSelection::by_name("Size", "Medium")]),
            ],
        };
        let plan = plan_for(&desired, &state).unwrap();

        assert_eq!(plan.delete_links, vec![VariantOptionId::new(501)]);
        assert!(plan.links.is_empty());
    }

    #[test]
    fn baseline_of_another_product_is_rejected() {
        let mut state = size_state();
        state.variants[0].product_id = ProductId::new(2);
        let err = plan(pid(), &ParsedCatalog::default(), &state).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn correlator_is_seeded_with_surviving_names() {
        let desired = DesiredCatalog {
            options: vec![size_option(vec![DesiredOptionValue::existing(
                OptionValueId::new(100),
                "S",
            )])],
            variants: vec![],
        };
        let plan = plan_for(&desired, &size_state()).unwrap();

        assert_eq!(plan.correlator.option_id("Size"), Some(OptionId::new(10)));
        assert_eq!(plan.correlator.value_id(OptionId::new(10), "S"), Some(OptionValueId::new(100)));
        assert_eq!(plan.correlator.value_id(OptionId::new(10), "Small"), None);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: every fetched value is either kept (updated) or deleted, never both.
            #[test]
            fn values_are_kept_or_deleted_exactly_once(keep_small in any::<bool>(), keep_medium in any::<bool>()) {
                let mut values = Vec::new();
                if keep_small {
                    values.push(DesiredOptionValue::existing(OptionValueId::new(100), "Small"));
                }
                if keep_medium {
                    values.push(DesiredOptionValue::existing(OptionValueId::new(101), "Medium"));
                }
                let desired = DesiredCatalog {
                    options: vec![size_option(values)],
                    variants: vec![existing_variant(5, vec![]), existing_variant(6, vec![])],
                };
                let plan = plan_for(&desired, &size_state()).unwrap();

                let mut seen: Vec<OptionValueId> = plan.update_values.iter().map(|u| u.id).collect();
                seen.extend(plan.delete_values.iter().copied());
                seen.sort();
                prop_assert_eq!(seen, vec![OptionValueId::new(100), OptionValueId::new(101)]);
                // Links of deleted values cascade; links of kept values are stale (no selection).
                let stale = usize::from(keep_small) + usize::from(keep_medium);
                prop_assert_eq!(plan.delete_links.len(), stale);
            }
        }
    }
}
