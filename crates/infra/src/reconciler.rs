//! Catalog reconciliation pipeline (application-level orchestration).
//!
//! ```text
//! DesiredCatalog
//!   ↓
//! 1. Parse (shape validation, new/existing partitions). No IO.
//!   ↓
//! 2. Lock the product, open a transaction, fetch the baseline
//!   ↓
//! 3. Plan (pure diff against the baseline)
//!   ↓
//! 4. Execute: deletes → updates → inserts, resolving generated ids
//!   ↓
//! 5. Commit
//! ```
//!
//! Any failure after step 2 drops the transaction, which rolls it back: a
//! reconciliation either lands completely or not at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use forgecat_catalog::{
    CatalogView, DesiredCatalog, NewOption, NewOptionValue, NewVariant, NewVariantOption, PlanStats,
    ParsedCatalog, ReconcilePlan, VariantTarget, plan,
};
use forgecat_core::{DomainError, OptionId, OptionValueId, ProductId, ReconcileId, VariantId};

use crate::catalog_store::{CatalogStore, CatalogTransaction, GatewayError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Malformed desired state. Nothing was read or written.
    #[error("invalid desired state: {0}")]
    Validation(String),

    /// An id not owned by the product, or a name that resolves to nothing.
    #[error("unresolved reference: {0}")]
    Reference(String),

    /// Ownership or uniqueness violated, detected by the planner or by storage.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage failure: {0}")]
    Storage(GatewayError),

    /// The caller's cancel flag was raised; the transaction was rolled back.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl From<GatewayError> for ReconcileError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Integrity(msg) => ReconcileError::Integrity(msg),
            GatewayError::NotFound(msg) => ReconcileError::Reference(msg),
            GatewayError::Storage(_) => ReconcileError::Storage(value),
        }
    }
}

impl From<DomainError> for ReconcileError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ReconcileError::Validation(msg),
            DomainError::InvalidId(msg) => ReconcileError::Validation(msg),
            DomainError::Reference(msg) => ReconcileError::Reference(msg),
            DomainError::Integrity(msg) => ReconcileError::Integrity(msg),
        }
    }
}

/// Cooperative cancellation shared between a caller and a running reconciliation.
///
/// Checked before every storage call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<(), ReconcileError> {
        if self.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedValue {
    pub option_id: OptionId,
    pub name: String,
    pub id: OptionValueId,
}

/// Outcome of a committed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub reconcile_id: ReconcileId,
    pub product_id: ProductId,
    pub stats: PlanStats,
    /// Generated option ids by option name.
    pub options_created: BTreeMap<String, OptionId>,
    pub values_created: Vec<CreatedValue>,
    /// Generated variant ids by position in the request's variant list.
    pub variants_created: BTreeMap<i32, VariantId>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Created {
    options: BTreeMap<String, OptionId>,
    values: Vec<CreatedValue>,
    variants: BTreeMap<i32, VariantId>,
}

/// Applies desired catalog states through a [`CatalogStore`].
///
/// Reconciliations of the same product are serialized in-process; different
/// products proceed independently. A product's lock entry lives only while some
/// reconciliation of it holds or waits for the lock.
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
}

impl<S> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // The mutexes guard no data, so a panic while holding one leaves nothing
    // inconsistent behind and poisoning is ignored.
    fn product_lock(&self, product_id: ProductId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(product_id).or_default().clone()
    }

    /// Drop our handle and forget the entry once nobody else holds or awaits it.
    fn release_product_lock(&self, product_id: ProductId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(&product_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&product_id);
        }
    }

    #[cfg(test)]
    fn tracked_products(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<S> Reconciler<S>
where
    S: CatalogStore,
{
    /// Move the product's persisted catalog to `desired`.
    pub fn reconcile_catalog(
        &self,
        product_id: ProductId,
        desired: &DesiredCatalog,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.reconcile_catalog_with(product_id, desired, &CancelFlag::new())
    }

    /// [`reconcile_catalog`](Self::reconcile_catalog) with cooperative cancellation.
    pub fn reconcile_catalog_with(
        &self,
        product_id: ProductId,
        desired: &DesiredCatalog,
        cancel: &CancelFlag,
    ) -> Result<ReconcileReport, ReconcileError> {
        let reconcile_id = ReconcileId::new();
        let span = info_span!("reconcile_catalog", product_id = %product_id, reconcile_id = %reconcile_id);
        let _entered = span.enter();

        let result = self.run(reconcile_id, product_id, desired, cancel);
        match &result {
            Ok(report) => info!(
                inserts = report.stats.inserts(),
                updates = report.stats.updates(),
                deletes = report.stats.deletes(),
                "catalog reconciled"
            ),
            Err(ReconcileError::Validation(msg)) => warn!(error = %msg, "desired state rejected"),
            Err(err) => warn!(error = %err, "reconciliation rolled back"),
        }
        result
    }

    /// Read-side view of the product's persisted catalog.
    pub fn load_catalog(&self, product_id: ProductId) -> Result<CatalogView, ReconcileError> {
        let mut tx = self.store.begin(product_id)?;
        let state = tx.fetch_catalog_state()?;
        Ok(CatalogView::from_state(&state))
    }

    fn run(
        &self,
        reconcile_id: ReconcileId,
        product_id: ProductId,
        desired: &DesiredCatalog,
        cancel: &CancelFlag,
    ) -> Result<ReconcileReport, ReconcileError> {
        let parsed = desired.parse()?;

        let lock = self.product_lock(product_id);
        let result = {
            let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.apply(reconcile_id, product_id, &parsed, cancel)
        };
        self.release_product_lock(product_id, lock);
        result
    }

    fn apply(
        &self,
        reconcile_id: ReconcileId,
        product_id: ProductId,
        parsed: &ParsedCatalog,
        cancel: &CancelFlag,
    ) -> Result<ReconcileReport, ReconcileError> {
        cancel.checkpoint()?;
        let mut tx = self.store.begin(product_id)?;
        cancel.checkpoint()?;
        let state = tx.fetch_catalog_state()?;

        let mut plan = plan(product_id, parsed, &state)?;
        let stats = plan.stats();
        debug!(?stats, "planned reconciliation");

        let created = execute(&mut tx, &mut plan, cancel)?;

        cancel.checkpoint()?;
        tx.commit()?;

        Ok(ReconcileReport {
            reconcile_id,
            product_id,
            stats,
            options_created: created.options,
            values_created: created.values,
            variants_created: created.variants,
            completed_at: Utc::now(),
        })
    }
}

fn execute<T>(tx: &mut T, plan: &mut ReconcilePlan, cancel: &CancelFlag) -> Result<Created, ReconcileError>
where
    T: CatalogTransaction,
{
    let product_id = plan.product_id;
    let mut created = Created::default();

    // Deletes, children first.
    cancel.checkpoint()?;
    tx.delete_option_values(&plan.delete_values)?;
    cancel.checkpoint()?;
    tx.delete_options(&plan.delete_options)?;
    cancel.checkpoint()?;
    tx.delete_variant_options(&plan.delete_links)?;
    cancel.checkpoint()?;
    tx.delete_variants(&plan.delete_variants)?;

    cancel.checkpoint()?;
    tx.update_options(&plan.update_options)?;
    cancel.checkpoint()?;
    tx.update_option_values(&plan.update_values)?;
    cancel.checkpoint()?;
    tx.update_variants(&plan.update_variants)?;

    // Inserts, parents first; each step registers generated ids for the next.
    let new_options: Vec<NewOption> = plan
        .insert_options
        .iter()
        .map(|o| NewOption {
            product_id,
            name: o.name.clone(),
            position: o.position,
        })
        .collect();
    cancel.checkpoint()?;
    let option_ids = tx.insert_options(&new_options)?;
    ensure_id_count("option", new_options.len(), option_ids.len())?;
    for (row, id) in new_options.iter().zip(&option_ids) {
        plan.correlator.register_option(&row.name, *id)?;
        created.options.insert(row.name.clone(), *id);
    }

    let mut new_values: Vec<NewOptionValue> = plan.insert_values.clone();
    for (pending, option_id) in plan.insert_options.iter().zip(&option_ids) {
        new_values.extend(pending.values.iter().map(|v| NewOptionValue {
            option_id: *option_id,
            name: v.name.clone(),
            position: v.position,
        }));
    }
    cancel.checkpoint()?;
    let value_ids = tx.insert_option_values(&new_values)?;
    ensure_id_count("option value", new_values.len(), value_ids.len())?;
    for (row, id) in new_values.iter().zip(&value_ids) {
        plan.correlator.register_value(row.option_id, &row.name, *id)?;
        created.values.push(CreatedValue {
            option_id: row.option_id,
            name: row.name.clone(),
            id: *id,
        });
    }

    let new_variants: Vec<NewVariant> = plan
        .insert_variants
        .iter()
        .map(|v| NewVariant {
            product_id,
            position: v.position,
            fields: v.fields.clone(),
        })
        .collect();
    cancel.checkpoint()?;
    let variant_ids = tx.insert_variants(&new_variants)?;
    ensure_id_count("variant", new_variants.len(), variant_ids.len())?;
    for (row, id) in new_variants.iter().zip(&variant_ids) {
        plan.correlator.register_variant(row.position, *id)?;
        created.variants.insert(row.position, *id);
    }

    let mut links = Vec::with_capacity(plan.links.len());
    for intent in &plan.links {
        let variant_id = match intent.variant {
            VariantTarget::Existing(id) => id,
            VariantTarget::New(position) => plan.correlator.resolve_variant(position)?,
        };
        let option_id = plan.correlator.resolve_option(&intent.option)?;
        let option_value_id = plan.correlator.resolve_value(option_id, &intent.value)?;
        links.push(NewVariantOption {
            variant_id,
            option_id,
            option_value_id,
        });
    }
    cancel.checkpoint()?;
    let link_ids = tx.insert_variant_options(&links)?;
    ensure_id_count("variant option", links.len(), link_ids.len())?;

    Ok(created)
}

fn ensure_id_count(what: &str, expected: usize, got: usize) -> Result<(), ReconcileError> {
    if expected != got {
        return Err(ReconcileError::Storage(GatewayError::Storage(format!(
            "store returned {got} {what} ids for {expected} rows"
        ))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::InMemoryCatalogStore;

    #[test]
    fn domain_errors_map_onto_the_reconcile_taxonomy() {
        assert!(matches!(
            ReconcileError::from(DomainError::invalid_id("x")),
            ReconcileError::Validation(_)
        ));
        assert!(matches!(
            ReconcileError::from(DomainError::reference("x")),
            ReconcileError::Reference(_)
        ));
        assert!(matches!(
            ReconcileError::from(DomainError::integrity("x")),
            ReconcileError::Integrity(_)
        ));
    }

    #[test]
    fn gateway_errors_map_onto_the_reconcile_taxonomy() {
        assert!(matches!(
            ReconcileError::from(GatewayError::Integrity("dup".into())),
            ReconcileError::Integrity(_)
        ));
        assert!(matches!(
            ReconcileError::from(GatewayError::NotFound("gone".into())),
            ReconcileError::Reference(_)
        ));
        assert!(matches!(
            ReconcileError::from(GatewayError::Storage("io".into())),
            ReconcileError::Storage(_)
        ));
    }

    #[test]
    fn validation_failures_never_touch_storage() {
        let reconciler = Reconciler::new(InMemoryCatalogStore::new());
        let desired = DesiredCatalog {
            options: vec![forgecat_catalog::DesiredOption::new("", ["Red"])],
            variants: vec![],
        };

        let err = reconciler
            .reconcile_catalog(ProductId::new(1), &desired)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        assert_eq!(reconciler.store().calls(), 0);
    }

    #[test]
    fn a_raised_flag_cancels_before_the_first_storage_call() {
        let reconciler = Reconciler::new(InMemoryCatalogStore::new());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = reconciler
            .reconcile_catalog_with(ProductId::new(1), &DesiredCatalog::default(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled));
        assert_eq!(reconciler.store().calls(), 0);
    }

    #[test]
    fn empty_desired_state_on_empty_product_is_a_noop() {
        let reconciler = Reconciler::new(InMemoryCatalogStore::new());
        let report = reconciler
            .reconcile_catalog(ProductId::new(1), &DesiredCatalog::default())
            .unwrap();

        assert_eq!(report.stats, PlanStats::default());
        assert!(report.options_created.is_empty());
        // fetch + commit
        assert_eq!(reconciler.store().calls(), 2);
    }

    #[test]
    fn lock_entries_are_dropped_once_idle() {
        let reconciler = Reconciler::new(InMemoryCatalogStore::new());
        for raw in 1..=20 {
            reconciler
                .reconcile_catalog(ProductId::new(raw), &DesiredCatalog::default())
                .unwrap();
        }
        assert_eq!(reconciler.tracked_products(), 0);

        // Failed runs release too.
        let cancel = CancelFlag::new();
        cancel.cancel();
        let _ = reconciler.reconcile_catalog_with(ProductId::new(1), &DesiredCatalog::default(), &cancel);
        assert_eq!(reconciler.tracked_products(), 0);
    }

    #[test]
    fn a_poisoned_product_lock_does_not_block_later_runs() {
        let reconciler = Arc::new(Reconciler::new(InMemoryCatalogStore::new()));
        let lock = reconciler.product_lock(ProductId::new(1));

        let poisoner = {
            let lock = lock.clone();
            std::thread::spawn(move || {
                let _guard = lock.lock().unwrap();
                panic!("store blew up mid-reconciliation");
            })
        };
        assert!(poisoner.join().is_err());
        assert!(lock.is_poisoned());

        reconciler
            .reconcile_catalog(ProductId::new(1), &DesiredCatalog::default())
            .unwrap();
        drop(lock);
    }

    #[test]
    fn store_is_handed_back_with_its_committed_state() {
        let reconciler = Reconciler::new(InMemoryCatalogStore::new());
        let desired = DesiredCatalog {
            options: vec![forgecat_catalog::DesiredOption::new("Color", ["Red"])],
            variants: vec![],
        };
        reconciler.reconcile_catalog(ProductId::new(3), &desired).unwrap();

        let store = reconciler.into_store();
        assert_eq!(store.snapshot(ProductId::new(3)).unwrap().counts(), (1, 1, 0, 0));
    }
}
