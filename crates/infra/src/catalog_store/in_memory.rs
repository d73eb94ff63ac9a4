use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use forgecat_catalog::{
    CatalogState, NewOption, NewOptionValue, NewVariant, NewVariantOption, OptionRow, OptionUpdate,
    OptionValueRow, OptionValueUpdate, VariantOptionRow, VariantRow, VariantUpdate,
};
use forgecat_core::{OptionId, OptionValueId, ProductId, VariantId, VariantOptionId};

use super::r#trait::{CatalogStore, CatalogTransaction, GatewayError};

/// Committed rows of one product plus an optimistic version counter.
#[derive(Debug, Clone, Default)]
struct ProductTables {
    version: u64,
    options: BTreeMap<OptionId, OptionRow>,
    values: BTreeMap<OptionValueId, OptionValueRow>,
    variants: BTreeMap<VariantId, VariantRow>,
    links: BTreeMap<VariantOptionId, VariantOptionRow>,
}

impl ProductTables {
    fn to_state(&self, product_id: ProductId) -> CatalogState {
        CatalogState {
            product_id,
            options: self.options.values().cloned().collect(),
            values: self.values.values().cloned().collect(),
            variants: self.variants.values().cloned().collect(),
            variant_options: self.links.values().cloned().collect(),
        }
    }

    fn drop_links_where(&mut self, pred: impl Fn(&VariantOptionRow) -> bool) {
        self.links.retain(|_, l| !pred(l));
    }
}

/// In-memory catalog store.
///
/// Intended for tests/dev. Each transaction works on a private copy of its
/// product's rows; commit swaps the copy in if nobody else committed the same
/// product in the meantime. Ids come from one store-wide sequence and are never
/// reused, rolled back or not.
#[derive(Debug)]
pub struct InMemoryCatalogStore {
    products: RwLock<HashMap<ProductId, ProductTables>>,
    next_id: AtomicI64,
    fail_on_call: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            fail_on_call: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th storage call (1-based) of the next transaction fail.
    ///
    /// One-shot: the transaction that picks it up clears it.
    pub fn fail_on_call(&self, n: usize) {
        self.fail_on_call.store(n, Ordering::SeqCst);
    }

    /// Total storage calls served so far, across all transactions.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Committed state of a product.
    pub fn snapshot(&self, product_id: ProductId) -> Result<CatalogState, GatewayError> {
        let products = self
            .products
            .read()
            .map_err(|_| GatewayError::Storage("lock poisoned".to_string()))?;
        Ok(products
            .get(&product_id)
            .map(|t| t.to_state(product_id))
            .unwrap_or_else(|| CatalogState::empty(product_id)))
    }

    /// Install rows verbatim, keeping their ids. Test fixture helper.
    pub fn seed(&self, state: CatalogState) -> Result<(), GatewayError> {
        let mut tables = ProductTables::default();
        let mut max_id = 0;
        for o in state.options {
            max_id = max_id.max(o.id.get());
            tables.options.insert(o.id, o);
        }
        for v in state.values {
            max_id = max_id.max(v.id.get());
            tables.values.insert(v.id, v);
        }
        for v in state.variants {
            max_id = max_id.max(v.id.get());
            tables.variants.insert(v.id, v);
        }
        for l in state.variant_options {
            max_id = max_id.max(l.id.get());
            tables.links.insert(l.id, l);
        }
        self.next_id.fetch_max(max_id + 1, Ordering::SeqCst);

        let mut products = self
            .products
            .write()
            .map_err(|_| GatewayError::Storage("lock poisoned".to_string()))?;
        products.insert(state.product_id, tables);
        Ok(())
    }

    fn allocate(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl CatalogStore for InMemoryCatalogStore {
    type Tx<'a> = InMemoryCatalogTx<'a>;

    fn begin(&self, product_id: ProductId) -> Result<InMemoryCatalogTx<'_>, GatewayError> {
        let work = {
            let products = self
                .products
                .read()
                .map_err(|_| GatewayError::Storage("lock poisoned".to_string()))?;
            products.get(&product_id).cloned().unwrap_or_default()
        };

        Ok(InMemoryCatalogTx {
            store: self,
            product_id,
            work,
            fail_on_call: self.fail_on_call.swap(0, Ordering::SeqCst),
            calls: 0,
        })
    }
}

/// Open transaction of an [`InMemoryCatalogStore`].
#[derive(Debug)]
pub struct InMemoryCatalogTx<'a> {
    store: &'a InMemoryCatalogStore,
    product_id: ProductId,
    work: ProductTables,
    fail_on_call: usize,
    calls: usize,
}

impl InMemoryCatalogTx<'_> {
    fn call(&mut self, operation: &str) -> Result<(), GatewayError> {
        self.calls += 1;
        self.store.calls.fetch_add(1, Ordering::SeqCst);
        if self.calls == self.fail_on_call {
            return Err(GatewayError::Storage(format!(
                "injected failure in {operation} (call {})",
                self.calls
            )));
        }
        Ok(())
    }

    fn check_product(&self, product_id: ProductId, what: &str) -> Result<(), GatewayError> {
        if product_id != self.product_id {
            return Err(GatewayError::Integrity(format!(
                "{what} targets product #{product_id} inside a transaction for #{}",
                self.product_id
            )));
        }
        Ok(())
    }

    /// Deferred constraints: name uniqueness is only checked at commit, so bulk
    /// renames may swap names.
    fn check_unique_names(&self) -> Result<(), GatewayError> {
        let mut option_names = HashSet::new();
        for o in self.work.options.values() {
            if !option_names.insert(o.name.as_str()) {
                return Err(GatewayError::Integrity(format!(
                    "duplicate option name '{}' on product #{}",
                    o.name, self.product_id
                )));
            }
        }
        let mut value_names = HashSet::new();
        for v in self.work.values.values() {
            if !value_names.insert((v.option_id, v.name.as_str())) {
                return Err(GatewayError::Integrity(format!(
                    "duplicate value name '{}' on option #{}",
                    v.name, v.option_id
                )));
            }
        }
        Ok(())
    }
}

impl CatalogTransaction for InMemoryCatalogTx<'_> {
    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn fetch_catalog_state(&mut self) -> Result<CatalogState, GatewayError> {
        self.call("fetch_catalog_state")?;
        Ok(self.work.to_state(self.product_id))
    }

    fn update_options(&mut self, rows: &[OptionUpdate]) -> Result<(), GatewayError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.call("update_options")?;
        for row in rows {
            let option = self
                .work
                .options
                .get_mut(&row.id)
                .ok_or_else(|| GatewayError::NotFound(format!("option #{}", row.id)))?;
            option.name = row.name.clone();
            option.position = row.position;
        }
        Ok(())
    }

    fn insert_options(&mut self, rows: &[NewOption]) -> Result<Vec<OptionId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        self.call("insert_options")?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            self.check_product(row.product_id, "option insert")?;
            let id = OptionId::new(self.store.allocate());
            self.work.options.insert(
                id,
                OptionRow {
                    id,
                    product_id: row.product_id,
                    name: row.name.clone(),
                    position: row.position,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_options(&mut self, ids: &[OptionId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call("delete_options")?;
        for id in ids {
            if self.work.options.remove(id).is_none() {
                return Err(GatewayError::NotFound(format!("option #{id}")));
            }
            self.work.values.retain(|_, v| v.option_id != *id);
            self.work.drop_links_where(|l| l.option_id == *id);
        }
        Ok(())
    }

    fn update_option_values(&mut self, rows: &[OptionValueUpdate]) -> Result<(), GatewayError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.call("update_option_values")?;
        for row in rows {
            let value = self
                .work
                .values
                .get_mut(&row.id)
                .ok_or_else(|| GatewayError::NotFound(format!("option value #{}", row.id)))?;
            value.name = row.name.clone();
            value.position = row.position;
        }
        Ok(())
    }

    fn insert_option_values(&mut self, rows: &[NewOptionValue]) -> Result<Vec<OptionValueId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        self.call("insert_option_values")?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if !self.work.options.contains_key(&row.option_id) {
                return Err(GatewayError::Integrity(format!(
                    "option value '{}' references unknown option #{}",
                    row.name, row.option_id
                )));
            }
            let id = OptionValueId::new(self.store.allocate());
            self.work.values.insert(
                id,
                OptionValueRow {
                    id,
                    option_id: row.option_id,
                    name: row.name.clone(),
                    position: row.position,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_option_values(&mut self, ids: &[OptionValueId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call("delete_option_values")?;
        for id in ids {
            if self.work.values.remove(id).is_none() {
                return Err(GatewayError::NotFound(format!("option value #{id}")));
            }
            self.work.drop_links_where(|l| l.option_value_id == *id);
        }
        Ok(())
    }

    fn update_variants(&mut self, rows: &[VariantUpdate]) -> Result<(), GatewayError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.call("update_variants")?;
        for row in rows {
            let variant = self
                .work
                .variants
                .get_mut(&row.id)
                .ok_or_else(|| GatewayError::NotFound(format!("variant #{}", row.id)))?;
            variant.position = row.position;
            variant.fields = row.fields.clone();
        }
        Ok(())
    }

    fn insert_variants(&mut self, rows: &[NewVariant]) -> Result<Vec<VariantId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        self.call("insert_variants")?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            self.check_product(row.product_id, "variant insert")?;
            let id = VariantId::new(self.store.allocate());
            self.work.variants.insert(
                id,
                VariantRow {
                    id,
                    product_id: row.product_id,
                    position: row.position,
                    fields: row.fields.clone(),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_variants(&mut self, ids: &[VariantId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call("delete_variants")?;
        for id in ids {
            if self.work.variants.remove(id).is_none() {
                return Err(GatewayError::NotFound(format!("variant #{id}")));
            }
            self.work.drop_links_where(|l| l.variant_id == *id);
        }
        Ok(())
    }

    fn insert_variant_options(&mut self, rows: &[NewVariantOption]) -> Result<Vec<VariantOptionId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        self.call("insert_variant_options")?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if !self.work.variants.contains_key(&row.variant_id) {
                return Err(GatewayError::Integrity(format!(
                    "link references variant #{} outside product #{}",
                    row.variant_id, self.product_id
                )));
            }
            if !self.work.options.contains_key(&row.option_id) {
                return Err(GatewayError::Integrity(format!(
                    "link references option #{} outside product #{}",
                    row.option_id, self.product_id
                )));
            }
            match self.work.values.get(&row.option_value_id) {
                Some(value) if value.option_id == row.option_id => {}
                _ => {
                    return Err(GatewayError::Integrity(format!(
                        "option value #{} is not a value of option #{}",
                        row.option_value_id, row.option_id
                    )));
                }
            }
            let taken = self
                .work
                .links
                .values()
                .any(|l| l.variant_id == row.variant_id && l.option_id == row.option_id);
            if taken {
                return Err(GatewayError::Integrity(format!(
                    "variant #{} already selects a value for option #{}",
                    row.variant_id, row.option_id
                )));
            }

            let id = VariantOptionId::new(self.store.allocate());
            self.work.links.insert(
                id,
                VariantOptionRow {
                    id,
                    variant_id: row.variant_id,
                    option_id: row.option_id,
                    option_value_id: row.option_value_id,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_variant_options(&mut self, ids: &[VariantOptionId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call("delete_variant_options")?;
        for id in ids {
            if self.work.links.remove(id).is_none() {
                return Err(GatewayError::NotFound(format!("variant option #{id}")));
            }
        }
        Ok(())
    }

    fn commit(mut self) -> Result<(), GatewayError> {
        self.call("commit")?;
        self.check_unique_names()?;

        let store = self.store;
        let mut products = store
            .products
            .write()
            .map_err(|_| GatewayError::Storage("lock poisoned".to_string()))?;
        let current = products.get(&self.product_id).map(|t| t.version).unwrap_or(0);
        if current != self.work.version {
            return Err(GatewayError::Storage(format!(
                "product #{} was modified concurrently (expected version {}, found {current})",
                self.product_id, self.work.version
            )));
        }

        self.work.version += 1;
        products.insert(self.product_id, self.work);
        Ok(())
    }
}
