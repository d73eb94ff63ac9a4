//! Postgres-backed catalog store.
//!
//! Schema lives in `migrations/0001_catalog.sql`. Every bulk call is a single
//! statement over `UNNEST` arrays; every statement is scoped by the product the
//! transaction was opened for.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | GatewayError | Scenario |
//! |------------|----------------------|--------------|----------|
//! | Database (unique violation) | `23505` | `Integrity` | Duplicate option/value name, second link on one axis |
//! | Database (foreign key violation) | `23503` | `Integrity` | Link to a foreign option, variant or value |
//! | Database (check constraint violation) | `23514` | `Integrity` | Blank name |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / Io / Tls / other | N/A | `Storage` | Connection failures |
//!
//! ## Serialization
//!
//! `begin` takes `pg_advisory_xact_lock(product_id)`, so two reconciliations of
//! the same product queue up in the database even across processes. The lock is
//! released with the transaction.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::runtime::Handle;
use tracing::{Span, instrument};

use forgecat_catalog::{
    CatalogState, NewOption, NewOptionValue, NewVariant, NewVariantOption, OptionRow, OptionUpdate,
    OptionValueRow, OptionValueUpdate, VariantFields, VariantOptionRow, VariantRow, VariantUpdate,
};
use forgecat_core::{OptionId, OptionValueId, ProductId, VariantId, VariantOptionId};

use super::r#trait::{CatalogStore, CatalogTransaction, GatewayError};
use crate::config::StoreConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_catalog.sql");

/// Postgres-backed catalog store.
///
/// The [`CatalogStore`] trait is synchronous; each call runs on the current
/// tokio runtime via [`Handle::block_on`]. Call it from a blocking context
/// (`spawn_blocking` or a plain thread holding a runtime handle), never directly
/// from an async task.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using `config`.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &StoreConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the catalog tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), GatewayError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn open(&self, product_id: ProductId) -> Result<Transaction<'static, Postgres>, GatewayError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(product_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("advisory_lock", e))?;

        Ok(tx)
    }
}

fn runtime_handle() -> Result<Handle, GatewayError> {
    Handle::try_current().map_err(|_| {
        GatewayError::Storage(
            "PostgresCatalogStore requires a tokio runtime; call it from spawn_blocking or a thread holding a runtime handle"
                .to_string(),
        )
    })
}

impl CatalogStore for PostgresCatalogStore {
    type Tx<'a> = PostgresCatalogTx;

    fn begin(&self, product_id: ProductId) -> Result<PostgresCatalogTx, GatewayError> {
        let handle = runtime_handle()?;
        let tx = handle.block_on(self.open(product_id))?;
        Ok(PostgresCatalogTx {
            handle,
            product_id,
            tx,
        })
    }
}

/// Open transaction of a [`PostgresCatalogStore`].
///
/// Dropping it without [`commit`](CatalogTransaction::commit) rolls back.
pub struct PostgresCatalogTx {
    handle: Handle,
    product_id: ProductId,
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresCatalogTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCatalogTx")
            .field("product_id", &self.product_id)
            .finish_non_exhaustive()
    }
}

type VariantTuple = (i64, i64, i32, String, i64, i64, i32, Option<String>);

impl PostgresCatalogTx {
    #[instrument(skip(self), fields(product_id = %self.product_id, rows = tracing::field::Empty), err)]
    async fn load_state(&mut self) -> Result<CatalogState, GatewayError> {
        let pid = self.product_id.get();

        let options: Vec<(i64, i64, String, i32)> = sqlx::query_as(
            r#"
            SELECT id, product_id, name, position
            FROM product_options
            WHERE product_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(pid)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_options", e))?;

        let values: Vec<(i64, i64, String, i32)> = sqlx::query_as(
            r#"
            SELECT v.id, v.option_id, v.name, v.position
            FROM product_option_values v
            JOIN product_options o ON o.id = v.option_id
            WHERE o.product_id = $1
            ORDER BY v.option_id, v.position, v.id
            "#,
        )
        .bind(pid)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_option_values", e))?;

        let variants: Vec<VariantTuple> = sqlx::query_as(
            r#"
            SELECT id, product_id, position, sku, origin_price, sale_price, stock, image
            FROM product_variants
            WHERE product_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(pid)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_variants", e))?;

        let links: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, variant_id, option_id, option_value_id
            FROM product_variant_options
            WHERE product_id = $1
            ORDER BY variant_id, id
            "#,
        )
        .bind(pid)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_variant_options", e))?;

        let state = CatalogState {
            product_id: self.product_id,
            options: options
                .into_iter()
                .map(|(id, product_id, name, position)| OptionRow {
                    id: OptionId::new(id),
                    product_id: ProductId::new(product_id),
                    name,
                    position,
                })
                .collect(),
            values: values
                .into_iter()
                .map(|(id, option_id, name, position)| OptionValueRow {
                    id: OptionValueId::new(id),
                    option_id: OptionId::new(option_id),
                    name,
                    position,
                })
                .collect(),
            variants: variants
                .into_iter()
                .map(
                    |(id, product_id, position, sku, origin_price, sale_price, stock, image)| VariantRow {
                        id: VariantId::new(id),
                        product_id: ProductId::new(product_id),
                        position,
                        fields: VariantFields {
                            sku,
                            origin_price,
                            sale_price,
                            stock,
                            image,
                        },
                    },
                )
                .collect(),
            variant_options: links
                .into_iter()
                .map(|(id, variant_id, option_id, option_value_id)| VariantOptionRow {
                    id: VariantOptionId::new(id),
                    variant_id: VariantId::new(variant_id),
                    option_id: OptionId::new(option_id),
                    option_value_id: OptionValueId::new(option_value_id),
                })
                .collect(),
        };

        let (o, v, va, l) = state.counts();
        Span::current().record("rows", o + v + va + l);
        Ok(state)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_update_options(&mut self, rows: &[OptionUpdate]) -> Result<(), GatewayError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id.get()).collect();
        let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();

        let affected = sqlx::query(
            r#"
            UPDATE product_options AS o
            SET name = u.name, position = u.position
            FROM UNNEST($1::bigint[], $2::text[], $3::integer[]) AS u(id, name, position)
            WHERE o.id = u.id AND o.product_id = $4
            "#,
        )
        .bind(&ids)
        .bind(&names)
        .bind(&positions)
        .bind(self.product_id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_options", e))?
        .rows_affected();

        expect_affected("option", rows.len(), affected)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_insert_options(&mut self, rows: &[NewOption]) -> Result<Vec<OptionId>, GatewayError> {
        if let Some(foreign) = rows.iter().find(|r| r.product_id != self.product_id) {
            return Err(GatewayError::Integrity(format!(
                "option insert targets product #{} inside a transaction for #{}",
                foreign.product_id, self.product_id
            )));
        }
        let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();

        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO product_options (product_id, name, position)
            SELECT $1, u.name, u.position
            FROM UNNEST($2::text[], $3::integer[]) WITH ORDINALITY AS u(name, position, ord)
            ORDER BY u.ord
            RETURNING id
            "#,
        )
        .bind(self.product_id.get())
        .bind(&names)
        .bind(&positions)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_options", e))?;

        Ok(in_input_order(ids).into_iter().map(OptionId::new).collect())
    }

    #[instrument(skip(self, ids), fields(product_id = %self.product_id, count = ids.len()), err)]
    async fn bulk_delete_options(&mut self, ids: &[OptionId]) -> Result<(), GatewayError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let affected = sqlx::query("DELETE FROM product_options WHERE product_id = $1 AND id = ANY($2)")
            .bind(self.product_id.get())
            .bind(&raw)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_options", e))?
            .rows_affected();

        expect_affected("option", ids.len(), affected)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_update_values(&mut self, rows: &[OptionValueUpdate]) -> Result<(), GatewayError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id.get()).collect();
        let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();

        let affected = sqlx::query(
            r#"
            UPDATE product_option_values AS v
            SET name = u.name, position = u.position
            FROM UNNEST($1::bigint[], $2::text[], $3::integer[]) AS u(id, name, position),
                 product_options AS o
            WHERE v.id = u.id AND o.id = v.option_id AND o.product_id = $4
            "#,
        )
        .bind(&ids)
        .bind(&names)
        .bind(&positions)
        .bind(self.product_id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_option_values", e))?
        .rows_affected();

        expect_affected("option value", rows.len(), affected)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_insert_values(&mut self, rows: &[NewOptionValue]) -> Result<Vec<OptionValueId>, GatewayError> {
        let option_ids: Vec<i64> = rows.iter().map(|r| r.option_id.get()).collect();
        let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();

        // The join drops rows whose option belongs to another product.
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO product_option_values (option_id, name, position)
            SELECT u.option_id, u.name, u.position
            FROM UNNEST($1::bigint[], $2::text[], $3::integer[]) WITH ORDINALITY AS u(option_id, name, position, ord)
            JOIN product_options o ON o.id = u.option_id AND o.product_id = $4
            ORDER BY u.ord
            RETURNING id
            "#,
        )
        .bind(&option_ids)
        .bind(&names)
        .bind(&positions)
        .bind(self.product_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_option_values", e))?;

        if ids.len() != rows.len() {
            return Err(GatewayError::Integrity(format!(
                "{} of {} option values reference options outside product #{}",
                rows.len() - ids.len(),
                rows.len(),
                self.product_id
            )));
        }
        Ok(in_input_order(ids).into_iter().map(OptionValueId::new).collect())
    }

    #[instrument(skip(self, ids), fields(product_id = %self.product_id, count = ids.len()), err)]
    async fn bulk_delete_values(&mut self, ids: &[OptionValueId]) -> Result<(), GatewayError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let affected = sqlx::query(
            r#"
            DELETE FROM product_option_values AS v
            USING product_options AS o
            WHERE o.id = v.option_id AND o.product_id = $1 AND v.id = ANY($2)
            "#,
        )
        .bind(self.product_id.get())
        .bind(&raw)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("delete_option_values", e))?
        .rows_affected();

        expect_affected("option value", ids.len(), affected)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_update_variants(&mut self, rows: &[VariantUpdate]) -> Result<(), GatewayError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id.get()).collect();
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();
        let (skus, origin_prices, sale_prices, stocks, images) = variant_columns(rows.iter().map(|r| &r.fields));

        let affected = sqlx::query(
            r#"
            UPDATE product_variants AS pv
            SET position = u.position,
                sku = u.sku,
                origin_price = u.origin_price,
                sale_price = u.sale_price,
                stock = u.stock,
                image = u.image
            FROM UNNEST($1::bigint[], $2::integer[], $3::text[], $4::bigint[], $5::bigint[], $6::integer[], $7::text[])
                AS u(id, position, sku, origin_price, sale_price, stock, image)
            WHERE pv.id = u.id AND pv.product_id = $8
            "#,
        )
        .bind(&ids)
        .bind(&positions)
        .bind(&skus)
        .bind(&origin_prices)
        .bind(&sale_prices)
        .bind(&stocks)
        .bind(&images)
        .bind(self.product_id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_variants", e))?
        .rows_affected();

        expect_affected("variant", rows.len(), affected)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_insert_variants(&mut self, rows: &[NewVariant]) -> Result<Vec<VariantId>, GatewayError> {
        if let Some(foreign) = rows.iter().find(|r| r.product_id != self.product_id) {
            return Err(GatewayError::Integrity(format!(
                "variant insert targets product #{} inside a transaction for #{}",
                foreign.product_id, self.product_id
            )));
        }
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();
        let (skus, origin_prices, sale_prices, stocks, images) = variant_columns(rows.iter().map(|r| &r.fields));

        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO product_variants (product_id, position, sku, origin_price, sale_price, stock, image)
            SELECT $1, u.position, u.sku, u.origin_price, u.sale_price, u.stock, u.image
            FROM UNNEST($2::integer[], $3::text[], $4::bigint[], $5::bigint[], $6::integer[], $7::text[])
                WITH ORDINALITY AS u(position, sku, origin_price, sale_price, stock, image, ord)
            ORDER BY u.ord
            RETURNING id
            "#,
        )
        .bind(self.product_id.get())
        .bind(&positions)
        .bind(&skus)
        .bind(&origin_prices)
        .bind(&sale_prices)
        .bind(&stocks)
        .bind(&images)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_variants", e))?;

        Ok(in_input_order(ids).into_iter().map(VariantId::new).collect())
    }

    #[instrument(skip(self, ids), fields(product_id = %self.product_id, count = ids.len()), err)]
    async fn bulk_delete_variants(&mut self, ids: &[VariantId]) -> Result<(), GatewayError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let affected = sqlx::query("DELETE FROM product_variants WHERE product_id = $1 AND id = ANY($2)")
            .bind(self.product_id.get())
            .bind(&raw)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_variants", e))?
            .rows_affected();

        expect_affected("variant", ids.len(), affected)
    }

    #[instrument(skip(self, rows), fields(product_id = %self.product_id, count = rows.len()), err)]
    async fn bulk_insert_links(&mut self, rows: &[NewVariantOption]) -> Result<Vec<VariantOptionId>, GatewayError> {
        let variant_ids: Vec<i64> = rows.iter().map(|r| r.variant_id.get()).collect();
        let option_ids: Vec<i64> = rows.iter().map(|r| r.option_id.get()).collect();
        let value_ids: Vec<i64> = rows.iter().map(|r| r.option_value_id.get()).collect();

        // Composite foreign keys reject links that leave the product or pair a
        // value with someone else's option.
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO product_variant_options (product_id, variant_id, option_id, option_value_id)
            SELECT $1, u.variant_id, u.option_id, u.option_value_id
            FROM UNNEST($2::bigint[], $3::bigint[], $4::bigint[])
                WITH ORDINALITY AS u(variant_id, option_id, option_value_id, ord)
            ORDER BY u.ord
            RETURNING id
            "#,
        )
        .bind(self.product_id.get())
        .bind(&variant_ids)
        .bind(&option_ids)
        .bind(&value_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_variant_options", e))?;

        Ok(in_input_order(ids).into_iter().map(VariantOptionId::new).collect())
    }

    #[instrument(skip(self, ids), fields(product_id = %self.product_id, count = ids.len()), err)]
    async fn bulk_delete_links(&mut self, ids: &[VariantOptionId]) -> Result<(), GatewayError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let affected = sqlx::query("DELETE FROM product_variant_options WHERE product_id = $1 AND id = ANY($2)")
            .bind(self.product_id.get())
            .bind(&raw)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_variant_options", e))?
            .rows_affected();

        expect_affected("variant option", ids.len(), affected)
    }
}

impl CatalogTransaction for PostgresCatalogTx {
    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn fetch_catalog_state(&mut self) -> Result<CatalogState, GatewayError> {
        let handle = self.handle.clone();
        handle.block_on(self.load_state())
    }

    fn update_options(&mut self, rows: &[OptionUpdate]) -> Result<(), GatewayError> {
        if rows.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_update_options(rows))
    }

    fn insert_options(&mut self, rows: &[NewOption]) -> Result<Vec<OptionId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_insert_options(rows))
    }

    fn delete_options(&mut self, ids: &[OptionId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_delete_options(ids))
    }

    fn update_option_values(&mut self, rows: &[OptionValueUpdate]) -> Result<(), GatewayError> {
        if rows.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_update_values(rows))
    }

    fn insert_option_values(&mut self, rows: &[NewOptionValue]) -> Result<Vec<OptionValueId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_insert_values(rows))
    }

    fn delete_option_values(&mut self, ids: &[OptionValueId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_delete_values(ids))
    }

    fn update_variants(&mut self, rows: &[VariantUpdate]) -> Result<(), GatewayError> {
        if rows.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_update_variants(rows))
    }

    fn insert_variants(&mut self, rows: &[NewVariant]) -> Result<Vec<VariantId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_insert_variants(rows))
    }

    fn delete_variants(&mut self, ids: &[VariantId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_delete_variants(ids))
    }

    fn insert_variant_options(&mut self, rows: &[NewVariantOption]) -> Result<Vec<VariantOptionId>, GatewayError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_insert_links(rows))
    }

    fn delete_variant_options(&mut self, ids: &[VariantOptionId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        let handle = self.handle.clone();
        handle.block_on(self.bulk_delete_links(ids))
    }

    fn commit(self) -> Result<(), GatewayError> {
        let Self { handle, tx, .. } = self;
        // Deferred name constraints fire here.
        handle
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

/// Ids drawn from a BIGSERIAL in insertion order, which the `ORDER BY ord`
/// inserts pin to input order.
fn in_input_order(rows: Vec<(i64,)>) -> Vec<i64> {
    let mut ids: Vec<i64> = rows.into_iter().map(|(id,)| id).collect();
    ids.sort_unstable();
    ids
}

type VariantColumns = (Vec<String>, Vec<i64>, Vec<i64>, Vec<i32>, Vec<Option<String>>);

fn variant_columns<'a>(fields: impl Iterator<Item = &'a VariantFields>) -> VariantColumns {
    let mut columns: VariantColumns = Default::default();
    for f in fields {
        columns.0.push(f.sku.clone());
        columns.1.push(f.origin_price);
        columns.2.push(f.sale_price);
        columns.3.push(f.stock);
        columns.4.push(f.image.clone());
    }
    columns
}

fn expect_affected(what: &str, expected: usize, affected: u64) -> Result<(), GatewayError> {
    if affected != expected as u64 {
        return Err(GatewayError::NotFound(format!(
            "{} of {expected} {what} rows are not owned by the product",
            expected as u64 - affected.min(expected as u64)
        )));
    }
    Ok(())
}

/// Map SQLx errors to GatewayError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> GatewayError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique, foreign key, check
                Some("23505") | Some("23503") | Some("23514") => GatewayError::Integrity(msg),
                _ => GatewayError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => GatewayError::Storage(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => GatewayError::Storage(format!("connection pool timed out in {operation}")),
        sqlx::Error::RowNotFound => GatewayError::NotFound(format!("unexpected row not found in {operation}")),
        _ => GatewayError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
