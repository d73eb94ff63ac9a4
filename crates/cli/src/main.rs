//! `forgecat`: apply desired catalog documents to Postgres.
//!
//! Connection settings come from the environment (see `forgecat_infra::config`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use forgecat_catalog::DesiredCatalog;
use forgecat_core::ProductId;
use forgecat_infra::{CancelFlag, PostgresCatalogStore, Reconciler, StoreConfig};

#[derive(Parser)]
#[command(name = "forgecat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the catalog tables
    Migrate,

    /// Make a product's catalog match a desired-state JSON document
    Apply {
        #[arg(value_parser = parse_product_id)]
        product_id: ProductId,

        /// Desired state; `-` reads stdin
        file: PathBuf,
    },

    /// Print a product's catalog as JSON
    Show {
        #[arg(value_parser = parse_product_id)]
        product_id: ProductId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    forgecat_observability::init();
    let cli = Cli::parse();

    let config = StoreConfig::from_env().context("loading store configuration")?;
    tracing::debug!(?config, "connecting");
    let store = PostgresCatalogStore::connect(&config)
        .await
        .context("connecting to postgres")?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await.context("running migrations")?;
            tracing::info!("catalog schema is up to date");
        }
        Commands::Apply { product_id, file } => {
            let desired = read_desired(&file)?;
            let reconciler = Reconciler::new(store);
            let cancel = CancelFlag::new();

            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received, rolling back");
                        cancel.cancel();
                    }
                })
            };

            // The store drives its own futures; keep it off the async workers.
            let report = tokio::task::spawn_blocking(move || {
                reconciler.reconcile_catalog_with(product_id, &desired, &cancel)
            })
            .await
            .context("reconciliation task panicked")?;
            watcher.abort();

            let report = report.with_context(|| format!("reconciling product #{product_id}"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Show { product_id } => {
            let reconciler = Reconciler::new(store);
            let view = tokio::task::spawn_blocking(move || reconciler.load_catalog(product_id))
                .await
                .context("load task panicked")?
                .with_context(|| format!("loading product #{product_id}"))?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}

/// Product ids are storage-generated and positive; `0` means "new" in payloads.
fn parse_product_id(raw: &str) -> Result<ProductId, String> {
    let id: ProductId = raw.parse().map_err(|e: forgecat_core::DomainError| e.to_string())?;
    if id.is_new() {
        return Err("product id must be positive".to_string());
    }
    Ok(id)
}

fn read_desired(file: &Path) -> anyhow::Result<DesiredCatalog> {
    let raw = if file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))
}
