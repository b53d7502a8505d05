//! Seed the catalog from a YAML file.
//!
//! The file is a list of products (`name`, `description`, `price`, `image`,
//! `category`, optional `inStock` and `featured`). Products whose name is
//! already in the catalog are skipped, so the command can be re-run.

use std::path::Path;

use chrono::Utc;
use tracing::{error, info};

use greenhouse_core::NewProduct;
use greenhouse_storefront::db::{self, CatalogRepository, Store};

use super::{CommandError, database_url};

/// Outcome of a seeding run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Parse a seed file's contents.
///
/// # Errors
///
/// Returns `CommandError::SeedFile` for malformed YAML or invalid prices.
pub fn parse_products(content: &str) -> Result<Vec<NewProduct>, CommandError> {
    serde_yaml::from_str(content).map_err(|e| CommandError::SeedFile(e.to_string()))
}

/// Insert every product not already present by name.
///
/// # Errors
///
/// Returns `CommandError::SeedFile` for a product with a blank required
/// field, or a repository error.
pub async fn seed_catalog(
    catalog: &dyn CatalogRepository,
    products: Vec<NewProduct>,
) -> Result<SeedReport, CommandError> {
    let mut report = SeedReport::default();

    for new in products {
        if catalog.find_by_name(new.name.trim()).await?.is_some() {
            info!(name = %new.name, "Skipping existing product");
            report.skipped += 1;
            continue;
        }

        let name = new.name.clone();
        let product = new
            .into_product(Utc::now())
            .map_err(|e| CommandError::SeedFile(format!("{name}: {e}")))?;
        catalog.insert(&product).await?;
        info!(name = %product.name, price = %product.price, category = %product.category, "Added product");
        report.inserted += 1;
    }

    Ok(report)
}

/// Seed products from a YAML file into the storefront database.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or database
/// operations fail.
pub async fn products(file_path: &Path) -> Result<(), CommandError> {
    let database_url = database_url()?;

    info!(path = %file_path.display(), "Loading products from file");
    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|e| CommandError::SeedFile(format!("{}: {e}", file_path.display())))?;

    // Validate before connecting to the database
    let products = parse_products(&content)?;
    info!(products = products.len(), "Parsed seed file");

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let store = Store::postgres(pool);
    match seed_catalog(store.catalog(), products).await {
        Ok(report) => {
            info!("Seeding complete!");
            info!("  Products inserted: {}", report.inserted);
            info!("  Products skipped (already exist): {}", report.skipped);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Seeding stopped");
            Err(e)
        }
    }
}
