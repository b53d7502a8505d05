//! Settle stale `pending` orders against the payment gateway.
//!
//! # Usage
//!
//! ```bash
//! # Use STOREFRONT_PENDING_ORDER_TTL_MINUTES (default 24h)
//! greenhouse-cli reconcile
//!
//! # Anything pending for more than an hour
//! greenhouse-cli reconcile --older-than-minutes 60
//! ```
//!
//! Reads the full storefront configuration, including `STRIPE_SECRET_KEY`.
//! Session carts are never touched.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use greenhouse_storefront::config::{StorageConfig, StorefrontConfig};
use greenhouse_storefront::db::{self, Store};
use greenhouse_storefront::payments::StripeClient;
use greenhouse_storefront::services::{CartService, CheckoutService};

use super::CommandError;

/// Run one reconciliation pass.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the store is unreachable,
/// or listing pending orders fails. Per-order gateway failures are counted
/// in the summary instead.
pub async fn run(older_than_minutes: Option<u64>) -> Result<(), CommandError> {
    let config = StorefrontConfig::from_env()?;

    let store = match &config.storage {
        StorageConfig::Postgres { database_url } => {
            Store::postgres(db::create_pool(database_url).await?)
        }
        StorageConfig::Memory => Store::in_memory(),
    };
    let gateway = StripeClient::new(&config.payments)?;
    let checkout = CheckoutService::new(
        store.clone(),
        Arc::new(gateway),
        CartService::new(store),
        config.currency,
    );

    let older_than = older_than_minutes.map_or(config.pending_order_ttl, |minutes| {
        Duration::from_secs(minutes.saturating_mul(60))
    });
    info!(older_than_secs = older_than.as_secs(), "Reconciling pending orders");

    let report = checkout.reconcile_stale(older_than).await?;

    info!("Reconciliation complete!");
    info!("  Orders examined: {}", report.examined);
    info!("  Marked paid: {}", report.paid);
    info!("  Marked failed: {}", report.failed);
    info!("  Errors (left pending): {}", report.errors);
    Ok(())
}
