//! Storage for the storefront.
//!
//! # Backends
//!
//! - [`postgres`] - production storage in the `storefront` schema
//! - [`memory`] - process-local maps for development and tests
//!
//! Both implement the same repository traits with the same compare-and-swap
//! semantics: carts are saved against the version they were loaded at, and
//! order payment status only moves if it still has the status the caller
//! observed.
//!
//! # Tables
//!
//! - `products` - catalog
//! - `carts` / `cart_items` - one cart per guest session
//! - `orders` / `order_items` - purchase snapshots
//!
//! # Migrations
//!
//! Migrations live in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p greenhouse-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use greenhouse_core::{
    Cart, Order, OrderId, OrderStatus, PaymentStatus, Product, ProductId, SessionId,
};

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or a lost compare-and-swap.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Catalog listing filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub featured: Option<bool>,
}

impl ProductFilter {
    /// Whether `product` passes this filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        self.category
            .as_deref()
            .is_none_or(|c| product.category.eq_ignore_ascii_case(c))
            && self.featured.is_none_or(|f| product.featured == f)
    }
}

/// Product catalog access.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Products for the given ids. Unknown ids are skipped.
    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Featured first, then newest.
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError>;

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the id already exists.
    async fn insert(&self, product: &Product) -> Result<(), RepositoryError>;
}

/// Session cart persistence.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find(&self, session_id: &SessionId) -> Result<Option<Cart>, RepositoryError>;

    /// Persist `cart` if the stored version still equals `cart.version()`
    /// (version 0 means the cart must not exist yet). Items and total are
    /// written together. Returns the cart stamped with its new version.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another writer got there first.
    async fn save(&self, cart: &Cart) -> Result<Cart, RepositoryError>;
}

/// Order persistence. Orders are append-only apart from payment status,
/// order status and the payment intent id.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn list_for_session(&self, session_id: &SessionId)
    -> Result<Vec<Order>, RepositoryError>;

    /// Record the gateway intent id. Setting the same id again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown order and
    /// `RepositoryError::Conflict` if a different intent is already recorded.
    async fn attach_payment_intent(
        &self,
        id: OrderId,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;

    /// Move the payment status from `from` to `to`, setting `order_status`.
    ///
    /// Returns `None` if the order no longer has payment status `from`.
    async fn transition_payment(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        order_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// `pending` orders created before `cutoff`, oldest first.
    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;
}

#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    Memory,
}

/// Handle to every repository, shared through application state.
#[derive(Clone)]
pub struct Store {
    catalog: Arc<dyn CatalogRepository>,
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
    backend: Backend,
}

impl Store {
    /// Store backed by `PostgreSQL`.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        let repo = Arc::new(postgres::PgStore::new(pool.clone()));
        Self {
            catalog: repo.clone(),
            carts: repo.clone(),
            orders: repo,
            backend: Backend::Postgres(pool),
        }
    }

    /// Empty in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = Arc::new(memory::MemoryStore::default());
        Self {
            catalog: repo.clone(),
            carts: repo.clone(),
            orders: repo,
            backend: Backend::Memory,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogRepository {
        self.catalog.as_ref()
    }

    #[must_use]
    pub fn carts(&self) -> &dyn CartRepository {
        self.carts.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderRepository {
        self.orders.as_ref()
    }

    /// The connection pool, when backed by `PostgreSQL`.
    #[must_use]
    pub const fn pool(&self) -> Option<&PgPool> {
        match &self.backend {
            Backend::Postgres(pool) => Some(pool),
            Backend::Memory => None,
        }
    }

    /// Check that the backend answers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the database is unreachable.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        if let Backend::Postgres(pool) = &self.backend {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply the embedded storefront migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history diverges.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use greenhouse_core::Money;

    use super::*;

    fn product(category: &str, featured: bool) -> Product {
        Product {
            id: ProductId::generate(),
            name: "Pothos Golden".to_string(),
            description: "Trailing vine".to_string(),
            price: Money::from_minor_units(2499).unwrap(),
            image: "pothos.jpg".to_string(),
            category: category.to_string(),
            in_stock: true,
            featured,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(ProductFilter::default().matches(&product("Indoor Plants", false)));
    }

    #[test]
    fn test_filter_category_ignores_case() {
        let filter = ProductFilter {
            category: Some("indoor plants".to_string()),
            featured: None,
        };
        assert!(filter.matches(&product("Indoor Plants", false)));
        assert!(!filter.matches(&product("Succulents", false)));
    }

    #[test]
    fn test_filter_featured() {
        let filter = ProductFilter {
            category: None,
            featured: Some(true),
        };
        assert!(filter.matches(&product("Indoor Plants", true)));
        assert!(!filter.matches(&product("Indoor Plants", false)));
    }

    #[tokio::test]
    async fn test_memory_store_ping() {
        let store = Store::in_memory();
        assert!(store.pool().is_none());
        store.ping().await.unwrap();
    }
}
