//! Command implementations.

pub mod migrate;
pub mod reconcile;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

use greenhouse_storefront::config::ConfigError;
use greenhouse_storefront::db::RepositoryError;
use greenhouse_storefront::payments::GatewayError;
use greenhouse_storefront::services::CheckoutError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Seed file could not be read or parsed.
    #[error("Seed file error: {0}")]
    SeedFile(String),
}

/// Storefront database URL, with fallback to the generic `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}
