//! Catalog products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    /// Image URL or asset path.
    pub image: String,
    pub category: String,
    pub in_stock: bool,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors raised when validating a [`NewProduct`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    #[error("product {0} is required")]
    Missing(&'static str),
}

/// Product definition as it appears in a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image: String,
    pub category: String,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub featured: bool,
}

const fn default_in_stock() -> bool {
    true
}

impl NewProduct {
    /// Validate and stamp a new product with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`ProductError::Missing`] when a required text field is blank.
    pub fn into_product(self, now: DateTime<Utc>) -> Result<Product, ProductError> {
        let name = self.name.trim();
        let category = self.category.trim();
        if name.is_empty() {
            return Err(ProductError::Missing("name"));
        }
        if self.description.trim().is_empty() {
            return Err(ProductError::Missing("description"));
        }
        if self.image.trim().is_empty() {
            return Err(ProductError::Missing("image"));
        }
        if category.is_empty() {
            return Err(ProductError::Missing("category"));
        }

        Ok(Product {
            id: ProductId::generate(),
            name: name.to_owned(),
            description: self.description,
            price: self.price,
            image: self.image,
            category: category.to_owned(),
            in_stock: self.in_stock,
            featured: self.featured,
            created_at: now,
            updated_at: now,
        })
    }
}
