//! Session cart operations.
//!
//! Every mutation runs under the session's lock as load → modify → save,
//! and the save is checked against the version that was loaded. Items and
//! total are written together, so no caller ever sees a stale total.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, instrument};

use greenhouse_core::{Cart, CartError, CartItemId, ProductId, Quantity, SessionId};

use super::locks::SessionLocks;
use crate::db::{RepositoryError, Store};

/// Attempts at a cart save before giving up on concurrent writers.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Errors raised by cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error("product not found")]
    ProductNotFound(ProductId),
    #[error("product is out of stock")]
    OutOfStock(ProductId),
    #[error("cart not found")]
    CartNotFound,
    #[error("cart item not found")]
    ItemNotFound(CartItemId),
    #[error(transparent)]
    Cart(CartError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<CartError> for CartServiceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(id) => Self::ItemNotFound(id),
            other => Self::Cart(other),
        }
    }
}

/// What to do when a session has no stored cart.
#[derive(Debug, Clone, Copy)]
enum MissingCart {
    StartEmpty,
    NotFound,
}

/// Cart operations for guest sessions.
#[derive(Clone)]
pub struct CartService {
    store: Store,
    locks: SessionLocks,
}

impl CartService {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: SessionLocks::new(),
        }
    }

    /// The session's cart, or an unsaved empty one. Never writes.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` if the store fails.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn get_or_empty(&self, session_id: &SessionId) -> Result<Cart, CartServiceError> {
        Ok(self
            .store
            .carts()
            .find(session_id)
            .await?
            .unwrap_or_else(|| Cart::empty(session_id.clone(), Utc::now())))
    }

    /// Add `quantity` units of a product at its current catalog price.
    ///
    /// Creates the cart on first use. A product already in the cart has its
    /// line quantity increased and keeps the price captured earlier.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity` (via `Cart`), `ProductNotFound`, `OutOfStock`, or a
    /// repository failure.
    #[instrument(skip(self), fields(session_id = %session_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        session_id: &SessionId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart, CartServiceError> {
        let quantity = Quantity::new(quantity)?;
        let product = self
            .store
            .catalog()
            .get(product_id)
            .await?
            .ok_or(CartServiceError::ProductNotFound(product_id))?;
        if !product.in_stock {
            return Err(CartServiceError::OutOfStock(product_id));
        }

        self.mutate(session_id, MissingCart::StartEmpty, |cart, now| {
            cart.add_item(product.id, product.price, quantity, now)?;
            Ok(true)
        })
        .await
    }

    /// Replace one line's quantity.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity` (checked first), `CartNotFound`, `ItemNotFound`, or a
    /// repository failure. The cart is unchanged on error.
    #[instrument(skip(self), fields(session_id = %session_id, item_id = %item_id))]
    pub async fn set_item_quantity(
        &self,
        session_id: &SessionId,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<Cart, CartServiceError> {
        let quantity = Quantity::new(quantity)?;
        self.mutate(session_id, MissingCart::NotFound, |cart, now| {
            cart.set_quantity(item_id, quantity, now)?;
            Ok(true)
        })
        .await
    }

    /// Remove one line. Removing an item that is not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// `CartNotFound` or a repository failure.
    #[instrument(skip(self), fields(session_id = %session_id, item_id = %item_id))]
    pub async fn remove_item(
        &self,
        session_id: &SessionId,
        item_id: CartItemId,
    ) -> Result<Cart, CartServiceError> {
        self.mutate(session_id, MissingCart::NotFound, |cart, now| {
            Ok(cart.remove_item(item_id, now))
        })
        .await
    }

    /// Empty the cart and zero its total. The cart record is kept.
    ///
    /// # Errors
    ///
    /// `CartNotFound` or a repository failure.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn clear(&self, session_id: &SessionId) -> Result<Cart, CartServiceError> {
        self.mutate(session_id, MissingCart::NotFound, |cart, now| {
            cart.clear(now);
            Ok(true)
        })
        .await
    }

    /// Best-effort clear used after a successful payment.
    ///
    /// Returns `true` when the cart is empty afterwards (including when the
    /// session never had one) and `false` if clearing failed. Failures are
    /// logged, not propagated.
    pub async fn clear_session_cart(&self, session_id: &SessionId) -> bool {
        match self.clear(session_id).await {
            Ok(_) | Err(CartServiceError::CartNotFound) => true,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to clear cart");
                false
            }
        }
    }

    /// Load, apply `change`, and save if it reports a modification.
    ///
    /// A save that loses to a concurrent writer is retried from a fresh load.
    async fn mutate<F>(
        &self,
        session_id: &SessionId,
        missing: MissingCart,
        mut change: F,
    ) -> Result<Cart, CartServiceError>
    where
        F: FnMut(&mut Cart, DateTime<Utc>) -> Result<bool, CartError> + Send,
    {
        let _guard = self.locks.acquire(session_id).await;
        let carts = self.store.carts();

        let mut attempt = 1;
        loop {
            let now = Utc::now();
            let mut cart = match (carts.find(session_id).await?, missing) {
                (Some(cart), _) => cart,
                (None, MissingCart::StartEmpty) => Cart::empty(session_id.clone(), now),
                (None, MissingCart::NotFound) => return Err(CartServiceError::CartNotFound),
            };

            if !change(&mut cart, now)? {
                return Ok(cart);
            }

            match carts.save(&cart).await {
                Ok(saved) => return Ok(saved),
                Err(RepositoryError::Conflict(reason)) if attempt < MAX_SAVE_ATTEMPTS => {
                    debug!(attempt, reason = %reason, "Cart save conflicted, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use greenhouse_core::{Money, Product, recompute_total};
    use rust_decimal::Decimal;

    use super::*;

    fn session() -> SessionId {
        SessionId::parse("guest_cart_service").unwrap()
    }

    async fn product(store: &Store, price: &str, in_stock: bool) -> Product {
        let product = Product {
            id: ProductId::generate(),
            name: format!("Plant {price}"),
            description: "Green".to_string(),
            price: Money::new(price.parse::<Decimal>().unwrap()).unwrap(),
            image: "plant.jpg".to_string(),
            category: "Indoor Plants".to_string(),
            in_stock,
            featured: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.catalog().insert(&product).await.unwrap();
        product
    }

    fn service() -> (CartService, Store) {
        let store = Store::in_memory();
        (CartService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_get_does_not_create_cart() {
        let (carts, store) = service();

        let cart = carts.get_or_empty(&session()).await.unwrap();
        assert!(cart.is_empty());
        assert!(cart.total().is_zero());
        assert!(store.carts().find(&session()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_twice_merges_into_one_line() {
        let (carts, store) = service();
        let p = product(&store, "10.00", true).await;

        carts.add_item(&session(), p.id, 2).await.unwrap();
        let cart = carts.add_item(&session(), p.id, 2).await.unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 4);
        assert_eq!(cart.total().to_string(), "40.00");
    }

    #[tokio::test]
    async fn test_add_missing_product() {
        let (carts, _) = service();
        let err = carts
            .add_item(&session(), ProductId::generate(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CartServiceError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_add_out_of_stock() {
        let (carts, store) = service();
        let p = product(&store, "5", false).await;
        let err = carts.add_item(&session(), p.id, 1).await.unwrap_err();
        assert!(matches!(err, CartServiceError::OutOfStock(_)));
        assert!(store.carts().find(&session()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_zero_quantity_rejected() {
        let (carts, store) = service();
        let p = product(&store, "5", true).await;
        let err = carts.add_item(&session(), p.id, 0).await.unwrap_err();
        assert!(matches!(
            err,
            CartServiceError::Cart(CartError::InvalidQuantity(0))
        ));
    }

    #[tokio::test]
    async fn test_set_quantity_zero_leaves_cart_unchanged() {
        let (carts, store) = service();
        let p = product(&store, "3.50", true).await;
        let before = carts.add_item(&session(), p.id, 2).await.unwrap();
        let item_id = before.items()[0].id;

        let err = carts
            .set_item_quantity(&session(), item_id, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartServiceError::Cart(CartError::InvalidQuantity(0))
        ));

        let after = carts.get_or_empty(&session()).await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_set_quantity_validates_before_lookup() {
        let (carts, _) = service();
        let err = carts
            .set_item_quantity(&session(), CartItemId::generate(), -1)
            .await
            .unwrap_err();
        assert!(matches!(err, CartServiceError::Cart(_)));
    }

    #[tokio::test]
    async fn test_set_quantity_missing_cart_and_item() {
        let (carts, store) = service();
        let err = carts
            .set_item_quantity(&session(), CartItemId::generate(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CartServiceError::CartNotFound));

        let p = product(&store, "1", true).await;
        carts.add_item(&session(), p.id, 1).await.unwrap();
        let err = carts
            .set_item_quantity(&session(), CartItemId::generate(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CartServiceError::ItemNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_missing_item_is_noop() {
        let (carts, store) = service();
        let p = product(&store, "8", true).await;
        let before = carts.add_item(&session(), p.id, 1).await.unwrap();

        let after = carts
            .remove_item(&session(), CartItemId::generate())
            .await
            .unwrap();
        assert_eq!(after, before);
        assert_eq!(after.version(), before.version());
    }

    #[tokio::test]
    async fn test_remove_and_clear_require_cart() {
        let (carts, _) = service();
        assert!(matches!(
            carts.remove_item(&session(), CartItemId::generate()).await,
            Err(CartServiceError::CartNotFound)
        ));
        assert!(matches!(
            carts.clear(&session()).await,
            Err(CartServiceError::CartNotFound)
        ));
    }

    #[tokio::test]
    async fn test_clear_keeps_empty_cart_record() {
        let (carts, store) = service();
        let p = product(&store, "8", true).await;
        carts.add_item(&session(), p.id, 3).await.unwrap();

        let cleared = carts.clear(&session()).await.unwrap();
        assert!(cleared.is_empty());
        assert!(cleared.total().is_zero());

        let stored = store.carts().find(&session()).await.unwrap().unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_clear_session_cart_without_cart() {
        let (carts, _) = service();
        assert!(carts.clear_session_cart(&session()).await);
    }

    #[tokio::test]
    async fn test_total_invariant_over_mixed_operations() {
        let (carts, store) = service();
        let a = product(&store, "4.25", true).await;
        let b = product(&store, "19.99", true).await;

        carts.add_item(&session(), a.id, 3).await.unwrap();
        let cart = carts.add_item(&session(), b.id, 1).await.unwrap();
        let b_line = cart.items()[1].id;
        carts.set_item_quantity(&session(), b_line, 5).await.unwrap();
        let a_line = cart.items()[0].id;
        let cart = carts.remove_item(&session(), a_line).await.unwrap();

        assert_eq!(cart.total(), recompute_total(cart.items()).unwrap());
        assert_eq!(cart.total().to_string(), "99.95");
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let (carts, store) = service();
        let product_id = product(&store, "1", true).await.id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let carts = carts.clone();
            handles.push(tokio::spawn(async move {
                carts.add_item(&session(), product_id, 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let cart = carts.get_or_empty(&session()).await.unwrap();
        assert_eq!(cart.items()[0].quantity, 20);
        assert_eq!(cart.total().to_string(), "20.00");
    }
}
