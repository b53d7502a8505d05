//! In-memory storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use greenhouse_core::{
    Cart, Order, OrderId, OrderStatus, PaymentStatus, Product, ProductId, SessionId,
};

use super::{CartRepository, CatalogRepository, OrderRepository, ProductFilter, RepositoryError};

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<ProductId, Product>>,
    carts: RwLock<HashMap<SessionId, Cart>>,
    orders: RwLock<HashMap<OrderId, Order>>,
}

fn catalog_order(a: &Product, b: &Product) -> std::cmp::Ordering {
    b.featured
        .cmp(&a.featured)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let mut matching: Vec<Product> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(catalog_order);
        Ok(matching)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self
            .products
            .read()
            .await
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(RepositoryError::Conflict("product already exists".to_owned()));
        }
        products.insert(product.id, product.clone());
        Ok(())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn find(&self, session_id: &SessionId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.carts.read().await.get(session_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<Cart, RepositoryError> {
        let mut carts = self.carts.write().await;
        let stored_version = carts.get(cart.session_id()).map_or(0, Cart::version);
        if stored_version != cart.version() {
            return Err(RepositoryError::Conflict(
                "cart was modified concurrently".to_owned(),
            ));
        }
        let saved = cart.clone().with_version(cart.version() + 1);
        carts.insert(cart.session_id().clone(), saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict("order already exists".to_owned()));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| &o.session_id == session_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn attach_payment_intent(
        &self,
        id: OrderId,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        match order.payment_intent_id.as_deref() {
            Some(existing) if existing == intent_id => {}
            Some(_) => {
                return Err(RepositoryError::Conflict(
                    "order already has a payment intent".to_owned(),
                ));
            }
            None => {
                order.payment_intent_id = Some(intent_id.to_owned());
                order.updated_at = now;
            }
        }
        Ok(order.clone())
    }

    async fn transition_payment(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        order_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else {
            return Err(RepositoryError::NotFound);
        };
        if order.payment_status != from {
            return Ok(None);
        }
        order.payment_status = to;
        order.order_status = order_status;
        order.updated_at = now;
        Ok(Some(order.clone()))
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.payment_status == PaymentStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use greenhouse_core::{CheckoutDetails, CurrencyCode, Money, Quantity, ShippingAddress};

    use super::*;

    fn session(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    fn product(name: &str, featured: bool, created_at: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::generate(),
            name: name.to_string(),
            description: "A plant".to_string(),
            price: Money::from_minor_units(1000).unwrap(),
            image: "plant.jpg".to_string(),
            category: "Indoor Plants".to_string(),
            in_stock: true,
            featured,
            created_at,
            updated_at: created_at,
        }
    }

    fn order_for(session_id: &str, created_at: DateTime<Utc>) -> Order {
        let mut cart = Cart::empty(session(session_id), created_at);
        cart.add_item(
            ProductId::generate(),
            Money::from_minor_units(500).unwrap(),
            Quantity::ONE,
            created_at,
        )
        .unwrap();
        let details = CheckoutDetails::parse(
            "fern@example.com",
            "Fern",
            ShippingAddress {
                street: "3 Leaf Rd".to_string(),
                city: "Salem".to_string(),
                state: "OR".to_string(),
                zip_code: "97301".to_string(),
                country: "US".to_string(),
            },
        )
        .unwrap();
        Order::from_cart(&cart, details, CurrencyCode::USD, created_at).unwrap()
    }

    #[tokio::test]
    async fn test_list_products_featured_then_newest() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let old = product("Old", false, now - Duration::days(2));
        let new = product("New", false, now);
        let star = product("Star", true, now - Duration::days(5));
        for p in [&old, &new, &star] {
            CatalogRepository::insert(&store, p).await.unwrap();
        }

        let names: Vec<String> = store
            .list(&ProductFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Star", "New", "Old"]);
    }

    #[tokio::test]
    async fn test_get_many_skips_unknown() {
        let store = MemoryStore::default();
        let p = product("Monstera", false, Utc::now());
        CatalogRepository::insert(&store, &p).await.unwrap();

        let found = store.get_many(&[p.id, ProductId::generate()]).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_cart_save_bumps_version() {
        let store = MemoryStore::default();
        let cart = Cart::empty(session("guest_a"), Utc::now());

        let saved = store.save(&cart).await.unwrap();
        assert_eq!(saved.version(), 1);

        let saved = store.save(&saved).await.unwrap();
        assert_eq!(saved.version(), 2);
        assert_eq!(store.find(&session("guest_a")).await.unwrap().unwrap().version(), 2);
    }

    #[tokio::test]
    async fn test_cart_stale_save_conflicts() {
        let store = MemoryStore::default();
        let saved = store
            .save(&Cart::empty(session("guest_b"), Utc::now()))
            .await
            .unwrap();
        store.save(&saved).await.unwrap();

        let err = store.save(&saved).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let err = store
            .save(&Cart::empty(session("guest_b"), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_orders_newest_first_per_session() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let first = order_for("guest_c", now - Duration::minutes(10));
        let second = order_for("guest_c", now);
        let other = order_for("guest_d", now);
        for o in [&first, &second, &other] {
            OrderRepository::insert(&store, o).await.unwrap();
        }

        let orders = store.list_for_session(&session("guest_c")).await.unwrap();
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, [second.id, first.id]);
    }

    #[tokio::test]
    async fn test_attach_intent_rejects_different_intent() {
        let store = MemoryStore::default();
        let order = order_for("guest_e", Utc::now());
        OrderRepository::insert(&store, &order).await.unwrap();

        let updated = store
            .attach_payment_intent(order.id, "pi_1", Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.payment_intent_id.as_deref(), Some("pi_1"));

        store
            .attach_payment_intent(order.id, "pi_1", Utc::now())
            .await
            .unwrap();
        let err = store
            .attach_payment_intent(order.id, "pi_2", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let store = MemoryStore::default();
        let order = order_for("guest_f", Utc::now());
        OrderRepository::insert(&store, &order).await.unwrap();

        let paid = store
            .transition_payment(
                order.id,
                PaymentStatus::Pending,
                PaymentStatus::Paid,
                OrderStatus::Processing,
                Utc::now(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.order_status, OrderStatus::Processing);

        let lost = store
            .transition_payment(
                order.id,
                PaymentStatus::Pending,
                PaymentStatus::Failed,
                OrderStatus::Pending,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(lost.is_none());
    }

    #[tokio::test]
    async fn test_pending_before_cutoff() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let stale = order_for("guest_g", now - Duration::hours(30));
        let fresh = order_for("guest_g", now);
        OrderRepository::insert(&store, &stale).await.unwrap();
        OrderRepository::insert(&store, &fresh).await.unwrap();

        let found = store
            .list_pending_before(now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stale.id);
    }
}
