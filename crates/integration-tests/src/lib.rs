//! Integration tests for the Greenhouse storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p greenhouse-integration-tests
//! ```
//!
//! Each test boots the real router on an ephemeral port with the in-memory
//! store and a scripted payment gateway, then drives it over HTTP with
//! `reqwest`. No database or network access is needed.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use greenhouse_core::{Money, NewProduct, OrderId, Product};
use greenhouse_storefront::{
    app,
    config::StorefrontConfig,
    db::Store,
    middleware::RateLimits,
    payments::{
        CreateIntent, GatewayError, IntentSnapshot, IntentStatus, PaymentGateway, PaymentIntent,
    },
    state::AppState,
};

// =============================================================================
// Scripted Gateway
// =============================================================================

/// Payment gateway double whose intents start as `requires_payment_method`
/// and move only when a test says so.
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<HashMap<String, (IntentStatus, OrderId)>>,
    next_id: AtomicUsize,
    reject_creates: AtomicBool,
}

impl FakeGateway {
    /// Set the status the gateway reports for `intent_id`.
    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(entry) = self.intents.lock().unwrap().get_mut(intent_id) {
            entry.0 = status;
        }
    }

    /// Make subsequent intent creations fail with a gateway error.
    pub fn reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    /// The intent id created for `order_id`, if any.
    pub fn intent_for(&self, order_id: OrderId) -> Option<String> {
        self.intents
            .lock()
            .unwrap()
            .iter()
            .find(|(_, (_, order))| *order == order_id)
            .map(|(id, _)| id.clone())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, GatewayError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 503,
                message: "gateway unavailable".to_string(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_test{n}");
        self.intents.lock().unwrap().insert(
            id.clone(),
            (IntentStatus::RequiresPaymentMethod, request.order_id),
        );
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret_{}", request.amount_minor),
            id,
        })
    }

    async fn get_intent(&self, intent_id: &str) -> Result<IntentSnapshot, GatewayError> {
        let intents = self.intents.lock().unwrap();
        let (status, order_id) = intents.get(intent_id).ok_or_else(|| GatewayError::Api {
            status: 404,
            message: format!("No such payment_intent: '{intent_id}'"),
        })?;
        Ok(IntentSnapshot {
            id: intent_id.to_string(),
            status: *status,
            order_id: Some(*order_id),
        })
    }
}

// =============================================================================
// Test Application
// =============================================================================

/// A running storefront bound to `127.0.0.1:0`.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Store,
    pub gateway: Arc<FakeGateway>,
    pub state: AppState,
}

fn test_config() -> StorefrontConfig {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("STOREFRONT_STORAGE", "memory"),
        ("STRIPE_SECRET_KEY", "sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
        ("STOREFRONT_CORS_ORIGINS", "http://localhost:3000"),
    ]);
    StorefrontConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap()
}

impl TestApp {
    /// Boot a fresh storefront with an empty in-memory store.
    pub async fn spawn() -> Self {
        let store = Store::in_memory();
        let gateway = Arc::new(FakeGateway::default());
        let state = AppState::new(test_config(), store.clone(), gateway.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state.clone(), RateLimits::disabled());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            store,
            gateway,
            state,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Add a product to the catalog.
    pub async fn seed_product(&self, name: &str, price_minor: i64, in_stock: bool) -> Product {
        let product = NewProduct {
            name: name.to_string(),
            description: format!("{name} for testing"),
            price: Money::from_minor_units(price_minor).unwrap(),
            image: format!("{}.jpg", name.to_lowercase().replace(' ', "-")),
            category: "Indoor Plants".to_string(),
            in_stock,
            featured: false,
        }
        .into_product(Utc::now())
        .unwrap();
        self.store.catalog().insert(&product).await.unwrap();
        product
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).send().await.unwrap()
    }

    /// Add `quantity` of `product` to the session cart.
    pub async fn add_to_cart(
        &self,
        session_id: &str,
        product: &Product,
        quantity: i64,
    ) -> serde_json::Value {
        let response = self
            .post(
                &format!("/cart/{session_id}/items"),
                &serde_json::json!({ "productId": product.id, "quantity": quantity }),
            )
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// Valid checkout-intent body for `session_id`.
    #[must_use]
    pub fn checkout_body(session_id: &str) -> serde_json::Value {
        serde_json::json!({
            "sessionId": session_id,
            "customerEmail": "fern@example.com",
            "customerName": "Fern Gully",
            "shippingAddress": {
                "street": "12 Greenhouse Lane",
                "city": "Portland",
                "state": "OR",
                "zipCode": "97201",
                "country": "US"
            }
        })
    }
}
