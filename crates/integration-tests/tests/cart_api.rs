//! Cart and catalog endpoints over HTTP.

#![allow(clippy::unwrap_used)]

use greenhouse_integration_tests::TestApp;
use serde_json::{Value, json};

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    assert_eq!(app.get("/health/ready").await.status(), 200);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/cart/guest_headers"))
        .header("x-request-id", "trace-42")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store, max-age=0");
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_product_listing_and_detail() {
    let app = TestApp::spawn().await;
    let pothos = app.seed_product("Pothos Golden", 2499, true).await;

    let products: Vec<Value> = app.get("/products").await.json().await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["name"], "Pothos Golden");
    assert_eq!(products[0]["price"], 24.99);

    let filtered: Vec<Value> = app
        .get("/products?category=succulents")
        .await
        .json()
        .await
        .unwrap();
    assert!(filtered.is_empty());

    let response = app.get(&format!("/products/{}", pothos.id)).await;
    assert_eq!(response.status(), 200);

    let response = app.get("/products/not-a-uuid").await;
    assert_eq!(response.status(), 404);
}

// =============================================================================
// Cart
// =============================================================================

#[tokio::test]
async fn test_empty_cart_default() {
    let app = TestApp::spawn().await;

    let cart: Value = app.get("/cart/guest_new").await.json().await.unwrap();
    assert_eq!(cart["sessionId"], "guest_new");
    assert_eq!(cart["items"], json!([]));
    assert_eq!(cart["total"], 0.0);
}

#[tokio::test]
async fn test_add_same_product_twice_merges_lines() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Snake Plant", 1000, true).await;

    app.add_to_cart("guest_merge", &plant, 2).await;
    let cart = app.add_to_cart("guest_merge", &plant, 2).await;

    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 4);
    assert_eq!(items[0]["product"]["name"], "Snake Plant");
    assert_eq!(cart["total"], 40.0);
}

#[tokio::test]
async fn test_add_defaults_quantity_to_one() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Monstera Deliciosa", 4599, true).await;

    let response = app
        .post(
            "/cart/guest_default/items",
            &json!({ "productId": plant.id }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let cart: Value = response.json().await.unwrap();
    assert_eq!(cart["items"][0]["quantity"], 1);
    assert_eq!(cart["total"], 45.99);
}

#[tokio::test]
async fn test_add_rejections() {
    let app = TestApp::spawn().await;
    let sold_out = app.seed_product("Fiddle Leaf Fig", 6899, false).await;
    let plant = app.seed_product("Pothos Golden", 2499, true).await;

    let response = app
        .post(
            "/cart/guest_reject/items",
            &json!({ "productId": sold_out.id, "quantity": 1 }),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Product is out of stock");

    let response = app
        .post(
            "/cart/guest_reject/items",
            &json!({ "productId": "00000000-0000-4000-8000-000000000000", "quantity": 1 }),
        )
        .await;
    assert_eq!(response.status(), 404);

    let response = app
        .post(
            "/cart/guest_reject/items",
            &json!({ "productId": plant.id, "quantity": 0 }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .post("/cart/guest_reject/items", &json!({ "quantity": 1 }))
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .post(
            "/cart/bad%20session/items",
            &json!({ "productId": plant.id }),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Nothing was written by the rejected requests.
    let cart: Value = app.get("/cart/guest_reject").await.json().await.unwrap();
    assert_eq!(cart["items"], json!([]));
}

#[tokio::test]
async fn test_update_and_remove_item() {
    let app = TestApp::spawn().await;
    let snake = app.seed_product("Snake Plant", 3299, true).await;
    let pothos = app.seed_product("Pothos Golden", 2499, true).await;

    app.add_to_cart("guest_edit", &snake, 1).await;
    let cart = app.add_to_cart("guest_edit", &pothos, 1).await;
    let snake_line = cart["items"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .put(
            &format!("/cart/guest_edit/items/{snake_line}"),
            &json!({ "quantity": 3 }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let cart: Value = response.json().await.unwrap();
    assert_eq!(cart["total"], 123.96);

    let response = app
        .put(
            &format!("/cart/guest_edit/items/{snake_line}"),
            &json!({ "quantity": 0 }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .delete(&format!("/cart/guest_edit/items/{snake_line}"))
        .await;
    assert_eq!(response.status(), 200);
    let cart: Value = response.json().await.unwrap();
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["total"], 24.99);

    // Removing it again is a no-op.
    let response = app
        .delete(&format!("/cart/guest_edit/items/{snake_line}"))
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .put(
            &format!("/cart/guest_edit/items/{snake_line}"),
            &json!({ "quantity": 2 }),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_clear_cart() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("String of Pearls", 2999, true).await;

    assert_eq!(app.delete("/cart/guest_clear").await.status(), 404);

    app.add_to_cart("guest_clear", &plant, 2).await;
    let response = app.delete("/cart/guest_clear").await;
    assert_eq!(response.status(), 200);
    let cart: Value = response.json().await.unwrap();
    assert_eq!(cart["items"], json!([]));
    assert_eq!(cart["total"], 0.0);
}

#[tokio::test]
async fn test_concurrent_adds_are_not_lost() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Echeveria Succulent", 1899, true).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = app.client.clone();
        let url = app.url("/cart/guest_race/items");
        let product_id = plant.id;
        handles.push(tokio::spawn(async move {
            client
                .post(url)
                .json(&json!({ "productId": product_id, "quantity": 1 }))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 201);
    }

    let cart: Value = app.get("/cart/guest_race").await.json().await.unwrap();
    assert_eq!(cart["items"][0]["quantity"], 10);
    assert_eq!(cart["total"], 189.9);
}
