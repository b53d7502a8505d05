//! Checkout, payment confirmation and order lookup over HTTP.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use greenhouse_core::OrderId;
use greenhouse_integration_tests::TestApp;
use greenhouse_storefront::payments::IntentStatus;
use serde_json::{Value, json};

async fn checkout(app: &TestApp, session_id: &str) -> Value {
    let response = app
        .post(
            "/payment/create-payment-intent",
            &TestApp::checkout_body(session_id),
        )
        .await;
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

fn order_id(intent: &Value) -> OrderId {
    intent["orderId"].as_str().unwrap().parse().unwrap()
}

async fn confirm(app: &TestApp, intent_id: &str, order_id: OrderId) -> reqwest::Response {
    app.post(
        "/payment/confirm-payment",
        &json!({ "paymentIntentId": intent_id, "orderId": order_id }),
    )
    .await
}

#[tokio::test]
async fn test_successful_checkout_clears_cart() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Monstera Deliciosa", 4599, true).await;
    app.add_to_cart("guest_happy", &plant, 2).await;

    let intent = checkout(&app, "guest_happy").await;
    assert_eq!(intent["amount"], 9198);
    assert!(intent["clientSecret"].as_str().unwrap().starts_with("pi_test"));

    let order_id = order_id(&intent);
    let order: Value = app
        .get(&format!("/payment/order/{order_id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["orderStatus"], "pending");
    assert_eq!(order["total"], 91.98);
    assert_eq!(order["customerEmail"], "fern@example.com");

    let intent_id = app.gateway.intent_for(order_id).unwrap();
    app.gateway.set_status(&intent_id, IntentStatus::Succeeded);

    let response = confirm(&app, &intent_id, order_id).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Payment successful");
    assert_eq!(body["order"]["paymentStatus"], "paid");
    assert_eq!(body["order"]["orderStatus"], "processing");

    let cart: Value = app.get("/cart/guest_happy").await.json().await.unwrap();
    assert_eq!(cart["items"], json!([]));
    assert_eq!(cart["total"], 0.0);

    // Confirming again reports the same result.
    let response = confirm(&app, &intent_id, order_id).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_failed_payment_keeps_cart() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Snake Plant", 3299, true).await;
    let before = app.add_to_cart("guest_declined", &plant, 1).await;

    let intent = checkout(&app, "guest_declined").await;
    let order_id = order_id(&intent);
    let intent_id = app.gateway.intent_for(order_id).unwrap();

    let response = confirm(&app, &intent_id, order_id).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Payment failed");
    assert_eq!(body["order"]["paymentStatus"], "failed");

    let after: Value = app.get("/cart/guest_declined").await.json().await.unwrap();
    assert_eq!(after["items"], before["items"]);
    assert_eq!(after["total"], before["total"]);
}

#[tokio::test]
async fn test_checkout_empty_cart_creates_no_order() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/payment/create-payment-intent",
            &TestApp::checkout_body("guest_empty"),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Cart is empty");

    let orders: Vec<Value> = app
        .get("/payment/orders/guest_empty")
        .await
        .json()
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_checkout_validates_customer_details() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Pothos Golden", 2499, true).await;
    app.add_to_cart("guest_details", &plant, 1).await;

    let mut body = TestApp::checkout_body("guest_details");
    body["customerEmail"] = json!("nope");
    let response = app.post("/payment/create-payment-intent", &body).await;
    assert_eq!(response.status(), 400);

    let mut body = TestApp::checkout_body("guest_details");
    body["shippingAddress"]["city"] = json!("  ");
    let response = app.post("/payment/create-payment-intent", &body).await;
    assert_eq!(response.status(), 400);

    let mut body = TestApp::checkout_body("guest_details");
    body.as_object_mut().unwrap().remove("shippingAddress");
    let response = app.post("/payment/create-payment-intent", &body).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_gateway_outage_is_bad_gateway() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Macrame Hanger", 2499, true).await;
    app.add_to_cart("guest_outage", &plant, 1).await;
    app.gateway.reject_creates(true);

    let response = app
        .post(
            "/payment/create-payment-intent",
            &TestApp::checkout_body("guest_outage"),
        )
        .await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Payment service unavailable");
}

#[tokio::test]
async fn test_order_lookup_and_history() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Ceramic Planter - White", 1999, true).await;
    app.add_to_cart("guest_history", &plant, 1).await;

    let first = order_id(&checkout(&app, "guest_history").await);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = order_id(&checkout(&app, "guest_history").await);

    let orders: Vec<Value> = app
        .get("/payment/orders/guest_history")
        .await
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = orders.iter().map(|o| o["id"].as_str().unwrap()).collect();
    assert_eq!(ids, [second.to_string(), first.to_string()]);

    let a: Value = app
        .get(&format!("/payment/order/{first}"))
        .await
        .json()
        .await
        .unwrap();
    let b: Value = app
        .get(&format!("/payment/order/{first}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(a, b);

    let response = app.get(&format!("/payment/order/{}", OrderId::generate())).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Order not found");
}

#[tokio::test]
async fn test_confirm_rejects_foreign_intent() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Plant Care Starter Kit", 4999, true).await;
    app.add_to_cart("guest_a", &plant, 1).await;
    app.add_to_cart("guest_b", &plant, 1).await;

    let order_a = order_id(&checkout(&app, "guest_a").await);
    let order_b = order_id(&checkout(&app, "guest_b").await);
    let intent_b = app.gateway.intent_for(order_b).unwrap();
    app.gateway.set_status(&intent_b, IntentStatus::Succeeded);

    let response = confirm(&app, &intent_b, order_a).await;
    assert_eq!(response.status(), 400);

    let order: Value = app
        .get(&format!("/payment/order/{order_a}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(order["paymentStatus"], "pending");
}

#[tokio::test]
async fn test_reconcile_settles_abandoned_checkout() {
    let app = TestApp::spawn().await;
    let plant = app.seed_product("Fiddle Leaf Fig", 6899, true).await;
    app.add_to_cart("guest_abandon", &plant, 1).await;

    let order_id = order_id(&checkout(&app, "guest_abandon").await);
    let intent_id = app.gateway.intent_for(order_id).unwrap();
    app.gateway.set_status(&intent_id, IntentStatus::Succeeded);

    let report = app
        .state
        .checkout()
        .reconcile_stale(Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(report.paid, 1);

    let order: Value = app
        .get(&format!("/payment/order/{order_id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(order["paymentStatus"], "paid");

    // The cart is left alone by background settlement.
    let cart: Value = app.get("/cart/guest_abandon").await.json().await.unwrap();
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}
