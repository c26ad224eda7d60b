//! Payment flows against the mock adapter, admin payment operations and
//! webhook signature checks.

use axum::http::{Method, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use storehouse_integration_tests::{
    SQUARE_SIGNATURE_KEY, SQUARE_WEBHOOK_URL, STRIPE_WEBHOOK_SECRET, TestApp,
};

fn usd(amount: &str) -> Value {
    json!({"amount": amount, "currencyCode": "USD"})
}

async fn create_intent(app: &TestApp, amount: &str) -> String {
    let response = app
        .post(
            "/api/payments/create-intent",
            &json!({"amount": usd(amount), "description": "Order 1001"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["provider"], "mock");
    assert_eq!(response.body["status"], "pending");
    response.body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_client_config_names_the_provider() {
    let app = TestApp::new();
    let response = app.get("/api/payments/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["provider"], "mock");

    let unknown = app.get("/api/payments/config?provider=paypal").await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_successful_payment_has_a_receipt() {
    let app = TestApp::new();
    let intent = create_intent(&app, "25.00").await;

    let pending_receipt = app.get(&format!("/api/payments/receipt/{intent}")).await;
    assert_eq!(pending_receipt.status, StatusCode::NOT_FOUND);

    let processed = app
        .post(
            "/api/payments/process",
            &json!({"intentId": intent, "sourceId": "cnon:card-ok"}),
        )
        .await;
    assert_eq!(processed.status, StatusCode::OK, "{:?}", processed.body);
    assert_eq!(processed.body["status"], "completed");

    let verified = app
        .post("/api/payments/verify", &json!({"paymentId": intent}))
        .await;
    assert_eq!(verified.body["status"], "completed");

    let receipt = app.get(&format!("/api/payments/receipt/{intent}")).await;
    assert_eq!(receipt.status, StatusCode::OK);
    assert_eq!(receipt.body["paymentId"], intent.as_str());
}

#[tokio::test]
async fn test_declined_payment_is_unprocessable() {
    let app = TestApp::new();
    let intent = create_intent(&app, "10.00").await;

    let declined = app
        .post(
            "/api/payments/process",
            &json!({"intentId": intent, "sourceId": "fail-card"}),
        )
        .await;
    assert_eq!(declined.status, StatusCode::UNPROCESSABLE_ENTITY);

    let verified = app
        .post("/api/payments/verify", &json!({"paymentId": intent}))
        .await;
    assert_eq!(verified.body["status"], "failed");
}

#[tokio::test]
async fn test_cancel_pending_payment() {
    let app = TestApp::new();
    let intent = create_intent(&app, "5.00").await;

    let cancelled = app
        .post("/api/payments/cancel", &json!({"paymentId": intent}))
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["status"], "cancelled");

    let again = app
        .post("/api/payments/cancel", &json!({"paymentId": intent}))
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_refund_and_provider_switch() {
    let app = TestApp::new();
    let intent = create_intent(&app, "30.00").await;
    app.post(
        "/api/payments/process",
        &json!({"intentId": intent, "sourceId": "ok"}),
    )
    .await;

    let refund = app
        .admin(
            Method::POST,
            "/api/admin/payments/refund",
            Some(&json!({"paymentId": intent, "amount": usd("10.00")})),
        )
        .await;
    assert_eq!(refund.status, StatusCode::OK, "{:?}", refund.body);
    assert_eq!(refund.body["status"], "refunded");
    assert_eq!(refund.body["amount"]["amount"], "10.00");

    let switched = app
        .admin(
            Method::POST,
            "/api/admin/payments/active-provider",
            Some(&json!({"provider": "mock", "settings": {"declineAll": true}})),
        )
        .await;
    assert_eq!(switched.status, StatusCode::OK);
    assert_eq!(switched.body["provider"], "mock");
    assert_eq!(switched.body["providers"], json!(["mock"]));

    let next = create_intent(&app, "1.00").await;
    let declined = app
        .post(
            "/api/payments/process",
            &json!({"intentId": next, "sourceId": "ok"}),
        )
        .await;
    assert_eq!(declined.status, StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = app
        .admin(
            Method::POST,
            "/api/admin/payments/active-provider",
            Some(&json!({"provider": "paypal"})),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
}

fn square_signature(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SQUARE_SIGNATURE_KEY.as_bytes()).unwrap();
    mac.update(SQUARE_WEBHOOK_URL.as_bytes());
    mac.update(body.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

fn stripe_signature(body: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(STRIPE_WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body.as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[tokio::test]
async fn test_square_webhook_signatures() {
    let app = TestApp::new();
    let body = json!({
        "type": "payment.updated",
        "data": {"object": {"payment": {"id": "sq_pay_1", "status": "COMPLETED"}}}
    })
    .to_string();
    let signature = square_signature(&body);

    let accepted = app
        .send(
            Method::POST,
            "/api/webhooks/square",
            Some(body.clone()),
            &[("x-square-hmacsha256-signature", signature.as_str())],
        )
        .await;
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(accepted.body["received"], true);

    let tampered = app
        .send(
            Method::POST,
            "/api/webhooks/square",
            Some(body.replace("COMPLETED", "FAILED")),
            &[("x-square-hmacsha256-signature", signature.as_str())],
        )
        .await;
    assert_eq!(tampered.status, StatusCode::UNAUTHORIZED);

    let unsigned = app
        .send(Method::POST, "/api/webhooks/square", Some(body), &[])
        .await;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stripe_webhook_signatures() {
    let app = TestApp::new();
    let body = json!({
        "type": "payment_intent.succeeded",
        "data": {"object": {"object": "payment_intent", "id": "pi_1", "status": "succeeded"}}
    })
    .to_string();

    let now = Utc::now().timestamp();
    let fresh = stripe_signature(&body, now);
    let accepted = app
        .send(
            Method::POST,
            "/api/webhooks/stripe",
            Some(body.clone()),
            &[("stripe-signature", fresh.as_str())],
        )
        .await;
    assert_eq!(accepted.status, StatusCode::OK);

    let stale = stripe_signature(&body, now - 3600);
    let rejected = app
        .send(
            Method::POST,
            "/api/webhooks/stripe",
            Some(body),
            &[("stripe-signature", stale.as_str())],
        )
        .await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhooks_for_unconfigured_providers_are_not_found() {
    let mut config = storehouse_integration_tests::test_config();
    config.payments.stripe = None;
    let app = TestApp::with_config(config);

    let response = app
        .send(
            Method::POST,
            "/api/webhooks/stripe",
            Some("{}".to_string()),
            &[("stripe-signature", "t=1,v1=00")],
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
