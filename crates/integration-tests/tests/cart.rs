//! Session-owned carts through the HTTP API, and the sign-in merge.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use storehouse_core::ProductId;
use storehouse_integration_tests::{
    InMemoryCartRepository, InMemoryCategoryRepository, InMemoryProductRepository, TestApp,
};
use storehouse_storefront::db::ProductRepository;
use storehouse_storefront::models::{CartOwner, NewProduct};
use storehouse_storefront::services::CartService;
use storehouse_storefront::services::carts::MAX_LINE_QUANTITY;

async fn product(app: &TestApp, name: &str, price: &str, stock: i32) -> i64 {
    let response = app
        .admin(
            Method::POST,
            "/api/admin/products",
            Some(&json!({"name": name, "price": price, "stock": stock})),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.body["id"].as_i64().unwrap()
}

fn lines(cart: &Value) -> &Vec<Value> {
    cart["items"].as_array().unwrap()
}

#[tokio::test]
async fn test_anonymous_cart_lifecycle() {
    let app = TestApp::new();
    let mug = product(&app, "Mug", "8.50", 10).await;
    let tea = product(&app, "Tea", "4.00", 10).await;

    let cart = app.get("/api/cart").await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["itemCount"], 0);
    assert!(app.session_cookie().is_some());

    let cart = app
        .post("/api/cart/add", &json!({"productId": mug, "quantity": 2}))
        .await;
    assert_eq!(cart.status, StatusCode::OK, "{:?}", cart.body);
    let cart = app
        .post("/api/cart/add", &json!({"productId": mug}))
        .await;
    assert_eq!(lines(&cart.body).len(), 1, "same product shares a line");
    assert_eq!(lines(&cart.body)[0]["quantity"], 3);

    let cart = app
        .post("/api/cart/add", &json!({"productId": tea, "quantity": 1}))
        .await;
    assert_eq!(cart.body["itemCount"], 4);
    assert_eq!(cart.body["subtotal"], "29.50");

    let tea_line = lines(&cart.body)
        .iter()
        .find(|l| l["productId"] == tea)
        .unwrap()["id"]
        .clone();

    let cart = app
        .post("/api/cart/update", &json!({"itemId": tea_line, "quantity": 0}))
        .await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(lines(&cart.body).len(), 1);

    // Removing a line that is already gone is not an error.
    for _ in 0..2 {
        let cart = app
            .post("/api/cart/remove", &json!({"itemId": tea_line}))
            .await;
        assert_eq!(cart.status, StatusCode::OK);
    }

    let cart = app.post("/api/cart/clear", &json!({})).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert!(lines(&cart.body).is_empty());
}

#[tokio::test]
async fn test_carts_are_per_session() {
    let app = TestApp::new();
    let mug = product(&app, "Mug", "8.50", 10).await;

    app.post("/api/cart/add", &json!({"productId": mug})).await;
    assert_eq!(app.get("/api/cart").await.body["itemCount"], 1);

    app.clear_cookies();
    let other = app.get("/api/cart").await;
    assert_eq!(other.body["itemCount"], 0);
    assert_eq!(app.carts.cart_count(), 1);
}

#[tokio::test]
async fn test_stock_and_availability_are_enforced() {
    let app = TestApp::new();
    let scarce = product(&app, "Scarce", "1.00", 2).await;

    let too_many = app
        .post("/api/cart/add", &json!({"productId": scarce, "quantity": 3}))
        .await;
    assert_eq!(too_many.status, StatusCode::UNPROCESSABLE_ENTITY);

    let zero = app
        .post("/api/cart/add", &json!({"productId": scarce, "quantity": 0}))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let missing = app
        .post("/api/cart/add", &json!({"productId": 9999}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    app.admin(
        Method::PUT,
        &format!("/api/admin/products/{scarce}"),
        Some(&json!({"isActive": false})),
    )
    .await;
    let inactive = app
        .post("/api/cart/add", &json!({"productId": scarce}))
        .await;
    assert_eq!(inactive.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_updating_a_foreign_line_is_not_found() {
    let app = TestApp::new();
    let mug = product(&app, "Mug", "8.50", 10).await;
    let cart = app.post("/api/cart/add", &json!({"productId": mug})).await;
    let line = lines(&cart.body)[0]["id"].clone();

    app.clear_cookies();
    let response = app
        .post("/api/cart/update", &json!({"itemId": line, "quantity": 2}))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_a_json_bad_request() {
    let app = TestApp::new();
    let response = app
        .send(
            Method::POST,
            "/api/cart/add",
            Some("{not json".to_string()),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_sign_in_merge_sums_quantities() {
    let categories = Arc::new(InMemoryCategoryRepository::default());
    let products = Arc::new(InMemoryProductRepository::new(categories));
    let carts = Arc::new(InMemoryCartRepository::new(Arc::clone(&products)));
    let service = CartService::new(carts.clone(), products.clone());

    let new_product = |name: &str| NewProduct {
        name: name.to_string(),
        slug: None,
        description: None,
        price: Decimal::new(500, 2),
        compare_at_price: None,
        stock: 20,
        image_url: None,
        sku: None,
        is_active: true,
        is_featured: false,
        category_ids: Vec::new(),
    };
    let mug = products.create(new_product("Mug")).await.unwrap().id;
    let tea = products.create(new_product("Tea")).await.unwrap().id;

    let user = Uuid::new_v4();
    let anonymous = CartOwner::Anonymous("visitor-1".to_string());
    service
        .add_item(&CartOwner::User(user), mug, None, 2)
        .await
        .unwrap();
    service.add_item(&anonymous, mug, None, 3).await.unwrap();
    service.add_item(&anonymous, tea, None, 1).await.unwrap();

    let merged = service.merge_carts("visitor-1", user).await.unwrap();

    let quantity = |id: ProductId| {
        merged
            .items
            .iter()
            .find(|i| i.product_id == id)
            .map(|i| i.quantity)
    };
    assert_eq!(quantity(mug), Some(5));
    assert_eq!(quantity(tea), Some(1));
    assert_eq!(merged.item_count, 6);
    assert_eq!(carts.cart_count(), 1, "anonymous cart is deleted");
    assert!(carts.user_cart(user).is_some());

    // Merging again finds no anonymous cart and leaves the user cart alone.
    let again = service.merge_carts("visitor-1", user).await.unwrap();
    assert_eq!(again.item_count, 6);
}

#[tokio::test]
async fn test_sign_in_merge_caps_line_quantity() {
    let categories = Arc::new(InMemoryCategoryRepository::default());
    let products = Arc::new(InMemoryProductRepository::new(categories));
    let carts = Arc::new(InMemoryCartRepository::new(Arc::clone(&products)));
    let service = CartService::new(carts.clone(), products.clone());

    let bulk = products
        .create(NewProduct {
            name: "Bulk".to_string(),
            slug: None,
            description: None,
            price: Decimal::new(100, 2),
            compare_at_price: None,
            stock: 500,
            image_url: None,
            sku: None,
            is_active: true,
            is_featured: false,
            category_ids: Vec::new(),
        })
        .await
        .unwrap()
        .id;

    let user = Uuid::new_v4();
    service
        .add_item(&CartOwner::User(user), bulk, None, 60)
        .await
        .unwrap();
    service
        .add_item(&CartOwner::Anonymous("visitor-2".to_string()), bulk, None, 60)
        .await
        .unwrap();

    let merged = service.merge_carts("visitor-2", user).await.unwrap();

    assert_eq!(merged.items.len(), 1);
    assert_eq!(merged.items[0].quantity, MAX_LINE_QUANTITY);
}
