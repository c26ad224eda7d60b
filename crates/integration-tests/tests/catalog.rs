//! Catalog flows: categories and products managed through the admin API and
//! read back through the shopper API.

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use storehouse_integration_tests::TestApp;

async fn create_category(app: &TestApp, body: Value) -> Value {
    let response = app
        .admin(Method::POST, "/api/admin/categories", Some(&body))
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body
}

async fn create_product(app: &TestApp, body: Value) -> Value {
    let response = app
        .admin(Method::POST, "/api/admin/products", Some(&body))
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body
}

fn id(value: &Value) -> i64 {
    value["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_category_tree_nests_children() {
    let app = TestApp::new();
    let kitchen = create_category(&app, json!({"name": "Kitchen"})).await;
    let knives = create_category(
        &app,
        json!({"name": "Knives", "parentId": id(&kitchen), "sortOrder": 2}),
    )
    .await;
    create_category(
        &app,
        json!({"name": "Pans", "parentId": id(&kitchen), "sortOrder": 1}),
    )
    .await;
    create_category(&app, json!({"name": "Garden"})).await;

    assert_eq!(knives["slug"], "knives");

    let response = app.get("/api/categories/tree").await;
    assert_eq!(response.status, StatusCode::OK);

    let roots = response.body.as_array().unwrap();
    assert_eq!(roots.len(), 2);
    let kitchen_node = roots.iter().find(|n| n["name"] == "Kitchen").unwrap();
    let children: Vec<&str> = kitchen_node["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(children, ["Pans", "Knives"]);

    let by_slug = app.get("/api/categories/slug/knives").await;
    assert_eq!(by_slug.status, StatusCode::OK);
    assert_eq!(by_slug.body["parentId"], kitchen["id"]);
}

#[tokio::test]
async fn test_cycles_and_parent_deletes_are_rejected() {
    let app = TestApp::new();
    let parent = create_category(&app, json!({"name": "Parent"})).await;
    let child = create_category(&app, json!({"name": "Child", "parentId": id(&parent)})).await;

    let cycle = app
        .admin(
            Method::PUT,
            &format!("/api/admin/categories/{}", id(&parent)),
            Some(&json!({"parentId": id(&child)})),
        )
        .await;
    assert_eq!(cycle.status, StatusCode::BAD_REQUEST);

    let self_parent = app
        .admin(
            Method::PUT,
            &format!("/api/admin/categories/{}", id(&parent)),
            Some(&json!({"parentId": id(&parent)})),
        )
        .await;
    assert_eq!(self_parent.status, StatusCode::BAD_REQUEST);

    let delete_parent = app
        .admin(
            Method::DELETE,
            &format!("/api/admin/categories/{}", id(&parent)),
            None,
        )
        .await;
    assert_eq!(delete_parent.status, StatusCode::CONFLICT);

    let delete_child = app
        .admin(
            Method::DELETE,
            &format!("/api/admin/categories/{}", id(&child)),
            None,
        )
        .await;
    assert_eq!(delete_child.status, StatusCode::NO_CONTENT);

    let gone = app.get(&format!("/api/categories/{}", id(&child))).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_slug_conflicts() {
    let app = TestApp::new();
    create_category(&app, json!({"name": "Tools"})).await;

    let response = app
        .admin(
            Method::POST,
            "/api/admin/categories",
            Some(&json!({"name": "Tools"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_highlighting_orders_by_priority() {
    let app = TestApp::new();
    let a = create_category(&app, json!({"name": "Alpha"})).await;
    let b = create_category(&app, json!({"name": "Bravo"})).await;
    let c = create_category(&app, json!({"name": "Charlie"})).await;

    let response = app
        .admin(
            Method::POST,
            "/api/admin/categories/highlight",
            Some(&json!({"ids": [id(&a), id(&b), id(&c)], "highlighted": true})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["updated"], 3);

    for (category, priority) in [(&c, 0), (&a, 5)] {
        let response = app
            .admin(
                Method::POST,
                &format!("/api/admin/categories/{}/priority", id(category)),
                Some(&json!({"priority": priority})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["highlightPriority"], priority);
    }

    let highlighted = app.get("/api/categories/highlighted").await;
    let names: Vec<&str> = highlighted
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Charlie", "Alpha", "Bravo"]);

    // Un-highlighting clears the priority.
    app.admin(
        Method::POST,
        "/api/admin/categories/highlight",
        Some(&json!({"ids": [id(&c)], "highlighted": false})),
    )
    .await;
    let charlie = app.get(&format!("/api/categories/{}", id(&c))).await;
    assert_eq!(charlie.body["isHighlighted"], false);
    assert_eq!(charlie.body["highlightPriority"], Value::Null);

    let priority_on_plain = app
        .admin(
            Method::POST,
            &format!("/api/admin/categories/{}/priority", id(&c)),
            Some(&json!({"priority": 1})),
        )
        .await;
    assert_eq!(priority_on_plain.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reorder_and_visibility() {
    let app = TestApp::new();
    let a = create_category(&app, json!({"name": "Alpha"})).await;
    let b = create_category(&app, json!({"name": "Bravo"})).await;

    let response = app
        .admin(
            Method::POST,
            "/api/admin/categories/reorder",
            Some(&json!([
                {"id": id(&a), "sortOrder": 2},
                {"id": id(&b), "sortOrder": 1},
            ])),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["updated"], 2);

    let list = app.get("/api/categories").await;
    assert_eq!(list.body[0]["name"], "Bravo");

    let hidden = app
        .admin(
            Method::POST,
            &format!("/api/admin/categories/{}/visibility", id(&b)),
            Some(&json!({"visible": false})),
        )
        .await;
    assert_eq!(hidden.body["isVisible"], false);

    let active = app.get("/api/categories?activeOnly=true").await;
    let names: Vec<&str> = active
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Alpha"]);
}

#[tokio::test]
async fn test_cursor_pagination_visits_every_product_once() {
    let app = TestApp::new();
    for i in 0..7 {
        create_product(
            &app,
            json!({"name": format!("Item {i}"), "price": format!("{}.00", 10 + i % 3), "stock": 5}),
        )
        .await;
    }

    let mut seen = HashSet::new();
    let mut prices = Vec::new();
    let mut uri = "/api/products?limit=3&sortOrder=price_asc".to_string();
    loop {
        let page = app.get(&uri).await;
        assert_eq!(page.status, StatusCode::OK, "{:?}", page.body);
        for item in page.body["items"].as_array().unwrap() {
            assert!(seen.insert(id(item)), "duplicate product across pages");
            prices.push(item["price"].as_str().unwrap().parse::<f64>().unwrap());
        }
        match page.body["nextCursor"].as_str() {
            Some(cursor) => {
                assert_eq!(page.body["hasMore"], true);
                uri = format!("/api/products?limit=3&sortOrder=price_asc&cursor={cursor}");
            }
            None => break,
        }
    }

    assert_eq!(seen.len(), 7);
    assert!(prices.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_page_numbers_report_totals() {
    let app = TestApp::new();
    for i in 0..5 {
        create_product(&app, json!({"name": format!("Thing {i}"), "price": "1.00"})).await;
    }

    let page = app.get("/api/products?page=2&limit=2").await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["page"], 2);
    assert_eq!(page.body["total"], 5);
    assert_eq!(page.body["totalPages"], 3);
    assert_eq!(page.body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_listing_parameters_are_bad_requests() {
    let app = TestApp::new();

    let cursor = app.get("/api/products?cursor=not-a-cursor").await;
    assert_eq!(cursor.status, StatusCode::BAD_REQUEST);

    let sort = app.get("/api/products?sortOrder=sideways").await;
    assert_eq!(sort.status, StatusCode::BAD_REQUEST);

    let limit = app.get("/api/products?limit=0").await;
    assert_eq!(limit.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_products_filter_by_category_and_hide_inactive() {
    let app = TestApp::new();
    let knives = create_category(&app, json!({"name": "Knives"})).await;
    let chef = create_product(
        &app,
        json!({"name": "Chef Knife", "price": "49.90", "stock": 3, "isFeatured": true}),
    )
    .await;
    create_product(&app, json!({"name": "Spoon", "price": "2.00", "stock": 3})).await;

    let linked = app
        .admin(
            Method::PUT,
            &format!("/api/admin/products/{}/categories", id(&chef)),
            Some(&json!({"categoryIds": [id(&knives)]})),
        )
        .await;
    assert_eq!(linked.status, StatusCode::OK);
    assert_eq!(linked.body["categoryIds"], json!([id(&knives)]));

    let filtered = app
        .get(&format!("/api/products?categoryId={}", id(&knives)))
        .await;
    let items = filtered.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Chef Knife");

    let featured = app.get("/api/products/featured").await;
    assert_eq!(featured.body.as_array().unwrap().len(), 1);

    let deactivated = app
        .admin(
            Method::PUT,
            &format!("/api/admin/products/{}", id(&chef)),
            Some(&json!({"isActive": false})),
        )
        .await;
    assert_eq!(deactivated.status, StatusCode::OK);

    let shown = app.get(&format!("/api/products/{}", id(&chef))).await;
    assert_eq!(shown.status, StatusCode::NOT_FOUND);
    let by_slug = app.get("/api/products/slug/chef-knife").await;
    assert_eq!(by_slug.status, StatusCode::NOT_FOUND);
    let listing = app.get("/api/products").await;
    assert_eq!(listing.body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_catalog_combines_products_and_tree() {
    let app = TestApp::new();
    create_category(&app, json!({"name": "Garden"})).await;
    create_product(&app, json!({"name": "Trowel", "price": "12.00"})).await;

    let response = app.get("/api/catalog").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["products"]["items"][0]["name"], "Trowel");
    assert_eq!(response.body["categories"][0]["name"], "Garden");
}

#[tokio::test]
async fn test_delete_product() {
    let app = TestApp::new();
    let product = create_product(&app, json!({"name": "Temp", "price": "1.00"})).await;
    let uri = format!("/api/admin/products/{}", id(&product));

    let deleted = app.admin(Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let again = app.admin(Method::DELETE, &uri, None).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}
