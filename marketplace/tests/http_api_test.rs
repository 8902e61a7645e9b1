//! HTTP API integration tests.
//!
//! Drives the full router with `tower::ServiceExt::oneshot` over in-memory
//! collaborators: routing, identity headers, status codes and JSON bodies.

#![allow(clippy::unwrap_used)]

mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use chrono::Duration;
use common::Harness;
use serde_json::{Value, json};
use surplus_core::environment::Clock;
use surplus_core::types::{Caller, Role, StoreId, UserId};
use surplus_marketplace::MarketplaceSettings;
use surplus_marketplace::server::build_router;
use surplus_testing::fixtures::CITY_HALL;
use tower::ServiceExt;

fn identity(
    builder: axum::http::request::Builder,
    caller: &Caller,
) -> axum::http::request::Builder {
    let builder = builder.header("x-user-id", caller.user_id.to_string());
    match caller.role {
        Role::Buyer => builder,
        Role::Admin => builder.header("x-user-role", "admin"),
        Role::Seller { store_id } => builder
            .header("x-user-role", "seller")
            .header("x-store-id", store_id.to_string()),
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<&Caller>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = identity(builder, caller);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn post_listing(app: &Router, h: &Harness, seller: &Caller) -> (StatusCode, Value) {
    let body = listing_body(h, 3);
    send(app, Method::POST, "/api/listings", Some(seller), Some(body)).await
}

fn listing_body(h: &Harness, quantity: u32) -> Value {
    json!({
        "name": "Kimchi jeon",
        "category": "side dish",
        "is_instant": true,
        "original_price": 10_000,
        "discount_price": 6_000,
        "quantity": quantity,
        "pickup_deadline": h.clock.now() + Duration::hours(2),
    })
}

#[tokio::test]
async fn test_health_check() {
    let h = Harness::new();
    let app = build_router(h.state.clone());

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_route_without_recorder() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (status, _) = send(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listing_reservation_round() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let alice = Caller::buyer(UserId::new());

    let (status, listing) = post_listing(&app, &h, &seller).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(listing["discount_percent"], 40);
    assert_eq!(listing["phase"], "AVAILABLE");
    let listing_id = listing["id"].as_str().unwrap().to_string();

    let (status, reservation) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/reservations"),
        Some(&alice),
        Some(json!({ "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["status"], "RESERVED");
    let reservation_id = reservation["id"].as_str().unwrap().to_string();

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/reservations"),
        Some(&Caller::buyer(UserId::new())),
        Some(json!({ "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "INSUFFICIENT_STOCK");
    assert_eq!(error["remaining"], 1);

    let uri = format!("/api/listings/{listing_id}");
    let (status, detail) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["quantity"], 1);
    assert_eq!(detail["reserved_quantity"], 2);

    let (status, mine) = send(&app, Method::GET, "/api/reservations", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, canceled) = send(
        &app,
        Method::POST,
        &format!("/api/reservations/{reservation_id}/cancel"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "CANCELED");

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/reservations/{reservation_id}/cancel"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "ALREADY_FINAL");
}

#[tokio::test]
async fn test_seller_operations() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, listing) = post_listing(&app, &h, &seller).await;
    let listing_id = listing["id"].as_str().unwrap().to_string();

    let (status, sale) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/sell-direct"),
        Some(&seller),
        Some(json!({ "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sale["remaining_quantity"], 1);

    let (status, error) = send(
        &app,
        Method::PUT,
        &format!("/api/listings/{listing_id}/quantity"),
        Some(&seller),
        Some(json!({ "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "INVALID_QUANTITY");

    let (status, restocked) = send(
        &app,
        Method::PUT,
        &format!("/api/listings/{listing_id}/quantity"),
        Some(&seller),
        Some(json!({ "quantity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restocked["quantity"], 4);

    let (status, moved) = send(
        &app,
        Method::PUT,
        &format!("/api/listings/{listing_id}/pickup-deadline"),
        Some(&seller),
        Some(json!({ "pickup_deadline": h.clock.now() + Duration::hours(5) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(moved["pickup_deadline"].is_string());

    let (status, sold) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/mark-sold"),
        Some(&seller),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sold["status"], "SOLD");
}

#[tokio::test]
async fn test_identity_and_ownership_errors() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, listing) = post_listing(&app, &h, &seller).await;
    let listing_id = listing["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::GET, "/api/reservations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let buyer = Caller::buyer(UserId::new());
    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/sell-direct"),
        Some(&buyer),
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["code"], "NOT_OWNER");

    let rival = Caller::seller(UserId::new(), StoreId::new());
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/mark-sold"),
        Some(&rival),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/api/store/reservations", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/store/reservations?status=PENDING",
        Some(&seller),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, error) = send(
        &app,
        Method::GET,
        &format!("/api/listings/{}", surplus_core::types::ListingId::new()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_feed_endpoint() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    post_listing(&app, &h, &seller).await;

    // Still in early access for anonymous buyers.
    let (status, feed) = send(&app, Method::GET, "/api/feed", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["count"], 0);

    h.clock.advance(Duration::minutes(10));
    let uri = format!(
        "/api/feed?lat={}&lon={}&radius_km=1",
        CITY_HALL.latitude, CITY_HALL.longitude
    );
    let (status, feed) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["items"][0]["is_early_access"], false);
    assert!(feed["items"][0]["distance_km"].as_f64().unwrap() < 0.01);

    let (status, _) = send(&app, Method::GET, "/api/feed?lat=37.5", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sweep_endpoint_requires_secret() {
    let disabled = Harness::new();
    let app = build_router(disabled.state.clone());
    let sweep = "/api/internal/sweeps/auto-complete";
    let (status, _) = send(&app, Method::POST, sweep, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let h = Harness::with_settings(MarketplaceSettings {
        cron_secret: Some("s3cret".to_string()),
        ..MarketplaceSettings::default()
    });
    let app = build_router(h.state.clone());

    let request = |token: Option<&str>| {
        let builder = Request::builder()
            .method(Method::POST)
            .uri("/api/internal/sweeps/auto-complete");
        let builder = match token {
            Some(token) => builder.header("authorization", format!("Bearer {token}")),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    };

    let missing = app.clone().oneshot(request(None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let wrong = app.clone().oneshot(request(Some("guess"))).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = app.clone().oneshot(request(Some("s3cret"))).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let bytes = to_bytes(ok.into_body(), usize::MAX).await.unwrap();
    let report: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(report["completed"], 0);
}

#[tokio::test]
async fn test_negative_and_fractional_quantities_are_typed_errors() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, listing) = post_listing(&app, &h, &seller).await;
    let listing_id = listing["id"].as_str().unwrap().to_string();
    let buyer = Caller::buyer(UserId::new());

    for quantity in [json!(-1), json!(1.5)] {
        let (status, error) = send(
            &app,
            Method::POST,
            &format!("/api/listings/{listing_id}/reservations"),
            Some(&buyer),
            Some(json!({ "quantity": quantity })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "reserve {quantity}");
        assert_eq!(error["code"], "INVALID_QUANTITY", "reserve {quantity}");

        let (status, error) = send(
            &app,
            Method::POST,
            &format!("/api/listings/{listing_id}/sell-direct"),
            Some(&seller),
            Some(json!({ "quantity": quantity })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "sell-direct {quantity}");
        assert_eq!(error["code"], "INVALID_QUANTITY", "sell-direct {quantity}");

        let (status, error) = send(
            &app,
            Method::PUT,
            &format!("/api/listings/{listing_id}/quantity"),
            Some(&seller),
            Some(json!({ "quantity": quantity })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "restock {quantity}");
        assert_eq!(error["code"], "INVALID_QUANTITY", "restock {quantity}");
    }

    let mut body = listing_body(&h, 3);
    body["quantity"] = json!(2.5);
    let (status, error) =
        send(&app, Method::POST, "/api/listings", Some(&seller), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "INVALID_QUANTITY");

    let uri = format!("/api/listings/{listing_id}");
    let (_, detail) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(detail["quantity"], 3);
}

#[tokio::test]
async fn test_malformed_bodies_get_error_codes() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;

    let request = identity(Request::builder().method(Method::POST).uri("/api/listings"), &seller)
        .header("content-type", "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["code"], "MALFORMED_JSON");

    let (status, error) = send(
        &app,
        Method::POST,
        "/api/listings",
        Some(&seller),
        Some(json!({ "name": "Bagels" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "INVALID_BODY");
    assert!(error["message"].is_string());
}

#[tokio::test]
async fn test_edit_listing_endpoint() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (_, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, listing) = post_listing(&app, &h, &seller).await;
    let uri = format!("/api/listings/{}", listing["id"].as_str().unwrap());

    let (status, edited) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&seller),
        Some(json!({ "name": "Kimchi pancake", "discount_price": 5_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["name"], "Kimchi pancake");
    assert_eq!(edited["discount_percent"], 50);
    assert_eq!(edited["quantity"], 3);

    let (status, error) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&seller),
        Some(json!({ "discount_price": 10_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "INVALID_PRICE");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&Caller::buyer(UserId::new())),
        Some(json!({ "name": "Mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_store_page_endpoints() {
    let h = Harness::new();
    let app = build_router(h.state.clone());
    let (store_ref, seller) = h.open_store(Some(CITY_HALL)).await;
    let (_, listing) = post_listing(&app, &h, &seller).await;
    let listing_id = listing["id"].as_str().unwrap().to_string();
    send(
        &app,
        Method::POST,
        &format!("/api/listings/{listing_id}/reservations"),
        Some(&Caller::buyer(UserId::new())),
        Some(json!({ "quantity": 1 })),
    )
    .await;

    let page_uri = format!("/api/stores/{}/listings", store_ref.id);
    let (status, page) = send(&app, Method::GET, &page_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 0);

    h.clock.advance(Duration::minutes(10));
    let (_, page) = send(&app, Method::GET, &page_uri, None, None).await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["items"][0]["id"], listing_id.as_str());

    let (status, own) = send(&app, Method::GET, "/api/store/listings", Some(&seller), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(own[0]["reserved_quantity"], 1);
    assert_eq!(own[0]["quantity"], 2);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/store/listings",
        Some(&Caller::buyer(UserId::new())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
