//! HTTP API tests
//!
//! Drives the full router over the in-memory ledger store:
//! - Authentication on ledger routes
//! - Status codes for each error class
//! - Listing envelopes and report formats

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{Ledger, JWT_SECRET};
use stock_ledger::create_app;
use stock_ledger::middleware::auth::Claims;

fn bearer(user: Uuid) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: user.to_string(),
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn post(uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .body(Body::empty())
        .unwrap()
}

async fn app() -> (Ledger, Router) {
    let ledger = Ledger::new().await;
    let app = create_app(ledger.app_state());
    (ledger, app)
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (_, app) = app().await;
    let request = Request::builder()
        .uri("/api/v1/stock-levels")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let (_, app) = app().await;
    let request = Request::builder()
        .uri("/api/v1/stock-levels")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_health_is_public() {
    let (_, app) = app().await;
    for uri in ["/health", "/api/v1/health"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "connected");
    }
}

// ============================================================================
// Movements
// ============================================================================

#[tokio::test]
async fn test_single_movement_flow() {
    let (ledger, app) = app().await;

    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements",
            ledger.user,
            json!({
                "product_id": ledger.beans,
                "warehouse_id": ledger.main,
                "movement_type": "in",
                "quantity": 50,
                "cost_price": "2.50"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["movement_type"], "in");
    assert_eq!(body["user_id"], json!(ledger.user));

    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements",
            ledger.user,
            json!({
                "product_id": ledger.beans,
                "warehouse_id": ledger.main,
                "movement_type": "out",
                "quantity": 80
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");

    let (status, body) = send(
        &app,
        get(
            &format!("/api/v1/stock-levels/{}/{}", ledger.beans, ledger.main),
            ledger.user,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 50);
    assert_eq!(body["available_quantity"], 50);
}

#[tokio::test]
async fn test_invalid_movement_type_is_bad_request() {
    let (ledger, app) = app().await;
    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements",
            ledger.user,
            json!({
                "product_id": ledger.beans,
                "warehouse_id": ledger.main,
                "movement_type": "teleport",
                "quantity": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_MOVEMENT_TYPE");
    assert_eq!(body["error"]["field"], "movement_type");
}

#[tokio::test]
async fn test_bulk_movement_flow() {
    let (ledger, app) = app().await;
    let supplier = Uuid::new_v4();

    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements/bulk",
            ledger.user,
            json!({
                "supplier_id": supplier,
                "reference_number": "INV-7",
                "items": [
                    { "product_id": ledger.beans, "warehouse_id": ledger.main, "quantity": 10 },
                    { "product_id": ledger.filters, "warehouse_id": ledger.main, "quantity": 20 },
                    { "product_id": ledger.beans, "warehouse_id": ledger.annex, "quantity": 30 }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lines = body.as_array().unwrap();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l["reference_id"] == json!(supplier)));

    let (status, body) = send(&app, get("/api/v1/stock-movements/stock-in", ledger.user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["item_count"], 3);
}

#[tokio::test]
async fn test_bulk_without_items_is_bad_request() {
    let (ledger, app) = app().await;
    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements/bulk",
            ledger.user,
            json!({ "supplier_id": Uuid::new_v4(), "items": [] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Listings and reports
// ============================================================================

async fn stocked_app() -> (Ledger, Router) {
    let (ledger, app) = app().await;
    for (product, warehouse, qty) in [
        (ledger.beans, ledger.main, 5),
        (ledger.filters, ledger.main, 7),
        (ledger.beans, ledger.annex, 9),
    ] {
        let (status, _) = send(
            &app,
            post(
                "/api/v1/stock-movements",
                ledger.user,
                json!({
                    "product_id": product,
                    "warehouse_id": warehouse,
                    "movement_type": "in",
                    "quantity": qty
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    (ledger, app)
}

#[tokio::test]
async fn test_level_listing_envelope() {
    let (ledger, app) = stocked_app().await;
    let (status, body) = send(
        &app,
        get("/api/v1/stock-levels?page=1&limit=2&sort_by=quantity&sort_order=desc", ledger.user),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["data"][0]["quantity"], 9);
}

#[tokio::test]
async fn test_out_of_range_limit_falls_back() {
    let (ledger, app) = stocked_app().await;
    let (status, body) = send(&app, get("/api/v1/stock-levels?limit=1000&page=0", ledger.user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["page"], 1);
}

#[tokio::test]
async fn test_malformed_filter_is_bad_request() {
    let (ledger, app) = stocked_app().await;
    let (status, body) = send(&app, get("/api/v1/stock-movements?product_id=abc", ledger.user)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "product_id");
}

#[tokio::test]
async fn test_movement_listing_by_sku() {
    let (ledger, app) = stocked_app().await;
    let (status, body) = send(&app, get("/api/v1/stock-movements?product_sku=flt", ledger.user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["product_sku"], "FLT-100");
}

#[tokio::test]
async fn test_soh_report_json_and_csv() {
    let (ledger, app) = stocked_app().await;

    let (status, body) = send(&app, get("/api/v1/reports/soh", ledger.user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let response = app
        .clone()
        .oneshot(get("/api/v1/reports/soh?format=csv", ledger.user))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(csv.lines().count(), 4);
}

#[tokio::test]
async fn test_reports_are_gzip_compressed_on_request() {
    let (ledger, app) = stocked_app().await;
    let mut request = get("/api/v1/reports/soh", ledger.user);
    request
        .headers_mut()
        .insert(header::ACCEPT_ENCODING, "gzip".parse().unwrap());

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}

#[tokio::test]
async fn test_oversized_cost_price_is_bad_request() {
    let (ledger, app) = app().await;
    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements",
            ledger.user,
            json!({
                "product_id": ledger.beans,
                "warehouse_id": ledger.main,
                "movement_type": "in",
                "quantity": 2,
                "cost_price": "79228162514264337593543950335"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "cost_price");

    let (status, body) = send(
        &app,
        post(
            "/api/v1/stock-movements/bulk",
            ledger.user,
            json!({
                "supplier_id": Uuid::new_v4(),
                "items": [
                    { "product_id": ledger.beans, "warehouse_id": ledger.main, "quantity": 2,
                      "cost_price": "79228162514264337593543950335" }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "items[0].cost_price");
}

#[tokio::test]
async fn test_low_stock_report() {
    let (ledger, app) = stocked_app().await;
    ledger
        .store
        .set_thresholds(ledger.beans, ledger.main, 10, None)
        .await
        .unwrap();

    let (status, body) = send(&app, get("/api/v1/reports/low-stock", ledger.user)).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["product_sku"], "ARB-001");
    assert_eq!(rows[0]["warehouse_name"], "Main Warehouse");
}

#[tokio::test]
async fn test_missing_level_is_not_found() {
    let (ledger, app) = app().await;
    let (status, body) = send(
        &app,
        get(
            &format!("/api/v1/stock-levels/{}/{}", ledger.filters, ledger.annex),
            ledger.user,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
