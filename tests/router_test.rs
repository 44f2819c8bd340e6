//! HTTP surface tests: the full router over the in-memory store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use circulation_server::{config::AppConfig, create_router, repository::MemoryStore, AppState};

const ADMIN_PASSWORD: &str = "library-admin";

async fn app() -> Router {
    let mut config = AppConfig::default();
    config.auth.admin_password = Some(ADMIN_PASSWORD.to_string());
    let state = AppState::new(config, Arc::new(MemoryStore::new()));
    state.services.accounts.ensure_admin().await.unwrap();
    create_router(state)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

/// Staff token plus a registered reader's id and token
async fn staff_and_reader(app: &Router) -> (String, i64, String) {
    let staff = login(app, "admin", ADMIN_PASSWORD).await;
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/admin/users",
        Some(&staff),
        Some(json!({
            "student_id": "B20DCCN001",
            "fullname": "Nguyen Van A",
            "email": "a@example.org",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let reader_id = body["user"]["id"].as_i64().unwrap();
    let reader = login(app, "B20DCCN001", "123456").await;
    (staff, reader_id, reader)
}

async fn add_book(app: &Router, staff: &str, isbn: &str, qty: i32) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/admin/books",
        Some(staff),
        Some(json!({ "isbn": isbn, "title": "Clean Code", "author": "Robert C. Martin", "qty": qty })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = call(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_returns_a_bearer_token_in_the_envelope() {
    let app = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "login": "admin", "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["redirect"], "/admin");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let token = body["token"].as_str().unwrap();
    let (status, body) = call(&app, Method::GET, "/api/v1/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "admin");
}

#[tokio::test]
async fn wrong_passwords_lock_the_account() {
    let app = app().await;
    let attempt = |password: &'static str| {
        let app = app.clone();
        async move {
            call(
                &app,
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "username": "admin", "password": password })),
            )
            .await
        }
    };

    for _ in 0..4 {
        let (status, body) = attempt("wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");
    }
    let (status, body) = attempt("wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("locked"));

    let (status, _) = attempt(ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_routes_need_a_token_and_a_role() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/v1/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, _) = call(&app, Method::GET, "/api/v1/me/loans", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, _, reader) = staff_and_reader(&app).await;
    let (status, body) = call(&app, Method::GET, "/api/v1/admin/stats", Some(&reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn malformed_bodies_get_the_error_envelope() {
    let app = app().await;
    let staff = login(&app, "admin", ADMIN_PASSWORD).await;

    for body in [
        json!({ "barcodes": ["978-1-1"] }),
        json!({ "user_id": "abc", "barcodes": [] }),
    ] {
        let (status, reply) =
            call(&app, Method::POST, "/api/v1/admin/borrow", Some(&staff), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{reply}");
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["error"], "BadValue");
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["error"], "BadValue");
}

#[tokio::test]
async fn reader_borrows_and_staff_checks_in() {
    let app = app().await;
    let (staff, reader_id, reader) = staff_and_reader(&app).await;
    add_book(&app, &staff, "978-0132350884", 1).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/borrow",
        Some(&reader),
        Some(json!({ "isbn": "978-0132350884" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["loan"]["status"], "borrowing");
    assert_eq!(body["loan"]["barcode"], "978-0132350884-1");
    let loan_id = body["loan"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/borrow",
        Some(&reader),
        Some(json!({ "isbn": "978-0132350884" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "OutOfStock");

    let (status, body) = call(&app, Method::GET, "/api/v1/me/loans", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loans"].as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/admin/users/{}/loans", reader_id),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loans"][0]["id"].as_i64(), Some(loan_id));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/me/renew",
        Some(&reader),
        Some(json!({ "trans_id": loan_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["loan"]["renew_count"], 1);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/me/renew",
        Some(&reader),
        Some(json!({ "transaction_id": loan_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "RenewalLimitReached");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/return",
        Some(&staff),
        Some(json!({ "barcode": "978-0132350884-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["fine"], 0);
    assert_eq!(body["message"], "Returned on time");

    let (status, body) = call(&app, Method::GET, "/api/v1/books/978-0132350884", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["qty_avail"], 1);
}

#[tokio::test]
async fn unknown_and_idle_barcodes_are_rejected_on_return() {
    let app = app().await;
    let (staff, _, _) = staff_and_reader(&app).await;
    add_book(&app, &staff, "978-1", 1).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/return",
        Some(&staff),
        Some(json!({ "barcode": "no-such-copy" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "UnknownBarcode");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/return",
        Some(&staff),
        Some(json!({ "barcode": "978-1-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NotCurrentlyBorrowed");
}

#[tokio::test]
async fn cart_checkout_then_pickup_at_the_desk() {
    let app = app().await;
    let (staff, reader_id, reader) = staff_and_reader(&app).await;
    add_book(&app, &staff, "978-1", 1).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/cart/add",
        Some(&reader),
        Some(json!({ "isbn": "978-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 1);

    let (status, body) = call(&app, Method::POST, "/api/v1/cart/checkout", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success_count"], 1);
    assert_eq!(body["reservations"][0]["status"], "pending");
    let barcode = body["reservations"][0]["barcode"].as_str().unwrap().to_string();

    let (_, body) = call(&app, Method::GET, "/api/v1/cart", Some(&reader), None).await;
    assert_eq!(body["count"], 0);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/admin/copies/{}", barcode),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["copy"]["copy_status"], "pending");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/borrow",
        Some(&staff),
        Some(json!({ "user_id": reader_id, "barcodes": [barcode] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success_count"], 1);
    assert_eq!(body["items"][0]["ok"], true);
}

#[tokio::test]
async fn fines_are_created_and_paid_once() {
    let app = app().await;
    let (staff, reader_id, _) = staff_and_reader(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/fines",
        Some(&staff),
        Some(json!({ "user_id": reader_id, "amount": 20000, "reason": "damaged", "note": "Water damage" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let fine_id = body["fine"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/fines",
        Some(&staff),
        Some(json!({ "user_id": reader_id, "amount": 0, "reason": "lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let pay = json!({ "fine_id": fine_id });
    let (status, body) = call(&app, Method::POST, "/api/v1/admin/fines/pay", Some(&staff), Some(pay.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["fine"]["status"], "paid");
    let paid_at = body["fine"]["payment_date"].clone();

    let (status, body) = call(&app, Method::POST, "/api/v1/admin/fines/pay", Some(&staff), Some(pay)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Fine was already paid");
    assert_eq!(body["fine"]["payment_date"], paid_at);

    let (status, body) = call(&app, Method::GET, "/api/v1/admin/stats", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revenue"], 20000);
    assert_eq!(body["revenue_fmt"], "20.000");
}

#[tokio::test]
async fn inventory_refuses_to_drop_copies_in_use() {
    let app = app().await;
    let (staff, reader_id, _) = staff_and_reader(&app).await;
    add_book(&app, &staff, "978-1", 3).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/borrow",
        Some(&staff),
        Some(json!({ "user_id": reader_id, "barcodes": ["978-1-1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = call(&app, Method::DELETE, "/api/v1/admin/copies/978-1-1", Some(&staff), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "CopyInUse");

    let (status, body) = call(&app, Method::DELETE, "/api/v1/admin/books/978-1", Some(&staff), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "CopyInUse");

    let (status, body) = call(&app, Method::DELETE, "/api/v1/admin/copies/978-1-2", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/books/978-1/copies",
        Some(&staff),
        Some(json!({ "qty": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["copies"][0]["barcode"], "978-1-4");

    let (status, body) = call(&app, Method::GET, "/api/v1/books?q=clean", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"][0]["qty_total"], 3);
    assert_eq!(body["books"][0]["qty_avail"], 2);
}

#[tokio::test]
async fn readers_change_their_own_password() {
    let app = app().await;
    let (_, _, reader) = staff_and_reader(&app).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/me/password",
        Some(&reader),
        Some(json!({ "old_password": "not-it", "new_password": "a-better-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/me/password",
        Some(&reader),
        Some(json!({ "old_password": "123456", "new_password": "a-better-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    login(&app, "B20DCCN001", "a-better-secret").await;
}
