//! API integration tests against a running server
//!
//! Start the server with `CIRCULATION_AUTH__ADMIN_PASSWORD=admin` and run
//! `cargo test --test api_tests -- --ignored`.

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Helper to get a staff token
async fn get_auth_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "admin"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// ISBN unique to this run so tests can be repeated on the same database
fn fresh_isbn() -> String {
    format!("979-{}", chrono::Utc::now().timestamp_micros())
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "admin"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "success");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
#[ignore]
async fn test_unknown_account() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "no-such-reader",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "error");
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/admin/fines", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_search_books() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books?q=a", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["books"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_cycle() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let isbn = fresh_isbn();

    let response = client
        .post(format!("{}/admin/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "isbn": isbn,
            "title": "Integration Test Book",
            "author": "Test Author",
            "qty": 1
        }))
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), 201);

    let student_id = format!("IT{}", chrono::Utc::now().timestamp_micros());
    let response = client
        .post(format!("{}/admin/users", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "student_id": student_id,
            "fullname": "Integration Reader",
            "email": format!("{}@example.org", student_id)
        }))
        .send()
        .await
        .expect("Failed to create reader");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    let user_id = body["user"]["id"].as_i64().expect("No user id");

    let barcode = format!("{}-1", isbn);
    let response = client
        .post(format!("{}/admin/borrow", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "user_id": user_id, "barcodes": [barcode] }))
        .send()
        .await
        .expect("Failed to borrow");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success_count"], 1);

    let response = client
        .post(format!("{}/admin/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "barcode": barcode }))
        .send()
        .await
        .expect("Failed to return");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["fine"], 0);

    let response = client
        .delete(format!("{}/admin/books/{}", BASE_URL, isbn))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to delete book");
    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_stats() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/admin/stats/chart", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["bar"]["labels"].as_array().map(Vec::len), Some(6));
}
