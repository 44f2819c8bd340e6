//! Library circulation server
//!
//! REST JSON API over a circulation engine that keeps titles, copies and
//! loan transactions consistent while many desks and readers borrow,
//! reserve, return and renew at the same time.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/login", post(api::auth::login))
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/me", get(api::auth::me))
        // Catalog
        .route("/books", get(api::books::search_books))
        .route("/books/:isbn", get(api::books::get_book))
        // Inventory
        .route("/admin/books", post(api::books::create_book))
        .route("/admin/books/:isbn", delete(api::books::delete_book))
        .route("/admin/books/:isbn/copies", post(api::books::add_copies))
        .route(
            "/admin/copies/:barcode",
            get(api::books::check_copy).delete(api::books::delete_copy),
        )
        // Circulation
        .route("/admin/borrow", post(api::circulation::borrow))
        .route("/borrow", post(api::circulation::borrow_title))
        .route("/admin/return", post(api::circulation::return_copy))
        .route("/admin/renew", post(api::circulation::renew_any))
        .route("/me/renew", post(api::circulation::renew_own))
        .route("/admin/users/:id/loans", get(api::circulation::user_loans))
        .route("/me/loans", get(api::circulation::my_loans))
        // Cart
        .route("/cart", get(api::cart::get_cart))
        .route("/cart/add", post(api::cart::add_to_cart))
        .route("/cart/remove", post(api::cart::remove_from_cart))
        .route("/cart/checkout", post(api::cart::checkout))
        // Fines
        .route(
            "/admin/fines",
            get(api::fines::list_fines).post(api::fines::create_fine),
        )
        .route("/admin/fines/pay", post(api::fines::pay_fine))
        // Users
        .route(
            "/admin/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route("/admin/users/search", get(api::users::search_users))
        .route(
            "/admin/users/:id/reset-password",
            post(api::users::reset_password),
        )
        .route("/me/profile", get(api::users::my_profile))
        .route("/me/password", post(api::users::change_password))
        // Statistics
        .route("/admin/stats", get(api::stats::get_stats))
        .route("/admin/stats/chart", get(api::stats::get_chart_data))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
