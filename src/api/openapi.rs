//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, cart, circulation, fines, health, stats, users};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "0.3.0",
        description = "Library circulation REST API: catalog, loans, reservations and fines",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::logout,
        auth::me,
        // Books
        books::search_books,
        books::get_book,
        books::create_book,
        books::delete_book,
        books::add_copies,
        books::check_copy,
        books::delete_copy,
        // Circulation
        circulation::borrow,
        circulation::borrow_title,
        circulation::return_copy,
        circulation::renew_any,
        circulation::renew_own,
        circulation::user_loans,
        circulation::my_loans,
        // Cart
        cart::get_cart,
        cart::add_to_cart,
        cart::remove_from_cart,
        cart::checkout,
        // Fines
        fines::list_fines,
        fines::create_fine,
        fines::pay_fine,
        // Users
        users::list_users,
        users::search_users,
        users::create_user,
        users::reset_password,
        users::my_profile,
        users::change_password,
        // Stats
        stats::get_stats,
        stats::get_chart_data,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::UserPayload,
            // Books
            crate::models::title::Title,
            crate::models::title::NewTitle,
            crate::models::title::TitleDetails,
            crate::models::copy::Copy,
            crate::models::copy::AddCopies,
            crate::models::copy::CopyPreview,
            crate::models::enums::CopyStatus,
            books::BooksPayload,
            books::BookPayload,
            books::CopiesPayload,
            books::CopyPayload,
            // Circulation
            crate::models::loan::LoanTransaction,
            crate::models::loan::LoanView,
            crate::models::enums::TransactionStatus,
            crate::services::circulation::BorrowItemResult,
            crate::services::circulation::BatchBorrow,
            crate::services::circulation::ReturnReceipt,
            crate::services::circulation::CheckoutSummary,
            circulation::BorrowRequest,
            circulation::BorrowTitleRequest,
            circulation::ReturnRequest,
            circulation::RenewRequest,
            circulation::LoanPayload,
            circulation::LoansPayload,
            // Cart
            crate::models::cart::CartItem,
            crate::models::cart::CartIsbn,
            cart::CartPayload,
            // Fines
            crate::models::fine::Fine,
            crate::models::fine::CreateFine,
            crate::models::fine::FineDetails,
            crate::models::fine::FineView,
            crate::models::enums::FineReason,
            crate::models::enums::FineStatus,
            fines::PayFineRequest,
            fines::FinePayload,
            fines::FinesPayload,
            // Users
            crate::models::user::User,
            crate::models::user::CreateReader,
            crate::models::user::ChangePassword,
            crate::models::user::ReaderSummary,
            crate::models::user::Profile,
            crate::models::enums::Role,
            users::ReadersPayload,
            users::CreatedReader,
            // Stats
            crate::services::stats::LibraryStats,
            crate::services::stats::Series,
            crate::services::stats::ChartData,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalog and copy management"),
        (name = "circulation", description = "Borrow, return and renew"),
        (name = "cart", description = "Self-service reservation cart"),
        (name = "fines", description = "Fine ledger"),
        (name = "users", description = "Reader accounts"),
        (name = "stats", description = "Statistics")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
