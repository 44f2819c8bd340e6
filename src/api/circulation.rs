//! Borrow, return and renew endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{LoanTransaction, LoanView},
    services::circulation::{BatchBorrow, ReturnReceipt},
    AppState,
};

use super::{success, success_with, ApiJson, AuthenticatedUser, Success};

/// Staff borrow request, one or more scanned barcodes
#[derive(Deserialize, ToSchema)]
pub struct BorrowRequest {
    pub user_id: i32,
    pub barcodes: Vec<String>,
}

/// Self-service borrow request
#[derive(Deserialize, ToSchema)]
pub struct BorrowTitleRequest {
    pub isbn: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ReturnRequest {
    pub barcode: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RenewRequest {
    #[serde(alias = "transaction_id")]
    pub trans_id: i32,
}

#[derive(Serialize, ToSchema)]
pub struct LoanPayload {
    pub loan: LoanTransaction,
}

#[derive(Serialize, ToSchema)]
pub struct LoansPayload {
    pub loans: Vec<LoanView>,
}

/// Borrow scanned copies for a reader, or hand over their reservations
#[utoipa::path(
    post,
    path = "/admin/borrow",
    tag = "circulation",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 200, description = "Per-barcode outcome", body = BatchBorrow),
        (status = 400, description = "Loan limit reached or copy unavailable", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown user or barcode", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<BorrowRequest>,
) -> AppResult<Json<Success<BatchBorrow>>> {
    claims.require_staff()?;

    let batch = state
        .services
        .circulation
        .borrow(request.user_id, &request.barcodes)
        .await?;
    Ok(success_with(
        format!("Borrowed {} book(s)", batch.success_count),
        batch,
    ))
}

/// Borrow any available copy of a title for oneself
#[utoipa::path(
    post,
    path = "/borrow",
    tag = "circulation",
    security(("bearer_auth" = [])),
    request_body = BorrowTitleRequest,
    responses(
        (status = 200, description = "Loan opened", body = LoanPayload),
        (status = 400, description = "Out of stock or loan limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_title(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<BorrowTitleRequest>,
) -> AppResult<Json<Success<LoanPayload>>> {
    let loan = state
        .services
        .circulation
        .borrow_title(claims.user_id, request.isbn.trim())
        .await?;
    Ok(success_with("Book borrowed", LoanPayload { loan }))
}

/// Return a copy
#[utoipa::path(
    post,
    path = "/admin/return",
    tag = "circulation",
    security(("bearer_auth" = [])),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Returned, with any overdue fine", body = ReturnReceipt),
        (status = 400, description = "Copy is not borrowed", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown barcode", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<ReturnRequest>,
) -> AppResult<Json<Success<ReturnReceipt>>> {
    claims.require_staff()?;

    let receipt = state.services.circulation.return_copy(&request.barcode).await?;
    let message = if receipt.fine > 0 {
        format!(
            "Returned {} day(s) late, fine {}",
            receipt.overdue_days, receipt.fine
        )
    } else {
        "Returned on time".to_string()
    };
    Ok(success_with(message, receipt))
}

async fn renew(
    state: &AppState,
    claims: &crate::models::user::UserClaims,
    request: RenewRequest,
) -> AppResult<Json<Success<LoanPayload>>> {
    let loan = state
        .services
        .circulation
        .renew(request.trans_id, claims.principal())
        .await?;
    Ok(success_with(
        format!("Renewed until {}", loan.due_date.format("%d/%m/%Y")),
        LoanPayload { loan },
    ))
}

/// Renew any reader's loan
#[utoipa::path(
    post,
    path = "/admin/renew",
    tag = "circulation",
    security(("bearer_auth" = [])),
    request_body = RenewRequest,
    responses(
        (status = 200, description = "Loan renewed", body = LoanPayload),
        (status = 400, description = "Not renewable", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown transaction", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew_any(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<RenewRequest>,
) -> AppResult<Json<Success<LoanPayload>>> {
    claims.require_staff()?;
    renew(&state, &claims, request).await
}

/// Renew one of one's own loans
#[utoipa::path(
    post,
    path = "/me/renew",
    tag = "circulation",
    security(("bearer_auth" = [])),
    request_body = RenewRequest,
    responses(
        (status = 200, description = "Loan renewed", body = LoanPayload),
        (status = 400, description = "Not renewable", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the borrower", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew_own(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<RenewRequest>,
) -> AppResult<Json<Success<LoanPayload>>> {
    renew(&state, &claims, request).await
}

/// Open loans of a reader
#[utoipa::path(
    get,
    path = "/admin/users/{id}/loans",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Open loans", body = LoansPayload),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Success<LoansPayload>>> {
    claims.require_staff()?;

    let loans = state.services.circulation.user_loans(user_id).await?;
    Ok(success(LoansPayload { loans }))
}

/// Own reservations and loans
#[utoipa::path(
    get,
    path = "/me/loans",
    tag = "circulation",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Open transactions", body = LoansPayload))
)]
pub async fn my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<LoansPayload>>> {
    let loans = state.services.circulation.my_loans(claims.user_id).await?;
    Ok(success(LoansPayload { loans }))
}
