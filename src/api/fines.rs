//! Fine ledger endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::fine::{CreateFine, Fine, FinePayment, FineView},
    AppState,
};

use super::{success, success_with, ApiJson, AuthenticatedUser, Success};

#[derive(Deserialize, ToSchema)]
pub struct PayFineRequest {
    pub fine_id: i32,
}

#[derive(Serialize, ToSchema)]
pub struct FinePayload {
    pub fine: Fine,
}

#[derive(Serialize, ToSchema)]
pub struct FinesPayload {
    pub fines: Vec<FineView>,
}

/// All fines, unpaid first
#[utoipa::path(
    get,
    path = "/admin/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Fine ledger", body = FinesPayload))
)]
pub async fn list_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<FinesPayload>>> {
    claims.require_staff()?;

    let fines = state.services.fines.list().await?;
    Ok(success(FinesPayload { fines }))
}

/// Record a damage, loss or other fine
#[utoipa::path(
    post,
    path = "/admin/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    request_body = CreateFine,
    responses(
        (status = 201, description = "Fine created", body = FinePayload),
        (status = 400, description = "Invalid amount, reason or user", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateFine>,
) -> AppResult<(StatusCode, Json<Success<FinePayload>>)> {
    claims.require_staff()?;

    let fine = state.services.fines.create_manual(request).await?;
    Ok((
        StatusCode::CREATED,
        success_with("Fine created", FinePayload { fine }),
    ))
}

/// Mark a fine paid
#[utoipa::path(
    post,
    path = "/admin/fines/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    request_body = PayFineRequest,
    responses(
        (status = 200, description = "Fine paid, or already paid", body = FinePayload),
        (status = 404, description = "Unknown fine", body = crate::error::ErrorResponse)
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<PayFineRequest>,
) -> AppResult<Json<Success<FinePayload>>> {
    claims.require_staff()?;

    let (message, fine) = match state.services.fines.pay(request.fine_id).await? {
        FinePayment::Paid(fine) => ("Fine paid", fine),
        FinePayment::AlreadyPaid(fine) => ("Fine was already paid", fine),
    };
    Ok(success_with(message, FinePayload { fine }))
}
