//! Reader administration and self-service account endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{ChangePassword, CreateReader, Profile, ReaderQuery, ReaderSummary, User},
    AppState,
};

use super::{done, success, success_with, ApiJson, AuthenticatedUser, Empty, Success};

#[derive(Serialize, ToSchema)]
pub struct ReadersPayload {
    pub users: Vec<ReaderSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct CreatedReader {
    pub user: User,
}

/// All readers with loan and fine totals
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Readers", body = ReadersPayload))
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<ReadersPayload>>> {
    claims.require_staff()?;

    let users = state.services.accounts.list_readers().await?;
    Ok(success(ReadersPayload { users }))
}

/// Quick reader lookup for the borrow desk
#[utoipa::path(
    get,
    path = "/admin/users/search",
    tag = "users",
    security(("bearer_auth" = [])),
    params(ReaderQuery),
    responses((status = 200, description = "At most five readers", body = ReadersPayload))
)]
pub async fn search_users(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReaderQuery>,
) -> AppResult<Json<Success<ReadersPayload>>> {
    claims.require_staff()?;

    let users = state
        .services
        .accounts
        .find_readers(query.q.as_deref().unwrap_or(""))
        .await?;
    Ok(success(ReadersPayload { users }))
}

/// Register a reader
#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateReader,
    responses(
        (status = 201, description = "Reader created", body = CreatedReader),
        (status = 400, description = "Invalid input or duplicate student id / email", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateReader>,
) -> AppResult<(StatusCode, Json<Success<CreatedReader>>)> {
    claims.require_staff()?;

    let user = state.services.accounts.create_reader(request).await?;
    Ok((
        StatusCode::CREATED,
        success_with("Reader created with the default password", CreatedReader { user }),
    ))
}

/// Reset a reader's password to the default
#[utoipa::path(
    post,
    path = "/admin/users/{id}/reset-password",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Password reset"),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Success<Empty>>> {
    claims.require_staff()?;

    state.services.accounts.reset_password(user_id).await?;
    Ok(done("Password reset to the default"))
}

/// Own profile and recent history
#[utoipa::path(
    get,
    path = "/me/profile",
    tag = "users",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Profile", body = Profile))
)]
pub async fn my_profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<Profile>>> {
    let profile = state.services.accounts.profile(claims.user_id).await?;
    Ok(success(profile))
}

/// Change own password
#[utoipa::path(
    post,
    path = "/me/password",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Wrong current password or new one too short", body = crate::error::ErrorResponse)
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<ChangePassword>,
) -> AppResult<Json<Success<Empty>>> {
    state
        .services
        .accounts
        .change_password(claims.user_id, &request.old_password, &request.new_password)
        .await?;
    Ok(done("Password changed"))
}
