//! Authentication endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::User,
    AppState,
};

use super::{done, success, success_with, ApiJson, AuthenticatedUser, Empty, Success};

/// Login request
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or student id
    #[serde(alias = "login")]
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token
    pub token: String,
    pub token_type: String,
    /// Page the client should open next
    pub redirect: String,
    pub user: User,
}

#[derive(Serialize, ToSchema)]
pub struct UserPayload {
    pub user: User,
}

/// Log in and obtain a bearer token
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Wrong password", body = crate::error::ErrorResponse),
        (status = 403, description = "Account locked", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown account", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<Json<Success<LoginResponse>>> {
    let login = state
        .services
        .accounts
        .login(&request.username, &request.password)
        .await?;

    let redirect = if login.user.role.is_staff() {
        "/admin"
    } else {
        "/"
    };
    Ok(success_with(
        "Login successful",
        LoginResponse {
            token: login.token,
            token_type: "Bearer".to_string(),
            redirect: redirect.to_string(),
            user: login.user,
        },
    ))
}

/// Log out. Tokens are stateless; the client discards its copy.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout() -> Json<Success<Empty>> {
    done("Logged out")
}

/// Current user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserPayload),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<UserPayload>>> {
    let user = state.services.accounts.get_user(claims.user_id).await?;
    Ok(success(UserPayload { user }))
}
