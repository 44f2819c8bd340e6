//! Reservation cart endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::cart::{CartIsbn, CartItem},
    services::circulation::CheckoutSummary,
    AppState,
};

use super::{success, success_with, ApiJson, AuthenticatedUser, Success};

#[derive(Serialize, ToSchema)]
pub struct CartPayload {
    pub cart: Vec<CartItem>,
    pub count: usize,
}

impl From<Vec<CartItem>> for CartPayload {
    fn from(cart: Vec<CartItem>) -> Self {
        Self {
            count: cart.len(),
            cart,
        }
    }
}

/// Current cart
#[utoipa::path(
    get,
    path = "/cart",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Cart content", body = CartPayload))
)]
pub async fn get_cart(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<CartPayload>>> {
    let cart = state.services.cart.list(claims.user_id).await?;
    Ok(success(CartPayload::from(cart)))
}

/// Add a title to the cart
#[utoipa::path(
    post,
    path = "/cart/add",
    tag = "cart",
    security(("bearer_auth" = [])),
    request_body = CartIsbn,
    responses(
        (status = 200, description = "Added", body = CartPayload),
        (status = 400, description = "Already in cart or cart full", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<CartIsbn>,
) -> AppResult<Json<Success<CartPayload>>> {
    request.validate()?;
    let cart = state.services.cart.add(claims.user_id, &request.isbn).await?;
    Ok(success_with("Added to cart", CartPayload::from(cart)))
}

/// Remove a title from the cart
#[utoipa::path(
    post,
    path = "/cart/remove",
    tag = "cart",
    security(("bearer_auth" = [])),
    request_body = CartIsbn,
    responses(
        (status = 200, description = "Removed", body = CartPayload),
        (status = 404, description = "Not in cart", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<CartIsbn>,
) -> AppResult<Json<Success<CartPayload>>> {
    request.validate()?;
    let cart = state.services.cart.remove(claims.user_id, &request.isbn).await?;
    Ok(success_with("Removed from cart", CartPayload::from(cart)))
}

/// Reserve a copy of every cart title that has one available
#[utoipa::path(
    post,
    path = "/cart/checkout",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reservations created", body = CheckoutSummary),
        (status = 400, description = "Empty cart, loan limit or nothing available", body = crate::error::ErrorResponse)
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<CheckoutSummary>>> {
    let summary = state.services.circulation.checkout_cart(claims.user_id).await?;
    Ok(success_with(
        format!(
            "Reserved {} book(s); collect them at the desk",
            summary.success_count
        ),
        summary,
    ))
}
