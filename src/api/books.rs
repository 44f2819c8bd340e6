//! Catalog and inventory endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        copy::{AddCopies, Copy, CopyPreview},
        title::{NewTitle, Title, TitleDetails, TitleQuery},
    },
    AppState,
};

use super::{done, success, success_with, ApiJson, AuthenticatedUser, Empty, Success};

#[derive(Serialize, ToSchema)]
pub struct BooksPayload {
    pub books: Vec<Title>,
}

#[derive(Serialize, ToSchema)]
pub struct BookPayload {
    pub book: Title,
}

#[derive(Serialize, ToSchema)]
pub struct CopiesPayload {
    pub copies: Vec<Copy>,
}

#[derive(Serialize, ToSchema)]
pub struct CopyPayload {
    pub copy: CopyPreview,
}

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(TitleQuery),
    responses((status = 200, description = "Matching titles", body = BooksPayload))
)]
pub async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<TitleQuery>,
) -> AppResult<Json<Success<BooksPayload>>> {
    let books = state
        .services
        .inventory
        .search_titles(query.q.as_deref())
        .await?;
    Ok(success(BooksPayload { books }))
}

/// Title with its copies
#[utoipa::path(
    get,
    path = "/books/{isbn}",
    tag = "books",
    params(("isbn" = String, Path, description = "ISBN")),
    responses(
        (status = 200, description = "Title details", body = TitleDetails),
        (status = 404, description = "Unknown ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> AppResult<Json<Success<TitleDetails>>> {
    let details = state.services.inventory.title_detail(&isbn).await?;
    Ok(success(details))
}

/// Register a title and its copies
#[utoipa::path(
    post,
    path = "/admin/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = NewTitle,
    responses(
        (status = 201, description = "Title registered", body = BookPayload),
        (status = 400, description = "Invalid input or duplicate ISBN", body = crate::error::ErrorResponse),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<NewTitle>,
) -> AppResult<(StatusCode, Json<Success<BookPayload>>)> {
    claims.require_staff()?;

    let book = state.services.inventory.register_title(request).await?;
    Ok((
        StatusCode::CREATED,
        success_with("Book added", BookPayload { book }),
    ))
}

/// Delete a title and all its copies
#[utoipa::path(
    delete,
    path = "/admin/books/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("isbn" = String, Path, description = "ISBN")),
    responses(
        (status = 200, description = "Title deleted"),
        (status = 400, description = "A copy is reserved or on loan", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(isbn): Path<String>,
) -> AppResult<Json<Success<Empty>>> {
    claims.require_staff()?;

    let copies = state.services.inventory.delete_title(&isbn).await?;
    Ok(done(format!("Book deleted with {} copies", copies)))
}

/// Add copies to a title
#[utoipa::path(
    post,
    path = "/admin/books/{isbn}/copies",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("isbn" = String, Path, description = "ISBN")),
    request_body = AddCopies,
    responses(
        (status = 201, description = "Copies created", body = CopiesPayload),
        (status = 404, description = "Unknown ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_copies(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(isbn): Path<String>,
    ApiJson(request): ApiJson<AddCopies>,
) -> AppResult<(StatusCode, Json<Success<CopiesPayload>>)> {
    claims.require_staff()?;

    let copies = state.services.inventory.add_copies(&isbn, request).await?;
    Ok((
        StatusCode::CREATED,
        success_with(format!("Added {} copies", copies.len()), CopiesPayload { copies }),
    ))
}

/// Preview a scanned copy
#[utoipa::path(
    get,
    path = "/admin/copies/{barcode}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("barcode" = String, Path, description = "Copy barcode")),
    responses(
        (status = 200, description = "Copy preview", body = CopyPayload),
        (status = 404, description = "Unknown barcode", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(barcode): Path<String>,
) -> AppResult<Json<Success<CopyPayload>>> {
    claims.require_staff()?;

    let copy = state.services.inventory.check_copy(&barcode).await?;
    Ok(success(CopyPayload { copy }))
}

/// Delete a copy that is on the shelf
#[utoipa::path(
    delete,
    path = "/admin/copies/{barcode}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("barcode" = String, Path, description = "Copy barcode")),
    responses(
        (status = 200, description = "Copy deleted"),
        (status = 400, description = "Copy in use", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown barcode", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(barcode): Path<String>,
) -> AppResult<Json<Success<Empty>>> {
    claims.require_staff()?;

    let copy = state.services.inventory.remove_copy(&barcode).await?;
    Ok(done(format!("Copy {} deleted", copy.barcode)))
}
