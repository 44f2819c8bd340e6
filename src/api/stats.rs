//! Statistics endpoints

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    services::stats::{ChartData, LibraryStats},
    AppState,
};

use super::{success, AuthenticatedUser, Success};

/// Dashboard counters
#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Library statistics", body = LibraryStats))
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<LibraryStats>>> {
    claims.require_staff()?;

    let stats = state.services.stats.stats().await?;
    Ok(success(stats))
}

/// Copy usage and monthly fine revenue
#[utoipa::path(
    get,
    path = "/admin/stats/chart",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Chart series", body = ChartData))
)]
pub async fn get_chart_data(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Success<ChartData>>> {
    claims.require_staff()?;

    let chart = state.services.stats.chart_data().await?;
    Ok(success(chart))
}
