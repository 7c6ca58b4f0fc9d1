use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    errors::ApiError,
    handlers::claims_user_id,
    middlewares::auth::JwtClaims,
    models::stats::{AnalyticsSubject, DashboardStats, LeaderboardEntry, ProfileStats, UserStats},
    models::HistoryEntry,
    services::{stats_service::StatsService, AppState},
};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const MAX_LEADERBOARD_SIZE: usize = 50;

/// GET /api/v1/stats/dashboard - per-subject and global progress
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<DashboardStats>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let stats = StatsService::new(&state).dashboard_stats(&user_id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/stats/me - global quiz count and average score
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<UserStats>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let stats = StatsService::new(&state).user_stats(&user_id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/stats/analytics - subject -> source -> module drilldown
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<Vec<AnalyticsSubject>>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let report = StatsService::new(&state).analytics_report(&user_id).await?;
    Ok(Json(report))
}

/// GET /api/v1/stats/history - completed sessions, newest first
pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let entries = StatsService::new(&state).quiz_history(&user_id).await?;
    Ok(Json(entries))
}

/// GET /api/v1/stats/profile - totals and achievement tier
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<ProfileStats>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let stats = StatsService::new(&state).profile_stats(&user_id).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/v1/stats/leaderboard - top users by average score
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD_SIZE);
    let entries = StatsService::new(&state).leaderboard(limit).await?;
    Ok(Json(entries))
}
